//! Credentials and sessions: Argon2 password hashes, Telegram Mini-App
//! `initData` verification, and the JWT carried in the session cookie.

pub mod password;
pub mod session;
pub mod telegram;

pub use session::{AdminSession, Claims, Session, SessionKeys};
