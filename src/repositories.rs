pub mod achievements;
pub mod direct_links;
pub mod history;
pub mod messages;
pub mod notices;
pub mod security;
pub mod settings;
pub mod telegram;
pub mod users;
pub mod withdrawals;
