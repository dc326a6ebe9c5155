//! Verification of the `initData` string a Telegram Mini-App hands to its web view.
//!
//! The bot token is first turned into a secret with `HMAC-SHA256("WebAppData", token)`.
//! The received fields, minus `hash`, are sorted by key and joined as
//! `key=value` lines. That data-check string signed with the secret must equal
//! the hex `hash`, compared in constant time.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TelegramUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl TelegramUser {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InitData {
    pub user: TelegramUser,
    pub auth_date: i64,
    pub start_param: Option<String>,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum InitDataError {
    #[error("init data has no hash")]
    MissingHash,
    #[error("init data signature mismatch")]
    BadSignature,
    #[error("init data has no auth_date")]
    MissingAuthDate,
    #[error("init data is too old")]
    Expired,
    #[error("init data has no valid user: {0}")]
    BadUser(String),
}

fn keyed(key: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length.
    HmacSha256::new_from_slice(key).expect("hmac key of any size")
}

fn sign(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = keyed(key);
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Checks the signature and freshness of `init_data` and extracts the user.
pub fn verify_init_data(
    init_data: &str,
    bot_token: &str,
    max_age_secs: i64,
    now_unix: i64,
) -> Result<InitData, InitDataError> {
    let mut fields: BTreeMap<String, String> = form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect();

    let received_hash = fields.remove("hash").ok_or(InitDataError::MissingHash)?;

    let data_check_string = fields
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("\n");

    let received = hex::decode(&received_hash).map_err(|_| InitDataError::BadSignature)?;
    let secret = sign(b"WebAppData", bot_token.as_bytes());
    let mut mac = keyed(&secret);
    mac.update(data_check_string.as_bytes());
    mac.verify_slice(&received)
        .map_err(|_| InitDataError::BadSignature)?;

    let auth_date: i64 = fields
        .get("auth_date")
        .and_then(|v| v.parse().ok())
        .ok_or(InitDataError::MissingAuthDate)?;
    if max_age_secs > 0 && now_unix - auth_date > max_age_secs {
        return Err(InitDataError::Expired);
    }

    let user_json = fields
        .get("user")
        .ok_or_else(|| InitDataError::BadUser("missing".to_string()))?;
    let user: TelegramUser =
        serde_json::from_str(user_json).map_err(|e| InitDataError::BadUser(e.to_string()))?;

    Ok(InitData {
        user,
        auth_date,
        start_param: fields.remove("start_param").filter(|s| !s.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123456:TEST-token";

    /// Builds an `initData` string signed the way Telegram signs it.
    fn signed_init_data(pairs: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = pairs.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let check = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n");
        let secret = sign(b"WebAppData", TOKEN.as_bytes());
        let hash = hex::encode(sign(&secret, check.as_bytes()));

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k, v);
        }
        serializer.append_pair("hash", &hash);
        serializer.finish()
    }

    const USER: &str = r#"{"id":42,"first_name":"Rahim","last_name":"Uddin","username":"rahim"}"#;

    #[test]
    fn accepts_correctly_signed_data() {
        let data = signed_init_data(&[
            ("auth_date", "1700000000"),
            ("query_id", "AAF"),
            ("start_param", "REF12345"),
            ("user", USER),
        ]);

        let parsed = verify_init_data(&data, TOKEN, 86_400, 1_700_000_100).unwrap();
        assert_eq!(parsed.user.id, 42);
        assert_eq!(parsed.user.display_name(), "Rahim Uddin");
        assert_eq!(parsed.start_param.as_deref(), Some("REF12345"));
    }

    #[test]
    fn rejects_tampered_field() {
        let data = signed_init_data(&[("auth_date", "1700000000"), ("user", USER)]);
        let tampered = data.replace("1700000000", "1700000001");

        assert_eq!(
            verify_init_data(&tampered, TOKEN, 0, 1_700_000_000),
            Err(InitDataError::BadSignature)
        );
    }

    #[test]
    fn accepts_upper_case_hash_and_rejects_non_hex() {
        let data = signed_init_data(&[("auth_date", "1700000000"), ("user", USER)]);
        let (fields, hash) = data.rsplit_once("hash=").unwrap();

        let upper = format!("{}hash={}", fields, hash.to_ascii_uppercase());
        assert!(verify_init_data(&upper, TOKEN, 0, 1_700_000_000).is_ok());

        let garbage = format!("{}hash=zz{}", fields, &hash[2..]);
        assert_eq!(
            verify_init_data(&garbage, TOKEN, 0, 1_700_000_000),
            Err(InitDataError::BadSignature)
        );
    }

    #[test]
    fn rejects_wrong_bot_token() {
        let data = signed_init_data(&[("auth_date", "1700000000"), ("user", USER)]);
        assert_eq!(
            verify_init_data(&data, "654321:other", 0, 1_700_000_000),
            Err(InitDataError::BadSignature)
        );
    }

    #[test]
    fn rejects_stale_data() {
        let data = signed_init_data(&[("auth_date", "1700000000"), ("user", USER)]);
        assert_eq!(
            verify_init_data(&data, TOKEN, 3_600, 1_700_007_200),
            Err(InitDataError::Expired)
        );
    }

    #[test]
    fn rejects_missing_hash() {
        assert_eq!(
            verify_init_data("auth_date=1&user=%7B%7D", TOKEN, 0, 1),
            Err(InitDataError::MissingHash)
        );
    }

    #[test]
    fn signed_data_without_user_is_rejected() {
        let data = signed_init_data(&[("auth_date", "1700000000")]);
        assert!(matches!(
            verify_init_data(&data, TOKEN, 0, 1_700_000_000),
            Err(InitDataError::BadUser(_))
        ));
    }
}
