use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::models::settings::RewardSettings;

#[derive(Debug, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Auth {
    pub jwt_secret: String,
    pub session_hours: i64,
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    pub telegram_max_auth_age_secs: i64,
    #[serde(default)]
    pub admin_emails: Vec<String>,
    #[serde(default)]
    pub admin_telegram_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct Telegram {
    pub api_url: String,
    pub notify: bool,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub postgres: Postgres,
    pub auth: Auth,
    pub telegram: Telegram,
    #[serde(default)]
    pub rewards: RewardSettings,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("postgres.max_connections", 5)?
            .set_default("auth.session_hours", 24 * 7)?
            .set_default("auth.telegram_max_auth_age_secs", 86_400)?
            .set_default("telegram.api_url", "https://api.telegram.org")?
            .set_default("telegram.notify", false)?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("CLICKMASTER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.admin_emails")
                    .with_list_parse_key("auth.admin_telegram_ids")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_file_and_fills_defaults() {
        let path = std::env::temp_dir().join(format!("clickmaster-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[postgres]
url = "postgres://localhost/clickmaster"

[auth]
jwt_secret = "secret"
admin_emails = ["boss@example.com"]

[rewards]
ad_reward_micros = 750
"#
        )
        .unwrap();

        let settings = Settings::new(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.postgres.max_connections, 5);
        assert_eq!(settings.auth.session_hours, 168);
        assert_eq!(settings.auth.admin_emails, vec!["boss@example.com".to_string()]);
        assert!(!settings.telegram.notify);
        assert_eq!(settings.rewards.ad_reward_micros, 750);
        assert_eq!(settings.rewards.ad_cooldown_secs, 15);
    }
}
