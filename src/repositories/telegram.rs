use anyhow::bail;
use serde_json::json;

/// Minimal Telegram Bot API client used for user notifications.
#[derive(Clone)]
pub struct TelegramBotApi {
    bot_token: String,
    url: String,
    client: reqwest::Client,
}

impl TelegramBotApi {
    pub fn new(bot_token: String, url: String) -> Self {
        Self {
            bot_token,
            url: url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Contains the bot token. Errors built from it must drop the URL before they are logged.
    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.url, self.bot_token, method)
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), anyhow::Error> {
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true
        });

        let response: serde_json::Value = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;

        match response.get("ok").and_then(|ok| ok.as_bool()) {
            Some(true) => Ok(()),
            _ => bail!(
                "Telegram: sendMessage failed: {}",
                response
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or("bad response format")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_method_url_without_double_slash() {
        let api = TelegramBotApi::new("1:abc".to_string(), "https://api.telegram.org/".to_string());
        assert_eq!(
            api.method_url("sendMessage"),
            "https://api.telegram.org/bot1:abc/sendMessage"
        );
    }

    #[tokio::test]
    async fn transport_errors_do_not_leak_the_token() {
        // Nothing listens on port 1.
        let api = TelegramBotApi::new(
            "1:secret-token".to_string(),
            "http://127.0.0.1:1".to_string(),
        );

        let err = api.send_message(42, "hi").await.unwrap_err();
        assert!(!format!("{:#}", err).contains("secret-token"));
    }
}
