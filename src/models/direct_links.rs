use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct DirectLink {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub reward_micros: i64,
    pub is_active: bool,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DirectLinkInput {
    pub title: String,
    pub url: String,
    pub reward_micros: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl DirectLinkInput {
    pub fn normalized(mut self) -> Result<Self, String> {
        self.title = self.title.trim().to_string();
        self.url = self.url.trim().to_string();

        if self.title.is_empty() || self.title.chars().count() > 200 {
            return Err("title must be between 1 and 200 characters".to_string());
        }
        let has_scheme = self.url.starts_with("https://") || self.url.starts_with("http://");
        if !has_scheme || self.url.len() <= "https://".len() {
            return Err("url must be an absolute http(s) URL".to_string());
        }
        if self.reward_micros < 0 {
            return Err("reward_micros must not be negative".to_string());
        }

        Ok(self)
    }
}

/// A link as shown to a user, with the time left before it pays again.
#[derive(Clone, Debug, Serialize)]
pub struct UserDirectLink {
    pub id: Uuid,
    pub title: String,
    pub reward_micros: i64,
    pub available_in_secs: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ClickOutcome {
    pub url: String,
    pub rewarded: bool,
    pub reward_micros: i64,
}

/// Seconds until a link clicked at `last_click` pays out again.
pub fn seconds_until_rewardable(
    last_click: Option<DateTime<Utc>>,
    cooldown_hours: i64,
    now: DateTime<Utc>,
) -> i64 {
    match last_click {
        None => 0,
        Some(at) => chrono::Duration::try_hours(cooldown_hours)
            .and_then(|cooldown| at.checked_add_signed(cooldown))
            .map_or(i64::MAX, |ready| (ready - now).num_seconds().max(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(url: &str, reward: i64) -> DirectLinkInput {
        DirectLinkInput {
            title: "Sponsor".to_string(),
            url: url.to_string(),
            reward_micros: reward,
            is_active: true,
        }
    }

    #[test]
    fn validates_url_and_reward() {
        assert!(input("https://sponsor.example/offer", 1_000).normalized().is_ok());
        assert!(input("ftp://sponsor.example", 1_000).normalized().is_err());
        assert!(input("https://", 1_000).normalized().is_err());
        assert!(input("https://sponsor.example", -1).normalized().is_err());
    }

    #[test]
    fn cooldown_window() {
        let now = Utc::now();
        assert_eq!(seconds_until_rewardable(None, 24, now), 0);

        let an_hour_ago = now - chrono::Duration::hours(1);
        assert_eq!(seconds_until_rewardable(Some(an_hour_ago), 24, now), 23 * 3600);

        let two_days_ago = now - chrono::Duration::hours(48);
        assert_eq!(seconds_until_rewardable(Some(two_days_ago), 24, now), 0);
    }

    #[test]
    fn out_of_range_cooldown_never_pays() {
        let now = Utc::now();
        assert_eq!(
            seconds_until_rewardable(Some(now), i64::MAX / 1_000, now),
            i64::MAX
        );
    }
}
