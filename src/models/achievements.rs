use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    AdsWatched,
    Referrals,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct AchievementDef {
    pub code: &'static str,
    pub title: &'static str,
    pub metric: Metric,
    pub threshold: i64,
    pub reward_micros: i64,
}

pub const CATALOGUE: &[AchievementDef] = &[
    AchievementDef {
        code: "ads_10",
        title: "First steps",
        metric: Metric::AdsWatched,
        threshold: 10,
        reward_micros: 5_000,
    },
    AchievementDef {
        code: "ads_100",
        title: "Ad enthusiast",
        metric: Metric::AdsWatched,
        threshold: 100,
        reward_micros: 50_000,
    },
    AchievementDef {
        code: "ads_500",
        title: "Ad veteran",
        metric: Metric::AdsWatched,
        threshold: 500,
        reward_micros: 250_000,
    },
    AchievementDef {
        code: "ads_1000",
        title: "Click master",
        metric: Metric::AdsWatched,
        threshold: 1_000,
        reward_micros: 500_000,
    },
    AchievementDef {
        code: "ads_5000",
        title: "Ad legend",
        metric: Metric::AdsWatched,
        threshold: 5_000,
        reward_micros: 2_500_000,
    },
    AchievementDef {
        code: "referrals_1",
        title: "Friendly",
        metric: Metric::Referrals,
        threshold: 1,
        reward_micros: 10_000,
    },
    AchievementDef {
        code: "referrals_5",
        title: "Networker",
        metric: Metric::Referrals,
        threshold: 5,
        reward_micros: 50_000,
    },
    AchievementDef {
        code: "referrals_25",
        title: "Influencer",
        metric: Metric::Referrals,
        threshold: 25,
        reward_micros: 250_000,
    },
    AchievementDef {
        code: "referrals_100",
        title: "Ambassador",
        metric: Metric::Referrals,
        threshold: 100,
        reward_micros: 1_000_000,
    },
];

/// Catalogue entries for `metric` whose threshold `value` has reached.
pub fn reached(metric: Metric, value: i64) -> impl Iterator<Item = &'static AchievementDef> {
    CATALOGUE
        .iter()
        .filter(move |def| def.metric == metric && value >= def.threshold)
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Achievement {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub reward_micros: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AchievementStatus {
    #[serde(flatten)]
    pub def: AchievementDef,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

pub fn statuses(unlocked: &[Achievement]) -> Vec<AchievementStatus> {
    CATALOGUE
        .iter()
        .map(|def| {
            let hit = unlocked.iter().find(|a| a.code == def.code);
            AchievementStatus {
                def: *def,
                unlocked: hit.is_some(),
                unlocked_at: hit.map(|a| a.created_at),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        for (i, a) in CATALOGUE.iter().enumerate() {
            assert!(CATALOGUE[i + 1..].iter().all(|b| b.code != a.code));
        }
    }

    #[test]
    fn reached_only_includes_crossed_thresholds() {
        let codes: Vec<_> = reached(Metric::AdsWatched, 120).map(|d| d.code).collect();
        assert_eq!(codes, vec!["ads_10", "ads_100"]);

        assert_eq!(reached(Metric::Referrals, 0).count(), 0);
        assert_eq!(reached(Metric::Referrals, 5).count(), 2);
    }

    #[test]
    fn statuses_mark_unlocked_entries() {
        let unlocked = vec![Achievement {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            code: "referrals_1".to_string(),
            reward_micros: 10_000,
            created_at: Utc::now(),
        }];
        let statuses = statuses(&unlocked);

        assert_eq!(statuses.len(), CATALOGUE.len());
        let friendly = statuses.iter().find(|s| s.def.code == "referrals_1").unwrap();
        assert!(friendly.unlocked);
        assert!(statuses.iter().filter(|s| s.unlocked).count() == 1);
    }
}
