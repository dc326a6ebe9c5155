use serde::{Deserialize, Serialize};

use super::withdrawals::WithdrawalMethod;
use super::MICROS_PER_USD;

/// Limits and fee schedule for a single payout method.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MethodLimits {
    pub enabled: bool,
    pub min_micros: i64,
    pub max_micros: i64,
    /// Percentage fee in basis points (100 = 1%).
    pub fee_bps: i64,
    pub fixed_fee_micros: i64,
}

impl MethodLimits {
    fn mobile_money() -> Self {
        Self {
            enabled: true,
            min_micros: MICROS_PER_USD,
            max_micros: 50 * MICROS_PER_USD,
            fee_bps: 200,
            fixed_fee_micros: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MethodTable {
    pub bkash: MethodLimits,
    pub nagad: MethodLimits,
    pub rocket: MethodLimits,
    pub usdt_trc20: MethodLimits,
    pub binance_pay: MethodLimits,
}

impl MethodTable {
    pub fn limits(&self, method: WithdrawalMethod) -> &MethodLimits {
        match method {
            WithdrawalMethod::Bkash => &self.bkash,
            WithdrawalMethod::Nagad => &self.nagad,
            WithdrawalMethod::Rocket => &self.rocket,
            WithdrawalMethod::UsdtTrc20 => &self.usdt_trc20,
            WithdrawalMethod::BinancePay => &self.binance_pay,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (WithdrawalMethod, &MethodLimits)> {
        WithdrawalMethod::ALL
            .into_iter()
            .map(move |method| (method, self.limits(method)))
    }
}

impl Default for MethodTable {
    fn default() -> Self {
        Self {
            bkash: MethodLimits::mobile_money(),
            nagad: MethodLimits::mobile_money(),
            rocket: MethodLimits::mobile_money(),
            usdt_trc20: MethodLimits {
                enabled: true,
                min_micros: 5 * MICROS_PER_USD,
                max_micros: 500 * MICROS_PER_USD,
                fee_bps: 0,
                fixed_fee_micros: MICROS_PER_USD,
            },
            binance_pay: MethodLimits {
                enabled: true,
                min_micros: 2 * MICROS_PER_USD,
                max_micros: 500 * MICROS_PER_USD,
                fee_bps: 0,
                fixed_fee_micros: 0,
            },
        }
    }
}

/// Upper bound for any configured amount: one million dollars.
pub const MAX_AMOUNT_MICROS: i64 = 1_000_000 * MICROS_PER_USD;
pub const MAX_AD_COOLDOWN_SECS: i64 = 86_400;
pub const MAX_COOLDOWN_HOURS: i64 = 8_760;

/// Runtime reward parameters. Seeded from the config file on first start,
/// then owned by the database and edited from the admin dashboard.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RewardSettings {
    pub ad_reward_micros: i64,
    pub ad_cooldown_secs: i64,
    /// 0 disables the limit.
    pub daily_ad_limit: i64,
    pub referral_commission_bps: i64,
    pub signup_bonus_micros: i64,
    pub direct_link_cooldown_hours: i64,
    pub usd_to_bdt: f64,
    pub withdrawal_cooldown_hours: i64,
    /// 0 disables automatic bans.
    pub max_violations: i64,
    pub maintenance_mode: bool,
    pub methods: MethodTable,
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self {
            ad_reward_micros: 500,
            ad_cooldown_secs: 15,
            daily_ad_limit: 200,
            referral_commission_bps: 1_000,
            signup_bonus_micros: 0,
            direct_link_cooldown_hours: 24,
            usd_to_bdt: 120.0,
            withdrawal_cooldown_hours: 24,
            max_violations: 5,
            maintenance_mode: false,
            methods: MethodTable::default(),
        }
    }
}

impl RewardSettings {
    /// Returns a description of the first invalid field, if any.
    pub fn validate(&self) -> Result<(), String> {
        if !(0..=MAX_AMOUNT_MICROS).contains(&self.ad_reward_micros) {
            return Err(format!(
                "ad_reward_micros must be between 0 and {}",
                MAX_AMOUNT_MICROS
            ));
        }
        if !(0..=MAX_AD_COOLDOWN_SECS).contains(&self.ad_cooldown_secs) {
            return Err(format!(
                "ad_cooldown_secs must be between 0 and {}",
                MAX_AD_COOLDOWN_SECS
            ));
        }
        if self.daily_ad_limit < 0 {
            return Err("daily_ad_limit must not be negative".to_string());
        }
        if !(0..=10_000).contains(&self.referral_commission_bps) {
            return Err("referral_commission_bps must be between 0 and 10000".to_string());
        }
        if !(0..=MAX_AMOUNT_MICROS).contains(&self.signup_bonus_micros) {
            return Err(format!(
                "signup_bonus_micros must be between 0 and {}",
                MAX_AMOUNT_MICROS
            ));
        }
        let hours = 0..=MAX_COOLDOWN_HOURS;
        if !hours.contains(&self.direct_link_cooldown_hours)
            || !hours.contains(&self.withdrawal_cooldown_hours)
        {
            return Err(format!(
                "cooldown hours must be between 0 and {}",
                MAX_COOLDOWN_HOURS
            ));
        }
        if !self.usd_to_bdt.is_finite() || self.usd_to_bdt <= 0.0 {
            return Err("usd_to_bdt must be a positive number".to_string());
        }
        if self.max_violations < 0 {
            return Err("max_violations must not be negative".to_string());
        }

        for (method, limits) in self.methods.iter() {
            if limits.min_micros <= 0
                || limits.min_micros > limits.max_micros
                || limits.max_micros > MAX_AMOUNT_MICROS
            {
                return Err(format!(
                    "{}: min must be positive, not above max, and max at most {}",
                    method.as_str(),
                    MAX_AMOUNT_MICROS
                ));
            }
            if !(0..=10_000).contains(&limits.fee_bps)
                || !(0..=MAX_AMOUNT_MICROS).contains(&limits.fixed_fee_micros)
            {
                return Err(format!("{}: invalid fee schedule", method.as_str()));
            }
        }

        Ok(())
    }
}

/// The subset of settings exposed to unauthenticated clients.
#[derive(Clone, Debug, Serialize)]
pub struct PublicSettings {
    pub ad_reward_micros: i64,
    pub ad_cooldown_secs: i64,
    pub daily_ad_limit: i64,
    pub referral_commission_bps: i64,
    pub usd_to_bdt: f64,
    pub maintenance_mode: bool,
    pub methods: MethodTable,
}

impl From<RewardSettings> for PublicSettings {
    fn from(settings: RewardSettings) -> Self {
        Self {
            ad_reward_micros: settings.ad_reward_micros,
            ad_cooldown_secs: settings.ad_cooldown_secs,
            daily_ad_limit: settings.daily_ad_limit,
            referral_commission_bps: settings.referral_commission_bps,
            usd_to_bdt: settings.usd_to_bdt,
            maintenance_mode: settings.maintenance_mode,
            methods: settings.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(RewardSettings::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_commission_above_full_amount() {
        let settings = RewardSettings {
            referral_commission_bps: 10_001,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_inverted_method_limits() {
        let mut settings = RewardSettings::default();
        settings.methods.nagad.min_micros = 10 * MICROS_PER_USD;
        settings.methods.nagad.max_micros = MICROS_PER_USD;

        let err = settings.validate().unwrap_err();
        assert!(err.starts_with("nagad"));
    }

    #[test]
    fn rejects_non_positive_exchange_rate() {
        let settings = RewardSettings {
            usd_to_bdt: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_cooldowns_and_limits_beyond_bounds() {
        let settings = RewardSettings {
            withdrawal_cooldown_hours: i64::MAX / 1_000,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = RewardSettings {
            direct_link_cooldown_hours: MAX_COOLDOWN_HOURS + 1,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = RewardSettings {
            ad_cooldown_secs: i64::MAX,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let mut settings = RewardSettings::default();
        settings.methods.binance_pay.max_micros = i64::MAX;
        settings.methods.binance_pay.fee_bps = 100;
        let err = settings.validate().unwrap_err();
        assert!(err.starts_with("binance_pay"));

        let settings = RewardSettings {
            ad_cooldown_secs: MAX_AD_COOLDOWN_SECS,
            withdrawal_cooldown_hours: MAX_COOLDOWN_HOURS,
            ..Default::default()
        };
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let settings: RewardSettings =
            serde_json::from_str(r#"{"ad_reward_micros": 1000}"#).unwrap();
        assert_eq!(settings.ad_reward_micros, 1000);
        assert_eq!(settings.ad_cooldown_secs, 15);
    }
}
