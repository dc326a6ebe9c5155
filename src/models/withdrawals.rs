use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::settings::RewardSettings;
use super::MICROS_PER_USD;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalMethod {
    Bkash,
    Nagad,
    Rocket,
    UsdtTrc20,
    BinancePay,
}

impl WithdrawalMethod {
    pub const ALL: [WithdrawalMethod; 5] = [
        WithdrawalMethod::Bkash,
        WithdrawalMethod::Nagad,
        WithdrawalMethod::Rocket,
        WithdrawalMethod::UsdtTrc20,
        WithdrawalMethod::BinancePay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalMethod::Bkash => "bkash",
            WithdrawalMethod::Nagad => "nagad",
            WithdrawalMethod::Rocket => "rocket",
            WithdrawalMethod::UsdtTrc20 => "usdt_trc20",
            WithdrawalMethod::BinancePay => "binance_pay",
        }
    }

    pub fn is_mobile_money(&self) -> bool {
        matches!(
            self,
            WithdrawalMethod::Bkash | WithdrawalMethod::Nagad | WithdrawalMethod::Rocket
        )
    }

    pub fn payout_currency(&self) -> Currency {
        if self.is_mobile_money() {
            Currency::Bdt
        } else {
            Currency::Usd
        }
    }

    /// Checks the shape of the destination account for this rail.
    pub fn is_valid_account(&self, account: &str) -> bool {
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());

        match self {
            WithdrawalMethod::Bkash | WithdrawalMethod::Nagad | WithdrawalMethod::Rocket => {
                account.len() == 11 && account.starts_with("01") && all_digits(account)
            }
            WithdrawalMethod::UsdtTrc20 => {
                account.len() == 34
                    && account.starts_with('T')
                    && account.chars().all(|c| c.is_ascii_alphanumeric())
            }
            WithdrawalMethod::BinancePay => {
                (6..=12).contains(&account.len()) && all_digits(account)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Bdt,
    Usd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub method: WithdrawalMethod,
    pub account: String,
    pub amount_micros: i64,
    pub fee_micros: i64,
    pub net_micros: i64,
    pub payout_currency: Currency,
    pub payout_amount_minor: i64,
    pub exchange_rate: f64,
    pub status: WithdrawalStatus,
    pub admin_note: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewWithdrawal {
    pub method: WithdrawalMethod,
    pub account: String,
    pub amount_micros: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalAction {
    Approve,
    Reject,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WithdrawalDecision {
    pub action: WithdrawalAction,
    pub note: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WithdrawalFilter {
    pub status: Option<WithdrawalStatus>,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum QuoteError {
    #[error("{0} withdrawals are currently disabled")]
    MethodDisabled(&'static str),
    #[error("amount is below the minimum of {0} micros")]
    BelowMinimum(i64),
    #[error("amount is above the maximum of {0} micros")]
    AboveMaximum(i64),
    #[error("fees exceed the requested amount")]
    FeeExceedsAmount,
}

/// Fee and currency breakdown for a prospective withdrawal.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WithdrawalQuote {
    pub method: WithdrawalMethod,
    pub amount_micros: i64,
    pub fee_micros: i64,
    pub net_micros: i64,
    pub payout_currency: Currency,
    pub exchange_rate: f64,
    /// Payout in the currency's minor unit (poisha or cents).
    pub payout_amount_minor: i64,
}

impl WithdrawalQuote {
    pub fn calculate(
        method: WithdrawalMethod,
        amount_micros: i64,
        settings: &RewardSettings,
    ) -> Result<Self, QuoteError> {
        let limits = settings.methods.limits(method);
        if !limits.enabled {
            return Err(QuoteError::MethodDisabled(method.as_str()));
        }
        if amount_micros < limits.min_micros {
            return Err(QuoteError::BelowMinimum(limits.min_micros));
        }
        if amount_micros > limits.max_micros {
            return Err(QuoteError::AboveMaximum(limits.max_micros));
        }

        let fee_micros = i128::from(amount_micros) * i128::from(limits.fee_bps) / 10_000
            + i128::from(limits.fixed_fee_micros);
        let net_micros = i128::from(amount_micros) - fee_micros;
        if net_micros <= 0 {
            return Err(QuoteError::FeeExceedsAmount);
        }
        // Both fit: 0 < net < amount, so 0 <= fee < amount.
        let (fee_micros, net_micros) = (fee_micros as i64, net_micros as i64);

        let payout_currency = method.payout_currency();
        let exchange_rate = match payout_currency {
            Currency::Bdt => settings.usd_to_bdt,
            Currency::Usd => 1.0,
        };
        let payout_amount_minor =
            (net_micros as f64 / MICROS_PER_USD as f64 * exchange_rate * 100.0).round() as i64;

        Ok(Self {
            method,
            amount_micros,
            fee_micros,
            net_micros,
            payout_currency,
            exchange_rate,
            payout_amount_minor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_money_is_converted_to_taka_after_percentage_fee() {
        let settings = RewardSettings::default();
        let quote =
            WithdrawalQuote::calculate(WithdrawalMethod::Bkash, 10 * MICROS_PER_USD, &settings)
                .unwrap();

        assert_eq!(quote.fee_micros, 200_000);
        assert_eq!(quote.net_micros, 9_800_000);
        assert_eq!(quote.payout_currency, Currency::Bdt);
        // 9.80 USD * 120 = 1176.00 BDT
        assert_eq!(quote.payout_amount_minor, 117_600);
    }

    #[test]
    fn crypto_pays_out_in_dollars_with_fixed_fee() {
        let settings = RewardSettings::default();
        let quote = WithdrawalQuote::calculate(
            WithdrawalMethod::UsdtTrc20,
            12_500_000,
            &settings,
        )
        .unwrap();

        assert_eq!(quote.fee_micros, MICROS_PER_USD);
        assert_eq!(quote.net_micros, 11_500_000);
        assert_eq!(quote.payout_currency, Currency::Usd);
        assert_eq!(quote.payout_amount_minor, 1_150);
    }

    #[test]
    fn amount_below_minimum_is_rejected() {
        let settings = RewardSettings::default();
        let err = WithdrawalQuote::calculate(WithdrawalMethod::Nagad, 999_999, &settings)
            .unwrap_err();
        assert_eq!(err, QuoteError::BelowMinimum(MICROS_PER_USD));
    }

    #[test]
    fn amount_above_maximum_is_rejected() {
        let settings = RewardSettings::default();
        let err = WithdrawalQuote::calculate(
            WithdrawalMethod::BinancePay,
            501 * MICROS_PER_USD,
            &settings,
        )
        .unwrap_err();
        assert_eq!(err, QuoteError::AboveMaximum(500 * MICROS_PER_USD));
    }

    #[test]
    fn disabled_method_is_rejected_before_limits() {
        let mut settings = RewardSettings::default();
        settings.methods.rocket.enabled = false;
        let err = WithdrawalQuote::calculate(WithdrawalMethod::Rocket, 1, &settings).unwrap_err();
        assert_eq!(err, QuoteError::MethodDisabled("rocket"));
    }

    #[test]
    fn fee_swallowing_the_amount_is_rejected() {
        let mut settings = RewardSettings::default();
        settings.methods.binance_pay.fixed_fee_micros = 2 * MICROS_PER_USD;
        let err = WithdrawalQuote::calculate(
            WithdrawalMethod::BinancePay,
            2 * MICROS_PER_USD,
            &settings,
        )
        .unwrap_err();
        assert_eq!(err, QuoteError::FeeExceedsAmount);
    }

    #[test]
    fn percentage_fee_on_huge_amount_does_not_overflow() {
        let mut settings = RewardSettings::default();
        settings.methods.binance_pay.max_micros = i64::MAX;
        settings.methods.binance_pay.fee_bps = 100;

        let amount = i64::MAX / 2;
        let quote =
            WithdrawalQuote::calculate(WithdrawalMethod::BinancePay, amount, &settings).unwrap();
        assert_eq!(quote.fee_micros, (i128::from(amount) / 100) as i64);
        assert_eq!(quote.net_micros + quote.fee_micros, amount);
    }

    #[test]
    fn account_formats() {
        assert!(WithdrawalMethod::Bkash.is_valid_account("01712345678"));
        assert!(!WithdrawalMethod::Bkash.is_valid_account("0171234567"));
        assert!(!WithdrawalMethod::Nagad.is_valid_account("02712345678"));
        assert!(WithdrawalMethod::UsdtTrc20
            .is_valid_account("TXYZabcdefghijklmnopqrstuvwxyz1234"));
        assert!(!WithdrawalMethod::UsdtTrc20
            .is_valid_account("0xYZabcdefghijklmnopqrstuvwxyz1234"));
        assert!(WithdrawalMethod::BinancePay.is_valid_account("123456789"));
        assert!(!WithdrawalMethod::BinancePay.is_valid_account("12345"));
    }
}
