use serde::{Deserialize, Serialize};

pub mod achievements;
pub mod direct_links;
pub mod history;
pub mod messages;
pub mod notices;
pub mod security;
pub mod settings;
pub mod users;
pub mod withdrawals;

/// One USD expressed in micros, the unit every balance is stored in.
pub const MICROS_PER_USD: i64 = 1_000_000;

/// Renders micros as dollars with cents, e.g. `$12.50`.
pub fn format_usd(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let cents = (micros.unsigned_abs() + 5_000) / 10_000;
    format!("{}${}.{:02}", sign, cents / 100, cents % 100)
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Page {
    #[serde(default = "Page::default_page")]
    pub page: i64,
    #[serde(default = "Page::default_per_page")]
    pub per_page: i64,
}

impl Page {
    fn default_page() -> i64 {
        1
    }

    fn default_per_page() -> i64 {
        20
    }

    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit())
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: Self::default_page(),
            per_page: Self::default_per_page(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, page: Page, total: i64) -> Self {
        Self {
            items,
            page: page.page.max(1),
            per_page: page.limit(),
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamps_size_and_offset() {
        let page = Page {
            page: 3,
            per_page: 500,
        };
        assert_eq!(page.limit(), 100);
        assert_eq!(page.offset(), 200);

        let page = Page {
            page: 0,
            per_page: 0,
        };
        assert_eq!(page.limit(), 1);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn formats_dollars() {
        assert_eq!(format_usd(12_500_000), "$12.50");
        assert_eq!(format_usd(500), "$0.00");
        assert_eq!(format_usd(5_000), "$0.01");
        assert_eq!(format_usd(-2 * MICROS_PER_USD), "-$2.00");
    }

    #[test]
    fn huge_page_number_saturates_offset() {
        let page = Page {
            page: i64::MAX,
            per_page: 20,
        };
        assert_eq!(page.offset(), i64::MAX);
        assert!(page.offset() >= 0);
    }
}
