use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Access granted by a lifetime period ends on this date.
pub const LIFETIME_EXPIRY: NaiveDate = match NaiveDate::from_ymd_opt(2037, 12, 31) {
    Some(d) => d,
    None => panic!("invalid lifetime expiry"),
};

/// Ledger billing period, stored as "<count><unit>" (e.g. "1m", "30d", "1y")
/// or "lifetime".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BillingPeriod {
    Days(u32),
    Months(u32),
    Years(u32),
    Lifetime,
}

impl BillingPeriod {
    /// Date access runs to when this period starts on `from`.
    pub fn add_to(&self, from: NaiveDate) -> NaiveDate {
        let next = match self {
            BillingPeriod::Days(n) => from.checked_add_days(Days::new(u64::from(*n))),
            BillingPeriod::Months(n) => from.checked_add_months(Months::new(*n)),
            BillingPeriod::Years(n) => from.checked_add_months(Months::new(n.saturating_mul(12))),
            BillingPeriod::Lifetime => Some(LIFETIME_EXPIRY),
        };
        next.unwrap_or(LIFETIME_EXPIRY).min(LIFETIME_EXPIRY)
    }

    /// Paddle billing-cycle interval. Lifetime maps to a yearly cycle.
    pub fn paddle_interval(&self) -> &'static str {
        match self {
            BillingPeriod::Days(_) => "day",
            BillingPeriod::Months(_) => "month",
            BillingPeriod::Years(_) | BillingPeriod::Lifetime => "year",
        }
    }

    pub fn paddle_frequency(&self) -> u32 {
        match self {
            BillingPeriod::Days(n) | BillingPeriod::Months(n) | BillingPeriod::Years(n) => *n,
            BillingPeriod::Lifetime => 1,
        }
    }

    /// Human text, e.g. "1 Month", "30 Days", "Lifetime".
    pub fn text(&self) -> String {
        let (count, unit) = match self {
            BillingPeriod::Days(n) => (*n, "Day"),
            BillingPeriod::Months(n) => (*n, "Month"),
            BillingPeriod::Years(n) => (*n, "Year"),
            BillingPeriod::Lifetime => return "Lifetime".to_string(),
        };
        if count == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", count, unit)
        }
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingPeriod::Days(n) => write!(f, "{}d", n),
            BillingPeriod::Months(n) => write!(f, "{}m", n),
            BillingPeriod::Years(n) => write!(f, "{}y", n),
            BillingPeriod::Lifetime => write!(f, "lifetime"),
        }
    }
}

impl std::str::FromStr for BillingPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "lifetime" {
            return Ok(BillingPeriod::Lifetime);
        }
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("Invalid billing period: {}", s))?;
        let (count, unit) = s.split_at(split);
        let count: u32 = count
            .parse()
            .map_err(|_| format!("Invalid billing period: {}", s))?;
        if count == 0 {
            return Err(format!("Invalid billing period: {}", s));
        }
        match unit {
            "d" => Ok(BillingPeriod::Days(count)),
            "m" => Ok(BillingPeriod::Months(count)),
            "y" => Ok(BillingPeriod::Years(count)),
            _ => Err(format!("Invalid billing period: {}", s)),
        }
    }
}

impl TryFrom<String> for BillingPeriod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BillingPeriod> for String {
    fn from(value: BillingPeriod) -> Self {
        value.to_string()
    }
}
