use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Currencies Paddle settles without a fractional part.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &["JPY", "KRW", "VND"];

/// Number of minor-unit digits for an ISO 4217 currency code.
pub fn minor_unit_digits(currency: &str) -> u32 {
    if ZERO_DECIMAL_CURRENCIES
        .iter()
        .any(|c| c.eq_ignore_ascii_case(currency))
    {
        0
    } else {
        2
    }
}

/// Round half-up (midpoint away from zero) at the currency's precision.
pub fn round_to_currency(amount: Decimal, currency: &str) -> Decimal {
    amount.round_dp_with_strategy(
        minor_unit_digits(currency),
        RoundingStrategy::MidpointAwayFromZero,
    )
}

/// An amount tagged with its currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into().to_uppercase(),
        }
    }

    /// Parse Paddle's minor-unit string ("920" EUR => 9.20 EUR).
    pub fn from_minor_units(minor: &str, currency: &str) -> Result<Self, String> {
        let value: i128 = minor
            .trim()
            .parse()
            .map_err(|_| format!("amount '{}' is not an integer minor-unit value", minor))?;
        let amount = Decimal::try_from_i128_with_scale(value, minor_unit_digits(currency))
            .map_err(|e| format!("amount '{}' out of range: {}", minor, e))?;
        Ok(Self::new(amount, currency))
    }

    /// Minor-unit string as Paddle expects it in request bodies.
    pub fn to_minor_units(&self) -> String {
        let digits = minor_unit_digits(&self.currency);
        let scaled = self.amount * Decimal::from(10u64.pow(digits));
        scaled
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
            .to_string()
    }

    pub fn same_currency(&self, currency: &str) -> bool {
        self.currency.eq_ignore_ascii_case(currency)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", round_to_currency(self.amount, &self.currency), self.currency)
    }
}
