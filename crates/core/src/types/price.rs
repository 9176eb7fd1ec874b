//! Type-safe price representation in integer minor units.
//!
//! Every amount in the system is carried as an integer count of the
//! currency's smallest unit (pesos for CLP, cents for USD). Conversions to
//! and from provider wire formats happen only in the provider adapters.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price in integer minor units with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the smallest currency unit (pesos for CLP, cents for USD).
    pub amount_minor: i64,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
}

impl Price {
    /// Create a price from an amount in minor units.
    #[must_use]
    pub const fn from_minor(amount_minor: i64, currency: CurrencyCode) -> Self {
        Self {
            amount_minor,
            currency,
        }
    }

    /// The amount as a decimal in major units (e.g. `12.50` USD, `4990` CLP).
    #[must_use]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.amount_minor, u32::from(self.currency.decimals()))
    }

    /// Convert a major-unit amount from a provider payload into minor units.
    ///
    /// Provider APIs report amounts in major units (MercadoPago sends
    /// `transaction_amount` as a JSON number); rounding is to the nearest
    /// minor unit.
    #[must_use]
    pub fn from_major_f64(amount: f64, currency: CurrencyCode) -> Self {
        let scale = 10_f64.powi(i32::from(currency.decimals()));
        #[allow(clippy::cast_possible_truncation)]
        let minor = (amount * scale).round() as i64;
        Self::from_minor(minor, currency)
    }

    /// Format for display, e.g. `$4.990 CLP` or `$12.50 USD`.
    #[must_use]
    pub fn display(&self) -> String {
        match self.currency {
            // CLP convention: thousands separated by dots, no decimals
            CurrencyCode::Clp => {
                let mut digits = self.amount_minor.abs().to_string();
                let mut grouped = String::new();
                while digits.len() > 3 {
                    let split = digits.len() - 3;
                    grouped = format!(".{}{grouped}", digits.split_off(split));
                }
                let sign = if self.amount_minor < 0 { "-" } else { "" };
                format!("{sign}${digits}{grouped} CLP")
            }
            CurrencyCode::Usd => format!("${:.2} USD", self.to_decimal()),
        }
    }
}

/// ISO 4217 currency codes supported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyCode {
    /// Chilean peso (no minor unit).
    #[default]
    Clp,
    /// US dollar (cents).
    Usd,
}

impl CurrencyCode {
    /// Number of decimal places in the currency's minor unit.
    #[must_use]
    pub const fn decimals(self) -> u8 {
        match self {
            Self::Clp => 0,
            Self::Usd => 2,
        }
    }

    /// The ISO 4217 code string.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Clp => "CLP",
            Self::Usd => "USD",
        }
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLP" => Ok(Self::Clp),
            "USD" => Ok(Self::Usd),
            _ => Err(format!("unsupported currency: {s}")),
        }
    }
}
