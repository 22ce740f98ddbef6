//! Pip value of the order quantity

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Which currency of the pair the account is denominated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseCurrency {
    /// EUR in EUR/USD
    #[default]
    First,
    /// USD in EUR/USD
    Second,
}

impl std::str::FromStr for BaseCurrency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(BaseCurrency::First),
            "second" => Ok(BaseCurrency::Second),
            _ => Err(CoreError::UnknownBaseCurrency(s.to_string())),
        }
    }
}

impl std::fmt::Display for BaseCurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BaseCurrency::First => write!(f, "first"),
            BaseCurrency::Second => write!(f, "second"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipValue {
    pub midprice: f64,
    /// Price increment reported by the order tracker
    pub interval: f64,
    /// Value of one increment in the first currency
    pub first: f64,
    /// Value of one increment in the second currency
    pub second: f64,
    pub quantity: u64,
    /// `first` or `second`, per the base currency
    pub pip: f64,
}

impl PipValue {
    pub fn compute(base: BaseCurrency, quantity: u64, midprice: f64, interval: f64) -> Self {
        let first = quantity as f64 * interval;
        let (second, pip) = match base {
            BaseCurrency::First => (first * midprice, first),
            BaseCurrency::Second => {
                let second = first / midprice;
                (second, second)
            }
        };
        Self {
            midprice,
            interval,
            first,
            second,
            quantity,
            pip,
        }
    }
}
