use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat platform identity of a user.
pub type UserId = i64;

/// Which side of the trade the user intends to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// Parse the stored column representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }

    /// Return the stored column representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One snapshot of the bank's quote. `buy` is what the bank pays, `sell` is
/// what the bank charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePair {
    pub buy: i64,
    pub sell: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub user_id: UserId,
    pub direction: Direction,
    pub threshold: i64,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(user_id: UserId, direction: Direction, threshold: i64) -> Self {
        Self {
            user_id,
            direction,
            threshold,
            created_at: Utc::now(),
        }
    }
}

/// Parse a price written with optional `,` thousands separators.
///
/// Returns `None` for empty, negative or non-numeric input.
pub fn parse_price(text: &str) -> Option<i64> {
    let digits: String = text.trim().chars().filter(|c| *c != ',').collect();
    match digits.parse::<i64>() {
        Ok(price) if price >= 0 => Some(price),
        _ => None,
    }
}
