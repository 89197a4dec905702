use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Item categories
// ---------------------------------------------------------------------------

/// The fixed set of categories an item can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCategory {
    Electronics,
    Clothing,
    Furniture,
    Books,
    Sports,
    Toys,
    Home,
    Other,
}

impl ItemCategory {
    pub const ALL: [ItemCategory; 8] = [
        Self::Electronics,
        Self::Clothing,
        Self::Furniture,
        Self::Books,
        Self::Sports,
        Self::Toys,
        Self::Home,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electronics => "electronics",
            Self::Clothing => "clothing",
            Self::Furniture => "furniture",
            Self::Books => "books",
            Self::Sports => "sports",
            Self::Toys => "toys",
            Self::Home => "home",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Unordered user pair
// ---------------------------------------------------------------------------

/// Two user ids where the order is not significant.
///
/// `UserPair::new("a", "b") == UserPair::new("b", "a")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserPair {
    low: String,
    high: String,
}

impl UserPair {
    pub fn new(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low: low.to_string(),
            high: high.to_string(),
        }
    }

    /// Stable key used for uniqueness checks.
    pub fn key(&self) -> String {
        format!("{}:{}", self.low, self.high)
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Which persistence backend a process runs against. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// JSON arrays kept in a single local file.
    Local,
    /// Relational database with real-time insert notifications.
    Remote,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

impl FromStr for Backend {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" | "relational" => Ok(Self::Remote),
            other => Err(ValidationError::UnknownBackend(other.to_string())),
        }
    }
}
