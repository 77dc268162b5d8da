//! User model for chatrelay.
//!
//! Users are owned by the identity collaborator; the relay only reads the
//! stable id, the username and the tier.

use std::fmt;
use std::str::FromStr;

/// Account tier, which gates how much history a user can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tier {
    /// Basic account: recent history only.
    #[default]
    Standard,
    /// Pro account: unbounded history.
    Privileged,
}

impl Tier {
    /// Convert tier to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Standard => "basic",
            Tier::Privileged => "pro",
        }
    }

    /// Whether this tier sees the whole history of a scope.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Tier::Privileged)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Tier::Standard),
            "pro" => Ok(Tier::Privileged),
            _ => Err(format!("unknown user type: {s}")),
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Login username (unique, case-insensitive).
    pub username: String,
    /// Account tier.
    pub tier: Tier,
    /// Account creation timestamp.
    pub created_at: String,
}

/// Data for creating a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login username.
    pub username: String,
    /// Account tier (defaults to Standard).
    pub tier: Tier,
}

impl NewUser {
    /// Create a standard-tier user.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            tier: Tier::Standard,
        }
    }

    /// Set the tier.
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }
}
