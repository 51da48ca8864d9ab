//! Closed enumeration of the entity types mirrored between stores.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named category of record with one canonical mapping into both stores.
///
/// Adding a variant is a compile-time checked change: every `match` in the
/// registry and schema defaults must cover it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Account,
    Budget,
    Category,
    Transaction,
    User,
}

impl EntityType {
    /// Every entity type, in the order the orchestrator processes them.
    pub const ALL: [EntityType; 5] = [
        Self::User,
        Self::Account,
        Self::Category,
        Self::Budget,
        Self::Transaction,
    ];

    /// Stable identifier used in configuration and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Budget => "budget",
            Self::Category => "category",
            Self::Transaction => "transaction",
            Self::User => "user",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Returned when a string names no known entity type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity type '{0}'")]
pub struct UnknownEntityType(pub String);

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEntityType(s.to_string()))
    }
}
