//! Identifiers for columns and rankings

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(ColumnId);
string_id!(RankingId);

/// Monotonic id source owned by a provider
///
/// Starts at 0 and is persisted in session dumps. Ids are never reused,
/// even after the column or ranking they named is removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidGenerator {
    next: u64,
}

impl UidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a persisted counter value
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    /// The value that the next issued id will use
    pub fn value(&self) -> u64 {
        self.next
    }

    fn take(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn next_column_id(&mut self) -> ColumnId {
        ColumnId(format!("col{}", self.take()))
    }

    pub fn next_ranking_id(&mut self) -> RankingId {
        RankingId(format!("rank{}", self.take()))
    }
}
