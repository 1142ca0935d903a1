//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// Invalid productivity category value.
    #[error("invalid category: {value}")]
    InvalidCategory { value: String },

    /// Invalid matcher type for the given rule kind.
    #[error("invalid {kind} matcher type: {value}")]
    InvalidMatcher { kind: &'static str, value: String },

    /// Invalid rule kind value.
    #[error("invalid rule kind: {value}")]
    InvalidRuleKind { value: String },
}

/// Productivity category assigned to a usage interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Productive,
    Neutral,
    Unproductive,
}

impl Category {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Productive => "PRODUCTIVE",
            Self::Neutral => "NEUTRAL",
            Self::Unproductive => "UNPRODUCTIVE",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRODUCTIVE" => Ok(Self::Productive),
            "NEUTRAL" => Ok(Self::Neutral),
            "UNPRODUCTIVE" => Ok(Self::Unproductive),
            _ => Err(ValidationError::InvalidCategory {
                value: s.to_string(),
            }),
        }
    }
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated employee identifier.
    EmployeeId, "employee ID"
);

define_string_id!(
    /// A validated device identifier.
    ///
    /// Together with [`EmployeeId`] it keys the interval stream of one agent install.
    DeviceId, "device ID"
);

define_string_id!(
    /// A validated work session identifier.
    SessionId, "session ID"
);

define_string_id!(
    /// A validated classification rule identifier.
    RuleId, "rule ID"
);

define_string_id!(
    /// A validated tenant scope identifier.
    ScopeId, "scope ID"
);

/// Monotonic primary key of a usage interval.
///
/// Interval ids double as the pagination cursor for batch jobs, so they must be
/// totally ordered and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalId(pub i64);

impl IntervalId {
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for IntervalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
