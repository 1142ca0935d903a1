//! Classification rule definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::matcher::Matcher;
use crate::types::{Category, RuleId, ScopeId, ValidationError};

/// Which field family a rule is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Keyed on the application (name, window title, or app-level domain).
    App,
    /// Keyed on the browser-visited domain. Overrides app rules.
    Domain,
}

impl RuleKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Domain => "domain",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuleKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app" => Ok(Self::App),
            "domain" => Ok(Self::Domain),
            _ => Err(ValidationError::InvalidRuleKind {
                value: s.to_string(),
            }),
        }
    }
}

/// Who a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// Applies to every tenant.
    Global,
    /// Applies to a single tenant.
    Tenant(ScopeId),
}

impl RuleScope {
    /// Returns true if this rule is visible to the given tenant.
    #[must_use]
    pub fn applies_to(&self, scope: Option<&ScopeId>) -> bool {
        match self {
            Self::Global => true,
            Self::Tenant(id) => scope == Some(id),
        }
    }
}

/// A productivity rule as configured by an administrator.
///
/// Rules are read-only inputs; the engine never mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: RuleId,
    pub kind: RuleKind,
    pub scope: RuleScope,
    pub matcher: Matcher,
    pub pattern: String,
    pub category: Category,
    /// Lower value wins.
    pub priority: i32,
    pub is_active: bool,
}

impl RuleDefinition {
    /// Creates an active rule with the default priority of 100.
    pub fn new(
        id: RuleId,
        kind: RuleKind,
        matcher: Matcher,
        pattern: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            id,
            kind,
            scope: RuleScope::Global,
            matcher,
            pattern: pattern.into(),
            category,
            priority: DEFAULT_PRIORITY,
            is_active: true,
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: RuleScope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub const fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Priority assigned when none is given.
pub const DEFAULT_PRIORITY: i32 = 100;
