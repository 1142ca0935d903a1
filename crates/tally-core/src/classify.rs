//! Productivity classification via ordered rule sets.
//!
//! # Algorithm
//!
//! 1. Drop inactive rules.
//! 2. Stable-sort app and domain rules by priority (lower first). Rules with
//!    equal priority keep their creation order.
//! 3. If the record carries a domain, the first matching domain rule wins.
//!    Browser records without one use the domain found in their window
//!    title, if any.
//! 4. Otherwise the first matching app rule wins.
//! 5. Nothing matched: `NEUTRAL`, source `default`.
//!
//! Domain rules beat app rules regardless of priority values, so a browser
//! marked productive can still count a specific site as unproductive.

use serde::{Deserialize, Serialize};

use crate::domain::resolve_domain;
use crate::interval::UsageInterval;
use crate::matcher::{CompiledMatcher, MatchTarget};
use crate::rules::{RuleDefinition, RuleKind};
use crate::types::{Category, RuleId};

/// Category used when no rule matches.
pub const DEFAULT_CATEGORY: Category = Category::Neutral;

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    DomainRule,
    AppRule,
    Default,
}

impl ClassificationSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DomainRule => "domain_rule",
            Self::AppRule => "app_rule",
            Self::Default => "default",
        }
    }
}

/// Result of classifying one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub source: ClassificationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule_id: Option<RuleId>,
}

impl Classification {
    const fn fallback() -> Self {
        Self {
            category: DEFAULT_CATEGORY,
            source: ClassificationSource::Default,
            matched_rule_id: None,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    id: RuleId,
    category: Category,
    matcher: CompiledMatcher,
}

impl CompiledRule {
    fn compile(rule: &RuleDefinition) -> Self {
        Self {
            id: rule.id.clone(),
            category: rule.category,
            matcher: CompiledMatcher::compile(rule.matcher, &rule.pattern),
        }
    }
}

/// Active rules, sorted and compiled for repeated classification.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    app_rules: Vec<CompiledRule>,
    domain_rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Builds a rule set from separate app and domain rule lists.
    ///
    /// Input order is treated as creation order for equal priorities.
    pub fn new(app_rules: &[RuleDefinition], domain_rules: &[RuleDefinition]) -> Self {
        let rule_set = Self {
            app_rules: prepare(app_rules),
            domain_rules: prepare(domain_rules),
        };
        tracing::debug!(
            app_rules = rule_set.app_rules.len(),
            domain_rules = rule_set.domain_rules.len(),
            "compiled rule set"
        );
        rule_set
    }

    /// Builds a rule set from a mixed list, splitting on [`RuleKind`].
    pub fn from_rules(rules: &[RuleDefinition]) -> Self {
        let (domain, app): (Vec<_>, Vec<_>) = rules
            .iter()
            .cloned()
            .partition(|rule| rule.kind == RuleKind::Domain);
        Self::new(&app, &domain)
    }

    /// Number of active rules across both lists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.app_rules.len() + self.domain_rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves a category for the record. Always returns a category.
    pub fn classify(&self, target: &MatchTarget<'_>) -> Classification {
        let resolved = resolve_domain(target.name, target.domain, target.window_title);
        let target = MatchTarget {
            domain: resolved.as_deref(),
            ..*target
        };

        if target.domain.is_some() {
            if let Some(rule) = first_match(&self.domain_rules, &target) {
                return Classification {
                    category: rule.category,
                    source: ClassificationSource::DomainRule,
                    matched_rule_id: Some(rule.id.clone()),
                };
            }
        }

        if let Some(rule) = first_match(&self.app_rules, &target) {
            return Classification {
                category: rule.category,
                source: ClassificationSource::AppRule,
                matched_rule_id: Some(rule.id.clone()),
            };
        }

        Classification::fallback()
    }

    /// Classifies a stored usage interval.
    pub fn classify_interval(&self, interval: &UsageInterval) -> Classification {
        let target = MatchTarget::new(&interval.app_name)
            .with_title(interval.window_title.as_deref())
            .with_domain(interval.domain.as_deref());
        self.classify(&target)
    }
}

/// One-shot classification against unsorted rule lists.
pub fn classify(
    target: &MatchTarget<'_>,
    app_rules: &[RuleDefinition],
    domain_rules: &[RuleDefinition],
) -> Classification {
    RuleSet::new(app_rules, domain_rules).classify(target)
}

fn prepare(rules: &[RuleDefinition]) -> Vec<CompiledRule> {
    let mut active: Vec<&RuleDefinition> = rules.iter().filter(|rule| rule.is_active).collect();
    // `sort_by_key` is stable, which keeps creation order among equal priorities.
    active.sort_by_key(|rule| rule.priority);
    active.into_iter().map(CompiledRule::compile).collect()
}

fn first_match<'r>(
    rules: &'r [CompiledRule],
    target: &MatchTarget<'_>,
) -> Option<&'r CompiledRule> {
    rules.iter().find(|rule| rule.matcher.is_match(target))
}
