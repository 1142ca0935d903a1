//! Core engine for time accounting and productivity classification.
//!
//! This crate contains:
//! - Rule matching and classification of usage records into categories
//! - Aggregation of usage intervals into session statistics
//! - Validation of stored session statistics against recomputed values
//! - Reconciliation and batch jobs driven through store traits
//!
//! Nothing here touches a database or the clock; callers pass `now`
//! explicitly.

pub mod aggregate;
pub mod batch;
pub mod classify;
pub mod domain;
pub mod interval;
pub mod matcher;
pub mod reconcile;
pub mod rules;
pub mod session;
pub mod store;
pub mod types;
pub mod validate;

pub use aggregate::{AggregateOptions, SessionStatistics, StatField, aggregate, effective_duration};
pub use batch::{
    BackfillError, BackfillOptions, BackfillProgress, BatchFailure, BatchReconciliation,
    BatchValidation, SessionUnit, backfill_categories, load_units, reconcile_batch, validate_batch,
};
pub use classify::{Classification, ClassificationSource, DEFAULT_CATEGORY, RuleSet, classify};
pub use domain::{domain_from_window_title, is_browser_app, normalize_domain, resolve_domain};
pub use interval::{IntervalSpan, UsageInterval};
pub use matcher::{CompiledMatcher, MatchTarget, Matcher, test_rule};
pub use reconcile::{ReconcileError, Reconciliation, reconcile};
pub use rules::{DEFAULT_PRIORITY, RuleDefinition, RuleKind, RuleScope};
pub use session::WorkSession;
pub use store::{
    ActiveRules, IntervalPager, IntervalSource, PageEntry, RuleSource, SessionStore, TimeRange,
    UndecodableInterval, page_entry_id,
};
pub use types::{
    Category, DeviceId, EmployeeId, IntervalId, RuleId, ScopeId, SessionId, ValidationError,
};
pub use validate::{
    GapReport, IntegrityFinding, SessionValidationReport, TimeGap, ValidationConfig,
    ValidationReport, detect_gaps, top_gappiest, validate_session,
};
