//! CLI subcommand implementations.

pub mod backfill;
pub mod classify;
pub mod gaps;
pub mod import;
pub mod reconcile;
pub mod rules;
pub mod util;
pub mod validate;
