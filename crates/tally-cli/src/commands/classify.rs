//! Classify command: resolve the category of one ad-hoc record.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tally_core::{
    Classification, MatchTarget, RuleSet, RuleSource, ScopeId, is_browser_app, resolve_domain,
};
use tally_db::Database;

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Application name.
    #[arg(long)]
    pub app: String,

    /// Window title.
    #[arg(long)]
    pub title: Option<String>,

    /// Domain or full URL.
    #[arg(long)]
    pub domain: Option<String>,

    /// Tenant scope whose rules apply in addition to global rules.
    #[arg(long)]
    pub scope: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ClassifyOutput<'a> {
    app: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<String>,
    #[serde(flatten)]
    classification: Classification,
}

pub fn run<W: Write>(writer: &mut W, db: &Database, args: &ClassifyArgs) -> Result<()> {
    let scope = args.scope.as_deref().map(ScopeId::new).transpose()?;
    let active = db
        .fetch_active_rules(scope.as_ref())
        .context("failed to load rules")?;
    let rules = RuleSet::new(&active.app_rules, &active.domain_rules);

    let target = MatchTarget::new(&args.app)
        .with_title(args.title.as_deref())
        .with_domain(args.domain.as_deref());
    let classification = rules.classify(&target);

    let output = ClassifyOutput {
        app: &args.app,
        domain: resolve_domain(&args.app, args.domain.as_deref(), args.title.as_deref()),
        classification,
    };

    if args.json {
        writeln!(
            writer,
            "{}",
            serde_json::to_string_pretty(&output).context("failed to serialize output")?
        )?;
        return Ok(());
    }

    writeln!(writer, "Category: {}", output.classification.category)?;
    writeln!(writer, "Source:   {}", output.classification.source.as_str())?;
    if let Some(rule_id) = &output.classification.matched_rule_id {
        writeln!(writer, "Rule:     {rule_id}")?;
    }
    if output.domain.is_none() && is_browser_app(&args.app) {
        writeln!(
            writer,
            "Note: {} looks like a browser but no domain was given or found in its title; \
             only app rules apply.",
            args.app
        )?;
    }
    Ok(())
}
