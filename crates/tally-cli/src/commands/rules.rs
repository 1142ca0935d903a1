//! Rules command: add, list and try out classification rules.

use std::io::Write;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tally_core::{
    Category, CompiledMatcher, DEFAULT_PRIORITY, MatchTarget, Matcher, RuleDefinition, RuleId,
    RuleKind, RuleScope, ScopeId, resolve_domain, test_rule,
};
use tally_db::Database;
use uuid::Uuid;

#[derive(Debug, Subcommand)]
pub enum RulesAction {
    /// Add a rule.
    Add(RuleAddArgs),

    /// List every rule in creation order.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check whether a pattern matches a record without storing anything.
    Test(RuleTestArgs),
}

#[derive(Debug, Args)]
pub struct RuleAddArgs {
    /// Rule kind: app or domain.
    #[arg(long)]
    pub kind: RuleKind,

    /// Matcher type (app: EXACT, GLOB, REGEX, DOMAIN; domain: EXACT, SUFFIX, CONTAINS).
    #[arg(long)]
    pub matcher: String,

    #[arg(long)]
    pub pattern: String,

    /// PRODUCTIVE, NEUTRAL or UNPRODUCTIVE.
    #[arg(long)]
    pub category: Category,

    /// Lower values are evaluated first.
    #[arg(long, default_value_t = DEFAULT_PRIORITY)]
    pub priority: i32,

    /// Tenant scope. Global when omitted.
    #[arg(long)]
    pub scope: Option<String>,

    /// Store the rule disabled.
    #[arg(long)]
    pub inactive: bool,
}

#[derive(Debug, Args)]
pub struct RuleTestArgs {
    #[arg(long)]
    pub kind: RuleKind,

    #[arg(long)]
    pub matcher: String,

    #[arg(long)]
    pub pattern: String,

    /// Application name.
    #[arg(long)]
    pub app: String,

    /// Window title.
    #[arg(long)]
    pub title: Option<String>,

    /// Domain of the record.
    #[arg(long)]
    pub domain: Option<String>,
}

pub fn run<W: Write>(writer: &mut W, db: &Database, action: &RulesAction) -> Result<()> {
    match action {
        RulesAction::Add(args) => {
            let rule = build_rule(args)?;
            db.insert_rule(&rule).context("failed to store rule")?;
            writeln!(writer, "Added rule {}", rule.id)?;
        }
        RulesAction::List { json } => {
            let rules = db.list_rules().context("failed to load rules")?;
            if *json {
                writeln!(writer, "{}", serde_json::to_string_pretty(&rules)?)?;
            } else {
                write_rules(writer, &rules)?;
            }
        }
        RulesAction::Test(args) => {
            let matcher = Matcher::parse(args.kind, &args.matcher)?;
            // Same domain resolution as classification.
            let domain =
                resolve_domain(&args.app, args.domain.as_deref(), args.title.as_deref());
            let target = MatchTarget::new(&args.app)
                .with_title(args.title.as_deref())
                .with_domain(domain.as_deref());
            let verdict = if test_rule(matcher, &args.pattern, &target) {
                "match"
            } else {
                "no match"
            };
            writeln!(writer, "{verdict}")?;
        }
    }
    Ok(())
}

fn build_rule(args: &RuleAddArgs) -> Result<RuleDefinition> {
    if args.pattern.trim().is_empty() {
        anyhow::bail!("pattern cannot be empty");
    }
    let matcher = Matcher::parse(args.kind, &args.matcher)?;
    if !CompiledMatcher::compile(matcher, &args.pattern).is_usable() {
        anyhow::bail!("pattern {:?} is not usable with matcher {matcher}", args.pattern);
    }

    let mut rule = RuleDefinition::new(
        RuleId::new(Uuid::new_v4().to_string())?,
        args.kind,
        matcher,
        args.pattern.clone(),
        args.category,
    )
    .with_priority(args.priority);
    if let Some(scope) = &args.scope {
        rule = rule.with_scope(RuleScope::Tenant(ScopeId::new(scope.as_str())?));
    }
    if args.inactive {
        rule = rule.inactive();
    }
    Ok(rule)
}

fn write_rules<W: Write>(writer: &mut W, rules: &[RuleDefinition]) -> Result<()> {
    if rules.is_empty() {
        writeln!(writer, "No rules defined.")?;
        return Ok(());
    }
    writeln!(
        writer,
        "{:<36}  {:<6}  {:<15}  {:>8}  {:<12}  Pattern",
        "ID", "Kind", "Matcher", "Priority", "Category"
    )?;
    for rule in rules {
        let mut pattern = rule.pattern.clone();
        if let RuleScope::Tenant(scope) = &rule.scope {
            pattern.push_str(&format!(" [scope {scope}]"));
        }
        if !rule.is_active {
            pattern.push_str(" [inactive]");
        }
        writeln!(
            writer,
            "{:<36}  {:<6}  {:<15}  {:>8}  {:<12}  {pattern}",
            rule.id.as_str(),
            rule.kind.as_str(),
            rule.matcher.as_str(),
            rule.priority,
            rule.category.as_str(),
        )?;
    }
    Ok(())
}
