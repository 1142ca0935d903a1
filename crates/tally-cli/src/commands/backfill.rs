//! Backfill command: reclassify stored intervals with the current rules.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use tally_core::{
    BackfillError, BackfillOptions, BackfillProgress, IntervalId, RuleSet, RuleSource, ScopeId,
    backfill_categories,
};
use tally_db::Database;

use crate::Config;

#[derive(Debug, Args)]
pub struct BackfillArgs {
    /// Tenant scope whose rules apply in addition to global rules.
    ///
    /// Intervals carry no tenant, so every stored interval is reclassified
    /// with these rules. Keep one tenant per database.
    #[arg(long)]
    pub scope: Option<String>,

    /// Intervals per page. Defaults to the configured page size.
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Resume after this interval id.
    #[arg(long)]
    pub after: Option<i64>,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    args: &BackfillArgs,
    config: &Config,
) -> Result<BackfillProgress> {
    let scope = args.scope.as_deref().map(ScopeId::new).transpose()?;
    let active = db
        .fetch_active_rules(scope.as_ref())
        .context("failed to load rules")?;
    let rules = RuleSet::new(&active.app_rules, &active.domain_rules);
    if let Some(scope) = &scope {
        tracing::info!(%scope, "backfilling every stored interval with tenant rules");
    }

    let options = BackfillOptions {
        page_size: args.page_size.unwrap_or(config.backfill_page_size),
        start_after: args.after.map(IntervalId),
    };

    let progress = match backfill_categories(db, &rules, options) {
        Ok(progress) => progress,
        Err(BackfillError::Fetch { source, progress }) => {
            write_progress(writer, &progress)?;
            let resume = progress
                .last_cursor
                .map_or_else(String::new, |cursor| format!(" (resume with --after {cursor})"));
            return Err(anyhow::Error::new(source).context(format!("backfill interrupted{resume}")));
        }
        Err(err @ BackfillError::InvalidPageSize) => return Err(err.into()),
    };

    write_progress(writer, &progress)?;
    Ok(progress)
}

fn write_progress<W: Write>(writer: &mut W, progress: &BackfillProgress) -> Result<()> {
    writeln!(
        writer,
        "Scanned {} intervals in {} pages: {} updated, {} unchanged, {} failed",
        progress.scanned,
        progress.pages,
        progress.updated,
        progress.unchanged,
        progress.failures.len()
    )?;
    for failure in &progress.failures {
        writeln!(writer, "  interval {}: {}", failure.item, failure.error)?;
    }
    if let Some(cursor) = progress.last_cursor {
        writeln!(writer, "Last interval id: {cursor}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone, Utc};
    use insta::assert_snapshot;
    use tally_core::{
        Category, DeviceId, EmployeeId, IntervalPager, IntervalSpan, Matcher, RuleDefinition,
        RuleId, RuleKind, RuleScope, UsageInterval,
    };

    fn interval(id: i64, app: &str, domain: Option<&str>) -> UsageInterval {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap() + Duration::minutes(id);
        UsageInterval {
            id: IntervalId(id),
            employee_id: EmployeeId::new("emp-1").unwrap(),
            device_id: DeviceId::new("dev-1").unwrap(),
            app_name: app.to_string(),
            app_identifier: None,
            window_title: None,
            domain: domain.map(str::to_string),
            category: None,
            span: IntervalSpan::closed(start, start + Duration::minutes(1)),
            is_idle: false,
        }
    }

    fn db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_intervals(&[
            interval(1, "Terminal", None),
            interval(2, "Firefox", Some("youtube.com")),
            interval(3, "Firefox", Some("docs.rs")),
        ])
        .unwrap();
        for rule in [
            RuleDefinition::new(
                RuleId::new("term").unwrap(),
                RuleKind::App,
                Matcher::Exact,
                "terminal",
                Category::Productive,
            ),
            RuleDefinition::new(
                RuleId::new("yt").unwrap(),
                RuleKind::Domain,
                Matcher::DomainSuffix,
                "youtube.com",
                Category::Unproductive,
            ),
        ] {
            db.insert_rule(&rule).unwrap();
        }
        db
    }

    fn config() -> Config {
        Config {
            database_path: "unused.db".into(),
            ..Config::default()
        }
    }

    #[test]
    fn rewrites_categories_and_reports_cursor() {
        let db = db();
        let args = BackfillArgs {
            scope: None,
            page_size: Some(2),
            after: None,
        };
        let mut output = Vec::new();
        let progress = run(&mut output, &db, &args, &config()).unwrap();
        assert_eq!(progress.updated, 3);

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Scanned 3 intervals in 2 pages: 3 updated, 0 unchanged, 0 failed
        Last interval id: 3
        ");

        let categories: Vec<_> = db
            .fetch_interval_page(None, 10)
            .unwrap()
            .into_iter()
            .map(|entry| entry.unwrap().category)
            .collect();
        assert_eq!(
            categories,
            vec![
                Some(Category::Productive),
                Some(Category::Unproductive),
                Some(Category::Neutral),
            ]
        );
    }

    #[test]
    fn scoped_rules_apply_to_every_interval() {
        let db = db();
        db.insert_rule(
            &RuleDefinition::new(
                RuleId::new("acme-docs").unwrap(),
                RuleKind::Domain,
                Matcher::DomainExact,
                "docs.rs",
                Category::Productive,
            )
            .with_scope(RuleScope::Tenant(ScopeId::new("acme").unwrap())),
        )
        .unwrap();
        let args = BackfillArgs {
            scope: Some("acme".to_string()),
            page_size: None,
            after: None,
        };
        let progress = run(&mut Vec::new(), &db, &args, &config()).unwrap();
        assert_eq!(progress.scanned, 3);

        let categories: Vec<_> = db
            .fetch_interval_page(None, 10)
            .unwrap()
            .into_iter()
            .map(|entry| entry.unwrap().category)
            .collect();
        assert_eq!(categories[2], Some(Category::Productive));

        // Without the scope only global rules apply.
        let args = BackfillArgs {
            scope: None,
            page_size: None,
            after: None,
        };
        let progress = run(&mut Vec::new(), &db, &args, &config()).unwrap();
        assert_eq!(progress.updated, 1);
    }

    #[test]
    fn resumes_after_cursor() {
        let db = db();
        let args = BackfillArgs {
            scope: None,
            page_size: None,
            after: Some(2),
        };
        let progress = run(&mut Vec::new(), &db, &args, &config()).unwrap();
        assert_eq!(progress.scanned, 1);
        assert_eq!(progress.last_cursor, Some(IntervalId(3)));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let args = BackfillArgs {
            scope: None,
            page_size: Some(0),
            after: None,
        };
        let err = run(&mut Vec::new(), &db(), &args, &config()).unwrap_err();
        assert_eq!(err.to_string(), "page size must be positive");
    }
}
