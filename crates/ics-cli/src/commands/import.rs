//! Import command: decode an `.ics` file, expand it, and upsert the occurrences.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use ics_core::{ExpandOptions, ImportOptions, ImportPlan, SkippedComponent, StoreStats, decode, plan_import};
use ics_db::Database;

use crate::{Cli, Config};

/// What an import run did, as printed to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub file: String,
    pub components: usize,
    pub occurrences: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub skipped: Vec<SkippedSummary>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSummary {
    pub uid: Option<String>,
    pub component: String,
    pub reason: String,
}

impl From<&SkippedComponent> for SkippedSummary {
    fn from(skipped: &SkippedComponent) -> Self {
        Self {
            uid: skipped.uid.clone(),
            component: skipped.component.clone(),
            reason: skipped.reason.to_string(),
        }
    }
}

pub fn run<W: Write>(writer: &mut W, cli: &Cli, config: &Config) -> Result<ImportSummary> {
    let options = ImportOptions {
        reference_timezone: config.reference_tz()?,
        expand: ExpandOptions {
            max_occurrences: config.max_occurrences,
        },
    };

    let plan = plan_file(&cli.file, &options)?;

    let stats = if cli.dry_run {
        StoreStats::default()
    } else {
        let mut db = open_database(config)?;
        db.import(&plan.occurrences)
            .with_context(|| format!("failed to write {}", config.database_path.display()))?
    };

    let summary = ImportSummary {
        file: cli.file.display().to_string(),
        components: plan.components,
        occurrences: plan.occurrences.len(),
        inserted: stats.inserted,
        replaced: stats.replaced,
        skipped: plan.skipped.iter().map(SkippedSummary::from).collect(),
        dry_run: cli.dry_run,
    };

    if cli.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&summary)?)?;
    } else {
        write_summary(writer, &summary)?;
    }
    Ok(summary)
}

/// Reads and plans the file; any failure here is fatal for the run.
fn plan_file(path: &Path, options: &ImportOptions) -> Result<ImportPlan> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = String::from_utf8(bytes)
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    let components = decode(text.trim_start_matches('\u{feff}'))
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(plan_import(&components, options))
}

/// Opens the store, ensuring the parent directory exists.
fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    Ok(db.with_calendar_id(config.calendar_id))
}

fn write_summary<W: Write>(writer: &mut W, summary: &ImportSummary) -> Result<()> {
    for skipped in &summary.skipped {
        writeln!(
            writer,
            "skipped {} {}: {}",
            skipped.component,
            skipped.uid.as_deref().unwrap_or("<no uid>"),
            skipped.reason
        )?;
    }
    if summary.dry_run {
        writeln!(
            writer,
            "Planned {} occurrences from {} components ({} skipped); nothing written.",
            summary.occurrences,
            summary.components,
            summary.skipped.len()
        )?;
    } else {
        writeln!(
            writer,
            "Imported {} occurrences from {} components ({} new, {} replaced, {} skipped).",
            summary.occurrences,
            summary.components,
            summary.inserted,
            summary.replaced,
            summary.skipped.len()
        )?;
    }
    Ok(())
}
