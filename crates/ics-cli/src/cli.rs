//! Command-line argument definitions.

use std::path::PathBuf;

use clap::Parser;

/// Import an iCalendar file into the calendar database.
///
/// Recurring events are expanded into one stored occurrence each; running
/// the same import twice replaces records instead of duplicating them.
#[derive(Debug, Parser)]
#[command(name = "ics-import", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Reference timezone for date-only and floating times (IANA name).
    #[arg(long, value_name = "TZ")]
    pub timezone: Option<String>,

    /// Path to the calendar database.
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Calendar to write occurrences into.
    #[arg(long, value_name = "ID")]
    pub calendar_id: Option<i64>,

    /// Expand and report without touching the database.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the import summary as JSON.
    #[arg(long)]
    pub json: bool,

    /// The .ics file to import.
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::error::ErrorKind;

    #[test]
    fn parses_single_positional_file() {
        let cli = Cli::try_parse_from(["ics-import", "calendar.ics"]).unwrap();
        assert_eq!(cli.file, PathBuf::from("calendar.ics"));
        assert!(!cli.dry_run);
    }

    #[test]
    fn rejects_missing_file() {
        let err = Cli::try_parse_from(["ics-import"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_extra_positional() {
        let err = Cli::try_parse_from(["ics-import", "a.ics", "b.ics"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "ics-import",
            "--timezone",
            "Europe/Vienna",
            "--calendar-id",
            "3",
            "--dry-run",
            "cal.ics",
        ])
        .unwrap();
        assert_eq!(cli.timezone.as_deref(), Some("Europe/Vienna"));
        assert_eq!(cli.calendar_id, Some(3));
        assert!(cli.dry_run);
    }
}
