//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::Cli;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the calendar database file.
    pub database_path: PathBuf,
    /// IANA name of the zone given to date-only and floating times.
    pub reference_timezone: String,
    /// Calendar new occurrences are written into.
    pub calendar_id: i64,
    /// Maximum occurrences a single recurring series may expand to (at most 65534).
    pub max_occurrences: u16,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("reference_timezone", &self.reference_timezone)
            .field("calendar_id", &self.calendar_id)
            .field("max_occurrences", &self.max_occurrences)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            reference_timezone: system_timezone(),
            calendar_id: ics_db::DEFAULT_CALENDAR_ID,
            max_occurrences: ics_core::DEFAULT_MAX_OCCURRENCES,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (ICS_IMPORT_*)
        figment = figment.merge(Env::prefixed("ICS_IMPORT_"));

        figment.extract()
    }

    /// Applies command-line overrides on top of loaded values.
    #[must_use]
    pub fn with_cli_overrides(mut self, cli: &Cli) -> Self {
        if let Some(timezone) = &cli.timezone {
            self.reference_timezone.clone_from(timezone);
        }
        if let Some(database) = &cli.database {
            self.database_path.clone_from(database);
        }
        if let Some(calendar_id) = cli.calendar_id {
            self.calendar_id = calendar_id;
        }
        self
    }

    /// The reference timezone, parsed.
    pub fn reference_tz(&self) -> anyhow::Result<Tz> {
        self.reference_timezone.parse::<Tz>().map_err(|err| {
            anyhow::anyhow!("unknown reference timezone {}: {err}", self.reference_timezone)
        })
    }
}

/// Returns the platform-specific config directory for ics-import.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ics-import"))
}

/// Where the calendar application keeps its database: `~/.calendar/calendardb`.
fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".calendar")
        .join("calendardb")
}

/// The system timezone if it is a known IANA zone, else UTC.
fn system_timezone() -> String {
    iana_time_zone::get_timezone()
        .ok()
        .filter(|name| name.parse::<Tz>().is_ok())
        .unwrap_or_else(|| "UTC".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use clap::Parser;

    #[test]
    fn test_default_config_uses_calendar_dir_for_db() {
        let config = Config::default();
        assert!(config.database_path.ends_with(".calendar/calendardb"));
    }

    #[test]
    fn test_default_reference_timezone_is_valid() {
        let config = Config::default();
        assert!(config.reference_tz().is_ok());
    }

    #[test]
    fn test_default_limits() {
        let config = Config::default();
        assert_eq!(config.calendar_id, 1);
        assert_eq!(config.max_occurrences, 5000);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "database_path = \"/tmp/cal.db\"\nreference_timezone = \"Europe/Vienna\"\ncalendar_id = 4"
        )
        .unwrap();
        file.flush().unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/cal.db"));
        assert_eq!(config.reference_tz().unwrap(), chrono_tz::Europe::Vienna);
        assert_eq!(config.calendar_id, 4);
    }

    #[test]
    fn test_cli_overrides_take_precedence() {
        let cli = Cli::parse_from([
            "ics-import",
            "--timezone",
            "America/New_York",
            "--database",
            "/tmp/other.db",
            "--calendar-id",
            "9",
            "cal.ics",
        ]);
        let config = Config::default().with_cli_overrides(&cli);
        assert_eq!(config.reference_tz().unwrap(), chrono_tz::America::New_York);
        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.calendar_id, 9);
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let config = Config {
            reference_timezone: "Mars/Olympus_Mons".to_string(),
            ..Config::default()
        };
        let err = config.reference_tz().unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus_Mons"));
    }
}
