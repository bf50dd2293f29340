//! End-to-end tests for the `ics-import` binary.
//!
//! Tests the full pipeline: file → decode → expand → `SQLite`.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use rusqlite::Connection;
use tempfile::{NamedTempFile, TempDir};

const CALENDAR: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
PRODID:-//test//EN\r
BEGIN:VTIMEZONE\r
TZID:Europe/Vienna\r
BEGIN:STANDARD\r
DTSTART:19701025T030000\r
TZOFFSETFROM:+0200\r
TZOFFSETTO:+0100\r
END:STANDARD\r
END:VTIMEZONE\r
BEGIN:VEVENT\r
UID:standup@example.com\r
SUMMARY:Standup\r
LOCATION:Room 1\r
DTSTART;TZID=Europe/Vienna:20240101T090000\r
DTEND;TZID=Europe/Vienna:20240101T091500\r
RRULE:FREQ=WEEKLY;COUNT=3\r
EXDATE;TZID=Europe/Vienna:20240108T090000\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:holiday@example.com\r
SUMMARY:Holiday\r
DTSTART;VALUE=DATE:20240506\r
DTEND;VALUE=DATE:20240507\r
END:VEVENT\r
BEGIN:VTODO\r
UID:task@example.com\r
SUMMARY:File taxes\r
DTSTART:20240415T080000Z\r
END:VTODO\r
BEGIN:VEVENT\r
UID:broken@example.com\r
DTSTART:20240101T100000Z\r
RRULE:FREQ=DAILY\r
END:VEVENT\r
END:VCALENDAR\r
";

fn binary() -> &'static str {
    env!("CARGO_BIN_EXE_ics-import")
}

/// Writes a config file pointing at a database inside `temp`.
fn config_file(temp: &Path) -> NamedTempFile {
    let db_path = temp.join("calendardb");
    let mut config = NamedTempFile::new().unwrap();
    writeln!(
        config,
        "database_path = \"{}\"\nreference_timezone = \"Europe/Vienna\"",
        db_path.display()
    )
    .unwrap();
    config.flush().unwrap();
    config
}

fn import(temp: &TempDir, config: &NamedTempFile, ics: &Path) -> Output {
    Command::new(binary())
        .env("HOME", temp.path())
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config.path())
        .arg(ics)
        .output()
        .expect("failed to run ics-import")
}

fn rows(db: &Path) -> Vec<(String, i64, i64, i64, i64)> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare("SELECT Uid, ComponentType, DateStart, DateEnd, AllDay FROM Components ORDER BY DateStart, Uid")
        .unwrap();
    stmt.query_map([], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    })
    .unwrap()
    .map(Result::unwrap)
    .collect()
}

#[test]
fn test_import_expands_and_stores_occurrences() {
    let temp = TempDir::new().unwrap();
    let ics = temp.path().join("calendar.ics");
    std::fs::write(&ics, CALENDAR).unwrap();
    let config = config_file(temp.path());

    let output = import(&temp, &config, &ics);
    assert!(
        output.status.success(),
        "import failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Imported 4 occurrences from 4 components (4 new, 0 replaced, 1 skipped)."),
        "unexpected summary: {stdout}"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken@example.com"), "expected warning: {stderr}");

    let stored = rows(&temp.path().join("calendardb"));
    assert_eq!(
        stored,
        vec![
            ("standup@example.com-1704096000".to_string(), 1, 1_704_096_000, 1_704_096_900, 0),
            ("standup@example.com-1705305600".to_string(), 1, 1_705_305_600, 1_705_306_500, 0),
            ("task@example.com".to_string(), 2, 1_713_168_000, 1_713_168_000, 0),
            ("holiday@example.com".to_string(), 1, 1_714_946_400, 1_715_032_800, 1),
        ]
    );
}

#[test]
fn test_reimport_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let ics = temp.path().join("calendar.ics");
    std::fs::write(&ics, CALENDAR).unwrap();
    let config = config_file(temp.path());
    let db = temp.path().join("calendardb");

    assert!(import(&temp, &config, &ics).status.success());
    let first = rows(&db);

    let output = import(&temp, &config, &ics);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("(0 new, 4 replaced, 1 skipped)"));
    assert_eq!(rows(&db), first);

    let conn = Connection::open(&db).unwrap();
    let instances: i64 = conn
        .query_row("SELECT COUNT(*) FROM Instances", [], |row| row.get(0))
        .unwrap();
    assert_eq!(instances, 4);
}

#[test]
fn test_wrong_argument_count_exits_with_usage() {
    let temp = TempDir::new().unwrap();

    let none = Command::new(binary()).env("HOME", temp.path()).output().unwrap();
    assert_eq!(none.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&none.stderr).contains("Usage"));

    let two = Command::new(binary())
        .env("HOME", temp.path())
        .args(["a.ics", "b.ics"])
        .output()
        .unwrap();
    assert_eq!(two.status.code(), Some(1));
}

#[test]
fn test_help_exits_successfully() {
    let output = Command::new(binary()).arg("--help").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("ics-import"));
}

#[test]
fn test_missing_input_fails_without_creating_database() {
    let temp = TempDir::new().unwrap();
    let config = config_file(temp.path());

    let output = import(&temp, &config, &temp.path().join("missing.ics"));
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read"));
    assert!(!temp.path().join("calendardb").exists());
}
