//! Storage layer for imported calendar occurrences.
//!
//! Provides persistence for occurrences using `rusqlite`, in the table layout
//! the calendar application reads.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! # Schema
//!
//! ## Components
//!
//! One row per occurrence. `DateStart`/`DateEnd` are epoch seconds, `Uid` is
//! the occurrence uid, `Tzid` is the zone label in the application's
//! `:<IANA name>` form and `TzOffset` the UTC offset in seconds at the start.
//! `Flags`, `Status` and `Until` are not used by imports and are written as `-1`.
//!
//! ## Instances
//!
//! A range-query companion holding `(Id, DateStart, DateEnd)` for every
//! component row. It is rewritten together with its component row.
//!
//! ## Upserts
//!
//! Existing databases may not carry a unique constraint on `Uid`, so upserts
//! update by `Uid` first and insert only when nothing matched.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use ics_core::{Occurrence, OccurrenceStore, StoreStats, UpsertOutcome};

/// Calendar the original importer wrote into (the application's default sync calendar).
pub const DEFAULT_CALENDAR_ID: i64 = 1;

/// Value written to columns imports do not use.
const UNSET: i64 = -1;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
    calendar_id: i64,
}

/// A stored component row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRecord {
    pub id: i64,
    pub calendar_id: i64,
    pub component_type: i64,
    pub date_start: i64,
    pub date_end: i64,
    pub summary: String,
    pub location: String,
    pub description: String,
    pub uid: String,
    pub all_day: bool,
    pub created_time: i64,
    pub modified_time: i64,
    pub tzid: String,
    pub tz_offset: i64,
}

/// A stored instance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: i64,
    pub date_start: i64,
    pub date_end: i64,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, DbError> {
        let db = Self {
            conn,
            calendar_id: DEFAULT_CALENDAR_ID,
        };
        db.init()?;
        Ok(db)
    }

    /// Sets the calendar new rows are written to.
    #[must_use]
    pub const fn with_calendar_id(mut self, calendar_id: i64) -> Self {
        self.calendar_id = calendar_id;
        self
    }

    pub const fn calendar_id(&self) -> i64 {
        self.calendar_id
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS Components (
                Id INTEGER PRIMARY KEY AUTOINCREMENT,
                CalendarId INTEGER,
                ComponentType INTEGER,
                Flags INTEGER,
                DateStart INTEGER,
                DateEnd INTEGER,
                Summary TEXT,
                Location TEXT,
                Description TEXT,
                Status INTEGER,
                Uid TEXT,
                Until INTEGER,
                AllDay INTEGER,
                CreatedTime INTEGER,
                ModifiedTime INTEGER,
                Tzid TEXT,
                TzOffset INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_components_uid ON Components(Uid);

            CREATE TABLE IF NOT EXISTS Instances (
                Id INTEGER,
                DateStart INTEGER,
                DateEnd INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_instances_id ON Instances(Id);
            CREATE INDEX IF NOT EXISTS idx_instances_start ON Instances(DateStart);
            ",
        )?;
        Ok(())
    }

    /// Upserts a batch of occurrences in one transaction.
    ///
    /// Either every occurrence is written or, on error, none is.
    pub fn import(&mut self, occurrences: &[Occurrence]) -> Result<StoreStats, DbError> {
        self.import_at(occurrences, Utc::now())
    }

    fn import_at(
        &mut self,
        occurrences: &[Occurrence],
        now: DateTime<Utc>,
    ) -> Result<StoreStats, DbError> {
        let mut stats = StoreStats::default();
        if occurrences.is_empty() {
            return Ok(stats);
        }
        let tx = self.conn.transaction()?;
        for occurrence in occurrences {
            stats.record(upsert_row(&tx, self.calendar_id, occurrence, now.timestamp())?);
        }
        tx.commit()?;
        tracing::debug!(
            inserted = stats.inserted,
            replaced = stats.replaced,
            "committed import"
        );
        Ok(stats)
    }

    /// Lists all component rows ordered by start then uid.
    pub fn list_components(&self) -> Result<Vec<ComponentRecord>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMPONENT_COLUMNS} FROM Components ORDER BY DateStart ASC, Uid ASC"
        ))?;
        let rows = stmt.query_map([], component_from_row)?;
        let mut components = Vec::new();
        for row in rows {
            components.push(row?);
        }
        Ok(components)
    }

    /// Lists all instance rows ordered by start then ID.
    pub fn list_instances(&self) -> Result<Vec<InstanceRecord>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT Id, DateStart, DateEnd FROM Instances ORDER BY DateStart ASC, Id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(InstanceRecord {
                id: row.get(0)?,
                date_start: row.get(1)?,
                date_end: row.get(2)?,
            })
        })?;
        let mut instances = Vec::new();
        for row in rows {
            instances.push(row?);
        }
        Ok(instances)
    }

    /// Looks up a component row by uid.
    pub fn find_component(&self, uid: &str) -> Result<Option<ComponentRecord>, DbError> {
        let component = self
            .conn
            .query_row(
                &format!("SELECT {COMPONENT_COLUMNS} FROM Components WHERE Uid = ? ORDER BY Id ASC LIMIT 1"),
                [uid],
                component_from_row,
            )
            .optional()?;
        Ok(component)
    }
}

const COMPONENT_COLUMNS: &str = "Id, CalendarId, ComponentType, DateStart, DateEnd, Summary, Location, \
     Description, Uid, AllDay, CreatedTime, ModifiedTime, Tzid, TzOffset";

fn component_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ComponentRecord> {
    Ok(ComponentRecord {
        id: row.get(0)?,
        calendar_id: row.get(1)?,
        component_type: row.get(2)?,
        date_start: row.get(3)?,
        date_end: row.get(4)?,
        summary: row.get(5)?,
        location: row.get(6)?,
        description: row.get(7)?,
        uid: row.get(8)?,
        all_day: row.get::<_, i64>(9)? != 0,
        created_time: row.get(10)?,
        modified_time: row.get(11)?,
        tzid: row.get(12)?,
        tz_offset: row.get(13)?,
    })
}

impl OccurrenceStore for Database {
    type Error = DbError;

    fn upsert(&mut self, occurrence: &Occurrence) -> Result<UpsertOutcome, Self::Error> {
        upsert_row(&self.conn, self.calendar_id, occurrence, Utc::now().timestamp())
    }
}

/// Zone label in the `:<IANA name>` form the calendar application stores.
fn tzid_label(occurrence: &Occurrence) -> String {
    format!(":{}", occurrence.timezone().name())
}

/// Replaces the rows for `occurrence.occurrence_uid`, or inserts them.
///
/// `CreatedTime` survives a replacement; `Instances` rows are rewritten.
fn upsert_row(
    conn: &Connection,
    calendar_id: i64,
    occurrence: &Occurrence,
    now: i64,
) -> Result<UpsertOutcome, DbError> {
    let start = occurrence.start.timestamp();
    let end = occurrence.end.timestamp();
    let tzid = tzid_label(occurrence);
    let tz_offset = i64::from(occurrence.utc_offset_seconds());
    let all_day = i64::from(occurrence.all_day);

    let updated = conn.execute(
        "
        UPDATE Components
        SET CalendarId = ?, ComponentType = ?, Flags = ?, DateStart = ?, DateEnd = ?,
            Summary = ?, Location = ?, Description = ?, Status = ?, Until = ?, AllDay = ?,
            ModifiedTime = ?, Tzid = ?, TzOffset = ?
        WHERE Uid = ?
        ",
        params![
            calendar_id,
            occurrence.kind.type_tag(),
            UNSET,
            start,
            end,
            occurrence.summary,
            occurrence.location,
            occurrence.description,
            UNSET,
            UNSET,
            all_day,
            now,
            tzid,
            tz_offset,
            occurrence.occurrence_uid,
        ],
    )?;

    if updated > 0 {
        let ids = component_ids(conn, &occurrence.occurrence_uid)?;
        for id in ids {
            conn.execute("DELETE FROM Instances WHERE Id = ?", [id])?;
            insert_instance(conn, id, start, end)?;
        }
        return Ok(UpsertOutcome::Replaced);
    }

    conn.execute(
        "
        INSERT INTO Components (
            CalendarId, ComponentType, Flags, DateStart, DateEnd,
            Summary, Location, Description, Status, Uid,
            Until, AllDay, CreatedTime, ModifiedTime, Tzid, TzOffset
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            calendar_id,
            occurrence.kind.type_tag(),
            UNSET,
            start,
            end,
            occurrence.summary,
            occurrence.location,
            occurrence.description,
            UNSET,
            occurrence.occurrence_uid,
            UNSET,
            all_day,
            now,
            now,
            tzid,
            tz_offset,
        ],
    )?;
    insert_instance(conn, conn.last_insert_rowid(), start, end)?;
    Ok(UpsertOutcome::Inserted)
}

fn component_ids(conn: &Connection, uid: &str) -> Result<Vec<i64>, DbError> {
    let mut stmt = conn.prepare("SELECT Id FROM Components WHERE Uid = ?")?;
    let rows = stmt.query_map([uid], |row| row.get(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

fn insert_instance(conn: &Connection, id: i64, start: i64, end: i64) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO Instances (Id, DateStart, DateEnd) VALUES (?, ?, ?)",
        params![id, start, end],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeDelta, TimeZone};
    use chrono_tz::Europe::Vienna;
    use chrono_tz::Tz;
    use ics_core::ComponentKind;

    fn occurrence(uid: &str, start: DateTime<Tz>) -> Occurrence {
        Occurrence {
            occurrence_uid: uid.to_string(),
            series_uid: uid.to_string(),
            kind: ComponentKind::Event,
            summary: "Standup".to_string(),
            location: "Room 1".to_string(),
            description: String::new(),
            start,
            end: start + TimeDelta::minutes(15),
            all_day: false,
        }
    }

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        stmt.query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info")
            .map(|row| row.expect("column name"))
            .collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_calendar_layout() {
        let db = Database::open_in_memory().expect("open in-memory db");
        assert_eq!(
            table_columns(&db.conn, "Components"),
            vec![
                "Id",
                "CalendarId",
                "ComponentType",
                "Flags",
                "DateStart",
                "DateEnd",
                "Summary",
                "Location",
                "Description",
                "Status",
                "Uid",
                "Until",
                "AllDay",
                "CreatedTime",
                "ModifiedTime",
                "Tzid",
                "TzOffset",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "Instances"),
            vec!["Id", "DateStart", "DateEnd"]
        );
    }

    #[test]
    fn import_writes_component_and_instance() {
        let mut db = Database::open_in_memory().unwrap().with_calendar_id(7);
        let start = Vienna.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let stats = db
            .import_at(&[occurrence("standup-1704096000", start)], at(1_700_000_000))
            .unwrap();
        assert_eq!(stats, StoreStats { inserted: 1, replaced: 0 });

        let components = db.list_components().unwrap();
        assert_eq!(components.len(), 1);
        let row = &components[0];
        assert_eq!(row.calendar_id, 7);
        assert_eq!(row.component_type, 1);
        assert_eq!(row.date_start, 1_704_096_000);
        assert_eq!(row.date_end, 1_704_096_900);
        assert_eq!(row.tzid, ":Europe/Vienna");
        assert_eq!(row.tz_offset, 3600);
        assert_eq!(row.created_time, 1_700_000_000);
        assert!(!row.all_day);

        let instances = db.list_instances().unwrap();
        assert_eq!(
            instances,
            vec![InstanceRecord {
                id: row.id,
                date_start: row.date_start,
                date_end: row.date_end,
            }]
        );
    }

    #[test]
    fn reimport_replaces_instead_of_duplicating() {
        let mut db = Database::open_in_memory().unwrap();
        let start = Vienna.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let batch = vec![
            occurrence("a", start),
            occurrence("b", start + TimeDelta::days(1)),
        ];

        db.import_at(&batch, at(1_700_000_000)).unwrap();
        let first = db.list_components().unwrap();

        let stats = db.import_at(&batch, at(1_700_000_500)).unwrap();
        assert_eq!(stats, StoreStats { inserted: 0, replaced: 2 });

        let second = db.list_components().unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(db.list_instances().unwrap().len(), 2);
        for (before, after) in first.iter().zip(&second) {
            assert_eq!(before.id, after.id);
            assert_eq!(after.created_time, 1_700_000_000);
            assert_eq!(after.modified_time, 1_700_000_500);
        }
    }

    #[test]
    fn replacement_moves_instance_in_lockstep() {
        let mut db = Database::open_in_memory().unwrap();
        let start = Vienna.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        db.import_at(&[occurrence("moved", start)], at(0)).unwrap();

        let later = start + TimeDelta::hours(2);
        db.upsert(&occurrence("moved", later)).unwrap();

        let component = db.find_component("moved").unwrap().unwrap();
        assert_eq!(component.date_start, later.timestamp());
        let instances = db.list_instances().unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].date_start, later.timestamp());
        assert_eq!(instances[0].id, component.id);
    }

    #[test]
    fn upsert_reports_outcome() {
        let mut db = Database::open_in_memory().unwrap();
        let start = Tz::UTC.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(db.upsert(&occurrence("x", start)).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(db.upsert(&occurrence("x", start)).unwrap(), UpsertOutcome::Replaced);
    }

    #[test]
    fn legacy_duplicate_rows_are_all_updated() {
        let mut db = Database::open_in_memory().unwrap();
        for _ in 0..2 {
            db.conn
                .execute(
                    "INSERT INTO Components (Uid, DateStart, DateEnd, CreatedTime) VALUES ('legacy', 0, 0, 5)",
                    [],
                )
                .unwrap();
        }

        let start = Tz::UTC.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        db.import_at(&[occurrence("legacy", start)], at(10)).unwrap();

        let components = db.list_components().unwrap();
        assert_eq!(components.len(), 2);
        assert!(components.iter().all(|c| c.date_start == start.timestamp()));
        assert_eq!(db.list_instances().unwrap().len(), 2);
    }

    #[test]
    fn open_persists_to_disk() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("calendardb");
        let start = Tz::UTC.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        {
            let mut db = Database::open(&path).unwrap();
            db.import(&[occurrence("persisted", start)]).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.find_component("persisted").unwrap().is_some());
    }

    #[test]
    fn find_component_returns_first_row_for_uid() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(db.find_component("missing").unwrap().is_none());

        let first = Tz::UTC.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let second = first + TimeDelta::days(1);
        db.import_at(&[occurrence("a", second), occurrence("b", first)], at(10))
            .unwrap();

        let found = db.find_component("a").unwrap().unwrap();
        assert_eq!(found.uid, "a");
        assert_eq!(found.date_start, second.timestamp());
        assert_eq!(found.tzid, ":UTC");
        assert!(db.find_component("c").unwrap().is_none());
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut db = Database::open_in_memory().unwrap();
        assert_eq!(db.import(&[]).unwrap(), StoreStats::default());
    }
}
