//! The storage seam the import depends on.

use crate::materialize::Occurrence;

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// A sink for materialized occurrences.
pub trait OccurrenceStore {
    type Error;

    /// Replaces any record with the same `occurrence_uid`, or inserts one.
    fn upsert(&mut self, occurrence: &Occurrence) -> Result<UpsertOutcome, Self::Error>;
}

/// Counts of records written by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub inserted: usize,
    pub replaced: usize,
}

impl StoreStats {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Replaced => self.replaced += 1,
        }
    }

    pub const fn total(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Upserts every occurrence in order, stopping at the first store error.
pub fn store_all<S: OccurrenceStore>(
    store: &mut S,
    occurrences: &[Occurrence],
) -> Result<StoreStats, S::Error> {
    let mut stats = StoreStats::default();
    for occurrence in occurrences {
        stats.record(store.upsert(occurrence)?);
    }
    Ok(stats)
}
