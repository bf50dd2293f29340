//! Occurrence materialization: stable identities for expanded instances.

use chrono::{DateTime, Offset};
use chrono_tz::Tz;

use crate::expand::Instance;
use crate::normalize::NormalizedEvent;
use crate::raw::ComponentKind;

/// Derives the storage identity of one instance of an event.
///
/// Implementations must be collision-free within a series.
pub trait UidScheme {
    fn occurrence_uid(&self, event: &NormalizedEvent, instance: &Instance) -> String;
}

/// `uid` for singular events, `uid-<epoch seconds of start>` for series members.
///
/// Overrides (components with RECURRENCE-ID) are keyed by the original start
/// they replace, so they land on the same uid as the generated occurrence. A
/// recurring override shifts each instance by its distance from the override's
/// own start, which keeps its uids distinct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochSuffix;

impl UidScheme for EpochSuffix {
    fn occurrence_uid(&self, event: &NormalizedEvent, instance: &Instance) -> String {
        let suffix = match (event.recurrence_id, event.is_recurring()) {
            (Some(original), true) => {
                original.timestamp() + (instance.start.timestamp() - event.start.timestamp())
            }
            (Some(original), false) => original.timestamp(),
            (None, true) => instance.start.timestamp(),
            (None, false) => return event.uid.clone(),
        };
        format!("{}-{suffix}", event.uid)
    }
}

/// An occurrence ready to be handed to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub occurrence_uid: String,
    pub series_uid: String,
    pub kind: ComponentKind,
    pub summary: String,
    pub location: String,
    pub description: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub all_day: bool,
}

impl Occurrence {
    /// The timezone the occurrence start is expressed in.
    pub fn timezone(&self) -> Tz {
        self.start.timezone()
    }

    /// UTC offset in seconds in effect at the occurrence start.
    pub fn utc_offset_seconds(&self) -> i32 {
        self.start.offset().fix().local_minus_utc()
    }
}

/// Pairs each instance with the event's descriptive fields and a uid.
pub fn materialize<S>(event: &NormalizedEvent, instances: &[Instance], scheme: &S) -> Vec<Occurrence>
where
    S: UidScheme + ?Sized,
{
    instances
        .iter()
        .map(|instance| Occurrence {
            occurrence_uid: scheme.occurrence_uid(event, instance),
            series_uid: event.uid.clone(),
            kind: event.kind,
            summary: event.summary.clone(),
            location: event.location.clone(),
            description: event.description.clone(),
            start: instance.start,
            end: instance.end,
            all_day: event.all_day,
        })
        .collect()
}
