//! Core domain logic for iCalendar imports.
//!
//! This crate contains the fundamental types and logic for:
//! - Decoding: flattening parsed iCalendar data into raw components
//! - Normalization: coercing component properties into timezone-aware events
//! - Expansion: enumerating the concrete occurrences of a recurrence rule
//! - Materialization: assigning each occurrence a stable identity
//! - Planning: running a whole import batch with per-component failure isolation

mod expand;
mod materialize;
mod normalize;
mod plan;
pub mod raw;
mod store;

pub use expand::{DEFAULT_MAX_OCCURRENCES, ExpandError, ExpandOptions, Instance, MAX_OCCURRENCES_CEILING, expand};
pub use materialize::{EpochSuffix, Occurrence, UidScheme, materialize};
pub use normalize::{NormalizeError, NormalizedEvent, normalize};
pub use plan::{
    ComponentOutcome, ImportOptions, ImportPlan, SkipReason, SkippedComponent, plan_import,
    plan_import_with, process_component,
};
pub use raw::{ComponentKind, DecodeError, RawComponent, RawProperty, decode};
pub use store::{OccurrenceStore, StoreStats, UpsertOutcome, store_all};
