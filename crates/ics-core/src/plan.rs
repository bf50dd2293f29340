//! Import planning: run every component through normalize → expand →
//! materialize, containing per-component failures.

use std::collections::HashMap;

use chrono_tz::Tz;
use thiserror::Error;

use crate::expand::{ExpandError, ExpandOptions, expand};
use crate::materialize::{EpochSuffix, Occurrence, UidScheme, materialize};
use crate::normalize::{NormalizeError, normalize};
use crate::raw::RawComponent;

/// Settings for one import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Zone assigned to date-only and floating values.
    pub reference_timezone: Tz,
    pub expand: ExpandOptions,
}

impl ImportOptions {
    pub fn new(reference_timezone: Tz) -> Self {
        Self {
            reference_timezone,
            expand: ExpandOptions::default(),
        }
    }
}

/// Why a component was left out of the import.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Expand(#[from] ExpandError),
}

/// A component that was skipped, with enough context to report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedComponent {
    pub uid: Option<String>,
    /// Component name, e.g. `VEVENT`.
    pub component: String,
    pub reason: SkipReason,
}

/// Result of processing a single component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentOutcome {
    Expanded(Vec<Occurrence>),
    Skipped(SkippedComponent),
}

/// Everything an import run will write, plus what it left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPlan {
    /// Occurrences in write order; uids are unique.
    pub occurrences: Vec<Occurrence>,
    pub skipped: Vec<SkippedComponent>,
    /// Number of importable (event, task, journal) components seen.
    pub components: usize,
}

/// Normalizes, expands and materializes one component.
///
/// Non-importable components (e.g. `VTIMEZONE`) come back as a skip with
/// [`NormalizeError::Unsupported`]; [`plan_import`] filters them out first.
pub fn process_component<S>(raw: &RawComponent, options: &ImportOptions, scheme: &S) -> ComponentOutcome
where
    S: UidScheme + ?Sized,
{
    let skip = |reason: SkipReason| {
        ComponentOutcome::Skipped(SkippedComponent {
            uid: raw
                .value("UID")
                .map(str::trim)
                .filter(|uid| !uid.is_empty())
                .map(str::to_string),
            component: raw.name.to_ascii_uppercase(),
            reason,
        })
    };

    let event = match normalize(raw, options.reference_timezone) {
        Ok(event) => event,
        Err(err) => return skip(err.into()),
    };
    match expand(&event, &options.expand) {
        Ok(instances) => ComponentOutcome::Expanded(materialize(&event, &instances, scheme)),
        Err(err) => skip(err.into()),
    }
}

/// Plans an import with the default [`EpochSuffix`] uid scheme.
pub fn plan_import(components: &[RawComponent], options: &ImportOptions) -> ImportPlan {
    plan_import_with(components, options, &EpochSuffix)
}

/// Plans an import of a decoded calendar.
///
/// Components with RECURRENCE-ID are processed after all others so that an
/// override replaces the generated occurrence it stands for. Whenever two
/// occurrences share a uid the later one takes the earlier one's slot.
pub fn plan_import_with<S>(components: &[RawComponent], options: &ImportOptions, scheme: &S) -> ImportPlan
where
    S: UidScheme + ?Sized,
{
    let mut importable: Vec<&RawComponent> = components.iter().filter(|c| c.kind().is_some()).collect();
    importable.sort_by_key(|c| c.property("RECURRENCE-ID").is_some());

    let mut plan = ImportPlan {
        components: importable.len(),
        ..ImportPlan::default()
    };
    let mut slots: HashMap<String, usize> = HashMap::new();

    for raw in importable {
        match process_component(raw, options, scheme) {
            ComponentOutcome::Expanded(occurrences) => {
                for occurrence in occurrences {
                    if let Some(&slot) = slots.get(&occurrence.occurrence_uid) {
                        tracing::debug!(uid = %occurrence.occurrence_uid, "replacing earlier occurrence");
                        plan.occurrences[slot] = occurrence;
                    } else {
                        slots.insert(occurrence.occurrence_uid.clone(), plan.occurrences.len());
                        plan.occurrences.push(occurrence);
                    }
                }
            }
            ComponentOutcome::Skipped(skipped) => {
                tracing::warn!(
                    uid = skipped.uid.as_deref().unwrap_or("<none>"),
                    component = %skipped.component,
                    reason = %skipped.reason,
                    "skipping component"
                );
                plan.skipped.push(skipped);
            }
        }
    }

    tracing::debug!(
        components = plan.components,
        occurrences = plan.occurrences.len(),
        skipped = plan.skipped.len(),
        "planned import"
    );
    plan
}
