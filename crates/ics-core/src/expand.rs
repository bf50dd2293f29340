//! Recurrence expansion.
//!
//! Rules are evaluated with the `rrule` crate, anchored at the event start in
//! the event's own timezone so that a weekly 09:00 meeting stays at 09:00
//! local time across DST transitions. Only bounded rules are enumerated.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use rrule::{RRule, Unvalidated};
use thiserror::Error;

use crate::normalize::NormalizedEvent;

/// Default cap on occurrences generated for a single series.
pub const DEFAULT_MAX_OCCURRENCES: u16 = 5000;

/// Highest usable cap. Larger configured values are clamped to this, since
/// detecting overflow needs one candidate beyond the cap.
pub const MAX_OCCURRENCES_CEILING: u16 = u16::MAX - 1;

/// Reasons a series cannot be expanded.
///
/// All of these are scoped to one component; the import skips it and moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpandError {
    /// The rule could not be parsed or failed validation.
    #[error("invalid recurrence rule `{rule}`: {message}")]
    InvalidRule { rule: String, message: String },
    /// The rule has neither COUNT nor UNTIL.
    #[error("recurrence rule `{0}` is unbounded (no COUNT or UNTIL)")]
    Unbounded(String),
    /// The rule is bounded but produces more occurrences than allowed.
    #[error("recurrence rule `{rule}` expands to more than {limit} occurrences")]
    TooManyOccurrences { rule: String, limit: u16 },
    /// An instance falls outside the representable date range.
    #[error("recurrence rule `{0}` produces an instance outside the supported date range")]
    OutOfRange(String),
}

/// Limits applied while expanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Maximum number of candidate starts a single rule may produce,
    /// clamped to [`MAX_OCCURRENCES_CEILING`].
    pub max_occurrences: u16,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
        }
    }
}

/// One concrete start/end pair of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instance {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl Instance {
    fn at(start: DateTime<Tz>, duration: TimeDelta) -> Option<Self> {
        let end = start.checked_add_signed(duration)?;
        Some(Self { start, end })
    }
}

/// Enumerates the instances of an event in start order.
///
/// Events without a rule yield exactly their own start/end. Recurring events
/// yield every rule candidate not listed in `exclusions`; each instance keeps
/// the event's exact duration.
pub fn expand(event: &NormalizedEvent, options: &ExpandOptions) -> Result<Vec<Instance>, ExpandError> {
    let Some(rule_text) = event.recurrence_rule.as_deref() else {
        return Ok(vec![Instance {
            start: event.start,
            end: event.end,
        }]);
    };

    let invalid = |err: rrule::RRuleError| ExpandError::InvalidRule {
        rule: rule_text.to_string(),
        message: err.to_string(),
    };

    let tz = event.start.timezone();
    let (rule_body, floating_until) =
        split_floating_until(rule_text, tz).map_err(|message| ExpandError::InvalidRule {
            rule: rule_text.to_string(),
            message,
        })?;

    let mut rule: RRule<Unvalidated> = rule_body.parse().map_err(invalid)?;
    if let Some(until) = floating_until {
        rule = rule.until(until.with_timezone(&rrule::Tz::UTC));
    }
    if rule.get_count().is_none() && rule.get_until().is_none() {
        return Err(ExpandError::Unbounded(rule_text.to_string()));
    }

    let anchor = event.start.with_timezone(&rrule::Tz::Tz(tz));
    let set = rule.build(anchor).map_err(invalid)?;

    // Ask for one more than allowed so an exact fit is distinguishable from overflow.
    let limit = options.max_occurrences.min(MAX_OCCURRENCES_CEILING);
    let candidates = set.all(limit.saturating_add(1)).dates;
    if candidates.len() > usize::from(limit) {
        return Err(ExpandError::TooManyOccurrences {
            rule: rule_text.to_string(),
            limit,
        });
    }

    let duration = event.duration();
    let instances = candidates
        .into_iter()
        .map(|candidate| candidate.with_timezone(&tz))
        .filter(|start| !event.exclusions.contains(start))
        .map(|start| Instance::at(start, duration))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ExpandError::OutOfRange(rule_text.to_string()))?;

    tracing::debug!(
        uid = %event.uid,
        rule = rule_text,
        instances = instances.len(),
        excluded = event.exclusions.len(),
        "expanded recurrence"
    );
    Ok(instances)
}

/// Pulls a date or floating UNTIL out of the rule and resolves it in `tz`.
///
/// The rule evaluator only accepts a UTC bound against a zoned start. A
/// date-only bound covers its whole last day.
fn split_floating_until(rule_text: &str, tz: Tz) -> Result<(String, Option<DateTime<Utc>>), String> {
    let mut parts = Vec::new();
    let mut until = None;
    for part in rule_text.split(';') {
        match part.split_once('=') {
            Some((key, value))
                if key.trim().eq_ignore_ascii_case("UNTIL") && !value.trim().ends_with(['Z', 'z']) =>
            {
                until = Some(floating_until_to_utc(value.trim(), tz)?);
            }
            _ => parts.push(part),
        }
    }
    Ok((parts.join(";"), until))
}

fn floating_until_to_utc(value: &str, tz: Tz) -> Result<DateTime<Utc>, String> {
    let local = if value.len() == 8 {
        NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .and_then(|date| date.and_hms_opt(23, 59, 59))
    } else {
        NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()
    }
    .ok_or_else(|| format!("invalid UNTIL value `{value}`"))?;

    tz.from_local_datetime(&local)
        .earliest()
        .map(|until| until.with_timezone(&Utc))
        .ok_or_else(|| format!("UNTIL `{value}` does not exist in {}", tz.name()))
}
