//! Component normalization.
//!
//! Every date or date-time representation iCalendar allows (date-only,
//! floating, UTC, `TZID`-qualified) is coerced here into one
//! `DateTime<chrono_tz::Tz>`. Nothing downstream inspects the source form.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use thiserror::Error;

use crate::raw::{ComponentKind, RawComponent, RawProperty};

/// RFC 5545 `dur-value`, e.g. `PT1H30M`, `P1D`, `-P2W`.
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-])?P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").unwrap()
});

/// Reasons a single component cannot be normalized.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The component is not an event, task or journal.
    #[error("unsupported component type {0}")]
    Unsupported(String),
    /// The component has no usable UID.
    #[error("component has no UID")]
    MissingUid,
    /// The component has no start date.
    #[error("component has no DTSTART")]
    MissingStart,
    /// A date or date-time value could not be parsed.
    #[error("invalid {property} value: {value}")]
    InvalidDateTime { property: String, value: String },
    /// A local time falls into a DST gap of its timezone.
    #[error("{property} {value} does not exist in timezone {tz}")]
    NonexistentLocalTime {
        property: String,
        value: String,
        tz: Tz,
    },
    /// A DURATION value could not be parsed.
    #[error("invalid DURATION value: {0}")]
    InvalidDuration(String),
}

/// A calendar component with canonical, timezone-aware times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    /// Series UID, or the UID of a singular event.
    pub uid: String,
    pub kind: ComponentKind,
    pub summary: String,
    pub location: String,
    pub description: String,
    pub start: DateTime<Tz>,
    /// Not guaranteed to be at or after `start`.
    pub end: DateTime<Tz>,
    /// True when DTSTART carried no time of day.
    pub all_day: bool,
    /// The RRULE value, only ever set on events.
    pub recurrence_rule: Option<String>,
    /// EXDATE instants, matched exactly against generated starts.
    pub exclusions: BTreeSet<DateTime<Tz>>,
    /// Original start of the occurrence this component overrides.
    pub recurrence_id: Option<DateTime<Tz>>,
}

impl NormalizedEvent {
    /// `end - start`, possibly negative.
    pub fn duration(&self) -> TimeDelta {
        self.end.signed_duration_since(self.start)
    }

    pub const fn is_recurring(&self) -> bool {
        self.recurrence_rule.is_some()
    }
}

/// A parsed date or date-time attached to its zone.
struct Moment {
    at: DateTime<Tz>,
    date_only: bool,
}

/// Normalizes a raw component against a reference timezone.
///
/// The reference timezone is assigned to date-only and floating values.
pub fn normalize(raw: &RawComponent, reference: Tz) -> Result<NormalizedEvent, NormalizeError> {
    let kind = raw
        .kind()
        .ok_or_else(|| NormalizeError::Unsupported(raw.name.clone()))?;

    let uid = raw
        .value("UID")
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .ok_or(NormalizeError::MissingUid)?
        .to_string();

    let start_property = raw
        .property("DTSTART")
        .or_else(|| match kind {
            ComponentKind::Task => raw.property("DUE"),
            ComponentKind::Event | ComponentKind::Journal => None,
        })
        .ok_or(NormalizeError::MissingStart)?;
    let start = parse_moment(start_property, reference)?;

    let end = if let Some(property) = raw.property("DTEND") {
        parse_moment(property, reference)?.at
    } else if let Some(property) = raw.property("DURATION") {
        let value = property.value.trim();
        start
            .at
            .checked_add_signed(parse_duration(value)?)
            .ok_or_else(|| NormalizeError::InvalidDuration(value.to_string()))?
    } else if let (ComponentKind::Task, Some(property)) = (kind, raw.property("DUE")) {
        parse_moment(property, reference)?.at
    } else {
        start.at
    };

    let (recurrence_rule, exclusions) = if kind == ComponentKind::Event {
        let rule = raw
            .value("RRULE")
            .map(str::trim)
            .filter(|rule| !rule.is_empty())
            .map(str::to_string);
        (rule, parse_exclusions(raw, reference)?)
    } else {
        (None, BTreeSet::new())
    };

    let recurrence_id = raw
        .property("RECURRENCE-ID")
        .map(|property| parse_moment(property, reference).map(|m| m.at))
        .transpose()?;

    Ok(NormalizedEvent {
        uid,
        kind,
        summary: text(raw, "SUMMARY"),
        location: text(raw, "LOCATION"),
        description: text(raw, "DESCRIPTION"),
        start: start.at,
        end,
        all_day: start.date_only,
        recurrence_rule,
        exclusions,
        recurrence_id,
    })
}

fn text(raw: &RawComponent, name: &str) -> String {
    raw.value(name).map(unescape_text).unwrap_or_default()
}

/// Decodes RFC 5545 TEXT escapes.
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_exclusions(
    raw: &RawComponent,
    reference: Tz,
) -> Result<BTreeSet<DateTime<Tz>>, NormalizeError> {
    let mut exclusions = BTreeSet::new();
    for property in raw.properties("EXDATE") {
        for value in property.value.split(',').map(str::trim).filter(|v| !v.is_empty()) {
            exclusions.insert(parse_value(property, value, reference)?.at);
        }
    }
    Ok(exclusions)
}

fn parse_moment(property: &RawProperty, reference: Tz) -> Result<Moment, NormalizeError> {
    parse_value(property, property.value.trim(), reference)
}

fn parse_value(property: &RawProperty, value: &str, reference: Tz) -> Result<Moment, NormalizeError> {
    let invalid = || NormalizeError::InvalidDateTime {
        property: property.name.to_ascii_uppercase(),
        value: value.to_string(),
    };

    let date_only = property
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || (value.len() == 8 && !value.contains('T'));

    if date_only {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|_| invalid())?;
        let at = localize(property, value, reference, date.and_time(NaiveTime::MIN))?;
        return Ok(Moment { at, date_only });
    }

    if let Some(utc) = value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
        return Ok(Moment {
            at: Tz::UTC.from_utc_datetime(&naive),
            date_only,
        });
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
    let tz = property
        .param("TZID")
        .map_or(reference, |tzid| resolve_tzid(tzid, reference));
    let at = localize(property, value, tz, naive)?;
    Ok(Moment { at, date_only })
}

fn resolve_tzid(tzid: &str, reference: Tz) -> Tz {
    let name = tzid.trim_matches('"');
    name.parse::<Tz>().unwrap_or_else(|_| {
        tracing::warn!(tzid = name, fallback = %reference, "unknown TZID, using reference timezone");
        reference
    })
}

/// Attaches a zone to a local time; ambiguous times resolve to the earlier instant.
fn localize(
    property: &RawProperty,
    value: &str,
    tz: Tz,
    naive: NaiveDateTime,
) -> Result<DateTime<Tz>, NormalizeError> {
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| NormalizeError::NonexistentLocalTime {
            property: property.name.to_ascii_uppercase(),
            value: value.to_string(),
            tz,
        })
}

fn parse_duration(value: &str) -> Result<TimeDelta, NormalizeError> {
    let invalid = || NormalizeError::InvalidDuration(value.to_string());
    let caps = DURATION_RE.captures(value).ok_or_else(invalid)?;

    let mut seconds: i64 = 0;
    let mut any = false;
    for (group, unit) in [(2, 604_800), (3, 86_400), (4, 3_600), (5, 60), (6, 1)] {
        if let Some(m) = caps.get(group) {
            let n: i64 = m.as_str().parse().map_err(|_| invalid())?;
            seconds = n
                .checked_mul(unit)
                .and_then(|s| seconds.checked_add(s))
                .ok_or_else(invalid)?;
            any = true;
        }
    }
    if !any {
        return Err(invalid());
    }
    if caps.get(1).is_some_and(|sign| sign.as_str() == "-") {
        seconds = -seconds;
    }
    TimeDelta::try_seconds(seconds).ok_or_else(invalid)
}
