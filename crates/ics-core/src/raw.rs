//! Raw calendar components as produced by the iCalendar decoder.
//!
//! Parsing the content-line grammar is left to the `icalendar` crate. This
//! module only flattens its component tree into owned [`RawComponent`]s so
//! the rest of the pipeline never touches parser lifetimes.

use std::fmt;

use icalendar::parser::{self, Component};
use thiserror::Error;

/// Failures that make an input unusable as a whole.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The decoder could not make sense of the input at all.
    #[error("malformed calendar data: {0}")]
    Malformed(String),
    /// The input parsed but contained no calendar object.
    #[error("input does not contain a VCALENDAR object")]
    NoCalendar,
}

/// Component types that can be imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// `VEVENT`
    Event,
    /// `VTODO`
    Task,
    /// `VJOURNAL`
    Journal,
}

impl ComponentKind {
    /// Maps an iCalendar component name to an importable kind.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("VEVENT") {
            Some(Self::Event)
        } else if name.eq_ignore_ascii_case("VTODO") {
            Some(Self::Task)
        } else if name.eq_ignore_ascii_case("VJOURNAL") {
            Some(Self::Journal)
        } else {
            None
        }
    }

    /// The iCalendar component name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Event => "VEVENT",
            Self::Task => "VTODO",
            Self::Journal => "VJOURNAL",
        }
    }

    /// Numeric component type used by the calendar database.
    #[must_use]
    pub const fn type_tag(&self) -> i64 {
        match self {
            Self::Event => 1,
            Self::Task => 2,
            Self::Journal => 3,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single content line: name, value and parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProperty {
    pub name: String,
    pub value: String,
    pub params: Vec<(String, String)>,
}

impl RawProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Looks up a parameter value, ignoring case in the key.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// A decoded calendar component with its properties in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawComponent {
    pub name: String,
    pub properties: Vec<RawProperty>,
}

impl RawComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, property: RawProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// The importable kind of this component, if any.
    pub fn kind(&self) -> Option<ComponentKind> {
        ComponentKind::from_name(&self.name)
    }

    /// First property with the given name.
    pub fn property(&self, name: &str) -> Option<&RawProperty> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// All properties with the given name, in source order.
    pub fn properties<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RawProperty> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    /// Value of the first property with the given name.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.property(name).map(|p| p.value.as_str())
    }
}

impl From<&Component<'_>> for RawComponent {
    fn from(component: &Component<'_>) -> Self {
        let properties = component
            .properties
            .iter()
            .map(|property| RawProperty {
                name: property.name.as_str().to_string(),
                value: property.val.as_str().to_string(),
                params: property
                    .params
                    .iter()
                    .map(|param| {
                        let value = param.val.as_ref().map_or("", |v| v.as_str());
                        (param.key.as_str().to_string(), value.to_string())
                    })
                    .collect(),
            })
            .collect();
        Self {
            name: component.name.as_str().to_string(),
            properties,
        }
    }
}

/// Decodes iCalendar text into a flat, depth-first list of components.
///
/// Every component is returned, including containers such as `VCALENDAR`
/// and nested ones such as `VALARM`; callers filter by [`RawComponent::kind`].
pub fn decode(input: &str) -> Result<Vec<RawComponent>, DecodeError> {
    let unfolded = parser::unfold(input);
    // `read_calendar` would strip the VCALENDAR root; keep it so its presence can be checked.
    let roots = parser::read_components(&unfolded).map_err(DecodeError::Malformed)?;

    if !roots
        .iter()
        .any(|c| c.name.as_str().eq_ignore_ascii_case("VCALENDAR"))
    {
        return Err(DecodeError::NoCalendar);
    }

    let mut components = Vec::new();
    for component in &roots {
        walk(component, &mut components);
    }
    tracing::debug!(count = components.len(), "decoded calendar components");
    Ok(components)
}

fn walk(component: &Component<'_>, out: &mut Vec<RawComponent>) {
    out.push(RawComponent::from(component));
    for child in &component.components {
        walk(child, out);
    }
}
