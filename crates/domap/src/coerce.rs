//! Value coercion registry.
//!
//! Converts a resolved node into the plain value of a leaf field. Dispatch is
//! an exhaustive match over [`Kind`]; structural fields never reach it.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::config::{FieldConfig, Kind};
use crate::driver::{NodeId, Session};
use crate::result::{DomapError, DomapResult};

/// Attributes that hold markup and are read as DOM properties
const MARKUP_PROPERTIES: &[&str] = &["innerHTML", "outerHTML"];

// =============================================================================
// VALUE
// =============================================================================

/// Plain value of a field, also the output of `dump`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Text
    Text(String),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time without offset
    DateTime(NaiveDateTime),
    /// Date and time with a UTC offset
    ZonedDateTime(DateTime<FixedOffset>),
    /// Raw node handle
    Node(NodeId),
    /// Collection
    List(Vec<Value>),
    /// Named values, used for dumped containers
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Whether the value is `Null`
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text content, if this is a text value
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Convert into a JSON value
    pub fn to_json(&self) -> DomapResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::ZonedDateTime(value)
    }
}

impl From<NodeId> for Value {
    fn from(value: NodeId) -> Self {
        Self::Node(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

fn digits() -> Option<&'static Regex> {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()
}

/// First run of digits in `text` once whitespace and `,` separators are removed.
///
/// `"3 values"` gives 3, `"10,123.23"` gives 10123, `"01234"` gives 1234.
pub fn extract_integer(field: &str, text: &str) -> DomapResult<i64> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    digits()
        .and_then(|re| re.find(&compact))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| DomapError::Coercion {
            field: field.to_string(),
            value: text.to_string(),
            expected: "integer",
        })
}

/// Parse `text` as a float literal
pub fn parse_float(field: &str, text: &str) -> DomapResult<f64> {
    text.trim().parse().map_err(|_| DomapError::Coercion {
        field: field.to_string(),
        value: text.to_string(),
        expected: "float",
    })
}

/// Parse `text` with `format`, trying zoned, naive datetime then date patterns
pub fn parse_datetime(field: &str, text: &str, format: &str, kind: &Kind) -> DomapResult<Value> {
    let text = text.trim();
    let date_only = matches!(kind, Kind::Date);
    if let Ok(zoned) = DateTime::parse_from_str(text, format) {
        return Ok(if date_only {
            Value::Date(zoned.date_naive())
        } else {
            Value::ZonedDateTime(zoned)
        });
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
        return Ok(if date_only {
            Value::Date(naive.date())
        } else {
            Value::DateTime(naive)
        });
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, format) {
        return Ok(if date_only {
            Value::Date(date)
        } else {
            Value::DateTime(date.and_time(NaiveTime::MIN))
        });
    }
    Err(DomapError::Coercion {
        field: field.to_string(),
        value: text.to_string(),
        expected: kind.label(),
    })
}

/// Visible text of `node`, or the configured attribute (empty when absent)
pub fn raw_text(session: &dyn Session, node: NodeId, config: &FieldConfig) -> DomapResult<String> {
    let Some(attribute) = config.attribute.as_deref() else {
        return session.text(node);
    };
    let value = if MARKUP_PROPERTIES.contains(&attribute) {
        session.property(node, attribute)?
    } else {
        session.attribute(node, attribute)?
    };
    Ok(value.unwrap_or_default())
}

/// Whether `node` is checked
pub fn is_checked(session: &dyn Session, node: NodeId) -> DomapResult<bool> {
    Ok(session.attribute(node, "checked")?.as_deref() == Some("true"))
}

/// Coerce one resolved node into the value of a leaf field
pub fn coerce(session: &dyn Session, node: NodeId, config: &FieldConfig) -> DomapResult<Value> {
    let field = config.name.as_str();
    match &config.kind {
        Kind::Node => Ok(Value::Node(node)),
        Kind::Text => Ok(Value::Text(raw_text(session, node, config)?)),
        Kind::Integer => Ok(Value::Int(extract_integer(
            field,
            &raw_text(session, node, config)?,
        )?)),
        Kind::Float => Ok(Value::Float(parse_float(
            field,
            &raw_text(session, node, config)?,
        )?)),
        Kind::Date | Kind::DateTime => {
            let format = config.format.as_deref().ok_or_else(|| {
                DomapError::config(field, "a datetime format is required for date fields")
            })?;
            parse_datetime(field, &raw_text(session, node, config)?, format, &config.kind)
        }
        Kind::Boolean => Ok(Value::Bool(is_checked(session, node)?)),
        Kind::Container(container) => Err(DomapError::config(
            field,
            format!("container '{}' is resolved structurally", container.name()),
        )),
    }
}
