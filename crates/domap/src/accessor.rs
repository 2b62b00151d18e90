//! Field accessors.
//!
//! Every compiled field is bound to exactly one [`Accessor`], picked by
//! precedence: nested container, then input, then checkbox, then radio, then
//! leaf. Reads always run a fresh lookup. Writes are only accepted by input,
//! checkbox and radio fields and never fall back to a configured default.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

use crate::coerce::{coerce, is_checked, Value};
use crate::config::{FieldConfig, Kind};
use crate::container::WebArea;
use crate::driver::{with_frames, NodeId, Scope, Session};
use crate::finder::{find, Found};
use crate::result::{DomapError, DomapResult};
use crate::schema::Field;

/// Runtime behaviour of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    /// Builds nested containers bound to the matched nodes
    Structural,
    /// Reads and writes the `value` of a text input
    Input,
    /// Reads and toggles the checked state
    Checkbox,
    /// Reads the `value` of the checked option; writes click the matching option
    Radio,
    /// Read-only coerced value
    Leaf,
}

impl Accessor {
    /// Accessor for a field configuration
    #[must_use]
    pub const fn select(config: &FieldConfig) -> Self {
        if config.is_structural() {
            Self::Structural
        } else if config.is_input {
            Self::Input
        } else if config.is_checkbox {
            Self::Checkbox
        } else if config.is_radio {
            Self::Radio
        } else {
            Self::Leaf
        }
    }

    /// Lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Input => "input",
            Self::Checkbox => "checkbox",
            Self::Radio => "radio",
            Self::Leaf => "leaf",
        }
    }
}

/// Result of reading a field
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Plain value of a leaf, input, checkbox or radio field, or a default
    Value(Value),
    /// Single nested container
    Area(WebArea),
    /// Collection of nested containers
    Areas(Vec<WebArea>),
}

// =============================================================================
// WRITES
// =============================================================================

/// Interaction an input field can perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// Submit the enclosing form
    Submit,
    /// Click the node
    Click,
    /// Clear the value
    Clear,
    /// Type text without clearing first
    SendKeys(String),
}

impl Interaction {
    fn apply(&self, session: &dyn Session, node: NodeId) -> DomapResult<()> {
        match self {
            Self::Submit => session.submit(node),
            Self::Click => session.click(node),
            Self::Clear => session.clear(node),
            Self::SendKeys(text) => session.type_text(node, text),
        }
    }
}

/// Named interaction with arguments, resolved when written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Interaction name (`submit`, `click`, `clear`, `send_keys`)
    pub name: String,
    /// Arguments
    pub args: Vec<String>,
}

impl Action {
    /// Action without arguments
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Resolve the named interaction
    pub fn resolve(&self) -> DomapResult<Interaction> {
        match self.name.as_str() {
            "submit" => Ok(Interaction::Submit),
            "click" => Ok(Interaction::Click),
            "clear" => Ok(Interaction::Clear),
            "send_keys" | "type" => Ok(Interaction::SendKeys(self.args.concat())),
            _ => Err(DomapError::UnknownInteraction {
                name: self.name.clone(),
            }),
        }
    }
}

/// Value written to a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Replace the text of an input, or pick a radio option by value
    Text(String),
    /// Set the checked state of a checkbox
    Check(bool),
    /// Perform a named interaction on an input
    Action(Action),
}

impl From<&str> for Write {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Write {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<bool> for Write {
    fn from(checked: bool) -> Self {
        Self::Check(checked)
    }
}

impl From<Action> for Write {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

pub(crate) fn read(area: &WebArea, field: &Field) -> DomapResult<FieldValue> {
    let config = &field.config;
    let session = area.session();
    with_frames(session, area.frames(), || {
        let found = find(
            session,
            area.scope(),
            &config.selectors,
            &config.find_options().with_poll(area.poll()),
            config.default.clone(),
        )?;
        let nodes = match found {
            Found::Default(value) => return Ok(FieldValue::Value(value)),
            Found::Nodes(nodes) => nodes,
        };
        match field.accessor {
            Accessor::Structural => structural(area, config, nodes),
            Accessor::Input => {
                let value = session.attribute(first(&nodes, config)?, "value")?;
                Ok(FieldValue::Value(Value::Text(value.unwrap_or_default())))
            }
            Accessor::Checkbox => Ok(FieldValue::Value(Value::Bool(is_checked(
                session,
                first(&nodes, config)?,
            )?))),
            Accessor::Radio => Ok(FieldValue::Value(
                checked_option(session, &nodes)?.map_or(Value::Null, Value::Text),
            )),
            Accessor::Leaf if config.many => nodes
                .into_iter()
                .map(|node| coerce(session, node, config))
                .collect::<DomapResult<Vec<_>>>()
                .map(|values| FieldValue::Value(Value::List(values))),
            Accessor::Leaf => Ok(FieldValue::Value(coerce(
                session,
                first(&nodes, config)?,
                config,
            )?)),
        }
    })
}

fn structural(area: &WebArea, config: &FieldConfig, nodes: Vec<NodeId>) -> DomapResult<FieldValue> {
    let Kind::Container(target) = &config.kind else {
        return Err(DomapError::config(&config.name, "not a container field"));
    };
    let schema = target.schema()?;
    let mut children = nodes.into_iter().map(|node| {
        if config.frame {
            area.child(&schema, Scope::Document, Some(node))
        } else {
            area.child(&schema, Scope::Element(node), None)
        }
    });
    if config.many {
        Ok(FieldValue::Areas(children.collect()))
    } else {
        children
            .next()
            .map(FieldValue::Area)
            .ok_or_else(|| DomapError::config(&config.name, "lookup returned no node"))
    }
}

/// Value of the first checked option, `None` when nothing is checked
fn checked_option(session: &dyn Session, options: &[NodeId]) -> DomapResult<Option<String>> {
    for &option in options {
        if is_checked(session, option)? {
            return Ok(Some(session.attribute(option, "value")?.unwrap_or_default()));
        }
    }
    Ok(None)
}

fn select_option(
    session: &dyn Session,
    config: &FieldConfig,
    options: &[NodeId],
    value: &str,
) -> DomapResult<()> {
    for &option in options {
        if session.attribute(option, "value")?.as_deref() == Some(value) {
            tracing::debug!(field = %config.name, value, "selecting option");
            return session.click(option);
        }
    }
    Err(DomapError::UnknownOption {
        field: config.name.clone(),
        value: value.to_string(),
    })
}

fn first(nodes: &[NodeId], config: &FieldConfig) -> DomapResult<NodeId> {
    nodes
        .first()
        .copied()
        .ok_or_else(|| DomapError::config(&config.name, "lookup returned no node"))
}

pub(crate) fn write(area: &WebArea, field: &Field, value: Write) -> DomapResult<()> {
    let config = &field.config;
    if matches!(field.accessor, Accessor::Structural | Accessor::Leaf) {
        return Err(DomapError::Unsettable {
            field: config.name.clone(),
            kind: field.accessor.as_str(),
        });
    }

    let session = area.session();
    with_frames(session, area.frames(), || {
        let found = find::<Value>(
            session,
            area.scope(),
            &config.selectors,
            &config.find_options().with_poll(area.poll()),
            None,
        )?;
        let nodes = found.nodes().unwrap_or_default();
        if field.accessor == Accessor::Radio {
            return match value {
                Write::Text(value) => select_option(session, config, &nodes, &value),
                _ => Err(DomapError::TypeMismatch {
                    field: config.name.clone(),
                    expected: "option value",
                }),
            };
        }
        let node = first(&nodes, config)?;
        match (field.accessor, value) {
            (Accessor::Input, Write::Text(text)) => {
                session.clear(node)?;
                session.type_text(node, &text)
            }
            (Accessor::Input, Write::Action(action)) => action.resolve()?.apply(session, node),
            (Accessor::Checkbox, Write::Check(checked)) => {
                if is_checked(session, node)? == checked {
                    tracing::debug!(field = %config.name, checked, "checkbox already in state");
                    return Ok(());
                }
                session.click(node)
            }
            (Accessor::Input, Write::Check(_)) => Err(DomapError::TypeMismatch {
                field: config.name.clone(),
                expected: "text or action",
            }),
            (_, _) => Err(DomapError::TypeMismatch {
                field: config.name.clone(),
                expected: "bool",
            }),
        }
    })
}

// =============================================================================
// TYPED EXTRACTION
// =============================================================================

/// Conversion from a read field into a Rust type
pub trait FromField: Sized {
    /// Convert `value`, read from `field`
    fn from_field(field: &str, value: FieldValue) -> DomapResult<Self>;
}

pub(crate) fn mismatch<T>(field: &str) -> DomapError {
    DomapError::TypeMismatch {
        field: field.to_string(),
        expected: std::any::type_name::<T>(),
    }
}

impl FromField for FieldValue {
    fn from_field(_field: &str, value: FieldValue) -> DomapResult<Self> {
        Ok(value)
    }
}

impl FromField for Value {
    fn from_field(field: &str, value: FieldValue) -> DomapResult<Self> {
        match value {
            FieldValue::Value(value) => Ok(value),
            _ => Err(mismatch::<Self>(field)),
        }
    }
}

macro_rules! from_value {
    ($ty:ty, $($pattern:pat => $convert:expr),+ $(,)?) => {
        impl FromField for $ty {
            fn from_field(field: &str, value: FieldValue) -> DomapResult<Self> {
                match value {
                    $(FieldValue::Value($pattern) => $convert,)+
                    _ => None,
                }
                .ok_or_else(|| mismatch::<Self>(field))
            }
        }
    };
}

macro_rules! from_integer {
    ($($ty:ty),+) => {
        $(from_value!($ty, Value::Int(n) => <$ty>::try_from(n).ok());)+
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize);
from_value!(String, Value::Text(text) => Some(text));
from_value!(bool, Value::Bool(flag) => Some(flag));
from_value!(NodeId, Value::Node(node) => Some(node));
from_value!(NaiveDate, Value::Date(date) => Some(date));
from_value!(
    NaiveDateTime,
    Value::DateTime(datetime) => Some(datetime),
    Value::ZonedDateTime(datetime) => Some(datetime.naive_local()),
);
from_value!(DateTime<FixedOffset>, Value::ZonedDateTime(datetime) => Some(datetime));
#[allow(clippy::cast_precision_loss)]
impl FromField for f64 {
    fn from_field(field: &str, value: FieldValue) -> DomapResult<Self> {
        match value {
            FieldValue::Value(Value::Float(n)) => Ok(n),
            FieldValue::Value(Value::Int(n)) => Ok(n as Self),
            _ => Err(mismatch::<Self>(field)),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
impl FromField for f32 {
    fn from_field(field: &str, value: FieldValue) -> DomapResult<Self> {
        f64::from_field(field, value).map(|n| n as Self)
    }
}

impl<T: FromField> FromField for Vec<T> {
    fn from_field(field: &str, value: FieldValue) -> DomapResult<Self> {
        match value {
            FieldValue::Value(Value::List(items)) => items
                .into_iter()
                .map(|item| T::from_field(field, FieldValue::Value(item)))
                .collect(),
            FieldValue::Areas(areas) => areas
                .into_iter()
                .map(|area| T::from_field(field, FieldValue::Area(area)))
                .collect(),
            _ => Err(mismatch::<Self>(field)),
        }
    }
}

impl<T: FromField> FromField for Option<T> {
    fn from_field(field: &str, value: FieldValue) -> DomapResult<Self> {
        match value {
            FieldValue::Value(Value::Null) => Ok(None),
            other => T::from_field(field, other).map(Some),
        }
    }
}
