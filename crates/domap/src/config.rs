//! Field configuration model.
//!
//! A field is declared as a [`Declared`] type plus a list of [`Directive`]s.
//! [`FieldConfig::derive`] folds the directives left-to-right into one
//! immutable descriptor and rejects invalid combinations up front, so that a
//! broken declaration fails when the container schema is compiled rather
//! than on first access.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::coerce::Value;
use crate::finder::FindOptions;
use crate::result::{DomapError, DomapResult};
use crate::schema::{Container, Schema};
use crate::selector::Selector;

// =============================================================================
// KINDS
// =============================================================================

/// Reference to the schema of a nested container
#[derive(Clone)]
pub struct ContainerRef {
    name: String,
    source: SchemaSource,
}

#[derive(Clone)]
enum SchemaSource {
    /// Compiled lazily through the type registry (allows self-reference)
    Static(fn() -> DomapResult<Arc<Schema>>),
    /// Already compiled, e.g. loaded from a YAML file
    Built(Arc<Schema>),
}

impl ContainerRef {
    /// Reference a statically declared container type
    #[must_use]
    pub fn of<C: Container>() -> Self {
        Self {
            name: C::NAME.to_string(),
            source: SchemaSource::Static(C::schema),
        }
    }

    /// Reference an already compiled schema
    #[must_use]
    pub fn built(schema: Arc<Schema>) -> Self {
        Self {
            name: schema.name.clone(),
            source: SchemaSource::Built(schema),
        }
    }

    /// Name of the referenced container
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compiled schema of the referenced container
    pub fn schema(&self) -> DomapResult<Arc<Schema>> {
        match &self.source {
            SchemaSource::Static(compile) => compile(),
            SchemaSource::Built(schema) => Ok(Arc::clone(schema)),
        }
    }
}

impl fmt::Debug for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContainerRef").field(&self.name).finish()
    }
}

impl PartialEq for ContainerRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Semantic target type of a field
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    /// Visible text or attribute value
    Text,
    /// First run of digits
    Integer,
    /// Floating point literal
    Float,
    /// Calendar date, parsed with the field format
    Date,
    /// Date and time, parsed with the field format
    DateTime,
    /// Checked state
    Boolean,
    /// The node handle itself
    Node,
    /// Nested container resolved structurally
    Container(ContainerRef),
}

impl Kind {
    /// Human-readable name used in errors
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Boolean => "boolean",
            Self::Node => "node",
            Self::Container(_) => "container",
        }
    }
}

/// Collection-ness of a declared type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Shape {
    /// Exactly one match
    #[default]
    One,
    /// Every match of the winning selector
    Many,
    /// One match, `null` when absent
    Optional,
}

/// Type flags selecting a mutable accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    /// Text input: reads and writes the `value`
    Input,
    /// Checkbox: reads and toggles the checked state
    Checkbox,
    /// Radio group: reads the checked option's value, writes by clicking one
    Radio,
}

/// Declared type of a field, before directives are applied
#[derive(Debug, Clone, PartialEq)]
pub struct Declared {
    /// Collection-ness
    pub shape: Shape,
    /// Target kind
    pub kind: Kind,
    /// Mutable accessor flag carried by the type alias
    pub flag: Option<Flag>,
    /// Attribute implied by the type alias
    pub attribute: Option<String>,
}

impl Declared {
    /// Plain declaration of `kind`
    #[must_use]
    pub const fn new(kind: Kind) -> Self {
        Self {
            shape: Shape::One,
            kind,
            flag: None,
            attribute: None,
        }
    }

    /// `String`
    #[must_use]
    pub const fn text() -> Self {
        Self::new(Kind::Text)
    }

    /// Integer
    #[must_use]
    pub const fn integer() -> Self {
        Self::new(Kind::Integer)
    }

    /// Float
    #[must_use]
    pub const fn float() -> Self {
        Self::new(Kind::Float)
    }

    /// Date
    #[must_use]
    pub const fn date() -> Self {
        Self::new(Kind::Date)
    }

    /// Date and time
    #[must_use]
    pub const fn datetime() -> Self {
        Self::new(Kind::DateTime)
    }

    /// Boolean read from the checked state
    #[must_use]
    pub const fn boolean() -> Self {
        Self::new(Kind::Boolean)
    }

    /// Raw node handle
    #[must_use]
    pub const fn node() -> Self {
        Self::new(Kind::Node)
    }

    /// Text of the `href` attribute
    #[must_use]
    pub fn link() -> Self {
        Self::text().with_attribute("href")
    }

    /// Text of the `src` attribute
    #[must_use]
    pub fn image_src() -> Self {
        Self::text().with_attribute("src")
    }

    /// Inner markup of the node
    #[must_use]
    pub fn inner_html() -> Self {
        Self::text().with_attribute("innerHTML")
    }

    /// Outer markup of the node
    #[must_use]
    pub fn outer_html() -> Self {
        Self::text().with_attribute("outerHTML")
    }

    /// Writable text input
    #[must_use]
    pub const fn input_value() -> Self {
        let mut declared = Self::text();
        declared.flag = Some(Flag::Input);
        declared
    }

    /// Writable checkbox
    #[must_use]
    pub const fn checkbox() -> Self {
        let mut declared = Self::boolean();
        declared.flag = Some(Flag::Checkbox);
        declared
    }

    /// Writable radio group
    #[must_use]
    pub const fn radio() -> Self {
        let mut declared = Self::text();
        declared.flag = Some(Flag::Radio);
        declared
    }

    /// Nested container of a static type
    #[must_use]
    pub fn component<C: Container>() -> Self {
        Self::new(Kind::Container(ContainerRef::of::<C>()))
    }

    /// Nested container of an already compiled schema
    #[must_use]
    pub fn container(schema: Arc<Schema>) -> Self {
        Self::new(Kind::Container(ContainerRef::built(schema)))
    }

    /// Wrap as a collection
    #[must_use]
    pub const fn many(mut self) -> Self {
        self.shape = Shape::Many;
        self
    }

    /// Wrap as optional
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.shape = Shape::Optional;
        self
    }

    fn with_attribute(mut self, attribute: &str) -> Self {
        self.attribute = Some(attribute.to_string());
        self
    }
}

// =============================================================================
// DIRECTIVES
// =============================================================================

/// One configuration directive attached to a field
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Append a selector
    Selector(Selector),
    /// Overwrite the wait budget
    Wait(Duration),
    /// Overwrite the default value
    Default(Value),
    /// Read this attribute instead of the visible text
    Attribute(String),
    /// Pattern used to parse dates
    DatetimeFormat(String),
    /// Type flag
    Flag(Flag),
    /// Run the nested container inside the matched frame
    Frame,
    /// Directive that was not understood; always rejected
    Unknown(String),
}

impl Directive {
    /// Selector string with strategy inference
    #[must_use]
    pub fn selector(selector: &str) -> Self {
        Self::Selector(Selector::parse(selector))
    }

    /// CSS selector
    #[must_use]
    pub fn css(path: impl Into<String>) -> Self {
        Self::Selector(Selector::css(path))
    }

    /// XPath selector
    #[must_use]
    pub fn xpath(path: impl Into<String>) -> Self {
        Self::Selector(Selector::xpath(path))
    }

    /// Exact link text selector
    #[must_use]
    pub fn link_text(text: impl Into<String>) -> Self {
        Self::Selector(Selector::link_text(text))
    }

    /// Partial link text selector
    #[must_use]
    pub fn partial_link_text(text: impl Into<String>) -> Self {
        Self::Selector(Selector::partial_link_text(text))
    }

    /// Wait budget in seconds; negative or invalid values mean no wait
    #[must_use]
    pub fn wait(seconds: f64) -> Self {
        Self::Wait(Duration::try_from_secs_f64(seconds).unwrap_or_default())
    }

    /// Default value returned when nothing matches
    #[must_use]
    pub fn default(value: impl Into<Value>) -> Self {
        Self::Default(value.into())
    }

    /// Attribute to read
    #[must_use]
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute(name.into())
    }

    /// Date parse pattern (chrono `strftime` syntax)
    #[must_use]
    pub fn format(pattern: impl Into<String>) -> Self {
        Self::DatetimeFormat(pattern.into())
    }
}

// =============================================================================
// FIELD CONFIG
// =============================================================================

/// Normalized, immutable descriptor of one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConfig {
    /// Field identifier
    pub name: String,
    /// Target kind
    pub kind: Kind,
    /// Selectors tried left-to-right; never empty
    pub selectors: Vec<Selector>,
    /// Wait budget
    pub wait: Duration,
    /// `None` means a failed lookup raises
    pub default: Option<Value>,
    /// Collection field
    pub many: bool,
    /// Attribute read instead of the visible text
    pub attribute: Option<String>,
    /// Writable text input
    pub is_input: bool,
    /// Writable checkbox
    pub is_checkbox: bool,
    /// Writable radio group; always looked up as a collection of options
    pub is_radio: bool,
    /// Date parse pattern
    pub format: Option<String>,
    /// Nested container lives inside the matched frame
    pub frame: bool,
}

impl FieldConfig {
    /// Fold `directives` over `declared` into a validated config
    pub fn derive(
        name: &str,
        declared: Declared,
        directives: impl IntoIterator<Item = Directive>,
    ) -> DomapResult<Self> {
        let mut config = Self {
            name: name.to_string(),
            many: declared.shape == Shape::Many,
            default: (declared.shape == Shape::Optional).then_some(Value::Null),
            is_input: declared.flag == Some(Flag::Input),
            is_checkbox: declared.flag == Some(Flag::Checkbox),
            is_radio: declared.flag == Some(Flag::Radio),
            attribute: declared.attribute,
            kind: declared.kind,
            selectors: Vec::new(),
            wait: Duration::ZERO,
            format: None,
            frame: false,
        };

        for directive in directives {
            match directive {
                Directive::Selector(selector) => config.selectors.push(selector),
                Directive::Wait(wait) => config.wait = wait,
                Directive::Default(value) => config.default = Some(value),
                Directive::Attribute(attribute) => config.attribute = Some(attribute),
                Directive::DatetimeFormat(format) => config.format = Some(format),
                Directive::Flag(Flag::Input) => config.is_input = true,
                Directive::Flag(Flag::Checkbox) => config.is_checkbox = true,
                Directive::Flag(Flag::Radio) => config.is_radio = true,
                Directive::Frame => config.frame = true,
                Directive::Unknown(directive) => {
                    return Err(DomapError::config(
                        name,
                        format!("unknown directive '{directive}'"),
                    ));
                }
            }
        }

        config.validate()?;
        tracing::debug!(
            field = name,
            kind = config.kind.label(),
            selectors = config.selectors.len(),
            many = config.many,
            "field configured"
        );
        Ok(config)
    }

    fn validate(&self) -> DomapResult<()> {
        let fail = |message: &str| Err(DomapError::config(&self.name, message));
        if self.selectors.is_empty() {
            return fail("at least one selector is required");
        }
        let flags = [self.is_input, self.is_checkbox, self.is_radio];
        if self.is_structural() && flags.contains(&true) {
            return fail("input, checkbox and radio flags cannot be used on a container field");
        }
        if flags.iter().filter(|flag| **flag).count() > 1 {
            return fail("a field takes at most one of the input, checkbox and radio flags");
        }
        if self.many && (self.is_input || self.is_checkbox || self.is_radio) {
            return fail("input, checkbox and radio fields cannot be lists");
        }
        if self.frame && !self.is_structural() {
            return fail("frame is only valid on a container field");
        }
        if self.frame && self.many {
            return fail("frame fields must resolve a single node");
        }
        Ok(())
    }

    /// Whether the field resolves into nested containers
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self.kind, Kind::Container(_))
    }

    /// Lookup options for this field
    #[must_use]
    pub fn find_options(&self) -> FindOptions {
        FindOptions::new()
            .with_many(self.many || self.is_radio)
            .with_wait(self.wait)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod unwrap_tests {
        use super::*;

        #[test]
        fn test_plain_field() {
            let config =
                FieldConfig::derive("title", Declared::text(), [Directive::css("h1")]).unwrap();
            assert_eq!(config.kind, Kind::Text);
            assert!(!config.many);
            assert_eq!(config.default, None);
            assert_eq!(config.selectors, vec![Selector::css("h1")]);
            assert_eq!(config.wait, Duration::ZERO);
        }

        #[test]
        fn test_collection_sets_many() {
            let config =
                FieldConfig::derive("tags", Declared::text().many(), [Directive::css("a.tag")])
                    .unwrap();
            assert!(config.many);
            assert_eq!(config.default, None);
        }

        #[test]
        fn test_optional_defaults_to_null() {
            let config = FieldConfig::derive(
                "subtitle",
                Declared::text().optional(),
                [Directive::css("h2")],
            )
            .unwrap();
            assert!(!config.many);
            assert_eq!(config.default, Some(Value::Null));
        }

        #[test]
        fn test_explicit_default_overrides_optional() {
            let config = FieldConfig::derive(
                "subtitle",
                Declared::text().optional(),
                [Directive::css("h2"), Directive::default("none")],
            )
            .unwrap();
            assert_eq!(config.default, Some(Value::Text("none".to_string())));
        }

        #[test]
        fn test_aliases_set_attributes_and_flags() {
            let link = FieldConfig::derive("a", Declared::link(), [Directive::css("a")]).unwrap();
            assert_eq!(link.attribute.as_deref(), Some("href"));
            let src = FieldConfig::derive("i", Declared::image_src(), [Directive::css("img")])
                .unwrap();
            assert_eq!(src.attribute.as_deref(), Some("src"));
            let input =
                FieldConfig::derive("q", Declared::input_value(), [Directive::css("input")])
                    .unwrap();
            assert!(input.is_input);
            let checkbox =
                FieldConfig::derive("c", Declared::checkbox(), [Directive::css("input")]).unwrap();
            assert!(checkbox.is_checkbox);
            assert_eq!(checkbox.kind, Kind::Boolean);
        }
    }

    mod fold_tests {
        use super::*;

        #[test]
        fn test_selectors_append_in_order() {
            let config = FieldConfig::derive(
                "price",
                Declared::integer(),
                [
                    Directive::css("span.price"),
                    Directive::xpath("//span[@class='price']"),
                    Directive::selector("link:Price"),
                ],
            )
            .unwrap();
            assert_eq!(
                config.selectors,
                vec![
                    Selector::css("span.price"),
                    Selector::xpath("//span[@class='price']"),
                    Selector::link_text("Price"),
                ]
            );
        }

        #[test]
        fn test_later_directives_overwrite() {
            let config = FieldConfig::derive(
                "price",
                Declared::integer(),
                [
                    Directive::css("span"),
                    Directive::wait(1.0),
                    Directive::wait(2.5),
                    Directive::attribute("data-a"),
                    Directive::attribute("data-b"),
                ],
            )
            .unwrap();
            assert_eq!(config.wait, Duration::from_millis(2500));
            assert_eq!(config.attribute.as_deref(), Some("data-b"));
        }

        #[test]
        fn test_negative_wait_is_zero() {
            assert_eq!(Directive::wait(-1.0), Directive::Wait(Duration::ZERO));
        }

        #[test]
        fn test_find_options_follow_config() {
            let config = FieldConfig::derive(
                "rows",
                Declared::text().many(),
                [Directive::css("tr"), Directive::wait(3.0)],
            )
            .unwrap();
            let options = config.find_options();
            assert!(options.many);
            assert_eq!(options.wait, Duration::from_secs(3));
        }
    }

    mod validation_tests {
        use super::*;

        fn message(err: &DomapError) -> (String, String) {
            match err {
                DomapError::Configuration { field, message } => (field.clone(), message.clone()),
                other => (String::new(), other.to_string()),
            }
        }

        #[test]
        fn test_zero_selectors_rejected() {
            let err = FieldConfig::derive("price", Declared::integer(), [Directive::wait(2.0)])
                .unwrap_err();
            let (field, text) = message(&err);
            assert_eq!(field, "price");
            assert!(text.contains("selector"));
        }

        #[test]
        fn test_unknown_directive_rejected() {
            let err = FieldConfig::derive(
                "price",
                Declared::integer(),
                [Directive::css("span"), Directive::Unknown("retry".to_string())],
            )
            .unwrap_err();
            assert!(message(&err).1.contains("retry"));
        }

        #[test]
        fn test_input_many_rejected() {
            let err = FieldConfig::derive(
                "q",
                Declared::input_value().many(),
                [Directive::css("input")],
            )
            .unwrap_err();
            assert_eq!(message(&err).0, "q");
        }

        #[test]
        fn test_input_and_checkbox_rejected() {
            let err = FieldConfig::derive(
                "q",
                Declared::input_value(),
                [Directive::css("input"), Directive::Flag(Flag::Checkbox)],
            )
            .unwrap_err();
            assert!(matches!(err, DomapError::Configuration { .. }));
        }

        #[test]
        fn test_radio_looks_up_every_option() {
            let radio =
                FieldConfig::derive("size", Declared::radio(), [Directive::css("input[name=size]")])
                    .unwrap();
            assert!(radio.is_radio);
            assert!(!radio.many);
            assert!(radio.find_options().many);
        }

        #[test]
        fn test_radio_and_checkbox_rejected() {
            let err = FieldConfig::derive(
                "size",
                Declared::radio(),
                [Directive::css("input"), Directive::Flag(Flag::Checkbox)],
            )
            .unwrap_err();
            assert!(message(&err).1.contains("at most one"));
        }

        #[test]
        fn test_radio_list_rejected() {
            let err = FieldConfig::derive(
                "size",
                Declared::radio().many(),
                [Directive::css("input")],
            )
            .unwrap_err();
            assert_eq!(message(&err).0, "size");
        }

        #[test]
        fn test_frame_requires_container() {
            let err = FieldConfig::derive(
                "frame",
                Declared::text(),
                [Directive::css("iframe"), Directive::Frame],
            )
            .unwrap_err();
            assert!(message(&err).1.contains("frame"));
        }
    }
}
