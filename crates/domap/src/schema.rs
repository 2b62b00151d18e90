//! Container schemas and the per-type schema registry.
//!
//! A schema is the compiled form of a container declaration: one
//! [`FieldConfig`] plus its [`Accessor`] per field. Static container types
//! compile their schema once, on first use, and share it through a
//! process-wide registry keyed by type identity.

use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::accessor::Accessor;
use crate::config::{Declared, Directive, FieldConfig};
use crate::result::{DomapError, DomapResult};

/// Container flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Whole document, exposes page metadata and navigation
    Page,
    /// Fragment rooted at a node
    #[default]
    Component,
    /// Component that can be submitted
    Form,
}

impl Variant {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Component => "component",
            Self::Form => "form",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled field: configuration and the accessor bound to it
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Normalized configuration
    pub config: FieldConfig,
    /// Read/write behaviour
    pub accessor: Accessor,
}

impl Field {
    /// Field name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

/// Compiled container declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Container name
    pub name: String,
    /// Container flavour
    pub variant: Variant,
    /// URL template opened by `open`, with `{name}` placeholders
    pub url: Option<String>,
    fields: Vec<Field>,
}

impl Schema {
    /// Start declaring a schema
    #[must_use]
    pub fn builder(name: impl Into<String>, variant: Variant) -> SchemaBuilder {
        SchemaBuilder::new(name, variant)
    }

    /// Field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Pending(String, Declared, Vec<Directive>),
    Compiled(Field),
}

impl Entry {
    fn name(&self) -> &str {
        match self {
            Self::Pending(name, _, _) => name,
            Self::Compiled(field) => field.name(),
        }
    }
}

/// Builder for container schemas.
///
/// Declaring a field twice replaces the earlier declaration in place, which
/// is how inherited fields are overridden.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    variant: Variant,
    url: Option<String>,
    entries: Vec<Entry>,
}

impl SchemaBuilder {
    /// Create a builder for an empty schema
    #[must_use]
    pub fn new(name: impl Into<String>, variant: Variant) -> Self {
        Self {
            name: name.into(),
            variant,
            url: None,
            entries: Vec::new(),
        }
    }

    /// Set the URL template
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Declare a field
    #[must_use]
    pub fn field(
        self,
        name: impl Into<String>,
        declared: Declared,
        directives: impl IntoIterator<Item = Directive>,
    ) -> Self {
        let name = name.into();
        self.push(Entry::Pending(
            name,
            declared,
            directives.into_iter().collect(),
        ))
    }

    /// Inherit the URL and fields of an already compiled schema
    #[must_use]
    pub fn inherit(mut self, base: &Schema) -> Self {
        if base.url.is_some() {
            self.url.clone_from(&base.url);
        }
        for field in &base.fields {
            self = self.push(Entry::Compiled(field.clone()));
        }
        self
    }

    fn push(mut self, entry: Entry) -> Self {
        match self.entries.iter_mut().find(|e| e.name() == entry.name()) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    /// Derive every field configuration and bind accessors
    pub fn build(self) -> DomapResult<Schema> {
        let fields = self
            .entries
            .into_iter()
            .map(|entry| match entry {
                Entry::Pending(name, declared, directives) => {
                    let config = FieldConfig::derive(&name, declared, directives)?;
                    Ok(Field {
                        accessor: Accessor::select(&config),
                        config,
                    })
                }
                Entry::Compiled(field) => Ok(field),
            })
            .collect::<DomapResult<Vec<_>>>()?;
        tracing::debug!(
            container = %self.name,
            variant = %self.variant,
            fields = fields.len(),
            "schema compiled"
        );
        Ok(Schema {
            name: self.name,
            variant: self.variant,
            url: self.url,
            fields,
        })
    }
}

// =============================================================================
// STATIC CONTAINERS
// =============================================================================

/// A container type declared in code.
///
/// Usually implemented through `#[derive(Container)]`; implementing it by
/// hand only requires naming the container and declaring its fields.
///
/// ```
/// use domap::{Container, Declared, Directive, SchemaBuilder, Variant};
///
/// struct Quote;
///
/// impl Container for Quote {
///     const NAME: &'static str = "Quote";
///     const VARIANT: Variant = Variant::Component;
///
///     fn declare(builder: SchemaBuilder) -> SchemaBuilder {
///         builder
///             .field("text", Declared::text(), [Directive::css("span.text")])
///             .field("tags", Declared::text().many(), [Directive::css("a.tag"), Directive::default(Vec::<String>::new())])
///     }
/// }
///
/// let schema = Quote::schema().unwrap();
/// assert_eq!(schema.len(), 2);
/// ```
pub trait Container: 'static {
    /// Container name used in diagnostics and dumps
    const NAME: &'static str;
    /// Container flavour
    const VARIANT: Variant;

    /// Declare the fields of this container
    fn declare(builder: SchemaBuilder) -> SchemaBuilder;

    /// Compiled schema, built on first use and shared afterwards
    fn schema() -> DomapResult<Arc<Schema>>
    where
        Self: Sized,
    {
        compile::<Self>()
    }
}

type Registry = Mutex<HashMap<TypeId, Arc<Schema>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::default)
}

fn compile<C: Container>() -> DomapResult<Arc<Schema>> {
    let key = TypeId::of::<C>();
    if let Some(schema) = registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return Ok(Arc::clone(schema));
    }

    // Compiled outside the lock: declarations may reference other containers.
    let schema = Arc::new(C::declare(SchemaBuilder::new(C::NAME, C::VARIANT)).build()?);
    let mut schemas = registry().lock().unwrap_or_else(PoisonError::into_inner);
    Ok(Arc::clone(schemas.entry(key).or_insert(schema)))
}

/// Error for a field name the schema does not declare
pub(crate) fn unknown_field(schema: &Schema, field: &str) -> DomapError {
    DomapError::config(field, format!("'{}' has no such field", schema.name))
}
