//! Declarative page files.
//!
//! A page file describes the same model as code declarations:
//!
//! ```yaml
//! name: QuotesPage
//! kind: page
//! url: https://quotes.toscrape.com/page/{page}/
//! extends: [base.yaml]
//! fields:
//!   quotes:
//!     type: list[component]
//!     selectors: div.quote
//!     component:
//!       fields:
//!         text: span.text
//!         tags:
//!           type: list[text]
//!           selectors: [a.tag]
//!           default: []
//!   next_page:
//!     type: optional[link]
//!     selectors: "li.next > a"
//! ```
//!
//! A field given as a string or a list is a text field with those selectors.
//! Bases listed in `extends` are resolved relative to the file and loaded in
//! order; later declarations override earlier ones.

use serde_yaml_ng::{Mapping, Value as Yaml};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::coerce::Value;
use crate::config::{Declared, Directive, Flag, Kind};
use crate::result::{DomapError, DomapResult};
use crate::schema::{Schema, SchemaBuilder, Variant};

const PAGE_KEYS: &[&str] = &["name", "kind", "url", "extends", "fields", "elements"];

/// Load a page schema from a YAML file
pub fn load_page(path: impl AsRef<Path>) -> DomapResult<Arc<Schema>> {
    load_file(path.as_ref(), &[])
}

/// Load a page schema from YAML text, resolving `extends` against `base_dir`
pub fn load_str(source: &str, base_dir: &Path) -> DomapResult<Arc<Schema>> {
    load(source, Context { base_dir, chain: &[] }, "Page")
}

/// Where relative `extends` paths resolve, and the files currently being loaded
#[derive(Debug, Clone, Copy)]
struct Context<'a> {
    base_dir: &'a Path,
    chain: &'a [PathBuf],
}

fn load_file(path: &Path, chain: &[PathBuf]) -> DomapResult<Arc<Schema>> {
    let canonical = std::fs::canonicalize(path)?;
    if chain.contains(&canonical) {
        return Err(DomapError::config(
            path.display().to_string(),
            "page file extends itself through its bases",
        ));
    }
    let source = std::fs::read_to_string(&canonical)?;
    let base_dir = canonical.parent().unwrap_or_else(|| Path::new("."));
    tracing::debug!(path = %path.display(), depth = chain.len(), "loading page file");

    let mut chain = chain.to_vec();
    chain.push(canonical.clone());
    let context = Context {
        base_dir,
        chain: &chain,
    };
    load(&source, context, &default_name(path))
}

fn load(source: &str, context: Context<'_>, name: &str) -> DomapResult<Arc<Schema>> {
    let document: Yaml = serde_yaml_ng::from_str(source)?;
    let Yaml::Mapping(mapping) = document else {
        return Err(DomapError::config(name, "a page file must be a mapping"));
    };
    container(&mapping, context, name, Variant::Page).map(Arc::new)
}

fn default_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let mut chars = stem.chars();
    let capitalized = chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect::<String>())
        .unwrap_or_default();
    format!("{capitalized}Page")
}

fn container(
    mapping: &Mapping,
    context: Context<'_>,
    default_name: &str,
    default_variant: Variant,
) -> DomapResult<Schema> {
    for key in mapping.keys() {
        let key = key.as_str().unwrap_or_default();
        if !PAGE_KEYS.contains(&key) {
            return Err(DomapError::config(key, "unknown page key"));
        }
    }

    let name = match mapping.get("name") {
        Some(name) => string(default_name, "name", name)?,
        None => default_name.to_string(),
    };
    let variant = match mapping.get("kind") {
        Some(kind) => serde_yaml_ng::from_value(kind.clone())?,
        None => default_variant,
    };

    let mut builder = SchemaBuilder::new(&name, variant);
    if let Some(extends) = mapping.get("extends") {
        for base in strings(&name, "extends", extends)? {
            let base = load_file(&context.base_dir.join(base), context.chain)?;
            builder = builder.inherit(&base);
        }
    }
    if let Some(url) = mapping.get("url") {
        builder = builder.url(string(&name, "url", url)?);
    }

    let fields = mapping.get("fields").or_else(|| mapping.get("elements"));
    if let Some(fields) = fields {
        let Yaml::Mapping(fields) = fields else {
            return Err(DomapError::config(&name, "fields must be a mapping"));
        };
        for (field, spec) in fields {
            let field = field
                .as_str()
                .ok_or_else(|| DomapError::config(&name, "field names must be strings"))?;
            let (declared, directives) = field_spec(field, spec, context)?;
            builder = builder.field(field, declared, directives);
        }
    }
    builder.build()
}

fn field_spec(
    field: &str,
    spec: &Yaml,
    context: Context<'_>,
) -> DomapResult<(Declared, Vec<Directive>)> {
    let Yaml::Mapping(spec) = spec else {
        let directives = strings(field, "selectors", spec)?
            .iter()
            .map(|s| Directive::selector(s))
            .collect();
        return Ok((Declared::text(), directives));
    };

    let component = match spec.get("component") {
        Some(Yaml::Mapping(nested)) => Some(Arc::new(container(
            nested,
            context,
            field,
            Variant::Component,
        )?)),
        Some(_) => return Err(DomapError::config(field, "component must be a mapping")),
        None => None,
    };
    let declared = match spec.get("type") {
        Some(kind) => parse_type(field, &string(field, "type", kind)?, component)?,
        None => component.map_or_else(Declared::text, Declared::container),
    };

    let mut directives = Vec::new();
    for (key, value) in spec {
        let key = key.as_str().unwrap_or_default();
        match key {
            "type" | "component" => {}
            "selectors" | "selector" => directives.extend(
                strings(field, key, value)?
                    .iter()
                    .map(|s| Directive::selector(s)),
            ),
            "wait" => directives.push(Directive::wait(value.as_f64().ok_or_else(|| {
                DomapError::config(field, "wait must be a number of seconds")
            })?)),
            "default" => directives.push(Directive::Default(to_value(value))),
            "attribute" => directives.push(Directive::attribute(string(field, key, value)?)),
            "format" => directives.push(Directive::format(string(field, key, value)?)),
            "frame" => {
                if value.as_bool() == Some(true) {
                    directives.push(Directive::Frame);
                }
            }
            "input" => {
                if value.as_bool() == Some(true) {
                    directives.push(Directive::Flag(Flag::Input));
                }
            }
            "checkbox" => {
                if value.as_bool() == Some(true) {
                    directives.push(Directive::Flag(Flag::Checkbox));
                }
            }
            "radio" => {
                if value.as_bool() == Some(true) {
                    directives.push(Directive::Flag(Flag::Radio));
                }
            }
            other => directives.push(Directive::Unknown(other.to_string())),
        }
    }
    Ok((declared, directives))
}

/// Parse `list[...]`, `optional[...]` and the kind names
fn parse_type(field: &str, raw: &str, component: Option<Arc<Schema>>) -> DomapResult<Declared> {
    let raw = raw.trim();
    if let Some(inner) = wrapped(raw, "list") {
        return parse_type(field, inner, component).map(Declared::many);
    }
    if let Some(inner) = wrapped(raw, "optional") {
        return parse_type(field, inner, component).map(Declared::optional);
    }
    let has_component = component.is_some();
    let declared = match raw {
        "text" | "str" | "string" => Declared::text(),
        "int" | "integer" => Declared::integer(),
        "float" => Declared::float(),
        "date" => Declared::date(),
        "datetime" => Declared::datetime(),
        "bool" | "boolean" => Declared::boolean(),
        "node" | "element" => Declared::node(),
        "link" => Declared::link(),
        "src" | "image_src" => Declared::image_src(),
        "inner_html" => Declared::inner_html(),
        "outer_html" => Declared::outer_html(),
        "input" => Declared::input_value(),
        "checkbox" => Declared::checkbox(),
        "radio" => Declared::radio(),
        "component" => match component {
            Some(schema) => Declared::container(schema),
            None => {
                return Err(DomapError::config(
                    field,
                    "component type needs a `component` mapping",
                ))
            }
        },
        other => {
            return Err(DomapError::config(field, format!("unknown type '{other}'")));
        }
    };
    if has_component && !matches!(declared.kind, Kind::Container(_)) {
        return Err(DomapError::config(
            field,
            "a `component` mapping requires the component type",
        ));
    }
    Ok(declared)
}

fn wrapped<'a>(raw: &'a str, wrapper: &str) -> Option<&'a str> {
    raw.strip_prefix(wrapper)?
        .strip_prefix('[')?
        .strip_suffix(']')
        .map(str::trim)
}

fn string(field: &str, key: &str, value: &Yaml) -> DomapResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DomapError::config(field, format!("{key} must be a string")))
}

fn strings(field: &str, key: &str, value: &Yaml) -> DomapResult<Vec<String>> {
    match value {
        Yaml::Sequence(items) => items.iter().map(|item| string(field, key, item)).collect(),
        other => string(field, key, other).map(|s| vec![s]),
    }
}

fn to_value(yaml: &Yaml) -> Value {
    match yaml {
        Yaml::Null => Value::Null,
        Yaml::Bool(flag) => Value::Bool(*flag),
        Yaml::Number(n) => n
            .as_i64()
            .map_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN)), Value::Int),
        Yaml::String(text) => Value::Text(text.clone()),
        Yaml::Sequence(items) => Value::List(items.iter().map(to_value).collect()),
        Yaml::Mapping(mapping) => Value::Object(
            mapping
                .iter()
                .filter_map(|(k, v)| Some((k.as_str()?.to_string(), to_value(v))))
                .collect(),
        ),
        Yaml::Tagged(tagged) => to_value(&tagged.value),
    }
}
