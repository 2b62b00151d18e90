//! Result and error types for domap.

use thiserror::Error;

use crate::selector::Selector;

/// Result type for domap operations
pub type DomapResult<T> = Result<T, DomapError>;

/// Errors that can occur while declaring or resolving page objects
#[derive(Debug, Error)]
pub enum DomapError {
    /// A field or container declaration is invalid
    #[error("Invalid configuration for field '{field}': {message}")]
    Configuration {
        /// Offending field
        field: String,
        /// What is wrong with it
        message: String,
    },

    /// No selector matched within the wait budget and no default was set
    #[error("{}", not_found_message(.selectors, .title, .url))]
    ElementNotFound {
        /// Selectors tried, in order
        selectors: Vec<Selector>,
        /// Title of the page at failure time
        title: String,
        /// URL of the page at failure time
        url: String,
    },

    /// Write attempted on a field that cannot be set
    #[error("Field '{field}' is a {kind} field which cannot be set")]
    Unsettable {
        /// Field name
        field: String,
        /// Accessor kind of the field
        kind: &'static str,
    },

    /// Text could not be converted into the declared type
    #[error("Cannot convert {value:?} of field '{field}' into {expected}")]
    Coercion {
        /// Field name
        field: String,
        /// Raw text or attribute value
        value: String,
        /// Target type
        expected: &'static str,
    },

    /// Interaction name not understood by an input field
    #[error("Unknown interaction '{name}'")]
    UnknownInteraction {
        /// Requested interaction
        name: String,
    },

    /// Radio write naming a value none of the options carries
    #[error("Field '{field}' has no option with value {value:?}")]
    UnknownOption {
        /// Field name
        field: String,
        /// Requested option value
        value: String,
    },

    /// Operation not available for the container's scope or variant
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Error message
        message: String,
    },

    /// A resolved field was read as an incompatible Rust type
    #[error("Field '{field}' cannot be read as {expected}")]
    TypeMismatch {
        /// Field name
        field: String,
        /// Requested type
        expected: &'static str,
    },

    /// The browser session reported a failure
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Declarative page file could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DomapError {
    pub(crate) fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn driver(err: impl std::fmt::Display) -> Self {
        Self::Driver {
            message: err.to_string(),
        }
    }

    /// Whether this error is a lookup failure
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ElementNotFound { .. })
    }
}

fn not_found_message(selectors: &[Selector], title: &str, url: &str) -> String {
    let tried = selectors
        .iter()
        .map(|s| format!("> {s}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Unable to find inside document an element matching the selectors:\n{tried}\n\n\
         Context of the exception:\n- Title page: {title}\n- URL: {url}"
    )
}
