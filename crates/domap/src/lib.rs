//! domap: declarative DOM mapping for browser automation
//!
//! Web pages are described as typed containers whose fields carry selector
//! directives. Nothing is fetched up front: every field read resolves its
//! selectors against the live browser session, then either coerces the
//! matched node into a plain value or binds a nested container to it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      DOMAP Architecture                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Container  │    │ Schema     │    │ Accessor   │            │
//! │   │ (derive or │───►│ (compiled  │───►│ dispatch   │            │
//! │   │  YAML)     │    │  once)     │    │            │            │
//! │   └────────────┘    └────────────┘    └─────┬──────┘            │
//! │                                             │                    │
//! │   ┌────────────┐    ┌────────────┐    ┌─────▼──────┐            │
//! │   │ Session    │◄───│ Finder     │◄───│ Coercion / │            │
//! │   │ (CDP/mock) │    │ (poll)     │    │ nesting    │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use domap::prelude::*;
//!
//! #[derive(Container)]
//! #[dom(component)]
//! struct Quote {
//!     #[dom(css = "span.text")]
//!     text: String,
//!     #[dom(css = "a.tag", default = Vec::<String>::new())]
//!     tags: Vec<String>,
//! }
//!
//! #[derive(Container)]
//! #[dom(page, url = "https://quotes.toscrape.com/page/{page}/")]
//! struct QuotesPage {
//!     #[dom(css = "div.quote", wait = 2)]
//!     quotes: Vec<Quote>,
//! }
//!
//! let page = Area::<QuotesPage>::new(session)?;
//! page.open(&[("page", "1")])?;
//! for quote in page.quotes()? {
//!     println!("{} {:?}", quote.text()?, quote.tags()?);
//! }
//! ```

#![warn(missing_docs)]

extern crate self as domap;

pub mod accessor;
pub mod coerce;
pub mod config;
pub mod container;
pub mod driver;
pub mod finder;
mod result;
pub mod schema;
pub mod selector;
pub mod types;
pub mod wait;
pub mod yaml;

/// Blocking session over the Chrome DevTools Protocol
#[cfg(feature = "browser")]
pub mod chromium;

pub use accessor::{Accessor, Action, FieldValue, FromField, Interaction, Write};
pub use coerce::{extract_integer, Value};
pub use config::{ContainerRef, Declared, Directive, FieldConfig, Flag, Kind, Shape};
pub use container::{Area, Form, Page, WebArea};
pub use driver::{with_frames, FrameGuard, MockNode, MockSession, NodeId, Scope, Session};
pub use finder::{find, FindOptions, Found};
pub use result::{DomapError, DomapResult};
pub use schema::{Container, Field, Schema, SchemaBuilder, Variant};
pub use selector::{Selector, Strategy};
pub use types::{Checkbox, Element, ImageSrc, InnerHtml, InputValue, Link, OuterHtml, Radio};
pub use wait::{PollOptions, DEFAULT_POLL_INTERVAL_MS};
pub use yaml::{load_page, load_str};

#[cfg(feature = "browser")]
pub use chromium::{BrowserConfig, ChromiumSession};

// Derive macro shares its name with the trait, like serde
#[cfg(feature = "derive")]
pub use domap_derive::Container;

/// Everything needed to declare and use containers
pub mod prelude {
    pub use super::accessor::{Action, FieldValue, FromField, Write};
    pub use super::coerce::Value;
    pub use super::config::{Declared, Directive};
    pub use super::container::{Area, Form, Page, WebArea};
    pub use super::driver::{MockNode, MockSession, NodeId, Scope, Session};
    pub use super::result::{DomapError, DomapResult};
    pub use super::schema::{Container, SchemaBuilder, Variant};
    pub use super::selector::Selector;
    pub use super::types::*;

    #[cfg(feature = "browser")]
    pub use super::chromium::{BrowserConfig, ChromiumSession};

    #[cfg(feature = "derive")]
    pub use domap_derive::Container;
}
