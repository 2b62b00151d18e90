//! Semantic type aliases for derived containers.
//!
//! Each alias reads as its underlying Rust type but tells
//! `#[derive(Container)]` which attribute to extract or which accessor to use.

use crate::driver::NodeId;

/// `href` attribute
pub type Link = String;

/// `src` attribute
pub type ImageSrc = String;

/// Inner markup
pub type InnerHtml = String;

/// Outer markup
pub type OuterHtml = String;

/// Writable text input
pub type InputValue = String;

/// Writable checkbox
pub type Checkbox = bool;

/// Writable radio group: `value` of the checked option, `None` when none is
pub type Radio = Option<String>;

/// Raw node handle
pub type Element = NodeId;
