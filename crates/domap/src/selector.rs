//! Selector grammar.
//!
//! A selector string has the shape `{strategy}:{path}`. When the prefix is not
//! a known strategy name, the strategy is inferred from the path itself: a
//! leading `/` or `./` means XPath, anything else is a CSS selector. Nothing
//! else is guessed, so `.article` stays a CSS class selector.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lookup strategy understood by a browser session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Match on the `class` attribute
    ClassName,
    /// CSS selector
    Css,
    /// Match on the `id` attribute
    Id,
    /// Anchor whose visible text equals the path
    LinkText,
    /// Anchor whose visible text contains the path
    PartialLinkText,
    /// Match on the `name` attribute
    Name,
    /// Match on the tag name
    TagName,
    /// XPath expression
    XPath,
}

/// Prefix aliases accepted in selector strings
const PREFIXES: &[(&str, Strategy)] = &[
    ("class_name", Strategy::ClassName),
    ("class", Strategy::ClassName),
    ("cls", Strategy::ClassName),
    ("css", Strategy::Css),
    ("id", Strategy::Id),
    ("link_text", Strategy::LinkText),
    ("link", Strategy::LinkText),
    ("name", Strategy::Name),
    ("partial_link_text", Strategy::PartialLinkText),
    ("plink", Strategy::PartialLinkText),
    ("tag_name", Strategy::TagName),
    ("tag", Strategy::TagName),
    ("xpath", Strategy::XPath),
    ("xp", Strategy::XPath),
];

impl Strategy {
    /// WebDriver name of the strategy
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ClassName => "class name",
            Self::Css => "css selector",
            Self::Id => "id",
            Self::LinkText => "link text",
            Self::PartialLinkText => "partial link text",
            Self::Name => "name",
            Self::TagName => "tag name",
            Self::XPath => "xpath",
        }
    }

    /// Canonical prefix used when rendering a selector
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::ClassName => "class_name",
            Self::Css => "css",
            Self::Id => "id",
            Self::LinkText => "link_text",
            Self::PartialLinkText => "partial_link_text",
            Self::Name => "name",
            Self::TagName => "tag_name",
            Self::XPath => "xpath",
        }
    }

    /// Look up a prefix alias (`xp`, `cls`, `link`, ...)
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        PREFIXES
            .iter()
            .find(|(alias, _)| *alias == prefix)
            .map(|(_, strategy)| *strategy)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (strategy, path) pair identifying how to query the DOM
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    /// How to interpret `path`
    pub strategy: Strategy,
    /// Strategy-specific query
    pub path: String,
}

impl Selector {
    /// Create a selector from its parts
    #[must_use]
    pub fn new(strategy: Strategy, path: impl Into<String>) -> Self {
        Self {
            strategy,
            path: path.into(),
        }
    }

    /// Parse a selector string, inferring the strategy when no known prefix is given
    #[must_use]
    pub fn parse(selector: &str) -> Self {
        if let Some((prefix, rest)) = selector.split_once(':') {
            if let Some(strategy) = Strategy::from_prefix(prefix) {
                return Self::new(strategy, rest);
            }
        }
        if selector.starts_with('/') || selector.starts_with("./") {
            return Self::new(Strategy::XPath, selector);
        }
        Self::new(Strategy::Css, selector)
    }

    /// Create a CSS selector
    #[must_use]
    pub fn css(path: impl Into<String>) -> Self {
        Self::new(Strategy::Css, path)
    }

    /// Create an XPath selector
    #[must_use]
    pub fn xpath(path: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, path)
    }

    /// Create an exact link text selector
    #[must_use]
    pub fn link_text(text: impl Into<String>) -> Self {
        Self::new(Strategy::LinkText, text)
    }

    /// Create a partial link text selector
    #[must_use]
    pub fn partial_link_text(text: impl Into<String>) -> Self {
        Self::new(Strategy::PartialLinkText, text)
    }
}

impl FromStr for Selector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.strategy.prefix(), self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert_eq, prop_assume, proptest};

    mod parse_tests {
        use super::*;

        #[test]
        fn test_explicit_prefixes() {
            let cases = [
                ("css:div", Strategy::Css, "div"),
                ("xpath://div", Strategy::XPath, "//div"),
                ("xp://div", Strategy::XPath, "//div"),
                ("class_name:my-class", Strategy::ClassName, "my-class"),
                ("class:my-class", Strategy::ClassName, "my-class"),
                ("cls:my-class", Strategy::ClassName, "my-class"),
                ("tag_name:a", Strategy::TagName, "a"),
                ("tag:a", Strategy::TagName, "a"),
                ("partial_link_text:a", Strategy::PartialLinkText, "a"),
                ("plink:a", Strategy::PartialLinkText, "a"),
                ("link_text:Next", Strategy::LinkText, "Next"),
                ("link:Next", Strategy::LinkText, "Next"),
                ("id:a", Strategy::Id, "a"),
                ("name:q", Strategy::Name, "q"),
            ];
            for (input, strategy, path) in cases {
                assert_eq!(Selector::parse(input), Selector::new(strategy, path), "{input}");
            }
        }

        #[test]
        fn test_inferred_xpath() {
            assert_eq!(Selector::parse("/body/span"), Selector::xpath("/body/span"));
            assert_eq!(Selector::parse("//div"), Selector::xpath("//div"));
            assert_eq!(Selector::parse("./div"), Selector::xpath("./div"));
            assert_eq!(Selector::parse(".//div"), Selector::xpath(".//div"));
        }

        #[test]
        fn test_inferred_css() {
            assert_eq!(Selector::parse("div.article"), Selector::css("div.article"));
            assert_eq!(Selector::parse(".article"), Selector::css(".article"));
            assert_eq!(Selector::parse("a"), Selector::css("a"));
        }

        #[test]
        fn test_only_first_colon_splits() {
            assert_eq!(
                Selector::parse("css:a:not(.x)"),
                Selector::css("a:not(.x)")
            );
        }

        #[test]
        fn test_unknown_prefix_is_css() {
            assert_eq!(
                Selector::parse("input:checked"),
                Selector::css("input:checked")
            );
        }

        #[test]
        fn test_display_uses_canonical_prefix() {
            assert_eq!(Selector::parse("xp://a").to_string(), "xpath://a");
            assert_eq!(Selector::parse("cls:btn").to_string(), "class_name:btn");
        }

        #[test]
        fn test_webdriver_names() {
            assert_eq!(Strategy::Css.as_str(), "css selector");
            assert_eq!(Strategy::PartialLinkText.as_str(), "partial link text");
        }
    }

    proptest! {
        #[test]
        fn prop_leading_slash_is_xpath(rest in "[a-z/\\[\\]@=']{0,24}") {
            let input = format!("/{rest}");
            prop_assert_eq!(Selector::parse(&input), Selector::xpath(input.clone()));
            let relative = format!("./{rest}");
            prop_assert_eq!(Selector::parse(&relative), Selector::xpath(relative.clone()));
        }

        #[test]
        fn prop_unprefixed_is_css(input in "[a-z#\\.\\[\\] >]{1,24}") {
            prop_assume!(!input.starts_with('/') && !input.starts_with("./"));
            prop_assert_eq!(Selector::parse(&input), Selector::css(input.clone()));
        }
    }
}
