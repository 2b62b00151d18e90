//! Lookup engine.
//!
//! Selectors are tried in declaration order and the first one yielding at
//! least one node wins. Results of different selectors are never merged.

use std::time::Duration;

use crate::driver::{NodeId, Scope, Session};
use crate::result::{DomapError, DomapResult};
use crate::selector::Selector;
use crate::wait::{poll, PollOptions};

/// Cardinality and wait policy of a lookup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Collect every match of the winning selector instead of the first one
    pub many: bool,
    /// Wait budget; zero means a single immediate attempt
    pub wait: Duration,
    /// Polling behaviour while waiting
    pub poll: PollOptions,
}

impl FindOptions {
    /// Single-node lookup without waiting
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cardinality flag
    #[must_use]
    pub const fn with_many(mut self, many: bool) -> Self {
        self.many = many;
        self
    }

    /// Set the wait budget
    #[must_use]
    pub const fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Set the polling options
    #[must_use]
    pub const fn with_poll(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }
}

/// Outcome of a successful lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Found<D> {
    /// Nodes matched by the winning selector (exactly one unless `many`)
    Nodes(Vec<NodeId>),
    /// Nothing matched and the caller's default was substituted
    Default(D),
}

impl<D> Found<D> {
    /// Nodes if the lookup matched, `None` when the default was used
    #[must_use]
    pub fn nodes(self) -> Option<Vec<NodeId>> {
        match self {
            Self::Nodes(nodes) => Some(nodes),
            Self::Default(_) => None,
        }
    }
}

/// Find nodes matching `selectors` under `scope`.
///
/// When nothing matches within the wait budget, `default` is returned as
/// [`Found::Default`] if given, otherwise the call fails with
/// [`DomapError::ElementNotFound`] carrying the current page title and URL.
/// A `many` lookup that matches zero nodes counts as no match for that
/// selector.
pub fn find<D>(
    session: &dyn Session,
    scope: Scope,
    selectors: &[Selector],
    options: &FindOptions,
    default: Option<D>,
) -> DomapResult<Found<D>> {
    if selectors.is_empty() {
        return Err(DomapError::config(
            "<lookup>",
            "at least one selector is required",
        ));
    }

    let matched = poll(options.wait, &options.poll, || {
        attempt(session, scope, selectors, options.many)
    })?;

    if let Some(nodes) = matched {
        return Ok(Found::Nodes(nodes));
    }
    if let Some(default) = default {
        tracing::debug!(selectors = ?selectors, "no match, using default");
        return Ok(Found::Default(default));
    }
    Err(DomapError::ElementNotFound {
        selectors: selectors.to_vec(),
        title: session.title().unwrap_or_default(),
        url: session.current_url().unwrap_or_default(),
    })
}

fn attempt(
    session: &dyn Session,
    scope: Scope,
    selectors: &[Selector],
    many: bool,
) -> DomapResult<Option<Vec<NodeId>>> {
    for selector in selectors {
        let nodes = if many {
            session.find_many(scope, selector)?
        } else {
            session.find_one(scope, selector)?.into_iter().collect()
        };
        if nodes.is_empty() {
            tracing::debug!(%selector, "no match");
            continue;
        }
        tracing::debug!(%selector, count = nodes.len(), "matched");
        return Ok(Some(nodes));
    }
    Ok(None)
}
