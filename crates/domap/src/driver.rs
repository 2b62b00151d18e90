//! Browser session capability.
//!
//! Containers never talk to a browser directly. Every lookup, read and
//! interaction goes through the [`Session`] trait, which keeps the resolution
//! engine independent from the automation backend:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Session (blocking trait)                                 │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌────────────────────┐        ┌───────────────────────┐ │
//! │  │  ChromiumSession   │        │  MockSession          │ │
//! │  │  (feature browser) │        │  (in-memory, tests)   │ │
//! │  │  CDP via           │        │  routed selectors,    │ │
//! │  │  chromiumoxide     │        │  call history         │ │
//! │  └────────────────────┘        └───────────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

use crate::result::{DomapError, DomapResult};
use crate::selector::Selector;

/// Opaque handle to a node resolved by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Wrap a backend-specific identifier
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Backend-specific identifier
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Search root of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The whole document of the current browsing context
    Document,
    /// Descendants of a previously resolved node
    Element(NodeId),
}

impl Scope {
    /// The node this scope is rooted at, if any
    #[must_use]
    pub const fn node(&self) -> Option<NodeId> {
        match self {
            Self::Document => None,
            Self::Element(node) => Some(*node),
        }
    }
}

/// Blocking browser session used by every container.
///
/// Implementations own a single browsing session and are used from one
/// thread at a time; methods take `&self` and rely on interior mutability.
pub trait Session: fmt::Debug {
    /// First node matching `selector` under `scope`, `None` when nothing matches
    fn find_one(&self, scope: Scope, selector: &Selector) -> DomapResult<Option<NodeId>>;

    /// All nodes matching `selector` under `scope` (empty when nothing matches)
    fn find_many(&self, scope: Scope, selector: &Selector) -> DomapResult<Vec<NodeId>>;

    /// Visible text of a node
    fn text(&self, node: NodeId) -> DomapResult<String>;

    /// Attribute value of a node
    fn attribute(&self, node: NodeId, name: &str) -> DomapResult<Option<String>>;

    /// DOM property of a node, stringified (`innerHTML`, `outerHTML`, ...)
    fn property(&self, node: NodeId, name: &str) -> DomapResult<Option<String>>;

    /// Clear the value of an input node
    fn clear(&self, node: NodeId) -> DomapResult<()>;

    /// Type text into an input node
    fn type_text(&self, node: NodeId, text: &str) -> DomapResult<()>;

    /// Click a node
    fn click(&self, node: NodeId) -> DomapResult<()>;

    /// Submit the form a node belongs to
    fn submit(&self, node: NodeId) -> DomapResult<()>;

    /// Move the browsing context into a frame node of the current context
    fn switch_to_frame(&self, frame: NodeId) -> DomapResult<()>;

    /// Move the browsing context back to the top-level document
    fn switch_to_default_content(&self) -> DomapResult<()>;

    /// Navigate the session to a URL
    fn navigate(&self, url: &str) -> DomapResult<()>;

    /// Title of the current page
    fn title(&self) -> DomapResult<String>;

    /// URL of the current page
    fn current_url(&self) -> DomapResult<String>;

    /// Source of the current page
    fn page_source(&self) -> DomapResult<String>;
}

/// Scoped frame context.
///
/// Entering switches into each frame of `path` in order; dropping the guard
/// switches back to the default content, whether the body succeeded or not.
pub struct FrameGuard<'s> {
    session: &'s dyn Session,
    active: bool,
}

impl<'s> FrameGuard<'s> {
    /// Switch into the frames of `path`, outermost first
    pub fn enter(session: &'s dyn Session, path: &[NodeId]) -> DomapResult<Self> {
        let guard = Self {
            session,
            active: !path.is_empty(),
        };
        for frame in path {
            session.switch_to_frame(*frame)?;
        }
        Ok(guard)
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = self.session.switch_to_default_content() {
                tracing::warn!(error = %err, "failed to restore default browsing context");
            }
        }
    }
}

impl fmt::Debug for FrameGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameGuard")
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Run `body` inside the frames of `path`, restoring the default content afterwards
pub fn with_frames<T>(
    session: &dyn Session,
    path: &[NodeId],
    body: impl FnOnce() -> DomapResult<T>,
) -> DomapResult<T> {
    let _guard = FrameGuard::enter(session, path)?;
    body()
}

// ============================================================================
// In-memory session
// ============================================================================

/// Node stored by [`MockSession`]
#[derive(Debug, Clone, Default)]
pub struct MockNode {
    /// Visible text
    pub text: String,
    /// Attributes
    pub attributes: BTreeMap<String, String>,
    /// DOM properties
    pub properties: BTreeMap<String, String>,
}

impl MockNode {
    /// Node with visible text
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set a DOM property
    #[must_use]
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.properties.insert(name.into(), value.into());
        self
    }

    /// Checkbox input in the given state
    #[must_use]
    pub fn checkbox(checked: bool) -> Self {
        let node = Self::default().attr("type", "checkbox");
        if checked {
            node.attr("checked", "true")
        } else {
            node
        }
    }

    /// Radio option of group `name` carrying `value`
    #[must_use]
    pub fn radio(name: &str, value: &str, checked: bool) -> Self {
        let node = Self::default()
            .attr("type", "radio")
            .attr("name", name)
            .attr("value", value);
        if checked {
            node.attr("checked", "true")
        } else {
            node
        }
    }
}

#[derive(Debug, Clone)]
struct Route {
    frames: Vec<NodeId>,
    scope: Scope,
    selector: Selector,
    nodes: Vec<NodeId>,
    hidden_for: usize,
    seen: usize,
}

#[derive(Debug, Default)]
struct MockState {
    nodes: Vec<MockNode>,
    routes: Vec<Route>,
    frames: Vec<NodeId>,
    title: String,
    url: String,
    source: String,
    history: Vec<String>,
}

impl MockState {
    fn node(&self, id: NodeId) -> DomapResult<&MockNode> {
        self.nodes
            .get(id.get() as usize)
            .ok_or_else(|| DomapError::driver(format!("stale {id}")))
    }

    fn node_mut(&mut self, id: NodeId) -> DomapResult<&mut MockNode> {
        self.nodes
            .get_mut(id.get() as usize)
            .ok_or_else(|| DomapError::driver(format!("stale {id}")))
    }

    fn resolve(&mut self, scope: Scope, selector: &Selector) -> Vec<NodeId> {
        let frames = self.frames.clone();
        let Some(route) = self
            .routes
            .iter_mut()
            .find(|r| r.frames == frames && r.scope == scope && &r.selector == selector)
        else {
            return Vec::new();
        };
        if route.seen < route.hidden_for {
            route.seen += 1;
            return Vec::new();
        }
        route.nodes.clone()
    }
}

/// In-memory session for unit tests and offline development.
///
/// Nodes are registered explicitly and selectors are answered from routes
/// declared per scope and frame context, so tests control exactly which
/// selector matches what. Every call is recorded in [`MockSession::history`].
#[derive(Debug, Default)]
pub struct MockSession {
    state: RefCell<MockState>,
}

impl MockSession {
    /// Create an empty session on `about:blank`
    #[must_use]
    pub fn new() -> Self {
        let session = Self::default();
        session.state.borrow_mut().url = "about:blank".to_string();
        session
    }

    /// Set the page title
    #[must_use]
    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.state.borrow_mut().title = title.into();
        self
    }

    /// Set the page URL
    #[must_use]
    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.state.borrow_mut().url = url.into();
        self
    }

    /// Set the page source
    #[must_use]
    pub fn with_source(self, source: impl Into<String>) -> Self {
        self.state.borrow_mut().source = source.into();
        self
    }

    /// Register a node and return its handle
    pub fn add_node(&self, node: MockNode) -> NodeId {
        let mut state = self.state.borrow_mut();
        state.nodes.push(node);
        NodeId::new(state.nodes.len() as u64 - 1)
    }

    /// Answer `selector` under `scope` with `nodes` in the top-level document
    pub fn route(&self, scope: Scope, selector: &str, nodes: &[NodeId]) {
        self.route_in_frames(&[], scope, selector, nodes, 0);
    }

    /// Like [`MockSession::route`] but only after `attempts` unanswered queries
    pub fn route_after(&self, scope: Scope, selector: &str, nodes: &[NodeId], attempts: usize) {
        self.route_in_frames(&[], scope, selector, nodes, attempts);
    }

    /// Answer `selector` only while the session is inside the frames of `frames`
    pub fn route_in_frames(
        &self,
        frames: &[NodeId],
        scope: Scope,
        selector: &str,
        nodes: &[NodeId],
        hidden_for: usize,
    ) {
        self.state.borrow_mut().routes.push(Route {
            frames: frames.to_vec(),
            scope,
            selector: Selector::parse(selector),
            nodes: nodes.to_vec(),
            hidden_for,
            seen: 0,
        });
    }

    /// Change the visible text of a node
    pub fn set_text(&self, node: NodeId, text: impl Into<String>) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(node.get() as usize) {
            n.text = text.into();
        }
    }

    /// Current attribute value of a node, bypassing the history
    #[must_use]
    pub fn peek_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.state
            .borrow()
            .nodes
            .get(node.get() as usize)
            .and_then(|n| n.attributes.get(name).cloned())
    }

    /// Frames the session is currently switched into
    #[must_use]
    pub fn current_frames(&self) -> Vec<NodeId> {
        self.state.borrow().frames.clone()
    }

    /// Recorded calls, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state.borrow().history.clone()
    }

    /// Number of recorded calls starting with `prefix`
    #[must_use]
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state
            .borrow()
            .history
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Check if a call starting with `prefix` was recorded
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.count_calls(prefix) > 0
    }

    /// Forget the recorded calls
    pub fn clear_history(&self) {
        self.state.borrow_mut().history.clear();
    }

    fn record(&self, call: String) {
        self.state.borrow_mut().history.push(call);
    }
}

impl Session for MockSession {
    fn find_one(&self, scope: Scope, selector: &Selector) -> DomapResult<Option<NodeId>> {
        self.record(format!("find_one:{selector}"));
        Ok(self
            .state
            .borrow_mut()
            .resolve(scope, selector)
            .first()
            .copied())
    }

    fn find_many(&self, scope: Scope, selector: &Selector) -> DomapResult<Vec<NodeId>> {
        self.record(format!("find_many:{selector}"));
        Ok(self.state.borrow_mut().resolve(scope, selector))
    }

    fn text(&self, node: NodeId) -> DomapResult<String> {
        self.record(format!("text:{}", node.get()));
        Ok(self.state.borrow().node(node)?.text.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> DomapResult<Option<String>> {
        self.record(format!("attribute:{}:{name}", node.get()));
        Ok(self.state.borrow().node(node)?.attributes.get(name).cloned())
    }

    fn property(&self, node: NodeId, name: &str) -> DomapResult<Option<String>> {
        self.record(format!("property:{}:{name}", node.get()));
        Ok(self.state.borrow().node(node)?.properties.get(name).cloned())
    }

    fn clear(&self, node: NodeId) -> DomapResult<()> {
        self.record(format!("clear:{}", node.get()));
        let mut state = self.state.borrow_mut();
        let _ = state
            .node_mut(node)?
            .attributes
            .insert("value".to_string(), String::new());
        Ok(())
    }

    fn type_text(&self, node: NodeId, text: &str) -> DomapResult<()> {
        self.record(format!("type_text:{}:{text}", node.get()));
        let mut state = self.state.borrow_mut();
        state
            .node_mut(node)?
            .attributes
            .entry("value".to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    fn click(&self, node: NodeId) -> DomapResult<()> {
        self.record(format!("click:{}", node.get()));
        let mut state = self.state.borrow_mut();
        let target = state.node_mut(node)?;
        let input_type = target.attributes.get("type").cloned();
        match input_type.as_deref() {
            Some("checkbox") => {
                if target.attributes.remove("checked").is_none() {
                    let _ = target
                        .attributes
                        .insert("checked".to_string(), "true".to_string());
                }
            }
            Some("radio") => {
                let group = target.attributes.get("name").cloned();
                for other in &mut state.nodes {
                    let is_radio = other.attributes.get("type").map(String::as_str) == Some("radio");
                    if is_radio && other.attributes.get("name") == group.as_ref() {
                        let _ = other.attributes.remove("checked");
                    }
                }
                let _ = state
                    .node_mut(node)?
                    .attributes
                    .insert("checked".to_string(), "true".to_string());
            }
            _ => {}
        }
        Ok(())
    }

    fn submit(&self, node: NodeId) -> DomapResult<()> {
        self.record(format!("submit:{}", node.get()));
        self.state.borrow().node(node).map(|_| ())
    }

    fn switch_to_frame(&self, frame: NodeId) -> DomapResult<()> {
        self.record(format!("switch_to_frame:{}", frame.get()));
        let mut state = self.state.borrow_mut();
        let _ = state.node(frame)?;
        state.frames.push(frame);
        Ok(())
    }

    fn switch_to_default_content(&self) -> DomapResult<()> {
        self.record("switch_to_default_content".to_string());
        self.state.borrow_mut().frames.clear();
        Ok(())
    }

    fn navigate(&self, url: &str) -> DomapResult<()> {
        self.record(format!("navigate:{url}"));
        self.state.borrow_mut().url = url.to_string();
        Ok(())
    }

    fn title(&self) -> DomapResult<String> {
        Ok(self.state.borrow().title.clone())
    }

    fn current_url(&self) -> DomapResult<String> {
        Ok(self.state.borrow().url.clone())
    }

    fn page_source(&self) -> DomapResult<String> {
        Ok(self.state.borrow().source.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod mock_session_tests {
        use super::*;

        #[test]
        fn test_routes_answer_by_scope() {
            let session = MockSession::new();
            let list = session.add_node(MockNode::new("list"));
            let item = session.add_node(MockNode::new("item"));
            session.route(Scope::Document, "ul", &[list]);
            session.route(Scope::Element(list), "li", &[item]);

            let sel = Selector::parse("li");
            assert_eq!(session.find_one(Scope::Document, &sel).unwrap(), None);
            assert_eq!(
                session.find_one(Scope::Element(list), &sel).unwrap(),
                Some(item)
            );
            assert_eq!(session.history()[0], "find_one:css:li");
        }

        #[test]
        fn test_route_after_attempts() {
            let session = MockSession::new();
            let node = session.add_node(MockNode::new("late"));
            session.route_after(Scope::Document, "p", &[node], 2);
            let sel = Selector::parse("p");

            assert!(session.find_many(Scope::Document, &sel).unwrap().is_empty());
            assert!(session.find_many(Scope::Document, &sel).unwrap().is_empty());
            assert_eq!(session.find_many(Scope::Document, &sel).unwrap(), vec![node]);
        }

        #[test]
        fn test_input_interactions() {
            let session = MockSession::new();
            let input = session.add_node(MockNode::default().attr("value", "old"));
            session.clear(input).unwrap();
            session.type_text(input, "new").unwrap();
            assert_eq!(session.attribute(input, "value").unwrap().as_deref(), Some("new"));
        }

        #[test]
        fn test_click_toggles_checkbox() {
            let session = MockSession::new();
            let checkbox = session.add_node(MockNode::checkbox(false));
            session.click(checkbox).unwrap();
            assert_eq!(session.peek_attribute(checkbox, "checked").as_deref(), Some("true"));
            session.click(checkbox).unwrap();
            assert_eq!(session.peek_attribute(checkbox, "checked"), None);
        }

        #[test]
        fn test_click_moves_radio_selection_within_group() {
            let session = MockSession::new();
            let small = session.add_node(MockNode::radio("size", "s", true));
            let large = session.add_node(MockNode::radio("size", "l", false));
            let other = session.add_node(MockNode::radio("color", "red", true));
            session.click(large).unwrap();
            assert_eq!(session.peek_attribute(small, "checked"), None);
            assert_eq!(session.peek_attribute(large, "checked").as_deref(), Some("true"));
            assert_eq!(session.peek_attribute(other, "checked").as_deref(), Some("true"));
        }

        #[test]
        fn test_stale_node_is_driver_error() {
            let session = MockSession::new();
            let err = session.text(NodeId::new(42)).unwrap_err();
            assert!(matches!(err, DomapError::Driver { .. }));
        }

        #[test]
        fn test_page_metadata() {
            let session = MockSession::new()
                .with_title("Quotes")
                .with_url("https://quotes.example/")
                .with_source("<html></html>");
            assert_eq!(session.title().unwrap(), "Quotes");
            assert_eq!(session.current_url().unwrap(), "https://quotes.example/");
            assert_eq!(session.page_source().unwrap(), "<html></html>");
            session.navigate("https://quotes.example/page/2").unwrap();
            assert!(session.was_called("navigate:https://quotes.example/page/2"));
        }
    }

    mod frame_guard_tests {
        use super::*;

        #[test]
        fn test_guard_restores_on_success() {
            let session = MockSession::new();
            let outer = session.add_node(MockNode::default());
            let inner = session.add_node(MockNode::default());
            with_frames(&session, &[outer, inner], || {
                assert_eq!(session.current_frames(), vec![outer, inner]);
                Ok(())
            })
            .unwrap();
            assert!(session.current_frames().is_empty());
        }

        #[test]
        fn test_guard_restores_on_failure() {
            let session = MockSession::new();
            let frame = session.add_node(MockNode::default());
            let result: DomapResult<()> = with_frames(&session, &[frame], || {
                Err(DomapError::driver("boom"))
            });
            assert!(result.is_err());
            assert!(session.current_frames().is_empty());
            assert_eq!(session.count_calls("switch_to_default_content"), 1);
        }

        #[test]
        fn test_empty_path_does_not_switch() {
            let session = MockSession::new();
            with_frames(&session, &[], || Ok(())).unwrap();
            assert!(session.history().is_empty());
        }

        #[test]
        fn test_failed_enter_still_restores() {
            let session = MockSession::new();
            let frame = session.add_node(MockNode::default());
            let result = FrameGuard::enter(&session, &[frame, NodeId::new(99)]);
            assert!(result.is_err());
            assert!(session.current_frames().is_empty());
        }
    }
}
