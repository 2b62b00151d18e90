//! Container instances.
//!
//! A [`WebArea`] binds a compiled [`Schema`] to a session and a search root.
//! It holds no field values: each read is a fresh lookup, and nested
//! containers are built anew every time their parent field is read.
//! [`Area`] is the typed wrapper used with static container types.

use regex::{Captures, Regex};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::{Arc, OnceLock};

use crate::accessor::{self, mismatch, FieldValue, FromField, Write};
use crate::coerce::Value;
use crate::config::Kind;
use crate::driver::{with_frames, NodeId, Scope, Session};
use crate::result::{DomapError, DomapResult};
use crate::schema::{unknown_field, Container, Schema, Variant};
use crate::wait::PollOptions;

/// Container instance bound to a session and a scope
#[derive(Debug, Clone)]
pub struct WebArea {
    session: Rc<dyn Session>,
    scope: Scope,
    frames: Vec<NodeId>,
    schema: Arc<Schema>,
    poll: PollOptions,
}

impl WebArea {
    /// Bind `schema` to the whole document of `session`
    #[must_use]
    pub fn new(session: Rc<dyn Session>, schema: Arc<Schema>) -> Self {
        Self {
            session,
            scope: Scope::Document,
            frames: Vec::new(),
            schema,
            poll: PollOptions::default(),
        }
    }

    /// Bind `schema` to the subtree of a resolved node
    #[must_use]
    pub fn within(session: Rc<dyn Session>, schema: Arc<Schema>, node: NodeId) -> Self {
        Self {
            scope: Scope::Element(node),
            ..Self::new(session, schema)
        }
    }

    /// Set the polling options used by every lookup of this area and its children
    #[must_use]
    pub const fn with_poll(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    /// Owning session
    #[must_use]
    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    /// Search root
    #[must_use]
    pub const fn scope(&self) -> Scope {
        self.scope
    }

    /// Frames entered before every lookup, outermost first
    #[must_use]
    pub fn frames(&self) -> &[NodeId] {
        &self.frames
    }

    /// Compiled schema
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub(crate) const fn poll(&self) -> PollOptions {
        self.poll
    }

    pub(crate) fn child(&self, schema: &Arc<Schema>, scope: Scope, frame: Option<NodeId>) -> Self {
        let mut frames = self.frames.clone();
        frames.extend(frame);
        Self {
            session: Rc::clone(&self.session),
            scope,
            frames,
            schema: Arc::clone(schema),
            poll: self.poll,
        }
    }

    /// Read a field
    pub fn get(&self, name: &str) -> DomapResult<FieldValue> {
        let field = self
            .schema
            .field(name)
            .ok_or_else(|| unknown_field(&self.schema, name))?;
        accessor::read(self, field)
    }

    /// Read a field as a Rust type
    pub fn get_as<T: FromField>(&self, name: &str) -> DomapResult<T> {
        T::from_field(name, self.get(name)?)
    }

    /// Write an input, checkbox or radio field
    pub fn set(&self, name: &str, value: impl Into<Write>) -> DomapResult<()> {
        let field = self
            .schema
            .field(name)
            .ok_or_else(|| unknown_field(&self.schema, name))?;
        accessor::write(self, field, value.into())
    }

    /// Read every field into a plain value, recursing into nested containers.
    ///
    /// Raw node fields are left out.
    pub fn dump(&self) -> DomapResult<Value> {
        let mut object = std::collections::BTreeMap::new();
        for field in self.schema.fields() {
            if field.config.kind == Kind::Node {
                continue;
            }
            let value = match accessor::read(self, field)? {
                FieldValue::Value(value) => value,
                FieldValue::Area(area) => area.dump()?,
                FieldValue::Areas(areas) => Value::List(
                    areas
                        .iter()
                        .map(Self::dump)
                        .collect::<DomapResult<Vec<_>>>()?,
                ),
            };
            let _ = object.insert(field.name().to_string(), value);
        }
        Ok(Value::Object(object))
    }

    fn require(&self, variant: Variant, operation: &str) -> DomapResult<()> {
        if self.schema.variant == variant {
            Ok(())
        } else {
            Err(DomapError::InvalidScope {
                message: format!(
                    "{operation} is only available on a {variant}, '{}' is a {}",
                    self.schema.name, self.schema.variant
                ),
            })
        }
    }

    /// Title of the current page
    pub fn title(&self) -> DomapResult<String> {
        self.require(Variant::Page, "title")?;
        self.session.title()
    }

    /// Source of the current page
    pub fn source(&self) -> DomapResult<String> {
        self.require(Variant::Page, "source")?;
        self.session.page_source()
    }

    /// URL of the current page
    pub fn current_url(&self) -> DomapResult<String> {
        self.session.current_url()
    }

    /// Navigate to the page URL, substituting `{name}` placeholders from `params`
    pub fn open(&self, params: &[(&str, &str)]) -> DomapResult<()> {
        self.require(Variant::Page, "open")?;
        let template = self.schema.url.as_deref().ok_or_else(|| DomapError::InvalidScope {
            message: format!("page '{}' has no url", self.schema.name),
        })?;
        let url = expand_url(template, params)?;
        tracing::debug!(page = %self.schema.name, %url, "opening page");
        self.session.navigate(&url)
    }

    /// Submit the form this area is bound to
    pub fn submit(&self) -> DomapResult<()> {
        self.require(Variant::Form, "submit")?;
        let Scope::Element(node) = self.scope else {
            return Err(DomapError::InvalidScope {
                message: format!("form '{}' is not bound to a node", self.schema.name),
            });
        };
        with_frames(self.session(), &self.frames, || self.session.submit(node))
    }
}

fn placeholder() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{(\w+)\}").ok())
        .as_ref()
}

fn expand_url(template: &str, params: &[(&str, &str)]) -> DomapResult<String> {
    let Some(re) = placeholder() else {
        return Ok(template.to_string());
    };
    let mut missing = None;
    let url = re.replace_all(template, |caps: &Captures<'_>| {
        let key = &caps[1];
        if let Some((_, value)) = params.iter().find(|(name, _)| *name == key) {
            return (*value).to_string();
        }
        if missing.is_none() {
            missing = Some(key.to_string());
        }
        String::new()
    });
    match missing {
        Some(key) => Err(DomapError::config(
            "url",
            format!("no value given for placeholder '{{{key}}}'"),
        )),
        None => Ok(url.into_owned()),
    }
}

// =============================================================================
// TYPED AREAS
// =============================================================================

/// Marker for containers exposing page metadata and navigation
pub trait Page: Container {}

/// Marker for containers that can be submitted
pub trait Form: Container {}

/// Typed container instance
pub struct Area<C> {
    inner: WebArea,
    _container: PhantomData<fn() -> C>,
}

impl<C: Container> Area<C> {
    /// Bind `C` to the whole document of `session`
    pub fn new(session: Rc<dyn Session>) -> DomapResult<Self> {
        Ok(Self::wrap(WebArea::new(session, C::schema()?)))
    }

    /// Bind `C` to the subtree of a resolved node
    pub fn within(session: Rc<dyn Session>, node: NodeId) -> DomapResult<Self> {
        Ok(Self::wrap(WebArea::within(session, C::schema()?, node)))
    }

    /// Type a dynamic area, checking that it was built from `C`
    pub fn from_web(area: WebArea) -> DomapResult<Self> {
        if area.schema.name == C::NAME {
            Ok(Self::wrap(area))
        } else {
            Err(mismatch::<C>(&area.schema.name))
        }
    }

    const fn wrap(inner: WebArea) -> Self {
        Self {
            inner,
            _container: PhantomData,
        }
    }

    /// Set the polling options
    #[must_use]
    pub fn with_poll(self, poll: PollOptions) -> Self {
        Self::wrap(self.inner.with_poll(poll))
    }

    /// Dynamic view of this area
    #[must_use]
    pub const fn as_web(&self) -> &WebArea {
        &self.inner
    }

    /// Unwrap into the dynamic area
    #[must_use]
    pub fn into_web(self) -> WebArea {
        self.inner
    }

    /// Read a field
    pub fn get(&self, name: &str) -> DomapResult<FieldValue> {
        self.inner.get(name)
    }

    /// Read a field as a Rust type
    pub fn get_as<T: FromField>(&self, name: &str) -> DomapResult<T> {
        self.inner.get_as(name)
    }

    /// Write an input, checkbox or radio field
    pub fn set(&self, name: &str, value: impl Into<Write>) -> DomapResult<()> {
        self.inner.set(name, value)
    }

    /// Read every field into a plain value
    pub fn dump(&self) -> DomapResult<Value> {
        self.inner.dump()
    }

    /// URL of the current page
    pub fn current_url(&self) -> DomapResult<String> {
        self.inner.current_url()
    }
}

impl<C: Page> Area<C> {
    /// Title of the current page
    pub fn title(&self) -> DomapResult<String> {
        self.inner.title()
    }

    /// Source of the current page
    pub fn source(&self) -> DomapResult<String> {
        self.inner.source()
    }

    /// Navigate to the page URL
    pub fn open(&self, params: &[(&str, &str)]) -> DomapResult<()> {
        self.inner.open(params)
    }
}

impl<C: Form> Area<C> {
    /// Submit the form
    pub fn submit(&self) -> DomapResult<()> {
        self.inner.submit()
    }
}

impl<C> Clone for Area<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _container: PhantomData,
        }
    }
}

impl<C> fmt::Debug for Area<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Area")
            .field("container", &self.inner.schema.name)
            .field("scope", &self.inner.scope)
            .finish_non_exhaustive()
    }
}

impl FromField for WebArea {
    fn from_field(field: &str, value: FieldValue) -> DomapResult<Self> {
        match value {
            FieldValue::Area(area) => Ok(area),
            _ => Err(mismatch::<Self>(field)),
        }
    }
}

impl<C: Container> FromField for Area<C> {
    fn from_field(field: &str, value: FieldValue) -> DomapResult<Self> {
        match value {
            FieldValue::Area(area) => Self::from_web(area),
            _ => Err(mismatch::<Self>(field)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::accessor::Action;
    use crate::config::{Declared, Directive};
    use crate::driver::{MockNode, MockSession};
    use crate::schema::SchemaBuilder;

    struct Quote;

    impl Container for Quote {
        const NAME: &'static str = "Quote";
        const VARIANT: Variant = Variant::Component;

        fn declare(builder: SchemaBuilder) -> SchemaBuilder {
            builder
                .field("text", Declared::text(), [Directive::css("span.text")])
                .field("author", Declared::text(), [Directive::css("small.author")])
                .field(
                    "tags",
                    Declared::text().many(),
                    [Directive::css("a.tag"), Directive::default(Vec::<String>::new())],
                )
                .field("node", Declared::node(), [Directive::css("span.text")])
        }
    }

    struct QuotesPage;

    impl Container for QuotesPage {
        const NAME: &'static str = "QuotesPage";
        const VARIANT: Variant = Variant::Page;

        fn declare(builder: SchemaBuilder) -> SchemaBuilder {
            builder
                .url("https://quotes.example/page/{page}/")
                .field(
                    "quotes",
                    Declared::component::<Quote>().many(),
                    [Directive::css("div.quote")],
                )
                .field(
                    "next",
                    Declared::link().optional(),
                    [Directive::css("li.next > a")],
                )
        }
    }

    impl Page for QuotesPage {}

    struct Login;

    impl Container for Login {
        const NAME: &'static str = "Login";
        const VARIANT: Variant = Variant::Form;

        fn declare(builder: SchemaBuilder) -> SchemaBuilder {
            builder
                .field("username", Declared::input_value(), [Directive::css("#username")])
                .field("remember", Declared::checkbox(), [Directive::css("#remember")])
                .field("heading", Declared::text(), [Directive::css("h2")])
        }
    }

    impl Form for Login {}

    fn quotes_session() -> (Rc<MockSession>, Vec<NodeId>) {
        let session = Rc::new(
            MockSession::new()
                .with_title("Quotes to Scrape")
                .with_url("https://quotes.example/"),
        );
        let mut quotes = Vec::new();
        for (text, author, tags) in [
            ("The world as we have created it", "Albert Einstein", vec!["change", "world"]),
            ("It is our choices", "J.K. Rowling", vec![]),
        ] {
            let quote = session.add_node(MockNode::new(""));
            let text_node = session.add_node(MockNode::new(text));
            let author_node = session.add_node(MockNode::new(author));
            session.route(Scope::Element(quote), "span.text", &[text_node]);
            session.route(Scope::Element(quote), "small.author", &[author_node]);
            let tag_nodes: Vec<_> = tags
                .into_iter()
                .map(|t| session.add_node(MockNode::new(t)))
                .collect();
            session.route(Scope::Element(quote), "a.tag", &tag_nodes);
            quotes.push(quote);
        }
        session.route(Scope::Document, "div.quote", &quotes);
        (session, quotes)
    }

    mod read_tests {
        use super::*;

        #[test]
        fn test_structural_many_builds_fresh_children() {
            let (session, quotes) = quotes_session();
            let page = Area::<QuotesPage>::new(session).unwrap();
            let children: Vec<Area<Quote>> = page.get_as("quotes").unwrap();
            assert_eq!(children.len(), 2);
            assert_eq!(children[0].as_web().scope(), Scope::Element(quotes[0]));
            assert_eq!(children[1].as_web().scope(), Scope::Element(quotes[1]));
            assert_eq!(
                children[1].get_as::<String>("author").unwrap(),
                "J.K. Rowling"
            );
        }

        #[test]
        fn test_default_empty_list() {
            let (session, _) = quotes_session();
            let page = Area::<QuotesPage>::new(session).unwrap();
            let children: Vec<Area<Quote>> = page.get_as("quotes").unwrap();
            assert_eq!(
                children[0].get_as::<Vec<String>>("tags").unwrap(),
                vec!["change", "world"]
            );
            assert!(children[1].get_as::<Vec<String>>("tags").unwrap().is_empty());
        }

        #[test]
        fn test_optional_absent_is_none() {
            let (session, _) = quotes_session();
            let page = Area::<QuotesPage>::new(session).unwrap();
            assert_eq!(page.get_as::<Option<String>>("next").unwrap(), None);
        }

        #[test]
        fn test_reads_are_not_cached() {
            let (session, _) = quotes_session();
            let page = Area::<QuotesPage>::new(session.clone()).unwrap();
            let quote = page.get_as::<Vec<Area<Quote>>>("quotes").unwrap().remove(0);
            let before = session.count_calls("find_one:css:span.text");
            let _ = quote.get_as::<String>("text").unwrap();
            let _ = quote.get_as::<String>("text").unwrap();
            assert_eq!(session.count_calls("find_one:css:span.text"), before + 2);
        }

        #[test]
        fn test_unknown_field() {
            let (session, _) = quotes_session();
            let page = Area::<QuotesPage>::new(session).unwrap();
            assert!(matches!(
                page.get("missing").unwrap_err(),
                DomapError::Configuration { .. }
            ));
        }
    }

    mod dump_tests {
        use super::*;

        #[test]
        fn test_dump_recurses_and_skips_nodes() {
            let (session, _) = quotes_session();
            let page = Area::<QuotesPage>::new(session).unwrap();
            let json = page.dump().unwrap().to_json().unwrap();
            assert_eq!(
                json,
                serde_json::json!({
                    "next": null,
                    "quotes": [
                        {
                            "author": "Albert Einstein",
                            "tags": ["change", "world"],
                            "text": "The world as we have created it",
                        },
                        {
                            "author": "J.K. Rowling",
                            "tags": [],
                            "text": "It is our choices",
                        },
                    ],
                })
            );
        }
    }

    mod page_tests {
        use super::*;

        #[test]
        fn test_metadata_comes_from_session() {
            let (session, _) = quotes_session();
            let page = Area::<QuotesPage>::new(session).unwrap();
            assert_eq!(page.title().unwrap(), "Quotes to Scrape");
            assert_eq!(page.current_url().unwrap(), "https://quotes.example/");
        }

        #[test]
        fn test_open_substitutes_placeholders() {
            let (session, _) = quotes_session();
            let page = Area::<QuotesPage>::new(session.clone()).unwrap();
            page.open(&[("page", "2")]).unwrap();
            assert_eq!(
                session.current_url().unwrap(),
                "https://quotes.example/page/2/"
            );
        }

        #[test]
        fn test_open_missing_placeholder() {
            let (session, _) = quotes_session();
            let page = Area::<QuotesPage>::new(session).unwrap();
            let err = page.open(&[]).unwrap_err();
            assert!(err.to_string().contains("{page}"));
        }

        #[test]
        fn test_dynamic_component_rejects_page_metadata() {
            let (session, quotes) = quotes_session();
            let quote = WebArea::within(session, Quote::schema().unwrap(), quotes[0]);
            assert!(matches!(
                quote.title().unwrap_err(),
                DomapError::InvalidScope { .. }
            ));
        }
    }

    mod write_tests {
        use super::*;

        fn login_session() -> (Rc<MockSession>, NodeId, NodeId, NodeId) {
            let session = Rc::new(MockSession::new());
            let form = session.add_node(MockNode::new(""));
            let username = session.add_node(MockNode::default().attr("value", "guest"));
            let remember = session.add_node(MockNode::checkbox(false));
            session.route(Scope::Element(form), "#username", &[username]);
            session.route(Scope::Element(form), "#remember", &[remember]);
            (session, form, username, remember)
        }

        #[test]
        fn test_input_round_trip() {
            let (session, form, _, _) = login_session();
            let login = Area::<Login>::within(session.clone(), form).unwrap();
            assert_eq!(login.get_as::<String>("username").unwrap(), "guest");
            login.set("username", "alice").unwrap();
            assert_eq!(login.get_as::<String>("username").unwrap(), "alice");
            assert!(session.was_called("clear:"));
        }

        #[test]
        fn test_input_action() {
            let (session, form, username, _) = login_session();
            let login = Area::<Login>::within(session.clone(), form).unwrap();
            login.set("username", Action::new("submit")).unwrap();
            assert!(session.was_called(&format!("submit:{}", username.get())));
            let err = login.set("username", Action::new("hover")).unwrap_err();
            assert!(matches!(err, DomapError::UnknownInteraction { .. }));
        }

        #[test]
        fn test_checkbox_is_idempotent() {
            let (session, form, _, _) = login_session();
            let login = Area::<Login>::within(session.clone(), form).unwrap();
            login.set("remember", false).unwrap();
            assert_eq!(session.count_calls("click:"), 0);
            login.set("remember", true).unwrap();
            assert_eq!(session.count_calls("click:"), 1);
            assert!(login.get_as::<bool>("remember").unwrap());
            login.set("remember", true).unwrap();
            assert_eq!(session.count_calls("click:"), 1);
        }

        #[test]
        fn test_leaf_and_structural_are_unsettable() {
            let (session, form, _, _) = login_session();
            let login = Area::<Login>::within(session, form).unwrap();
            let err = login.set("heading", "x").unwrap_err();
            assert!(matches!(err, DomapError::Unsettable { kind: "leaf", .. }));

            let (quotes, _) = quotes_session();
            let page = Area::<QuotesPage>::new(quotes).unwrap();
            let err = page.set("quotes", "x").unwrap_err();
            assert!(matches!(err, DomapError::Unsettable { kind: "structural", .. }));
        }

        #[test]
        fn test_write_ignores_default() {
            let session = Rc::new(MockSession::new());
            let schema = Arc::new(
                Schema::builder("Search", Variant::Component)
                    .field(
                        "query",
                        Declared::input_value(),
                        [Directive::css("input.q"), Directive::default("")],
                    )
                    .build()
                    .unwrap(),
            );
            let area = WebArea::new(session, schema);
            assert_eq!(area.get_as::<String>("query").unwrap(), "");
            assert!(area.set("query", "rust").unwrap_err().is_not_found());
        }

        #[test]
        fn test_submit_form() {
            let (session, form, _, _) = login_session();
            let login = Area::<Login>::within(session.clone(), form).unwrap();
            login.submit().unwrap();
            assert!(session.was_called(&format!("submit:{}", form.get())));

            let unbound = Area::<Login>::new(session).unwrap();
            assert!(matches!(
                unbound.submit().unwrap_err(),
                DomapError::InvalidScope { .. }
            ));
        }
    }

    mod frame_tests {
        use super::*;

        struct Widget;

        impl Container for Widget {
            const NAME: &'static str = "Widget";
            const VARIANT: Variant = Variant::Component;

            fn declare(builder: SchemaBuilder) -> SchemaBuilder {
                builder.field("label", Declared::text(), [Directive::css("p.label")])
            }
        }

        struct Host;

        impl Container for Host {
            const NAME: &'static str = "Host";
            const VARIANT: Variant = Variant::Page;

            fn declare(builder: SchemaBuilder) -> SchemaBuilder {
                builder.field(
                    "widget",
                    Declared::component::<Widget>(),
                    [Directive::css("iframe#widget"), Directive::Frame],
                )
            }
        }

        #[test]
        fn test_frame_field_reads_inside_frame() {
            let session = Rc::new(MockSession::new());
            let frame = session.add_node(MockNode::new(""));
            let label = session.add_node(MockNode::new("inside"));
            session.route(Scope::Document, "iframe#widget", &[frame]);
            session.route_in_frames(&[frame], Scope::Document, "p.label", &[label], 0);

            let host = Area::<Host>::new(session.clone()).unwrap();
            let widget: Area<Widget> = host.get_as("widget").unwrap();
            assert_eq!(widget.as_web().frames(), &[frame]);
            assert_eq!(widget.get_as::<String>("label").unwrap(), "inside");
            assert!(session.current_frames().is_empty());
        }

        #[test]
        fn test_frame_restored_after_failure() {
            let session = Rc::new(MockSession::new());
            let frame = session.add_node(MockNode::new(""));
            session.route(Scope::Document, "iframe#widget", &[frame]);

            let host = Area::<Host>::new(session.clone()).unwrap();
            let widget: Area<Widget> = host.get_as("widget").unwrap();
            assert!(widget.get("label").unwrap_err().is_not_found());
            assert!(session.current_frames().is_empty());
        }
    }
}
