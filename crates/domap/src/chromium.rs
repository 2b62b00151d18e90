//! Blocking [`Session`] over the Chrome DevTools Protocol.
//!
//! The session owns a tokio runtime and blocks on chromiumoxide futures, so
//! containers stay synchronous. Lookups and node operations run as injected
//! JavaScript over a node registry kept on the top-level window:
//!
//! ```text
//! ┌──────────────┐  block_on   ┌──────────────┐  CDP   ┌──────────────┐
//! │ Session call │────────────►│ Page::eval   │───────►│ window       │
//! │ (NodeId)     │◄────────────│ (JSON reply) │◄───────│ .__domap     │
//! └──────────────┘             └──────────────┘        └──────────────┘
//! ```
//!
//! A node id is the index of the element in the registry's list; a map from
//! element to id keeps registration constant time. Navigating away drops the
//! registry, after which older ids report a stale node.
//!
//! Attribute reads of `checked`, `selected` and `value` report the live
//! property, so toggled checkboxes and typed input are seen as they are now.

use std::cell::RefCell;
use std::fmt;

use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::runtime::Runtime;

use crate::driver::{NodeId, Scope, Session};
use crate::result::{DomapError, DomapResult};
use crate::selector::Selector;

/// Environment variable naming the chromium binary
pub const CHROMIUM_PATH_ENV: &str = "CHROMIUM_PATH";

/// Browser launch configuration
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Chromium binary, auto-detected when unset
    pub chromium_path: Option<String>,
    /// Keep the chromium sandbox enabled
    pub sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 800,
            chromium_path: None,
            sandbox: true,
        }
    }
}

impl BrowserConfig {
    /// Default configuration with the chromium path taken from `CHROMIUM_PATH`
    #[must_use]
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var(CHROMIUM_PATH_ENV) {
            Ok(path) if !path.is_empty() => config.with_chromium_path(path),
            _ => config,
        }
    }

    /// Show or hide the browser window
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Window size in CSS pixels
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Use a specific chromium binary
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Launch with `--no-sandbox`, needed inside most containers
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    fn to_cdp(&self) -> DomapResult<CdpConfig> {
        let mut builder =
            CdpConfig::builder().window_size(self.viewport_width, self.viewport_height);
        if !self.headless {
            builder = builder.with_head();
        }
        if !self.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = self.chromium_path {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(DomapError::driver)
    }
}

// ============================================================================
// Injected script
// ============================================================================

/// Helpers shared by every evaluated snippet.
///
/// `args` is bound by the caller before the snippet body runs.
const PRELUDE: &str = r"
const reg = window.__domap || (window.__domap = { list: [], ids: new Map() });
const keep = (el) => {
  let id = reg.ids.get(el);
  if (id === undefined) {
    id = reg.list.length;
    reg.list.push(el);
    reg.ids.set(el, id);
  }
  return id;
};
const node = (id) => {
  const el = reg.list[id];
  if (!el || !el.isConnected) { throw new Error('stale node#' + id); }
  return el;
};
const read = (el, name) => {
  if ((name === 'checked' || name === 'selected') && name in el) { return String(el[name]); }
  if (name === 'value' && 'value' in el) { return el.value == null ? null : String(el.value); }
  return el.getAttribute(name);
};
const context = (frames) => frames.reduce((doc, id) => {
  const inner = node(id).contentDocument;
  if (!inner) { throw new Error('node#' + id + ' is not a same-origin frame'); }
  return inner;
}, document);
const lookup = (args) => {
  const doc = context(args.frames);
  const root = args.scope === null ? doc : node(args.scope);
  const path = args.path;
  switch (args.strategy) {
    case 'xpath': {
      const snap = doc.evaluate(path, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
      const out = [];
      for (let i = 0; i < snap.snapshotLength; i++) { out.push(snap.snapshotItem(i)); }
      return out;
    }
    case 'link text':
      return [...root.querySelectorAll('a')].filter((a) => a.textContent.trim() === path);
    case 'partial link text':
      return [...root.querySelectorAll('a')].filter((a) => a.textContent.includes(path));
    case 'id':
      return [...root.querySelectorAll('[id]')].filter((el) => el.id === path);
    case 'name':
      return [...root.querySelectorAll('[name]')].filter((el) => el.getAttribute('name') === path);
    case 'class name':
      return [...root.querySelectorAll('.' + CSS.escape(path))];
    case 'tag name':
      return [...root.getElementsByTagName(path)];
    default:
      return [...root.querySelectorAll(path)];
  }
};
";

/// Attribute read; form state names go through `read` to the live property.
const ATTRIBUTE_SCRIPT: &str = "return { value: read(node(args.node), args.extra) };";

/// Every snippet answers `{ value: ... }` so `null` survives the CDP round trip
#[derive(Debug, Deserialize)]
struct Reply<T> {
    value: T,
}

// ============================================================================
// Session
// ============================================================================

/// Blocking CDP session driving a single chromium page
pub struct ChromiumSession {
    runtime: Runtime,
    browser: Browser,
    page: CdpPage,
    handler: tokio::task::JoinHandle<()>,
    frames: RefCell<Vec<NodeId>>,
}

impl ChromiumSession {
    /// Launch chromium and open a blank page
    pub fn launch(config: BrowserConfig) -> DomapResult<Self> {
        let runtime = Runtime::new()?;
        let cdp_config = config.to_cdp()?;

        let (browser, mut events) = runtime
            .block_on(Browser::launch(cdp_config))
            .map_err(DomapError::driver)?;

        let handler = runtime.spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = runtime
            .block_on(browser.new_page("about:blank"))
            .map_err(DomapError::driver)?;

        tracing::debug!(headless = config.headless, "chromium session launched");
        Ok(Self {
            runtime,
            browser,
            page,
            handler,
            frames: RefCell::new(Vec::new()),
        })
    }

    /// Close the browser and wait for the process to exit
    pub fn close(mut self) -> DomapResult<()> {
        self.runtime
            .block_on(self.browser.close())
            .map_err(DomapError::driver)?;
        self.handler.abort();
        Ok(())
    }

    fn eval<T: DeserializeOwned>(&self, body: &str, args: serde_json::Value) -> DomapResult<T> {
        let params = EvaluateParams::builder()
            .expression(format!(
                "(() => {{ {PRELUDE}\nconst args = {args};\n{body} }})()"
            ))
            .return_by_value(true)
            .build()
            .map_err(DomapError::driver)?;
        let result = self
            .runtime
            .block_on(self.page.evaluate_expression(params))
            .map_err(DomapError::driver)?;
        let reply: Reply<T> = result.into_value().map_err(DomapError::driver)?;
        Ok(reply.value)
    }

    fn lookup_args(&self, scope: Scope, selector: &Selector) -> serde_json::Value {
        json!({
            "frames": self.frame_ids(),
            "scope": scope.node().map(NodeId::get),
            "strategy": selector.strategy.as_str(),
            "path": selector.path,
        })
    }

    fn frame_ids(&self) -> Vec<u64> {
        self.frames.borrow().iter().map(|frame| frame.get()).collect()
    }

    fn on_node<T: DeserializeOwned>(
        &self,
        node: NodeId,
        body: &str,
        extra: serde_json::Value,
    ) -> DomapResult<T> {
        self.eval(body, json!({ "node": node.get(), "extra": extra }))
    }
}

impl Session for ChromiumSession {
    fn find_one(&self, scope: Scope, selector: &Selector) -> DomapResult<Option<NodeId>> {
        let found: Option<u64> = self.eval(
            "const hit = lookup(args)[0]; return { value: hit ? keep(hit) : null };",
            self.lookup_args(scope, selector),
        )?;
        Ok(found.map(NodeId::new))
    }

    fn find_many(&self, scope: Scope, selector: &Selector) -> DomapResult<Vec<NodeId>> {
        let found: Vec<u64> = self.eval(
            "return { value: lookup(args).map(keep) };",
            self.lookup_args(scope, selector),
        )?;
        Ok(found.into_iter().map(NodeId::new).collect())
    }

    fn text(&self, node: NodeId) -> DomapResult<String> {
        self.on_node(
            node,
            "const el = node(args.node); return { value: el.innerText ?? el.textContent ?? '' };",
            serde_json::Value::Null,
        )
    }

    fn attribute(&self, node: NodeId, name: &str) -> DomapResult<Option<String>> {
        self.on_node(
            node,
            ATTRIBUTE_SCRIPT,
            json!(name),
        )
    }

    fn property(&self, node: NodeId, name: &str) -> DomapResult<Option<String>> {
        self.on_node(
            node,
            "const v = node(args.node)[args.extra]; return { value: v === undefined || v === null ? null : String(v) };",
            json!(name),
        )
    }

    fn clear(&self, node: NodeId) -> DomapResult<()> {
        self.on_node::<bool>(
            node,
            "const el = node(args.node); el.value = ''; \
             el.dispatchEvent(new Event('input', { bubbles: true })); return { value: true };",
            serde_json::Value::Null,
        )
        .map(drop)
    }

    fn type_text(&self, node: NodeId, text: &str) -> DomapResult<()> {
        self.on_node::<bool>(
            node,
            "const el = node(args.node); el.focus(); el.value += args.extra; \
             el.dispatchEvent(new Event('input', { bubbles: true })); \
             el.dispatchEvent(new Event('change', { bubbles: true })); return { value: true };",
            json!(text),
        )
        .map(drop)
    }

    fn click(&self, node: NodeId) -> DomapResult<()> {
        self.on_node::<bool>(
            node,
            "node(args.node).click(); return { value: true };",
            serde_json::Value::Null,
        )
        .map(drop)
    }

    fn submit(&self, node: NodeId) -> DomapResult<()> {
        self.on_node::<bool>(
            node,
            "const el = node(args.node); const form = el.tagName === 'FORM' ? el : el.form; \
             if (!form) { throw new Error('node#' + args.node + ' is not inside a form'); } \
             if (form.requestSubmit) { form.requestSubmit(); } else { form.submit(); } \
             return { value: true };",
            serde_json::Value::Null,
        )
        .map(drop)
    }

    fn switch_to_frame(&self, frame: NodeId) -> DomapResult<()> {
        let mut path = self.frame_ids();
        path.push(frame.get());
        self.eval::<bool>(
            "context(args.frames); return { value: true };",
            json!({ "frames": path }),
        )?;
        self.frames.borrow_mut().push(frame);
        Ok(())
    }

    fn switch_to_default_content(&self) -> DomapResult<()> {
        self.frames.borrow_mut().clear();
        Ok(())
    }

    fn navigate(&self, url: &str) -> DomapResult<()> {
        tracing::debug!(url, "navigating");
        self.runtime
            .block_on(self.page.goto(url))
            .map_err(DomapError::driver)?;
        self.frames.borrow_mut().clear();
        Ok(())
    }

    fn title(&self) -> DomapResult<String> {
        let title = self
            .runtime
            .block_on(self.page.get_title())
            .map_err(DomapError::driver)?;
        Ok(title.unwrap_or_default())
    }

    fn current_url(&self) -> DomapResult<String> {
        let url = self
            .runtime
            .block_on(self.page.url())
            .map_err(DomapError::driver)?;
        Ok(url.unwrap_or_default())
    }

    fn page_source(&self) -> DomapResult<String> {
        self.runtime
            .block_on(self.page.content())
            .map_err(DomapError::driver)
    }
}

impl fmt::Debug for ChromiumSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromiumSession")
            .field("frames", &self.frames.borrow())
            .finish_non_exhaustive()
    }
}
