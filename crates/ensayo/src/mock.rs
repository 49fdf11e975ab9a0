//! Scripted in-memory browser for testing scripts without Chromium.
//!
//! A [`MockSession`] holds a tiny fake page: URL, title, elements addressed
//! by exact selector string, body text, serialized HTML and a screenshot.
//! Reactions (click-to-navigate, delayed text, console output, injected
//! failures) are configured up front with `with_*` builders.
//!
//! ```
//! use ensayo::mock::{MockElement, MockSession};
//!
//! let session = MockSession::new()
//!     .with_title("Home")
//!     .with_element("#title", MockElement::text("Welcome"));
//! assert!(session.calls().is_empty());
//! ```

use async_trait::async_trait;
use futures::StreamExt;
use image::ImageEncoder;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::result::{EngineError, EnsayoResult};
use crate::session::{BrowserSession, ConsoleEvent, ConsoleStream, SessionAllocator};

/// Encode a solid-color PNG
pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> EnsayoResult<Vec<u8>> {
    let pixels: Vec<u8> = rgba
        .iter()
        .copied()
        .cycle()
        .take(width as usize * height as usize * 4)
        .collect();
    let mut buffer = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buffer)
        .write_image(&pixels, width, height, image::ExtendedColorType::Rgba8)
        .map_err(|e| EngineError::image(format!("Failed to encode image: {e}")))?;
    Ok(buffer)
}

/// One fake DOM element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockElement {
    /// Text content
    pub text: String,
    /// Whether the element is rendered
    pub visible: bool,
    /// Attributes
    pub attributes: HashMap<String, String>,
    /// Form value
    pub value: String,
}

impl MockElement {
    /// Visible element with text
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visible: true,
            ..Self::default()
        }
    }

    /// Mark the element as not rendered
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    url: String,
    title: String,
    elements: HashMap<String, MockElement>,
    pages: HashMap<String, String>,
    body_text: Option<String>,
    html: String,
    screenshot: Vec<u8>,
    calls: Vec<String>,
    click_navigations: HashMap<String, String>,
    click_console: HashMap<String, String>,
    navigate_console: Vec<String>,
    delayed_text: Vec<(String, String, Instant)>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    navigate_error: Option<String>,
    latency: Duration,
    subscribers: Vec<mpsc::UnboundedSender<ConsoleEvent>>,
    closed: bool,
}

/// Scripted [`BrowserSession`]
#[derive(Debug)]
pub struct MockSession {
    state: Mutex<MockState>,
    created: Instant,
    active: Option<Arc<AtomicUsize>>,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    /// Blank page with a 16x16 white screenshot
    #[must_use]
    pub fn new() -> Self {
        let state = MockState {
            url: "about:blank".to_string(),
            body_text: Some(String::new()),
            html: "<html><head></head><body></body></html>".to_string(),
            screenshot: solid_png(16, 16, [255, 255, 255, 255]).unwrap_or_default(),
            ..MockState::default()
        };
        Self {
            state: Mutex::new(state),
            created: Instant::now(),
            active: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn configure(self, f: impl FnOnce(&mut MockState)) -> Self {
        f(&mut self.state());
        self
    }

    /// Set the current URL
    #[must_use]
    pub fn with_url(self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.configure(|s| s.url = url)
    }

    /// Set the document title
    #[must_use]
    pub fn with_title(self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.configure(|s| s.title = title)
    }

    /// Add an element
    #[must_use]
    pub fn with_element(self, selector: impl Into<String>, element: MockElement) -> Self {
        let selector = selector.into();
        self.configure(|s| {
            s.elements.insert(selector, element);
        })
    }

    /// Title to show after navigating to `url`
    #[must_use]
    pub fn with_page(self, url: impl Into<String>, title: impl Into<String>) -> Self {
        let (url, title) = (url.into(), title.into());
        self.configure(|s| {
            s.pages.insert(url, title);
        })
    }

    /// Set the body text; `None` models a body that never becomes ready
    #[must_use]
    pub fn with_body(self, body: Option<String>) -> Self {
        self.configure(|s| s.body_text = body)
    }

    /// Set the body text
    #[must_use]
    pub fn with_body_text(self, body: impl Into<String>) -> Self {
        self.with_body(Some(body.into()))
    }

    /// Set the serialized DOM
    #[must_use]
    pub fn with_html(self, html: impl Into<String>) -> Self {
        let html = html.into();
        self.configure(|s| s.html = html)
    }

    /// Set the screenshot bytes
    #[must_use]
    pub fn with_screenshot(self, png: Vec<u8>) -> Self {
        self.configure(|s| s.screenshot = png)
    }

    /// Clicking `selector` navigates to `url`
    #[must_use]
    pub fn with_click_navigation(self, selector: impl Into<String>, url: impl Into<String>) -> Self {
        let (selector, url) = (selector.into(), url.into());
        self.configure(|s| {
            s.click_navigations.insert(selector, url);
        })
    }

    /// Clicking `selector` logs a console error
    #[must_use]
    pub fn with_console_on_click(
        self,
        selector: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let (selector, message) = (selector.into(), message.into());
        self.configure(|s| {
            s.click_console.insert(selector, message);
        })
    }

    /// Every navigation logs a console error
    #[must_use]
    pub fn with_console_on_navigate(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.configure(|s| s.navigate_console.push(message))
    }

    /// Text of `selector` becomes `text` once `delay` has elapsed
    #[must_use]
    pub fn with_delayed_text(
        self,
        selector: impl Into<String>,
        text: impl Into<String>,
        delay: Duration,
    ) -> Self {
        let at = self.created + delay;
        let (selector, text) = (selector.into(), text.into());
        self.configure(|s| s.delayed_text.push((selector, text, at)))
    }

    /// Any call touching `selector` fails with a protocol error
    #[must_use]
    pub fn with_failing_selector(self, selector: impl Into<String>) -> Self {
        let selector = selector.into();
        self.configure(|s| {
            s.failing.insert(selector);
        })
    }

    /// Clicking `selector` panics
    #[must_use]
    pub fn with_panic_on_click(self, selector: impl Into<String>) -> Self {
        let selector = selector.into();
        self.configure(|s| {
            s.panicking.insert(selector);
        })
    }

    /// Navigation fails with `message`
    #[must_use]
    pub fn with_navigate_error(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.configure(|s| s.navigate_error = Some(message))
    }

    /// Every call sleeps for `latency` first
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.configure(|s| s.latency = latency)
    }

    /// Emit a console event to every subscriber
    pub fn emit_console(&self, event: ConsoleEvent) {
        self.state()
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Mutating calls made so far, e.g. `"click #submit"`
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Whether [`BrowserSession::close`] was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Current value of a form control
    #[must_use]
    pub fn value(&self, selector: &str) -> Option<String> {
        self.state().elements.get(selector).map(|e| e.value.clone())
    }

    async fn latency(&self) {
        let latency = self.state().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }

    fn element(&self, action: &str, selector: &str) -> EnsayoResult<MockElement> {
        let state = self.state();
        if state.failing.contains(selector) {
            return Err(EngineError::protocol(
                action,
                format!("injected failure for {selector}"),
            ));
        }
        let mut element = state
            .elements
            .get(selector)
            .cloned()
            .ok_or_else(|| EngineError::protocol(action, format!("element not found: {selector}")))?;
        let now = Instant::now();
        if let Some((_, text, _)) = state
            .delayed_text
            .iter()
            .rev()
            .find(|(sel, _, at)| sel == selector && now >= *at)
        {
            element.text.clone_from(text);
        }
        Ok(element)
    }

    fn go_to(&self, url: &str) {
        let messages = {
            let mut state = self.state();
            state.url = url.to_string();
            if let Some(title) = state.pages.get(url).cloned() {
                state.title = title;
            }
            state.navigate_console.clone()
        };
        for message in messages {
            self.emit_console(ConsoleEvent::error(message));
        }
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&self, url: &str) -> EnsayoResult<()> {
        self.latency().await;
        self.record(format!("navigate {url}"));
        if let Some(message) = self.state().navigate_error.clone() {
            return Err(EngineError::protocol("navigate", message));
        }
        self.go_to(url);
        Ok(())
    }

    async fn click(&self, selector: &str) -> EnsayoResult<()> {
        self.latency().await;
        self.element("click", selector)?;
        self.record(format!("click {selector}"));

        let (panics, navigation, console) = {
            let state = self.state();
            (
                state.panicking.contains(selector),
                state.click_navigations.get(selector).cloned(),
                state.click_console.get(selector).cloned(),
            )
        };
        if panics {
            panic!("scripted panic clicking {selector}");
        }
        if let Some(message) = console {
            self.emit_console(ConsoleEvent::error(message));
        }
        if let Some(url) = navigation {
            self.go_to(&url);
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> EnsayoResult<()> {
        self.latency().await;
        self.element("type", selector)?;
        self.record(format!("type {selector} {text}"));
        if let Some(element) = self.state().elements.get_mut(selector) {
            element.value.push_str(text);
        }
        Ok(())
    }

    async fn hover(&self, selector: &str) -> EnsayoResult<()> {
        self.latency().await;
        self.element("hover", selector)?;
        self.record(format!("hover {selector}"));
        Ok(())
    }

    async fn set_value(&self, selector: &str, value: &str) -> EnsayoResult<()> {
        self.latency().await;
        self.element("set_value", selector)?;
        self.record(format!("set_value {selector} {value}"));
        if let Some(element) = self.state().elements.get_mut(selector) {
            element.value = value.to_string();
        }
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> EnsayoResult<bool> {
        self.latency().await;
        match self.element("is_visible", selector) {
            Ok(element) => Ok(element.visible),
            Err(_) if !self.state().failing.contains(selector) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn element_exists(&self, selector: &str) -> EnsayoResult<bool> {
        self.latency().await;
        let state = self.state();
        if state.failing.contains(selector) {
            return Err(EngineError::protocol(
                "element_exists",
                format!("injected failure for {selector}"),
            ));
        }
        Ok(state.elements.contains_key(selector))
    }

    async fn text(&self, selector: &str) -> EnsayoResult<String> {
        self.latency().await;
        Ok(self.element("text", selector)?.text)
    }

    async fn body_text(&self) -> EnsayoResult<Option<String>> {
        self.latency().await;
        Ok(self.state().body_text.clone())
    }

    async fn attribute(&self, selector: &str, name: &str) -> EnsayoResult<Option<String>> {
        self.latency().await;
        Ok(self
            .element("attribute", selector)?
            .attributes
            .get(name)
            .cloned())
    }

    async fn current_url(&self) -> EnsayoResult<String> {
        self.latency().await;
        Ok(self.state().url.clone())
    }

    async fn title(&self) -> EnsayoResult<String> {
        self.latency().await;
        Ok(self.state().title.clone())
    }

    async fn screenshot(&self) -> EnsayoResult<Vec<u8>> {
        self.latency().await;
        Ok(self.state().screenshot.clone())
    }

    async fn html(&self) -> EnsayoResult<String> {
        self.latency().await;
        Ok(self.state().html.clone())
    }

    async fn console_events(&self) -> EnsayoResult<ConsoleStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().subscribers.push(tx);
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed())
    }

    async fn close(&self) -> EnsayoResult<()> {
        let was_closed = {
            let mut state = self.state();
            let was_closed = state.closed;
            state.closed = true;
            state.subscribers.clear();
            state.calls.push("close".to_string());
            was_closed
        };
        if !was_closed {
            if let Some(active) = &self.active {
                active.fetch_sub(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// Builds a session for the n-th `open` call (0-based)
pub type SessionFactory = Arc<dyn Fn(usize) -> MockSession + Send + Sync>;

/// [`SessionAllocator`] handing out [`MockSession`]s
pub struct MockAllocator {
    factory: SessionFactory,
    started: AtomicBool,
    start_error: Option<String>,
    opened: Mutex<Vec<Arc<MockSession>>>,
    active: Arc<AtomicUsize>,
    peak: AtomicUsize,
    stops: AtomicUsize,
}

impl fmt::Debug for MockAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockAllocator")
            .field("started", &self.started)
            .field("opened", &self.open_count())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl Default for MockAllocator {
    fn default() -> Self {
        Self::new(|_| MockSession::new())
    }
}

impl MockAllocator {
    /// Allocator building sessions with `factory`
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(usize) -> MockSession + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            started: AtomicBool::new(false),
            start_error: None,
            opened: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            peak: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    /// `start` fails with `message`
    #[must_use]
    pub fn with_start_error(mut self, message: impl Into<String>) -> Self {
        self.start_error = Some(message.into());
        self
    }

    fn opened(&self) -> MutexGuard<'_, Vec<Arc<MockSession>>> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sessions opened so far, in open order
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.opened().clone()
    }

    /// Number of sessions opened
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opened().len()
    }

    /// Number of opened sessions that were closed
    #[must_use]
    pub fn closed_count(&self) -> usize {
        self.opened().iter().filter(|s| s.is_closed()).count()
    }

    /// Most sessions open at the same time
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of effective `stop` calls
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionAllocator for MockAllocator {
    async fn start(&self) -> EnsayoResult<()> {
        if let Some(message) = &self.start_error {
            return Err(EngineError::protocol("start", message.clone()));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn open(&self) -> EnsayoResult<Arc<dyn BrowserSession>> {
        if !self.is_started() {
            return Err(EngineError::precondition("browser not started"));
        }
        let session = {
            let mut opened = self.opened();
            let mut session = (self.factory)(opened.len());
            session.active = Some(Arc::clone(&self.active));
            let session = Arc::new(session);
            opened.push(Arc::clone(&session));
            session
        };
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(session)
    }

    async fn stop(&self) -> EnsayoResult<()> {
        if self.started.swap(false, Ordering::SeqCst) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}
