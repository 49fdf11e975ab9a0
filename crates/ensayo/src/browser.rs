//! Chromium backend over the DevTools protocol (feature `browser`).

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, RemoteObject,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::result::{EngineError, EnsayoResult};
use crate::session::{
    BrowserSession, ConsoleEvent, ConsoleLevel, ConsoleStream, SessionAllocator,
};

/// Browser launch settings taken from [`EngineConfig`]
#[derive(Debug, Clone)]
struct LaunchOptions {
    headless: bool,
    viewport_width: u32,
    viewport_height: u32,
    chromium_path: Option<PathBuf>,
}

#[derive(Debug)]
struct Running {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// Launches one Chromium and hands out a fresh page per session
#[derive(Debug)]
pub struct ChromiumAllocator {
    options: LaunchOptions,
    running: RwLock<Option<Running>>,
    started: AtomicBool,
}

impl ChromiumAllocator {
    /// Allocator configured from the engine config
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            options: LaunchOptions {
                headless: config.headless,
                viewport_width: config.viewport_width,
                viewport_height: config.viewport_height,
                chromium_path: config.chromium_path.clone(),
            },
            running: RwLock::new(None),
            started: AtomicBool::new(false),
        }
    }

    fn launch_config(&self) -> EnsayoResult<BrowserConfig> {
        let options = &self.options;
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(options.viewport_width, options.viewport_height)
            .viewport(Viewport {
                width: options.viewport_width,
                height: options.viewport_height,
                ..Viewport::default()
            });

        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.chromium_path {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| EngineError::protocol("launch", e))
    }
}

#[async_trait]
impl SessionAllocator for ChromiumAllocator {
    async fn start(&self) -> EnsayoResult<()> {
        let mut running = self.running.write().await;
        if running.is_some() {
            return Ok(());
        }

        let (browser, mut handler) = Browser::launch(self.launch_config()?)
            .await
            .map_err(|e| EngineError::protocol("launch", e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::info!(headless = self.options.headless, "browser launched");
        *running = Some(Running { browser, handler });
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn open(&self) -> EnsayoResult<Arc<dyn BrowserSession>> {
        let running = self.running.read().await;
        let Some(running) = running.as_ref() else {
            return Err(EngineError::precondition("browser not started"));
        };
        let page = running
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| EngineError::protocol("open", e.to_string()))?;
        Ok(Arc::new(ChromiumSession { page }))
    }

    async fn stop(&self) -> EnsayoResult<()> {
        let Some(mut running) = self.running.write().await.take() else {
            return Ok(());
        };
        self.started.store(false, Ordering::SeqCst);

        if let Err(e) = running.browser.close().await {
            tracing::warn!(error = %e, "failed to close browser");
        }
        let _ = running.browser.wait().await;
        running.handler.abort();
        tracing::info!("browser stopped");
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

/// One Chromium page
#[derive(Debug, Clone)]
pub struct ChromiumSession {
    page: Page,
}

fn js_string(value: &str) -> EnsayoResult<String> {
    serde_json::to_string(value).map_err(|e| EngineError::configuration(e.to_string()))
}

fn visibility_script(selector: &str) -> EnsayoResult<String> {
    Ok(format!(
        "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
         const style = window.getComputedStyle(el); const rect = el.getBoundingClientRect(); \
         return style.display !== 'none' && style.visibility !== 'hidden' && \
         (rect.width > 0 || rect.height > 0); }})()",
        sel = js_string(selector)?
    ))
}

fn set_value_script(selector: &str, value: &str) -> EnsayoResult<String> {
    Ok(format!(
        "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
         el.value = {val}; \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
         return true; }})()",
        sel = js_string(selector)?,
        val = js_string(value)?
    ))
}

/// Render console call arguments the way DevTools prints them
fn console_message(args: &[RemoteObject]) -> String {
    args.iter()
        .filter_map(|arg| match &arg.value {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => arg.description.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

const fn console_level(kind: &ConsoleApiCalledType) -> ConsoleLevel {
    match kind {
        ConsoleApiCalledType::Error => ConsoleLevel::Error,
        ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
        ConsoleApiCalledType::Info => ConsoleLevel::Info,
        ConsoleApiCalledType::Debug => ConsoleLevel::Debug,
        _ => ConsoleLevel::Log,
    }
}

impl ChromiumSession {
    async fn evaluate<T: DeserializeOwned>(&self, action: &str, script: String) -> EnsayoResult<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| EngineError::protocol(action, e.to_string()))?
            .into_value()
            .map_err(|e| EngineError::protocol(action, e.to_string()))
    }

    async fn element(&self, action: &str, selector: &str) -> EnsayoResult<chromiumoxide::Element> {
        self.page
            .find_element(selector)
            .await
            .map_err(|e| EngineError::protocol(action, format!("element not found: {selector}: {e}")))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> EnsayoResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| EngineError::protocol("navigate", e.to_string()))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> EnsayoResult<()> {
        self.element("click", selector)
            .await?
            .click()
            .await
            .map_err(|e| EngineError::protocol("click", e.to_string()))?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> EnsayoResult<()> {
        let element = self.element("type", selector).await?;
        element
            .click()
            .await
            .map_err(|e| EngineError::protocol("type", e.to_string()))?;
        element
            .type_str(text)
            .await
            .map_err(|e| EngineError::protocol("type", e.to_string()))?;
        Ok(())
    }

    async fn hover(&self, selector: &str) -> EnsayoResult<()> {
        self.element("hover", selector)
            .await?
            .hover()
            .await
            .map_err(|e| EngineError::protocol("hover", e.to_string()))?;
        Ok(())
    }

    async fn set_value(&self, selector: &str, value: &str) -> EnsayoResult<()> {
        let found: bool = self
            .evaluate("set_value", set_value_script(selector, value)?)
            .await?;
        if found {
            Ok(())
        } else {
            Err(EngineError::protocol(
                "set_value",
                format!("element not found: {selector}"),
            ))
        }
    }

    async fn is_visible(&self, selector: &str) -> EnsayoResult<bool> {
        self.evaluate("is_visible", visibility_script(selector)?).await
    }

    async fn element_exists(&self, selector: &str) -> EnsayoResult<bool> {
        let script = format!("document.querySelector({}) !== null", js_string(selector)?);
        self.evaluate("element_exists", script).await
    }

    async fn text(&self, selector: &str) -> EnsayoResult<String> {
        Ok(self
            .element("text", selector)
            .await?
            .inner_text()
            .await
            .map_err(|e| EngineError::protocol("text", e.to_string()))?
            .unwrap_or_default())
    }

    async fn body_text(&self) -> EnsayoResult<Option<String>> {
        self.evaluate(
            "body_text",
            "document.body ? document.body.innerText : null".to_string(),
        )
        .await
    }

    async fn attribute(&self, selector: &str, name: &str) -> EnsayoResult<Option<String>> {
        self.element("attribute", selector)
            .await?
            .attribute(name)
            .await
            .map_err(|e| EngineError::protocol("attribute", e.to_string()))
    }

    async fn current_url(&self) -> EnsayoResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(|e| EngineError::protocol("url", e.to_string()))?
            .unwrap_or_default())
    }

    async fn title(&self) -> EnsayoResult<String> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(|e| EngineError::protocol("title", e.to_string()))?
            .unwrap_or_default())
    }

    /// Full-page PNG, including content below the fold
    async fn screenshot(&self) -> EnsayoResult<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| EngineError::protocol("screenshot", e.to_string()))
    }

    async fn html(&self) -> EnsayoResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| EngineError::protocol("html", e.to_string()))
    }

    async fn console_events(&self) -> EnsayoResult<ConsoleStream> {
        let events = self
            .page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(|e| EngineError::protocol("console", e.to_string()))?;
        Ok(events
            .map(|event| ConsoleEvent::new(console_level(&event.r#type), console_message(&event.args)))
            .boxed())
    }

    async fn close(&self) -> EnsayoResult<()> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| EngineError::protocol("close", e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_escape_selector() {
        let script = visibility_script(r#"a[title="x'y"]"#).unwrap();
        assert!(script.contains(r#"document.querySelector("a[title=\"x'y\"]")"#));

        let script = set_value_script("#q", "line\nbreak").unwrap();
        assert!(script.contains(r#"el.value = "line\nbreak";"#));
    }

    #[test]
    fn test_console_level_mapping() {
        assert_eq!(console_level(&ConsoleApiCalledType::Error), ConsoleLevel::Error);
        assert_eq!(console_level(&ConsoleApiCalledType::Warning), ConsoleLevel::Warning);
        assert_eq!(console_level(&ConsoleApiCalledType::Log), ConsoleLevel::Log);
        assert_eq!(console_level(&ConsoleApiCalledType::Assert), ConsoleLevel::Log);
    }

    #[tokio::test]
    async fn test_allocator_not_started() {
        let allocator = ChromiumAllocator::new(&EngineConfig::default());
        assert!(!allocator.is_started());
        let err = allocator.open().await.err().unwrap();
        assert!(matches!(err, EngineError::EnginePrecondition { .. }));
    }

    const TALL_PAGE: &str =
        "data:text/html,<body style='margin:0'><div style='height:2000px;background:red'></div></body>";

    #[tokio::test]
    #[ignore = "Launches a local Chromium"]
    async fn test_screenshot_covers_full_page() {
        let allocator = ChromiumAllocator::new(&EngineConfig::default().with_viewport(320, 240));
        allocator.start().await.unwrap();
        let session = allocator.open().await.unwrap();
        session.navigate(TALL_PAGE).await.unwrap();

        let png = session.screenshot().await.unwrap();
        let image = image::load_from_memory(&png).unwrap();
        assert!(image.height() >= 2000, "height {}", image.height());

        session.close().await.unwrap();
        allocator.stop().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Launches a local Chromium"]
    async fn test_workers_open_pages_concurrently() {
        let allocator = ChromiumAllocator::new(&EngineConfig::default());
        allocator.start().await.unwrap();

        let sessions = futures::future::join_all((0..4).map(|_| allocator.open())).await;
        for session in sessions {
            session.unwrap().close().await.unwrap();
        }
        allocator.stop().await.unwrap();
    }
}
