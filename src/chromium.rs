//! Chromiumoxide-backed implementation of [`PageDriver`].
//!
//! Owns the browser process for the lifetime of one run: launched once at the
//! start, released unconditionally by [`ChromiumDriver::close`], including on
//! failure paths. Network-idle detection is a CDP network-event quiet-window
//! loop bounded by a hard timeout.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::IntoEventKind;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestServedFromCache, EventRequestWillBeSent,
    ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::driver::{DriverError, ElementHandle, LaunchOptions, PageDriver};
use crate::session::SessionCookie;

const PROBE_INTERVAL: Duration = Duration::from_millis(250);
const QUIET_WINDOW: Duration = Duration::from_millis(500);

/// Single-page Chromium session.
pub struct ChromiumDriver {
    browser: Mutex<Option<Browser>>,
    handler: JoinHandle<()>,
    page: Page,
    elements: Mutex<HashMap<u64, Element>>,
    next_handle: AtomicU64,
}

impl ChromiumDriver {
    /// Launch the browser and open the single page the run drives.
    pub async fn launch(options: &LaunchOptions) -> Result<Self, DriverError> {
        let config = build_config(options)?;
        let (browser, handler) = Browser::launch(config).await.map_err(map_cdp_error)?;
        let handler = spawn_handler(handler);

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(map_cdp_error)?;
        let override_ua = SetUserAgentOverrideParams::builder()
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(DriverError::Message)?;
        page.execute(override_ua).await.map_err(map_cdp_error)?;

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            handler,
            page,
            elements: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
        })
    }

    async fn register(&self, element: Element) -> ElementHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed) + 1;
        self.elements.lock().await.insert(id, element);
        ElementHandle::new(id)
    }

    async fn take(&self, handle: ElementHandle) -> Result<Element, DriverError> {
        self.elements
            .lock()
            .await
            .remove(&handle.id())
            .ok_or(DriverError::StaleElement)
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.page.goto(url).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<(), DriverError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut listeners = Vec::new();

        listeners.push(spawn_net_listener(
            self.page
                .event_listener::<EventRequestWillBeSent>()
                .await
                .map_err(map_cdp_error)?,
            tx.clone(),
            |ev: EventRequestWillBeSent| {
                // Long-lived streams never finish and would hold idle off forever.
                if matches!(
                    ev.r#type.as_ref(),
                    Some(ResourceType::WebSocket | ResourceType::EventSource)
                ) {
                    return None;
                }
                Some(NetEvent::Started(ev.request_id.as_ref().to_string()))
            },
        ));
        listeners.push(spawn_net_listener(
            self.page
                .event_listener::<EventLoadingFinished>()
                .await
                .map_err(map_cdp_error)?,
            tx.clone(),
            |ev: EventLoadingFinished| Some(NetEvent::Finished(ev.request_id.as_ref().to_string())),
        ));
        listeners.push(spawn_net_listener(
            self.page
                .event_listener::<EventLoadingFailed>()
                .await
                .map_err(map_cdp_error)?,
            tx.clone(),
            |ev: EventLoadingFailed| Some(NetEvent::Finished(ev.request_id.as_ref().to_string())),
        ));
        listeners.push(spawn_net_listener(
            self.page
                .event_listener::<EventRequestServedFromCache>()
                .await
                .map_err(map_cdp_error)?,
            tx.clone(),
            |ev: EventRequestServedFromCache| {
                Some(NetEvent::Finished(ev.request_id.as_ref().to_string()))
            },
        ));
        drop(tx);

        let mut inflight: HashSet<String> = HashSet::new();
        let mut quiet = Box::pin(time::sleep(QUIET_WINDOW));
        let mut hard_stop = Box::pin(time::sleep(timeout));

        loop {
            tokio::select! {
                maybe_event = rx.recv() => match maybe_event {
                    Some(NetEvent::Started(id)) => {
                        inflight.insert(id);
                    }
                    Some(NetEvent::Finished(id)) => {
                        inflight.remove(&id);
                        if inflight.is_empty() {
                            quiet = Box::pin(time::sleep(QUIET_WINDOW));
                        }
                    }
                    None => break,
                },
                _ = &mut quiet, if inflight.is_empty() => break,
                _ = &mut hard_stop => break,
            }
        }

        for listener in listeners {
            listener.abort();
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.page
            .url()
            .await
            .map_err(map_cdp_error)?
            .ok_or_else(|| DriverError::Message("page reported no URL".to_string()))
    }

    async fn find_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                // A clickable point exists only for rendered, visible nodes.
                if element.clickable_point().await.is_ok() {
                    return Ok(Some(self.register(element).await));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            time::sleep(PROBE_INTERVAL).await;
        }
    }

    async fn click(&self, element: ElementHandle) -> Result<(), DriverError> {
        let element = self.take(element).await?;
        element.click().await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn fill(&self, element: ElementHandle, value: &str) -> Result<(), DriverError> {
        let element = self.take(element).await?;
        element.click().await.map_err(map_cdp_error)?;
        element.type_str(value).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn visible_texts(
        &self,
        selector: &str,
        limit: usize,
    ) -> Result<Vec<String>, DriverError> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(map_cdp_error)?;

        let mut texts = Vec::new();
        for element in elements.into_iter().take(limit) {
            if let Ok(Some(text)) = element.inner_text().await {
                let label = truncate_label(&text, 50);
                if !label.is_empty() {
                    texts.push(label);
                }
            }
        }
        Ok(texts)
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>, DriverError> {
        let cookies = self.page.get_cookies().await.map_err(map_cdp_error)?;
        Ok(cookies
            .into_iter()
            .map(|cookie| SessionCookie {
                name: cookie.name,
                value: cookie.value,
                domain: cookie.domain,
                path: cookie.path,
                expires: cookie_expiry(cookie.expires),
                http_only: cookie.http_only,
                secure: cookie.secure,
            })
            .collect())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page.screenshot(params).await.map_err(map_cdp_error)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.elements.lock().await.clear();
        let browser = { self.browser.lock().await.take() };
        if let Some(mut browser) = browser {
            if let Err(err) = browser.close().await {
                eprintln!("browser close failed: {err}");
            }
            let _ = browser.wait().await;
        }
        self.handler.abort();
        Ok(())
    }
}

enum NetEvent {
    Started(String),
    Finished(String),
}

fn spawn_net_listener<T, F>(
    mut stream: EventStream<T>,
    tx: mpsc::UnboundedSender<NetEvent>,
    map: F,
) -> JoinHandle<()>
where
    T: IntoEventKind + Clone + Unpin + Send + 'static,
    F: Fn(T) -> Option<NetEvent> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            let owned = (*event).clone();
            if let Some(mapped) = map(owned) {
                if tx.send(mapped).is_err() {
                    break;
                }
            }
        }
    })
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                eprintln!("chromiumoxide handler error: {err}");
            }
        }
    })
}

fn build_config(options: &LaunchOptions) -> Result<BrowserConfig, DriverError> {
    let viewport = chromiumoxide::handler::viewport::Viewport {
        width: options.viewport.width,
        height: options.viewport.height,
        device_scale_factor: None,
        emulating_mobile: false,
        is_landscape: options.viewport.width >= options.viewport.height,
        has_touch: false,
    };

    let mut builder = BrowserConfig::builder();
    if let Some(path) = &options.chrome_executable {
        builder = builder.chrome_executable(path);
    }
    let builder = builder.viewport(viewport).args(options.args.clone());
    let builder = if options.headless {
        builder
    } else {
        builder.with_head()
    };

    builder.build().map_err(DriverError::Message)
}

fn map_cdp_error<E: std::fmt::Display>(err: E) -> DriverError {
    DriverError::Message(err.to_string())
}

/// CDP reports session-scoped cookies with a negative expiry.
fn cookie_expiry(expires: f64) -> Option<f64> {
    (expires >= 0.0).then_some(expires)
}

fn truncate_label(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}
