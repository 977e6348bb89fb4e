//! Chrome DevTools Protocol backend for [`DebugSession`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::accessibility::{
    EnableParams as AxEnableParams, GetFullAxTreeParams,
};
use chromiumoxide::cdp::browser_protocol::dom::{
    BackendNodeId, EventAttributeModified, EventAttributeRemoved, EventCharacterDataModified,
    EventChildNodeInserted, EventChildNodeRemoved, EventDocumentUpdated, GetDocumentParams,
    ResolveNodeParams,
};
use chromiumoxide::cdp::browser_protocol::dom_snapshot::CaptureSnapshotParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{ProtocolCall, ProtocolError};
use crate::events::{EventFeed, EventHub, PageEvent, ReadyState};
use crate::scripts;
use crate::session::{AxNode, DebugSession};
use crate::snapshot::DomSnapshot;
use crate::stability::PageProbe;
use crate::types::ViewportSize;

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub viewport: Option<ViewportSize>,
    /// Browser executable; auto-detected when `None`
    pub chrome_path: Option<PathBuf>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: None,
            chrome_path: None,
        }
    }
}

/// A launched browser and the task driving its connection
pub struct ChromeInstance {
    browser: Browser,
    handler_task: JoinHandle<()>,
    _profile_dir: tempfile::TempDir,
}

impl ChromeInstance {
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        info!("Launching Chrome (headless: {})", options.headless);

        // Unique profile per run; Chrome refuses to share a user-data-dir
        let profile_dir = tempfile::Builder::new()
            .prefix("pagesense-chrome-")
            .tempdir()
            .context("Failed to create Chrome profile directory")?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(profile_dir.path())
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(vp) = options.viewport {
            builder = builder.window_size(vp.width, vp.height);
        }
        if let Some(path) = &options.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid browser configuration: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch Chrome")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser connection event error: {}", e);
                }
            }
            debug!("Browser connection closed");
        });

        Ok(Self {
            browser,
            handler_task,
            _profile_dir: profile_dir,
        })
    }

    /// Open `url` in a new tab and attach a session to it
    pub async fn open(&self, url: &str) -> Result<CdpSession> {
        debug!("Opening {}", url);
        let page = self
            .browser
            .new_page(url)
            .await
            .with_context(|| format!("Failed to open {}", url))?;
        if let Err(e) = page.wait_for_navigation().await {
            debug!("Navigation wait failed, continuing: {}", e);
        }
        CdpSession::attach(page).await
    }

    pub async fn close(mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        self.handler_task.abort();
        Ok(())
    }
}

/// Spawn a task republishing one protocol event type into the hub
macro_rules! forward_events {
    ($page:expr, $hub:expr, $event:ty, |$ev:ident| $map:expr) => {{
        let mut stream = $page.event_listener::<$event>().await?;
        let hub = $hub.clone();
        tokio::spawn(async move {
            while let Some($ev) = stream.next().await {
                hub.publish($map);
            }
        })
    }};
}

/// A debug session bound to one page
pub struct CdpSession {
    page: Page,
    hub: EventHub,
    listeners: Vec<JoinHandle<()>>,
}

impl CdpSession {
    /// Enable the DOM and network domains and start relaying their events
    pub async fn attach(page: Page) -> Result<Self> {
        let hub = EventHub::new();

        page.execute(NetworkEnableParams::default())
            .await
            .context("Failed to enable network events")?;
        // Mutation events only fire for nodes the client has been sent
        page.execute(GetDocumentParams::builder().depth(-1).pierce(true).build())
            .await
            .context("Failed to load the DOM tree")?;

        let listeners = vec![
            forward_events!(page, hub, EventChildNodeInserted, |_ev| PageEvent::ChildList {
                target: None,
                added: 1,
                removed: 0,
            }),
            forward_events!(page, hub, EventChildNodeRemoved, |_ev| PageEvent::ChildList {
                target: None,
                added: 0,
                removed: 1,
            }),
            forward_events!(page, hub, EventDocumentUpdated, |_ev| PageEvent::ChildList {
                target: None,
                added: 1,
                removed: 0,
            }),
            forward_events!(page, hub, EventAttributeModified, |ev| PageEvent::Attributes {
                target: None,
                name: ev.name.clone(),
            }),
            forward_events!(page, hub, EventAttributeRemoved, |ev| PageEvent::Attributes {
                target: None,
                name: ev.name.clone(),
            }),
            forward_events!(page, hub, EventCharacterDataModified, |_ev| {
                PageEvent::CharacterData { target: None }
            }),
            forward_events!(page, hub, EventRequestWillBeSent, |ev| PageEvent::RequestStarted {
                url: ev.request.url.clone(),
            }),
            forward_events!(page, hub, EventLoadingFinished, |ev| PageEvent::ResourceLoaded {
                url: ev.request_id.inner().clone(),
            }),
            forward_events!(page, hub, EventLoadingFailed, |ev| PageEvent::ResourceLoaded {
                url: ev.request_id.inner().clone(),
            }),
        ];

        Ok(Self {
            page,
            hub,
            listeners,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        Ok(())
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        for task in &self.listeners {
            task.abort();
        }
    }
}

#[async_trait]
impl DebugSession for CdpSession {
    async fn enable_accessibility(&self) -> Result<(), ProtocolError> {
        self.page
            .execute(AxEnableParams::default())
            .await
            .map_err(|e| ProtocolError::new(ProtocolCall::EnableAccessibility, e.to_string()))?;
        Ok(())
    }

    async fn full_accessibility_tree(&self) -> Result<Vec<AxNode>, ProtocolError> {
        let call = ProtocolCall::GetFullAxTree;
        let response = self
            .page
            .execute(GetFullAxTreeParams::default())
            .await
            .map_err(|e| ProtocolError::new(call, e.to_string()))?;
        let raw = serde_json::to_value(&response.result.nodes)
            .map_err(|e| ProtocolError::new(call, e.to_string()))?;
        serde_json::from_value(raw).map_err(|e| ProtocolError::new(call, e.to_string()))
    }

    async fn capture_snapshot(&self, computed_styles: &[&str]) -> Result<DomSnapshot, ProtocolError> {
        let call = ProtocolCall::CaptureSnapshot;
        let params = CaptureSnapshotParams::builder()
            .computed_styles(computed_styles.iter().map(|s| s.to_string()))
            .build()
            .map_err(|e| ProtocolError::new(call, e))?;
        let response = self
            .page
            .execute(params)
            .await
            .map_err(|e| ProtocolError::new(call, e.to_string()))?;
        let raw = serde_json::to_value(&response.result)
            .map_err(|e| ProtocolError::new(call, e.to_string()))?;
        serde_json::from_value(raw).map_err(|e| ProtocolError::new(call, e.to_string()))
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, ProtocolError> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| ProtocolError::new(ProtocolCall::Evaluate, e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn resolve_node(&self, backend_node_id: i64) -> Result<Option<String>, ProtocolError> {
        let params = ResolveNodeParams::builder()
            .backend_node_id(BackendNodeId::new(backend_node_id))
            .build();
        let response = self
            .page
            .execute(params)
            .await
            .map_err(|e| ProtocolError::new(ProtocolCall::ResolveNode, e.to_string()))?;
        Ok(response
            .result
            .object
            .object_id
            .as_ref()
            .map(|id| id.inner().clone()))
    }
}

#[async_trait]
impl PageProbe for CdpSession {
    async fn has_selector(&self, selector: &str) -> Result<bool> {
        let found = self.evaluate(&scripts::selector_probe(selector)).await?;
        Ok(found.as_bool().unwrap_or(false))
    }

    async fn has_text(&self, text: &str) -> Result<bool> {
        let found = self.evaluate(&scripts::text_probe(text)).await?;
        Ok(found.as_bool().unwrap_or(false))
    }

    async fn ready_state(&self) -> Result<ReadyState> {
        let state = self.evaluate(scripts::READY_STATE_SCRIPT).await?;
        Ok(ReadyState::parse(state.as_str().unwrap_or_default()))
    }

    async fn activity(&self) -> EventFeed {
        let attached = match self.evaluate(scripts::BODY_PRESENT_SCRIPT).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(e) => {
                debug!("Body check failed: {}", e);
                false
            }
        };
        self.hub.feed(attached)
    }
}
