//! Waiting for the page to settle.
//!
//! Every wait here resolves; none of them error. A `false`/unstable result
//! means "proceed on a best-effort basis".

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::dom::SharedDocument;
use crate::events::{EventFeed, FeedItem, ReadyState};
use crate::selector::SelectorList;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Give up after this long and report `stable: false`
    pub timeout_ms: u64,
    /// Required quiet period with no DOM mutation
    pub stability_threshold_ms: u64,
    /// Never report stable before this much time has passed
    pub min_wait_ms: u64,
    pub wait_for_network_idle: bool,
    /// Required quiet period with no network activity
    pub network_idle_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            stability_threshold_ms: 300,
            min_wait_ms: 100,
            wait_for_network_idle: true,
            network_idle_ms: 500,
            poll_interval_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityResult {
    pub stable: bool,
    pub wait_time_ms: u64,
    pub mutation_count: u64,
}

/// Wait until neither the DOM nor the network has been active for the
/// configured thresholds, or until the timeout.
pub async fn wait_for_stability(mut feed: EventFeed, config: &StabilityConfig) -> StabilityResult {
    let start = Instant::now();
    if !feed.is_attached() {
        debug!("Document body not available; skipping stability wait");
        return StabilityResult {
            stable: false,
            wait_time_ms: 0,
            mutation_count: 0,
        };
    }

    let threshold = Duration::from_millis(config.stability_threshold_ms);
    let network_idle = Duration::from_millis(config.network_idle_ms);
    let min_wait = Duration::from_millis(config.min_wait_ms);
    let timeout = Duration::from_millis(config.timeout_ms);

    let mut last_mutation = start;
    // No network activity seen yet counts as idle
    let mut last_network: Option<Instant> = None;
    let mut mutation_count = 0u64;
    let mut feed_open = true;

    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            item = feed.recv(), if feed_open => match item {
                Some(FeedItem::Event(event)) if event.is_mutation() => {
                    mutation_count += 1;
                    last_mutation = Instant::now();
                }
                Some(FeedItem::Event(event)) if event.is_network() => {
                    if config.wait_for_network_idle {
                        last_network = Some(Instant::now());
                    }
                }
                Some(FeedItem::Event(_)) => {}
                Some(FeedItem::Lagged(n)) => {
                    mutation_count += n;
                    last_mutation = Instant::now();
                }
                None => feed_open = false,
            },
            _ = ticker.tick() => {
                let now = Instant::now();
                let elapsed = now - start;
                let dom_quiet = now - last_mutation >= threshold;
                let network_quiet = !config.wait_for_network_idle
                    || last_network.is_none_or(|t| now - t >= network_idle);

                if elapsed >= min_wait && dom_quiet && network_quiet {
                    debug!(
                        "Page stable after {}ms ({} mutations)",
                        elapsed.as_millis(),
                        mutation_count
                    );
                    return StabilityResult {
                        stable: true,
                        wait_time_ms: elapsed.as_millis() as u64,
                        mutation_count,
                    };
                }
                if elapsed >= timeout {
                    info!(
                        "Page did not settle within {}ms ({} mutations); continuing",
                        config.timeout_ms, mutation_count
                    );
                    return StabilityResult {
                        stable: false,
                        wait_time_ms: elapsed.as_millis() as u64,
                        mutation_count,
                    };
                }
            }
        }
    }
}

/// Read-only questions a waiter can ask a page
#[async_trait]
pub trait PageProbe: Send + Sync {
    async fn has_selector(&self, selector: &str) -> Result<bool>;
    async fn has_text(&self, text: &str) -> Result<bool>;
    async fn ready_state(&self) -> Result<ReadyState>;
    /// A fresh subscription to the page's activity
    async fn activity(&self) -> EventFeed;
}

#[async_trait]
impl PageProbe for SharedDocument {
    async fn has_selector(&self, selector: &str) -> Result<bool> {
        let selector = SelectorList::parse(selector)?;
        let doc = self.lock().await;
        Ok(!doc.query_selector_all(doc.root(), &selector).is_empty())
    }

    async fn has_text(&self, text: &str) -> Result<bool> {
        Ok(self.lock().await.contains_text(text))
    }

    async fn ready_state(&self) -> Result<ReadyState> {
        Ok(self.lock().await.ready_state())
    }

    async fn activity(&self) -> EventFeed {
        self.lock().await.event_feed()
    }
}

/// Poll `predicate` until it holds or `timeout` elapses
pub async fn wait_for_condition<F, Fut>(mut predicate: F, timeout: Duration, interval: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

pub async fn wait_for_selector<P: PageProbe + ?Sized>(
    probe: &P,
    selector: &str,
    timeout: Duration,
    interval: Duration,
) -> bool {
    wait_for_condition(
        || async move {
            probe.has_selector(selector).await.unwrap_or_else(|e| {
                debug!("Selector probe for '{}' failed: {}", selector, e);
                false
            })
        },
        timeout,
        interval,
    )
    .await
}

pub async fn wait_for_text<P: PageProbe + ?Sized>(
    probe: &P,
    text: &str,
    timeout: Duration,
    interval: Duration,
) -> bool {
    wait_for_condition(
        || async move {
            probe.has_text(text).await.unwrap_or_else(|e| {
                debug!("Text probe failed: {}", e);
                false
            })
        },
        timeout,
        interval,
    )
    .await
}

/// Wait for `readyState == complete`, then for DOM/network quiet.
/// Both phases share the configured timeout.
pub async fn wait_for_page_ready<P: PageProbe + ?Sized>(
    probe: &P,
    config: &StabilityConfig,
) -> StabilityResult {
    let start = Instant::now();
    let timeout = Duration::from_millis(config.timeout_ms);
    let interval = Duration::from_millis(config.poll_interval_ms.max(1));

    let loaded = wait_for_condition(
        || async move {
            matches!(probe.ready_state().await, Ok(ReadyState::Complete))
        },
        timeout,
        interval,
    )
    .await;

    let spent = start.elapsed();
    if !loaded {
        info!("Document did not finish loading within {}ms", config.timeout_ms);
        return StabilityResult {
            stable: false,
            wait_time_ms: spent.as_millis() as u64,
            mutation_count: 0,
        };
    }

    let remaining = StabilityConfig {
        timeout_ms: config.timeout_ms.saturating_sub(spent.as_millis() as u64),
        ..config.clone()
    };
    let mut result = wait_for_stability(probe.activity().await, &remaining).await;
    result.wait_time_ms += spent.as_millis() as u64;
    result
}

#[cfg(test)]
#[path = "stability_test.rs"]
mod stability_test;
