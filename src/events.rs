//! Page activity notifications.
//!
//! Both the in-memory page model and the live debug session publish into an
//! [`EventHub`]; the stability waiter and the auto-tagger consume it through
//! an [`EventFeed`]. Consumers never depend on where the events came from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::dom::NodeId;

const HUB_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    pub fn parse(s: &str) -> Self {
        match s {
            "complete" => ReadyState::Complete,
            "interactive" => ReadyState::Interactive,
            _ => ReadyState::Loading,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// Structural change; counts cover whole inserted/removed subtrees
    ChildList {
        target: Option<NodeId>,
        added: usize,
        removed: usize,
    },
    Attributes {
        target: Option<NodeId>,
        name: String,
    },
    CharacterData {
        target: Option<NodeId>,
    },
    RequestStarted {
        url: String,
    },
    ResourceLoaded {
        url: String,
    },
    ReadyState(ReadyState),
}

impl PageEvent {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            PageEvent::ChildList { .. } | PageEvent::Attributes { .. } | PageEvent::CharacterData { .. }
        )
    }

    pub fn is_network(&self) -> bool {
        matches!(
            self,
            PageEvent::RequestStarted { .. } | PageEvent::ResourceLoaded { .. }
        )
    }
}

/// Fan-out point for page activity
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<PageEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: PageEvent) {
        // No subscribers is the normal idle case
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.tx.subscribe()
    }

    /// A feed for a page whose body may or may not exist yet
    pub fn feed(&self, attached: bool) -> EventFeed {
        EventFeed {
            rx: self.subscribe(),
            attached,
        }
    }
}

/// One subscriber's view of page activity
#[derive(Debug)]
pub struct EventFeed {
    rx: broadcast::Receiver<PageEvent>,
    attached: bool,
}

/// Outcome of waiting on a feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Event(PageEvent),
    /// Events were dropped because the subscriber fell behind
    Lagged(u64),
}

impl EventFeed {
    /// False when the page had no body at subscription time
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Next activity item, or `None` once every publisher is gone
    pub async fn recv(&mut self) -> Option<FeedItem> {
        match self.rx.recv().await {
            Ok(event) => Some(FeedItem::Event(event)),
            Err(broadcast::error::RecvError::Lagged(n)) => Some(FeedItem::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    fn try_recv(&mut self) -> Option<FeedItem> {
        match self.rx.try_recv() {
            Ok(event) => Some(FeedItem::Event(event)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Some(FeedItem::Lagged(n)),
            Err(_) => None,
        }
    }
}

/// A batch of structural changes delivered together
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added_nodes: usize,
    pub removed_nodes: usize,
    pub attribute_changes: usize,
    pub text_changes: usize,
}

impl ChangeSet {
    pub fn has_additions(&self) -> bool {
        self.added_nodes > 0
    }

    pub fn merge(&mut self, other: ChangeSet) {
        self.added_nodes += other.added_nodes;
        self.removed_nodes += other.removed_nodes;
        self.attribute_changes += other.attribute_changes;
        self.text_changes += other.text_changes;
    }

    fn record(&mut self, item: &FeedItem) {
        match item {
            FeedItem::Event(PageEvent::ChildList { added, removed, .. }) => {
                self.added_nodes += added;
                self.removed_nodes += removed;
            }
            FeedItem::Event(PageEvent::Attributes { .. }) => self.attribute_changes += 1,
            FeedItem::Event(PageEvent::CharacterData { .. }) => self.text_changes += 1,
            FeedItem::Event(_) => {}
            // Unknown losses are treated as growth so nothing goes untagged
            FeedItem::Lagged(n) => self.added_nodes += *n as usize,
        }
    }
}

/// Anything that can deliver batched structural change notifications.
///
/// Implemented for page event feeds (native notifications) and for plain
/// channels, which lets a polling loop or a protocol event stream drive the
/// auto-tagger.
#[async_trait]
pub trait ChangeSource: Send {
    /// Wait for the next batch; `None` ends the subscription.
    async fn next_batch(&mut self) -> Option<ChangeSet>;
}

#[async_trait]
impl ChangeSource for EventFeed {
    async fn next_batch(&mut self) -> Option<ChangeSet> {
        loop {
            let first = self.recv().await?;
            let mut batch = ChangeSet::default();
            batch.record(&first);
            while let Some(item) = self.try_recv() {
                batch.record(&item);
            }
            if batch != ChangeSet::default() {
                return Some(batch);
            }
            debug!("Ignoring non-structural page activity");
        }
    }
}

#[async_trait]
impl ChangeSource for mpsc::Receiver<ChangeSet> {
    async fn next_batch(&mut self) -> Option<ChangeSet> {
        self.recv().await
    }
}
