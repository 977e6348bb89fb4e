//! # pagesense
#![allow(clippy::uninlined_format_args)]
//!
//! Perception layer for browser automation agents: a stable, compact,
//! addressable view of the interactive elements on a live page.
//!
//! ## Pipeline
//!
//! 1. **Settle** ([`stability`]): wait for DOM mutations and network
//!    activity to go quiet, bounded by a timeout. Never fails.
//! 2. **Tag** ([`tagger`]): stamp every visible interactive element with a
//!    monotonically increasing `data-ps-id` that survives re-renders,
//!    shadow roots and frames.
//! 3. **Extract** ([`extraction`]): pull the accessibility tree and a
//!    DOM/layout snapshot concurrently, correlate them by backend node
//!    handle and prune to the viewport.
//! 4. **Fall back** ([`fusion`]): when the protocol path fails, fuse
//!    whatever accessibility data exists with a direct DOM enumeration.
//! 5. **Serialize** ([`serializer`]): single-letter keys, abbreviated roles,
//!    and a hard ceiling on payload size.
//!
//! [`perceiver::Perceiver`] runs all of it against any [`session::DebugSession`].
//!
//! ## CLI Usage
//!
//! ```bash
//! # Extract the interactive elements of a page
//! pagesense extract "https://example.com"
//!
//! # Whole page, not just the viewport
//! pagesense extract "https://example.com" --full-page --viewport 1280x800
//!
//! # Key to the compact output
//! pagesense legend
//!
//! # Check a saved payload against the size ceiling
//! pagesense check-size extraction.json
//!
//! # Wait for a page to settle and report how long it took
//! pagesense wait-stable "https://example.com" --timeout 5000
//!
//! # List the stable identities on a page
//! pagesense tags "https://example.com"
//! ```
//!
//! ## Library Usage
//!
//! ```no_run
//! use pagesense::cdp::{ChromeInstance, LaunchOptions};
//! use pagesense::{PerceptionConfig, Perceiver};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let chrome = ChromeInstance::launch(&LaunchOptions::default()).await?;
//! let session = chrome.open("https://example.com").await?;
//!
//! let perceiver = Perceiver::new(session, PerceptionConfig::default());
//! let perception = perceiver.perceive().await?;
//! for node in &perception.result.nodes {
//!     println!("{} {} {}", node.i, node.r, node.n);
//! }
//! # Ok(())
//! # }
//! ```

/// Live browser backend over the Chrome DevTools Protocol
pub mod cdp;

/// Pipeline configuration
pub mod config;

/// In-memory page model
pub mod dom;

/// Error types and exit codes
pub mod errors;

/// Page activity notifications
pub mod events;

/// Accessibility tree + layout snapshot extraction
pub mod extraction;

/// Accessibility/DOM fusion and coverage analysis
pub mod fusion;

/// End-to-end orchestration
pub mod perceiver;

/// Role vocabulary
pub mod roles;

/// Scripts evaluated in the page
pub mod scripts;

/// CSS selector subset
pub mod selector;

/// Compact wire format and size guard
pub mod serializer;

/// The debug-session capability
pub mod session;

/// DOM/layout snapshot model and page mirror
pub mod snapshot;

/// Waiting for the page to settle
pub mod stability;

/// Stable identity tagging
pub mod tagger;

/// Shared value types
pub mod types;

pub use config::PerceptionConfig;
pub use errors::{PerceptionError, ProtocolCall, ProtocolError};
pub use extraction::{ExtractionConfig, ExtractionResult, ProtocolExtractor};
pub use perceiver::{Perceiver, Perception, PerceptionPath};
pub use serializer::{SemanticNode, SizeLimits, legend, validate_size};
pub use session::{AxNode, DebugSession};
pub use stability::{StabilityConfig, StabilityResult, wait_for_page_ready, wait_for_stability};
pub use tagger::{TaggerConfig, TaggingContext};
pub use types::{BoundingBox, OutputFormat, PageMetadata, ViewportSize};
