//! Restart-safe, strictly ordered tailing of append-only server logs.
//!
//! This crate is the ingestion core of logtail. It watches log directories,
//! fans change notifications out to one sequential worker per source, and
//! delivers every new line exactly once, in file order, to a host-supplied
//! [`LineApplier`](lt_core::LineApplier), across restarts, rotation and
//! truncation.
//!
//! # Overview
//!
//! - [`RotationDetector`] decides whether a file is a continuation or a new
//!   generation, from its creation marker and its size.
//! - [`CatchupProcessor`] decides, on first contact with a source, whether
//!   the tail of the log is an in-progress session worth replaying, and
//!   replays it in catch-up mode.
//! - [`ServerStateTracker`] tracks per-source activity and fires callbacks
//!   on active/inactive transitions.
//! - [`Watcher`] owns the file-system subscription and drives the other three
//!   around each read pass.
//!
//! # Crate Dependencies
//!
//! ```text
//! lt-cli ──► lt-tail ──► lt-core
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use lt_core::{Config, SourceId, SourceWatchState, StateStore};
//! use lt_tail::{JsonFileStateStore, MemorySessionRepository, Watcher};
//! # use lt_core::{ApplyContext, ApplyError, LineApplier, LivenessProbe, ProbeError, ServerStatus};
//! # struct Parser;
//! # #[async_trait::async_trait]
//! # impl LineApplier for Parser {
//! #     async fn apply(&self, _: &ApplyContext, _: &str) -> Result<(), ApplyError> { Ok(()) }
//! # }
//! # struct Rcon;
//! # #[async_trait::async_trait]
//! # impl LivenessProbe for Rcon {
//! #     async fn query(&self, _: &str) -> Result<ServerStatus, ProbeError> { Ok(ServerStatus::default()) }
//! # }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(camino::Utf8Path::new("logtail.json"))?;
//! let store = Arc::new(JsonFileStateStore::open(config.state_path.clone()).await?);
//! store
//!     .save(&SourceWatchState::new(SourceId::new("server-1"), "/srv/logs/server-1.log"))
//!     .await?;
//!
//! let mut watcher = Watcher::builder(config, store, Arc::new(Parser))
//!     .catchup(Arc::new(Rcon), Arc::new(MemorySessionRepository::new()))
//!     .build()?;
//! watcher.add_path("/srv/logs")?;
//! watcher.start().await?;
//!
//! tokio::signal::ctrl_c().await?;
//! watcher.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Nothing in a read pass is fatal to the host. See [`TailError`] for how
//! each failure is classified.
//!
//! ```
//! use lt_tail::TailError;
//!
//! fn report(err: &TailError) {
//!     if err.is_fatal() {
//!         tracing::error!(error = %err, "watcher cannot run");
//!     } else if err.is_retryable() {
//!         tracing::warn!(error = %err, "retrying on next change");
//!     }
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod activity;
pub mod catchup;
pub mod error;
pub mod events;
pub mod filter;
pub mod markers;
pub mod queue;
pub mod reader;
pub mod rotation;
pub mod store;
pub mod watcher;

#[cfg(test)]
mod testing;

// Re-export error types
pub use error::TailError;

// Re-export component types
pub use activity::{ServerStateTracker, SourceCallback};
pub use catchup::{CatchupOutcome, CatchupProcessor, CatchupRejection};
pub use rotation::{RotationCheck, RotationDetector, RotationReason, SkipDecision};
pub use watcher::{PassReport, Watcher, WatcherBuilder};

// Re-export supporting types
pub use events::{ChangeSignal, ChangedPaths, SignalKind};
pub use filter::{AcceptAllFilter, CompositeFilter, FileFilter, LogFileFilter};
pub use queue::EnqueueOutcome;
pub use reader::ReadOutcome;
pub use store::{JsonFileStateStore, MemorySessionRepository, MemoryStateStore};
