//! Domain types for log ingestion.
//!
//! - [`SourceId`] / [`SourceWatchState`] - a monitored log and its persisted cursor
//! - [`ActivitySnapshot`] - in-memory liveness bookkeeping per source
//! - [`CatchupDecision`], [`Session`], [`Side`] - startup reconciliation results

mod activity;
mod session;
mod source;

pub use activity::ActivitySnapshot;
pub use session::{CatchupDecision, NewSession, ServerStatus, Session, SessionId, Side};
pub use source::{SourceId, SourceWatchState};
