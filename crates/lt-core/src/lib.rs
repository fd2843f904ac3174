//! Core types, configuration, and collaborator traits for logtail.
//!
//! This crate provides the foundational types shared across the workspace:
//!
//! - Domain types ([`SourceId`], [`SourceWatchState`], [`ActivitySnapshot`],
//!   [`CatchupDecision`], [`Side`])
//! - Configuration structures ([`Config`] and its sections)
//! - Error types for every collaborator boundary
//! - The collaborator traits the ingestion core is wired against
//!   ([`StateStore`], [`LineApplier`], [`LivenessProbe`], [`SessionRepository`])
//! - The `FxHashMap` alias used for per-source maps

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;
pub mod ports;
pub mod types;

pub use config::{ActivityConfig, CatchupConfig, Config, WatchConfig};
pub use error::{ApplyError, ConfigError, ProbeError, SessionError, StoreError};
pub use hash::{FxHashMap, fx_hash_map};
pub use ports::{
    ApplyContext, ApplyMode, LineApplier, LivenessProbe, SessionRepository, StateStore,
};
pub use types::{
    ActivitySnapshot, CatchupDecision, NewSession, ServerStatus, Session, SessionId, Side,
    SourceId, SourceWatchState,
};
