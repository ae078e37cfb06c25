//! # Tabkeeper Engine
//!
//! Keeps a cache of the host's tabs in step with lifecycle events and acts on
//! it: closing same-window duplicates, merging windows and sorting tabs.
//!
//! ## Flow
//!
//! ```text
//! TabEvent ──> EngineHandle loop ──> TabEngine::apply_event
//!                                        ├─> TabIndex (cache)
//!                                        └─> resolve_duplicates ──> TabHost
//!
//! merge / sort / dedupe commands ──> own task ──> TabEngine ──> TabHost
//! ```
//!
//! The cache is allowed to be stale. Every destructive call is preceded by a
//! `get_tab` on the affected tabs, and a host `NotFound` at any step drops the
//! tab from the cache and ends that step quietly.

mod config;
mod consolidate;
mod dedup;
mod engine;
mod error;
mod health;
mod reconcile;
mod runtime;
mod sort;

pub use config::{
    EngineConfig, ENV_DEDUPE_ON_SETTLE, ENV_EVENT_BUFFER, ENV_SERIALIZE_MERGES,
    ENV_SORT_AFTER_MERGE,
};
pub use consolidate::MergeReport;
pub use dedup::{AbortReason, DedupOutcome, DedupeReport};
pub use engine::TabEngine;
pub use error::{EngineError, Result};
pub use health::{EngineAction, EngineHealth};
pub use reconcile::ReconcileOutcome;
pub use runtime::EngineHandle;
pub use sort::SortReport;
