//! # Tabkeeper Protocol
//!
//! The boundary between the reconciliation engine and whatever owns the real
//! tabs and windows (a browser extension bridge, a WebDriver session, or the
//! in-memory host used by tests and the CLI).
//!
//! ```text
//! Host ──TabEvent──> engine ──TabHost calls──> Host
//! ```
//!
//! Everything the engine learns about the world arrives as a [`TabSnapshot`],
//! [`WindowSnapshot`] or [`TabEvent`]; everything it does goes through the
//! [`TabHost`] trait. [`HostError::NotFound`] is the only error kind the
//! engine discriminates on.

mod error;
mod events;
mod host;
mod types;

pub use error::{HostError, HostResult, ResourceKind};
pub use events::{AttachInfo, RemoveInfo, TabChange, TabEvent};
pub use host::TabHost;
pub use types::{
    MoveTarget, TabId, TabPosition, TabQuery, TabSnapshot, TabStatus, TabUpdate, WindowId,
    WindowQuery, WindowSnapshot, WindowType,
};
