//! # Tabkeeper Memory Host
//!
//! [`MemoryHost`] implements [`tabkeeper_protocol::TabHost`] over an in-memory
//! model of windows and tabs. The CLI drives it from a [`SessionLayout`] file;
//! tests use it to script races (tabs vanishing mid-verification, injected
//! host failures) that are hard to reproduce against a real browser.

mod host;
mod layout;

pub use host::{HostCall, HostOp, MemoryHost};
pub use layout::{SessionLayout, TabLayout, WindowLayout};
