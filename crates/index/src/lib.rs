//! # Tabkeeper Index
//!
//! The in-memory reflection of the host's tabs.
//!
//! ```text
//! TabSnapshot
//!     │
//!     ├──> resolve_tab_url (http/https only)
//!     │      └─> NormalizedUrl
//!     │
//!     └──> TabIndex
//!            ├─> by_tab:  TabId  -> { url, window }
//!            └─> by_href: href   -> [{ tab, window, seq }]
//! ```
//!
//! The index is a cache, not a source of truth: it may be briefly stale and
//! the engine re-verifies against the host before any destructive action.

mod index;
mod url;

pub use index::{DuplicateGroup, IndexEntry, IndexSlot, TabIndex};
pub use url::{collate, normalize, resolve_tab_url, NormalizedUrl, NEW_TAB_URLS};
