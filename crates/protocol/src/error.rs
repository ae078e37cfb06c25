use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{TabId, WindowId};

pub type HostResult<T> = std::result::Result<T, HostError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Tab,
    Window,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tab => f.write_str("tab"),
            Self::Window => f.write_str("window"),
        }
    }
}

/// Failure reported by a [`crate::TabHost`].
///
/// The host decides the variant. Callers must never classify failures by
/// inspecting the message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The tab or window vanished between the engine's check and its action.
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: i64 },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("host unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

impl HostError {
    #[must_use]
    pub const fn tab_not_found(id: TabId) -> Self {
        Self::NotFound {
            kind: ResourceKind::Tab,
            id: id.0,
        }
    }

    #[must_use]
    pub const fn window_not_found(id: WindowId) -> Self {
        Self::NotFound {
            kind: ResourceKind::Window,
            id: id.0,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_discriminated_by_variant() {
        assert!(HostError::tab_not_found(TabId(7)).is_not_found());
        assert!(HostError::window_not_found(WindowId(2)).is_not_found());
        // A message that merely mentions "not found" is still some other failure.
        assert!(!HostError::Other("No tab with id: 7 not found".to_string()).is_not_found());
    }

    #[test]
    fn display_names_the_resource() {
        assert_eq!(HostError::tab_not_found(TabId(7)).to_string(), "tab 7 not found");
        assert_eq!(
            HostError::window_not_found(WindowId(3)).to_string(),
            "window 3 not found"
        );
    }
}
