use serde::{Deserialize, Serialize};

use crate::{TabId, TabSnapshot, TabStatus, WindowId};

/// Fields that changed in a `tab updated` notification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TabChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TabStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl TabChange {
    /// Title, favicon and pin changes never affect what the engine caches.
    #[must_use]
    pub fn touches_location(&self) -> bool {
        self.url.is_some() || self.status.is_some()
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.status == Some(TabStatus::Complete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveInfo {
    pub window_id: WindowId,
    #[serde(default)]
    pub is_window_closing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachInfo {
    pub new_window_id: WindowId,
    #[serde(default)]
    pub new_position: usize,
}

/// Tab lifecycle notification delivered by the host.
///
/// Events for one tab arrive in causal order; nothing is assumed across tabs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TabEvent {
    Created {
        tab: TabSnapshot,
    },
    Updated {
        tab_id: TabId,
        change: TabChange,
        tab: TabSnapshot,
    },
    Removed {
        tab_id: TabId,
        info: RemoveInfo,
    },
    Attached {
        tab_id: TabId,
        info: AttachInfo,
    },
}

impl TabEvent {
    #[must_use]
    pub fn tab_id(&self) -> Option<TabId> {
        match self {
            Self::Created { tab } => tab.id,
            Self::Updated { tab_id, .. }
            | Self::Removed { tab_id, .. }
            | Self::Attached { tab_id, .. } => Some(*tab_id),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Removed { .. } => "removed",
            Self::Attached { .. } => "attached",
        }
    }
}
