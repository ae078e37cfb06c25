use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub i64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    #[default]
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    #[default]
    Normal,
    Popup,
    Panel,
    App,
    Devtools,
}

/// Point-in-time view of one tab as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSnapshot {
    /// Some hosts report tabs without an identifier (e.g. devtools); those
    /// are never cached.
    pub id: Option<TabId>,
    pub window_id: WindowId,
    #[serde(default)]
    pub index: usize,
    /// Committed location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Location the tab is navigating to but has not committed yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_url: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub status: TabStatus,
}

impl TabSnapshot {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == TabStatus::Complete
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub id: WindowId,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub window_type: WindowType,
    /// Only filled when the listing was requested with `populate`.
    #[serde(default)]
    pub tabs: Vec<TabSnapshot>,
}

impl WindowSnapshot {
    /// True when nothing would be lost to the user if the window were closed
    /// after its unpinned tabs moved elsewhere.
    #[must_use]
    pub fn is_empty_or_pinned_only(&self) -> bool {
        self.tabs.iter().all(|tab| tab.pinned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TabQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_type: Option<WindowType>,
}

impl TabQuery {
    #[must_use]
    pub const fn in_window(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            window_type: None,
        }
    }

    #[must_use]
    pub const fn normal_windows() -> Self {
        Self {
            window_id: None,
            window_type: Some(WindowType::Normal),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_type: Option<WindowType>,
    #[serde(default)]
    pub populate: bool,
}

impl WindowQuery {
    #[must_use]
    pub const fn normal_populated() -> Self {
        Self {
            window_type: Some(WindowType::Normal),
            populate: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabPosition {
    Index(usize),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTarget {
    /// `None` keeps the tab in its current window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    pub position: TabPosition,
}

impl MoveTarget {
    #[must_use]
    pub const fn within_window(index: usize) -> Self {
        Self {
            window_id: None,
            position: TabPosition::Index(index),
        }
    }

    #[must_use]
    pub const fn tail_of(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            position: TabPosition::End,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TabUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl TabUpdate {
    #[must_use]
    pub fn activate() -> Self {
        Self {
            active: Some(true),
            url: None,
        }
    }
}
