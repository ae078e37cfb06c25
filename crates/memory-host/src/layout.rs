use serde::{Deserialize, Serialize};
use tabkeeper_protocol::{TabId, TabStatus, WindowId, WindowType};

/// Serializable picture of every window and tab, in display order.
///
/// This is the file format the CLI reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionLayout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused: Option<WindowId>,
    #[serde(default)]
    pub windows: Vec<WindowLayout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLayout {
    pub id: WindowId,
    #[serde(default)]
    pub window_type: WindowType,
    #[serde(default)]
    pub tabs: Vec<TabLayout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabLayout {
    pub id: TabId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_url: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub active: bool,
    #[serde(default)]
    pub status: TabStatus,
}

impl SessionLayout {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    #[must_use]
    pub fn window(&self, id: WindowId) -> Option<&WindowLayout> {
        self.windows.iter().find(|window| window.id == id)
    }

    #[must_use]
    pub fn tab_count(&self) -> usize {
        self.windows.iter().map(|window| window.tabs.len()).sum()
    }
}

impl WindowLayout {
    #[must_use]
    pub fn urls(&self) -> Vec<&str> {
        self.tabs.iter().map(|tab| tab.url.as_str()).collect()
    }

    #[must_use]
    pub fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.iter().map(|tab| tab.id).collect()
    }
}
