use async_trait::async_trait;

use crate::{
    HostResult, MoveTarget, TabId, TabQuery, TabSnapshot, TabUpdate, WindowId, WindowQuery,
    WindowSnapshot,
};

/// The external resource manager that owns tabs and windows.
///
/// Every call may suspend and every call may fail. Implementations report a
/// vanished tab or window as [`crate::HostError::NotFound`]; the engine treats
/// that as a benign race and all other errors as "skip this item".
#[async_trait]
pub trait TabHost: Send + Sync {
    async fn list_tabs(&self, query: TabQuery) -> HostResult<Vec<TabSnapshot>>;

    async fn get_tab(&self, tab_id: TabId) -> HostResult<TabSnapshot>;

    async fn list_windows(&self, query: WindowQuery) -> HostResult<Vec<WindowSnapshot>>;

    /// The window the user is currently looking at (not populated).
    async fn current_window(&self) -> HostResult<WindowSnapshot>;

    async fn move_tab(&self, tab_id: TabId, target: MoveTarget) -> HostResult<TabSnapshot>;

    async fn update_tab(&self, tab_id: TabId, update: TabUpdate) -> HostResult<TabSnapshot>;

    async fn close_tab(&self, tab_id: TabId) -> HostResult<()>;

    async fn close_window(&self, window_id: WindowId) -> HostResult<()>;

    async fn focus_window(&self, window_id: WindowId) -> HostResult<()>;
}
