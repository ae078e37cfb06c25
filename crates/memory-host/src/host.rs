use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;
use tabkeeper_protocol::{
    AttachInfo, HostError, HostResult, MoveTarget, RemoveInfo, TabChange, TabEvent, TabHost,
    TabId, TabPosition, TabQuery, TabSnapshot, TabStatus, TabUpdate, WindowId, WindowQuery,
    WindowSnapshot, WindowType,
};
use tokio::sync::mpsc;

use crate::{SessionLayout, TabLayout, WindowLayout};

/// Host operations that can be targeted by failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostOp {
    ListTabs,
    GetTab,
    ListWindows,
    CurrentWindow,
    MoveTab,
    UpdateTab,
    CloseTab,
    CloseWindow,
    FocusWindow,
}

/// Mutating call the host accepted, in the order it was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum HostCall {
    MoveTab { tab_id: TabId, target: MoveTarget },
    UpdateTab { tab_id: TabId, update: TabUpdate },
    CloseTab { tab_id: TabId },
    CloseWindow { window_id: WindowId },
    FocusWindow { window_id: WindowId },
}

#[derive(Debug, Clone)]
struct TabState {
    id: TabId,
    url: String,
    pending_url: Option<String>,
    active: bool,
    pinned: bool,
    status: TabStatus,
}

#[derive(Debug, Clone)]
struct WindowState {
    id: WindowId,
    window_type: WindowType,
    tabs: Vec<TabState>,
}

impl WindowState {
    fn snapshot_tab(&self, index: usize) -> TabSnapshot {
        let tab = &self.tabs[index];
        TabSnapshot {
            id: Some(tab.id),
            window_id: self.id,
            index,
            url: Some(tab.url.clone()),
            pending_url: tab.pending_url.clone(),
            active: tab.active,
            pinned: tab.pinned,
            status: tab.status,
        }
    }

    fn snapshot(&self, focused: bool, populate: bool) -> WindowSnapshot {
        WindowSnapshot {
            id: self.id,
            focused,
            window_type: self.window_type,
            tabs: if populate {
                (0..self.tabs.len()).map(|i| self.snapshot_tab(i)).collect()
            } else {
                Vec::new()
            },
        }
    }

    fn pinned_count(&self) -> usize {
        self.tabs.iter().filter(|tab| tab.pinned).count()
    }

    /// Pinned tabs always occupy the front of the strip.
    fn insert(&mut self, mut tab: TabState, position: TabPosition) -> usize {
        let pinned = self.pinned_count();
        let wanted = match position {
            TabPosition::Index(index) => index.min(self.tabs.len()),
            TabPosition::End => self.tabs.len(),
        };
        let index = if tab.pinned {
            wanted.min(pinned)
        } else {
            wanted.max(pinned)
        };
        if self.tabs.is_empty() {
            tab.active = true;
        } else if tab.active && self.tabs.iter().any(|t| t.active) {
            tab.active = false;
        }
        self.tabs.insert(index, tab);
        index
    }

    fn take(&mut self, index: usize) -> TabState {
        let tab = self.tabs.remove(index);
        if tab.active && !self.tabs.is_empty() {
            let next = index.min(self.tabs.len() - 1);
            self.tabs[next].active = true;
        }
        tab
    }
}

#[derive(Debug, Default)]
struct HostState {
    windows: Vec<WindowState>,
    focused: Option<WindowId>,
    next_tab_id: i64,
    next_window_id: i64,
    failures: HashMap<HostOp, VecDeque<HostError>>,
    vanish_on_get: HashSet<TabId>,
    calls: Vec<HostCall>,
}

impl HostState {
    fn locate(&self, tab_id: TabId) -> Option<(usize, usize)> {
        self.windows.iter().enumerate().find_map(|(w, window)| {
            window
                .tabs
                .iter()
                .position(|tab| tab.id == tab_id)
                .map(|t| (w, t))
        })
    }

    fn window_pos(&self, window_id: WindowId) -> Option<usize> {
        self.windows.iter().position(|window| window.id == window_id)
    }

    fn take_failure(&mut self, op: HostOp) -> HostResult<()> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => {
                debug!("memory host: injected {op:?} failure: {err}");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn remove_tab(&mut self, tab_id: TabId) -> Option<(WindowId, TabState)> {
        let (w, t) = self.locate(tab_id)?;
        let window = &mut self.windows[w];
        Some((window.id, window.take(t)))
    }

    fn remove_window(&mut self, window_id: WindowId) -> Option<WindowState> {
        let pos = self.window_pos(window_id)?;
        let window = self.windows.remove(pos);
        if self.focused == Some(window_id) {
            self.focused = self.windows.first().map(|w| w.id);
        }
        Some(window)
    }
}

/// A tab/window host that lives entirely in memory.
///
/// Semantics follow a Chromium-style browser closely enough for the engine:
/// pinned tabs stay at the front, closing the active tab activates a
/// neighbour, and windows are left open when their last tab moves away (so
/// callers decide whether to close them). Every mutation is reported on the
/// connected event channel, exactly like a browser would.
#[derive(Debug)]
pub struct MemoryHost {
    state: Mutex<HostState>,
    events: Mutex<Option<mpsc::Sender<TabEvent>>>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                next_tab_id: 1,
                next_window_id: 1,
                ..HostState::default()
            }),
            events: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn from_layout(layout: &SessionLayout) -> Self {
        let host = Self::new();
        {
            let mut state = host.state.lock().unwrap_or_else(|p| p.into_inner());
            for window in &layout.windows {
                let mut tabs: Vec<TabState> = window
                    .tabs
                    .iter()
                    .map(|tab| TabState {
                        id: tab.id,
                        url: tab.url.clone(),
                        pending_url: tab.pending_url.clone(),
                        active: tab.active,
                        pinned: tab.pinned,
                        status: tab.status,
                    })
                    .collect();
                tabs.sort_by_key(|tab| !tab.pinned);
                if !tabs.is_empty() && !tabs.iter().any(|tab| tab.active) {
                    tabs[0].active = true;
                }
                state.next_tab_id = state
                    .next_tab_id
                    .max(tabs.iter().map(|t| t.id.0 + 1).max().unwrap_or(1));
                state.next_window_id = state.next_window_id.max(window.id.0 + 1);
                state.windows.push(WindowState {
                    id: window.id,
                    window_type: window.window_type,
                    tabs,
                });
            }
            let focused = layout
                .focused
                .filter(|id| state.window_pos(*id).is_some())
                .or_else(|| state.windows.first().map(|w| w.id));
            state.focused = focused;
        }
        host
    }

    /// Route future lifecycle events to `sender`.
    pub fn connect(&self, sender: mpsc::Sender<TabEvent>) {
        *self.events.lock().unwrap_or_else(|p| p.into_inner()) = Some(sender);
    }

    pub fn disconnect(&self) {
        *self.events.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    #[must_use]
    pub fn layout(&self) -> SessionLayout {
        let state = self.lock_state();
        SessionLayout {
            focused: state.focused,
            windows: state
                .windows
                .iter()
                .map(|window| WindowLayout {
                    id: window.id,
                    window_type: window.window_type,
                    tabs: window
                        .tabs
                        .iter()
                        .map(|tab| TabLayout {
                            id: tab.id,
                            url: tab.url.clone(),
                            pending_url: tab.pending_url.clone(),
                            pinned: tab.pinned,
                            active: tab.active,
                            status: tab.status,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Mutating calls accepted so far.
    #[must_use]
    pub fn calls(&self) -> Vec<HostCall> {
        self.lock_state().calls.clone()
    }

    /// Make the next call of `op` fail with `err`. Failures queue up per op.
    pub fn fail_next(&self, op: HostOp, err: HostError) {
        self.lock_state()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Simulate the user closing `tab_id` at the exact moment the engine asks
    /// about it: the next `get_tab` for it removes the tab and reports
    /// NotFound.
    pub fn vanish_on_next_get(&self, tab_id: TabId) {
        self.lock_state().vanish_on_get.insert(tab_id);
    }

    pub fn open_window(&self, window_type: WindowType) -> WindowId {
        let mut state = self.lock_state();
        let id = WindowId(state.next_window_id);
        state.next_window_id += 1;
        state.windows.push(WindowState {
            id,
            window_type,
            tabs: Vec::new(),
        });
        if state.focused.is_none() {
            state.focused = Some(id);
        }
        id
    }

    /// Open a tab at the end of `window_id` that has already finished loading.
    /// Emits `created`. Returns `None` when the window does not exist.
    pub fn open_tab(&self, window_id: WindowId, url: &str) -> Option<TabId> {
        self.open_tab_with(window_id, url, false)
    }

    pub fn open_pinned_tab(&self, window_id: WindowId, url: &str) -> Option<TabId> {
        self.open_tab_with(window_id, url, true)
    }

    fn open_tab_with(&self, window_id: WindowId, url: &str, pinned: bool) -> Option<TabId> {
        let snapshot = {
            let mut state = self.lock_state();
            let w = state.window_pos(window_id)?;
            let id = TabId(state.next_tab_id);
            state.next_tab_id += 1;
            let window = &mut state.windows[w];
            let index = window.insert(
                TabState {
                    id,
                    url: url.to_string(),
                    pending_url: None,
                    active: false,
                    pinned,
                    status: TabStatus::Complete,
                },
                TabPosition::End,
            );
            window.snapshot_tab(index)
        };
        let id = snapshot.id;
        self.emit(vec![TabEvent::Created { tab: snapshot }]);
        id
    }

    /// User navigation: emits `updated` for the url change and then for load
    /// completion.
    pub fn navigate(&self, tab_id: TabId, url: &str) -> bool {
        let events = {
            let mut state = self.lock_state();
            let Some((w, t)) = state.locate(tab_id) else {
                return false;
            };
            let window = &mut state.windows[w];
            window.tabs[t].url = url.to_string();
            window.tabs[t].pending_url = None;
            window.tabs[t].status = TabStatus::Loading;
            let loading = window.snapshot_tab(t);
            window.tabs[t].status = TabStatus::Complete;
            let complete = window.snapshot_tab(t);
            vec![
                TabEvent::Updated {
                    tab_id,
                    change: TabChange {
                        url: Some(url.to_string()),
                        status: Some(TabStatus::Loading),
                        ..TabChange::default()
                    },
                    tab: loading,
                },
                TabEvent::Updated {
                    tab_id,
                    change: TabChange {
                        status: Some(TabStatus::Complete),
                        ..TabChange::default()
                    },
                    tab: complete,
                },
            ]
        };
        self.emit(events);
        true
    }

    /// Focus a window the way a user clicking on it would.
    pub fn focus(&self, window_id: WindowId) -> bool {
        let mut state = self.lock_state();
        if state.window_pos(window_id).is_none() {
            return false;
        }
        state.focused = Some(window_id);
        true
    }

    /// Remove a tab and emit `removed`, as if the user closed it.
    pub fn user_close_tab(&self, tab_id: TabId) -> bool {
        let removed = self.lock_state().remove_tab(tab_id);
        let Some((window_id, _)) = removed else {
            return false;
        };
        self.emit(vec![TabEvent::Removed {
            tab_id,
            info: RemoveInfo {
                window_id,
                is_window_closing: false,
            },
        }]);
        true
    }

    #[must_use]
    pub fn tab(&self, tab_id: TabId) -> Option<TabSnapshot> {
        let state = self.lock_state();
        let (w, t) = state.locate(tab_id)?;
        Some(state.windows[w].snapshot_tab(t))
    }

    #[must_use]
    pub fn window_tab_ids(&self, window_id: WindowId) -> Vec<TabId> {
        let state = self.lock_state();
        state
            .window_pos(window_id)
            .map(|w| state.windows[w].tabs.iter().map(|t| t.id).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn window_ids(&self) -> Vec<WindowId> {
        self.lock_state().windows.iter().map(|w| w.id).collect()
    }

    #[must_use]
    pub fn focused_window(&self) -> Option<WindowId> {
        self.lock_state().focused
    }

    fn lock_state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn begin(&self, op: HostOp) -> HostResult<MutexGuard<'_, HostState>> {
        let mut state = self.lock_state();
        state.take_failure(op)?;
        Ok(state)
    }

    fn emit(&self, events: Vec<TabEvent>) {
        let guard = self.events.lock().unwrap_or_else(|p| p.into_inner());
        let Some(sender) = guard.as_ref() else {
            return;
        };
        for event in events {
            if let Err(err) = sender.try_send(event) {
                warn!("memory host: dropping lifecycle event: {err}");
            }
        }
    }
}

// Host calls take effect as soon as they are issued, like a browser
// receiving an extension message, and only then suspend. Concurrent batches
// therefore land in the order they were issued.
async fn settle() {
    tokio::task::yield_now().await;
}

impl MemoryHost {
    fn list_tabs_now(&self, query: TabQuery) -> HostResult<Vec<TabSnapshot>> {
        let state = self.begin(HostOp::ListTabs)?;
        let mut out = Vec::new();
        for window in &state.windows {
            if query.window_id.is_some_and(|id| id != window.id) {
                continue;
            }
            if query.window_type.is_some_and(|ty| ty != window.window_type) {
                continue;
            }
            out.extend((0..window.tabs.len()).map(|i| window.snapshot_tab(i)));
        }
        Ok(out)
    }

    fn get_tab_now(&self, tab_id: TabId) -> HostResult<TabSnapshot> {
        let vanished = {
            let mut state = self.begin(HostOp::GetTab)?;
            if !state.vanish_on_get.remove(&tab_id) {
                let (w, t) = state
                    .locate(tab_id)
                    .ok_or(HostError::tab_not_found(tab_id))?;
                return Ok(state.windows[w].snapshot_tab(t));
            }
            state.remove_tab(tab_id).map(|(window_id, _)| window_id)
        };
        if let Some(window_id) = vanished {
            self.emit(vec![TabEvent::Removed {
                tab_id,
                info: RemoveInfo {
                    window_id,
                    is_window_closing: false,
                },
            }]);
        }
        Err(HostError::tab_not_found(tab_id))
    }

    fn list_windows_now(&self, query: WindowQuery) -> HostResult<Vec<WindowSnapshot>> {
        let state = self.begin(HostOp::ListWindows)?;
        Ok(state
            .windows
            .iter()
            .filter(|window| query.window_type.map_or(true, |ty| ty == window.window_type))
            .map(|window| window.snapshot(state.focused == Some(window.id), query.populate))
            .collect())
    }

    fn current_window_now(&self) -> HostResult<WindowSnapshot> {
        let state = self.begin(HostOp::CurrentWindow)?;
        let window = state
            .focused
            .and_then(|id| state.window_pos(id))
            .map(|w| &state.windows[w])
            .or_else(|| state.windows.first())
            .ok_or_else(|| HostError::Unavailable("no windows are open".to_string()))?;
        Ok(window.snapshot(true, false))
    }

    fn move_tab_now(&self, tab_id: TabId, target: MoveTarget) -> HostResult<TabSnapshot> {
        let (snapshot, event) = {
            let mut state = self.begin(HostOp::MoveTab)?;
            let (w, t) = state
                .locate(tab_id)
                .ok_or(HostError::tab_not_found(tab_id))?;
            let source_id = state.windows[w].id;
            let dest_id = target.window_id.unwrap_or(source_id);
            let d = state
                .window_pos(dest_id)
                .ok_or(HostError::window_not_found(dest_id))?;
            let tab = state.windows[w].take(t);
            let index = state.windows[d].insert(tab, target.position);
            state.calls.push(HostCall::MoveTab { tab_id, target });
            let snapshot = state.windows[d].snapshot_tab(index);
            let event = (dest_id != source_id).then_some(TabEvent::Attached {
                tab_id,
                info: AttachInfo {
                    new_window_id: dest_id,
                    new_position: index,
                },
            });
            (snapshot, event)
        };
        self.emit(event.into_iter().collect());
        Ok(snapshot)
    }

    fn update_tab_now(&self, tab_id: TabId, update: TabUpdate) -> HostResult<TabSnapshot> {
        {
            let mut state = self.begin(HostOp::UpdateTab)?;
            let (w, t) = state
                .locate(tab_id)
                .ok_or(HostError::tab_not_found(tab_id))?;
            if update.active == Some(true) {
                for (i, tab) in state.windows[w].tabs.iter_mut().enumerate() {
                    tab.active = i == t;
                }
            }
            state.calls.push(HostCall::UpdateTab {
                tab_id,
                update: update.clone(),
            });
        }
        if let Some(url) = update.url.as_deref() {
            self.navigate(tab_id, url);
        }
        self.tab(tab_id).ok_or(HostError::tab_not_found(tab_id))
    }

    fn close_tab_now(&self, tab_id: TabId) -> HostResult<()> {
        let window_id = {
            let mut state = self.begin(HostOp::CloseTab)?;
            let (window_id, _) = state
                .remove_tab(tab_id)
                .ok_or(HostError::tab_not_found(tab_id))?;
            state.calls.push(HostCall::CloseTab { tab_id });
            window_id
        };
        self.emit(vec![TabEvent::Removed {
            tab_id,
            info: RemoveInfo {
                window_id,
                is_window_closing: false,
            },
        }]);
        Ok(())
    }

    fn close_window_now(&self, window_id: WindowId) -> HostResult<()> {
        let window = {
            let mut state = self.begin(HostOp::CloseWindow)?;
            let window = state
                .remove_window(window_id)
                .ok_or(HostError::window_not_found(window_id))?;
            state.calls.push(HostCall::CloseWindow { window_id });
            window
        };
        self.emit(
            window
                .tabs
                .iter()
                .map(|tab| TabEvent::Removed {
                    tab_id: tab.id,
                    info: RemoveInfo {
                        window_id,
                        is_window_closing: true,
                    },
                })
                .collect(),
        );
        Ok(())
    }

    fn focus_window_now(&self, window_id: WindowId) -> HostResult<()> {
        let mut state = self.begin(HostOp::FocusWindow)?;
        if state.window_pos(window_id).is_none() {
            return Err(HostError::window_not_found(window_id));
        }
        state.focused = Some(window_id);
        state.calls.push(HostCall::FocusWindow { window_id });
        Ok(())
    }
}

#[async_trait]
impl TabHost for MemoryHost {
    async fn list_tabs(&self, query: TabQuery) -> HostResult<Vec<TabSnapshot>> {
        let out = self.list_tabs_now(query);
        settle().await;
        out
    }

    async fn get_tab(&self, tab_id: TabId) -> HostResult<TabSnapshot> {
        let out = self.get_tab_now(tab_id);
        settle().await;
        out
    }

    async fn list_windows(&self, query: WindowQuery) -> HostResult<Vec<WindowSnapshot>> {
        let out = self.list_windows_now(query);
        settle().await;
        out
    }

    async fn current_window(&self) -> HostResult<WindowSnapshot> {
        let out = self.current_window_now();
        settle().await;
        out
    }

    async fn move_tab(&self, tab_id: TabId, target: MoveTarget) -> HostResult<TabSnapshot> {
        let out = self.move_tab_now(tab_id, target);
        settle().await;
        out
    }

    async fn update_tab(&self, tab_id: TabId, update: TabUpdate) -> HostResult<TabSnapshot> {
        let out = self.update_tab_now(tab_id, update);
        settle().await;
        out
    }

    async fn close_tab(&self, tab_id: TabId) -> HostResult<()> {
        let out = self.close_tab_now(tab_id);
        settle().await;
        out
    }

    async fn close_window(&self, window_id: WindowId) -> HostResult<()> {
        let out = self.close_window_now(window_id);
        settle().await;
        out
    }

    async fn focus_window(&self, window_id: WindowId) -> HostResult<()> {
        let out = self.focus_window_now(window_id);
        settle().await;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn unpinned_tabs_cannot_move_in_front_of_pinned_ones() {
        let host = MemoryHost::new();
        let window = host.open_window(WindowType::Normal);
        let pinned = host.open_pinned_tab(window, "https://mail.example/").expect("tab");
        let tab = host.open_tab(window, "https://a.com/").expect("tab");

        let moved = host
            .move_tab(tab, MoveTarget::within_window(0))
            .await
            .expect("move");
        assert_eq!(moved.index, 1);
        assert_eq!(host.window_tab_ids(window), vec![pinned, tab]);
    }

    #[tokio::test]
    async fn closing_active_tab_activates_neighbour() {
        let host = MemoryHost::new();
        let window = host.open_window(WindowType::Normal);
        let first = host.open_tab(window, "https://a.com/").expect("tab");
        let second = host.open_tab(window, "https://b.com/").expect("tab");
        assert!(host.tab(first).expect("first").active);

        host.close_tab(first).await.expect("close");
        assert!(host.tab(second).expect("second").active);
        assert_eq!(
            host.close_tab(first).await,
            Err(HostError::tab_not_found(first))
        );
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_once() {
        let host = MemoryHost::new();
        let window = host.open_window(WindowType::Normal);
        let tab = host.open_tab(window, "https://a.com/").expect("tab");
        host.fail_next(HostOp::GetTab, HostError::PermissionDenied("tabs".into()));

        assert!(matches!(
            host.get_tab(tab).await,
            Err(HostError::PermissionDenied(_))
        ));
        assert!(host.get_tab(tab).await.is_ok());
    }

    #[tokio::test]
    async fn cross_window_move_emits_attached() {
        let host = MemoryHost::new();
        let (tx, mut rx) = mpsc::channel(16);
        let a = host.open_window(WindowType::Normal);
        let b = host.open_window(WindowType::Normal);
        let tab = host.open_tab(b, "https://a.com/").expect("tab");
        host.connect(tx);

        host.move_tab(tab, MoveTarget::tail_of(a)).await.expect("move");
        let event = rx.try_recv().expect("event");
        assert_eq!(
            event,
            TabEvent::Attached {
                tab_id: tab,
                info: AttachInfo {
                    new_window_id: a,
                    new_position: 0
                }
            }
        );
        assert!(host.window_tab_ids(b).is_empty());
    }

    #[tokio::test]
    async fn layout_round_trips_through_json() {
        let raw = r#"{
            "focused": 2,
            "windows": [
                { "id": 1, "tabs": [ { "id": 10, "url": "https://a.com/" } ] },
                { "id": 2, "tabs": [
                    { "id": 20, "url": "https://b.com/" },
                    { "id": 21, "url": "https://c.com/", "pinned": true }
                ] }
            ]
        }"#;
        let layout = SessionLayout::from_json(raw).expect("layout");
        let host = MemoryHost::from_layout(&layout);

        assert_eq!(host.focused_window(), Some(WindowId(2)));
        assert_eq!(host.window_tab_ids(WindowId(2)), vec![TabId(21), TabId(20)]);
        let current = host.current_window().await.expect("current");
        assert_eq!(current.id, WindowId(2));

        let new_window = host.open_window(WindowType::Normal);
        assert_eq!(new_window, WindowId(3));
        let new_tab = host.open_tab(new_window, "https://d.com/").expect("tab");
        assert_eq!(new_tab, TabId(22));
    }
}
