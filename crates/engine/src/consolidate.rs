use std::sync::atomic::Ordering;

use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;
use tabkeeper_protocol::{MoveTarget, TabId, TabPosition, WindowId, WindowQuery, WindowSnapshot};

use crate::{EngineAction, Result, SortReport, TabEngine};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Window everything was gathered into.
    pub target: Option<WindowId>,
    pub moved: Vec<TabId>,
    /// Tabs that were closed before they could be moved.
    pub vanished: Vec<TabId>,
    pub failed: Vec<TabId>,
    pub closed_windows: Vec<WindowId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortReport>,
    /// Set when another merge was still running and this one did nothing.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

/// Clears the in-flight flag when a merge finishes, however it finishes.
struct MergeGuard<'a> {
    engine: &'a TabEngine,
}

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.engine.merge_in_flight.store(false, Ordering::Release);
    }
}

fn pick_target(windows: &[WindowSnapshot], current: Option<WindowId>) -> Option<WindowId> {
    current
        .filter(|id| windows.iter().any(|window| window.id == *id))
        .or_else(|| windows.iter().find(|window| window.focused).map(|w| w.id))
        .or_else(|| windows.first().map(|window| window.id))
}

impl TabEngine {
    /// Gather every unpinned tab of every normal window into the current one,
    /// close the windows left with nothing (or only pinned tabs), then focus
    /// and sort the survivor.
    pub async fn merge_windows(&self) -> Result<MergeReport> {
        let _guard = if self.config().serialize_merges {
            if self.merge_in_flight.swap(true, Ordering::AcqRel) {
                info!("merge already in progress; ignoring request");
                return Ok(MergeReport {
                    skipped: true,
                    ..MergeReport::default()
                });
            }
            Some(MergeGuard { engine: self })
        } else {
            None
        };

        let windows = self.host().list_windows(WindowQuery::normal_populated()).await?;
        if windows.len() <= 1 {
            let mut report = MergeReport {
                target: windows.first().map(|window| window.id),
                ..MergeReport::default()
            };
            if let Some(target) = report.target {
                match self.sort_window(target).await {
                    Ok(sort) => report.sort = Some(sort),
                    Err(err) => warn!("could not sort window {target}: {err}"),
                }
            }
            self.note(|health| health.merges_run += 1);
            return Ok(report);
        }

        let current = match self.host().current_window().await {
            Ok(window) => Some(window.id),
            Err(err) => {
                warn!("could not resolve the current window: {err}");
                None
            }
        };
        let Some(target) = pick_target(&windows, current) else {
            return Ok(MergeReport::default());
        };

        let strays: Vec<TabId> = windows
            .iter()
            .filter(|window| window.id != target)
            .flat_map(|window| window.tabs.iter())
            .filter(|tab| !tab.pinned)
            .filter_map(|tab| tab.id)
            .collect();

        let mut report = MergeReport {
            target: Some(target),
            ..MergeReport::default()
        };
        let results = join_all(strays.iter().map(|&tab_id| async move {
            (
                tab_id,
                self.host().move_tab(tab_id, MoveTarget::tail_of(target)).await,
            )
        }))
        .await;
        for (tab_id, result) in results {
            match result {
                Ok(_) => {
                    report.moved.push(tab_id);
                    self.record(EngineAction::TabMoved {
                        tab_id,
                        window_id: target,
                        position: TabPosition::End,
                    });
                }
                Err(err) if err.is_not_found() => {
                    self.purge(tab_id);
                    report.vanished.push(tab_id);
                }
                Err(err) => {
                    warn!("could not move tab {tab_id} into window {target}: {err}");
                    report.failed.push(tab_id);
                }
            }
        }

        report.closed_windows = self.close_emptied_windows(target).await;

        if let Err(err) = self.host().focus_window(target).await {
            warn!("could not focus window {target}: {err}");
        }
        if self.config().sort_after_merge {
            match self.sort_window(target).await {
                Ok(sort) => report.sort = Some(sort),
                Err(err) => warn!("could not sort window {target} after merge: {err}"),
            }
        }

        self.note(|health| health.merges_run += 1);
        info!(
            "merged into window {target}: moved {}, vanished {}, failed {}, closed {} windows",
            report.moved.len(),
            report.vanished.len(),
            report.failed.len(),
            report.closed_windows.len()
        );
        Ok(report)
    }

    async fn close_emptied_windows(&self, target: WindowId) -> Vec<WindowId> {
        let windows = match self.host().list_windows(WindowQuery::normal_populated()).await {
            Ok(windows) => windows,
            Err(err) => {
                warn!("could not re-list windows after merge: {err}");
                return Vec::new();
            }
        };
        let doomed: Vec<WindowId> = windows
            .iter()
            .filter(|window| window.id != target && window.is_empty_or_pinned_only())
            .map(|window| window.id)
            .collect();

        let results = join_all(
            doomed
                .iter()
                .map(|&window_id| async move { (window_id, self.host().close_window(window_id).await) }),
        )
        .await;

        let mut closed = Vec::new();
        for (window_id, result) in results {
            match result {
                Ok(()) => {
                    self.record(EngineAction::WindowClosed { window_id });
                    closed.push(window_id);
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => warn!("could not close window {window_id}: {err}"),
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(id: i64, focused: bool) -> WindowSnapshot {
        WindowSnapshot {
            id: WindowId(id),
            focused,
            window_type: tabkeeper_protocol::WindowType::Normal,
            tabs: Vec::new(),
        }
    }

    #[test]
    fn target_prefers_current_then_focused_then_first() {
        let windows = [window(1, false), window(2, true), window(3, false)];
        assert_eq!(pick_target(&windows, Some(WindowId(3))), Some(WindowId(3)));
        assert_eq!(pick_target(&windows, Some(WindowId(99))), Some(WindowId(2)));
        let unfocused = [window(4, false), window(5, false)];
        assert_eq!(pick_target(&unfocused, None), Some(WindowId(4)));
        assert_eq!(pick_target(&[], None), None);
    }
}
