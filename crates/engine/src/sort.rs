use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use tabkeeper_index::NormalizedUrl;
use tabkeeper_protocol::{MoveTarget, TabId, TabPosition, TabQuery, WindowId};

use crate::engine::qualifying;
use crate::{EngineAction, Result, TabEngine};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortReport {
    pub window_id: WindowId,
    /// Tabs with a sortable location.
    pub considered: usize,
    pub moved: Vec<TabId>,
    pub failed: Vec<TabId>,
}

impl SortReport {
    fn empty(window_id: WindowId) -> Self {
        Self {
            window_id,
            considered: 0,
            moved: Vec::new(),
            failed: Vec::new(),
        }
    }
}

struct Sortable {
    tab_id: TabId,
    url: NormalizedUrl,
}

/// Plan the moves that put `order` into the target layout.
///
/// `targets` lists each tab with the index it must end up at, in ascending
/// target order. Moves are simulated against `order` the way the host
/// applies them (take out, insert at index), so a tab already sitting at its
/// target after earlier moves is left alone.
fn plan_moves(mut order: Vec<Option<TabId>>, targets: &[(TabId, usize)]) -> Vec<(TabId, usize)> {
    let mut moves = Vec::new();
    for &(tab_id, target) in targets {
        let Some(current) = order.iter().position(|slot| *slot == Some(tab_id)) else {
            continue;
        };
        if current == target {
            continue;
        }
        let slot = order.remove(current);
        order.insert(target.min(order.len()), slot);
        moves.push((tab_id, target));
    }
    moves
}

impl TabEngine {
    pub async fn sort_current_window(&self) -> Result<SortReport> {
        let window = self.host().current_window().await?;
        self.sort_window(window.id).await
    }

    /// Order a window's web tabs by host, path, query and fragment.
    ///
    /// Pinned and unpinned tabs are sorted separately since the host keeps
    /// pinned tabs at the front. Tabs without a web location keep their
    /// relative order and drift behind the sorted ones of their group.
    pub async fn sort_window(&self, window_id: WindowId) -> Result<SortReport> {
        let mut tabs = self.host().list_tabs(TabQuery::in_window(window_id)).await?;
        if tabs.len() <= 1 {
            return Ok(SortReport::empty(window_id));
        }
        tabs.sort_by_key(|tab| tab.index);

        let mut pinned = Vec::new();
        let mut unpinned = Vec::new();
        for tab in &tabs {
            let Some(tab_id) = tab.id else {
                continue;
            };
            let url = match self.cached(tab_id) {
                Some(entry) => entry.url,
                None => match qualifying(tab) {
                    Some((_, url)) => {
                        self.with_index(|index| index.put(tab_id, url.clone(), tab.window_id));
                        url
                    }
                    None => continue,
                },
            };
            let group = if tab.pinned { &mut pinned } else { &mut unpinned };
            group.push(Sortable { tab_id, url });
        }
        pinned.sort_by(|a, b| a.url.sort_cmp(&b.url));
        unpinned.sort_by(|a, b| a.url.sort_cmp(&b.url));

        let pinned_total = tabs.iter().filter(|tab| tab.pinned).count();
        let targets: Vec<(TabId, usize)> = pinned
            .iter()
            .enumerate()
            .map(|(i, item)| (item.tab_id, i))
            .chain(
                unpinned
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (item.tab_id, pinned_total + i)),
            )
            .collect();

        let order = tabs.iter().map(|tab| tab.id).collect();
        let moves = plan_moves(order, &targets);
        debug!(
            "sorting window {window_id}: {} sortable tabs, {} moves",
            targets.len(),
            moves.len()
        );

        let results = join_all(moves.iter().map(|&(tab_id, index)| {
            let host = self.host().clone();
            async move {
                let result = host.move_tab(tab_id, MoveTarget::within_window(index)).await;
                (tab_id, index, result)
            }
        }))
        .await;

        let mut report = SortReport {
            considered: targets.len(),
            ..SortReport::empty(window_id)
        };
        for (tab_id, index, result) in results {
            match result {
                Ok(_) => {
                    report.moved.push(tab_id);
                    self.record(EngineAction::TabMoved {
                        tab_id,
                        window_id,
                        position: TabPosition::Index(index),
                    });
                }
                Err(err) if err.is_not_found() => self.purge(tab_id),
                Err(err) => {
                    warn!("could not move tab {tab_id} to index {index}: {err}");
                    report.failed.push(tab_id);
                }
            }
        }
        self.note(|health| health.sorts_run += 1);
        if !report.moved.is_empty() {
            info!("sorted window {window_id}: moved {} tabs", report.moved.len());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(raw: &[i64]) -> Vec<Option<TabId>> {
        raw.iter().map(|id| Some(TabId(*id))).collect()
    }

    fn apply(mut order: Vec<Option<TabId>>, moves: &[(TabId, usize)]) -> Vec<Option<TabId>> {
        for &(tab_id, target) in moves {
            let current = order
                .iter()
                .position(|slot| *slot == Some(tab_id))
                .expect("tab present");
            let slot = order.remove(current);
            order.insert(target, slot);
        }
        order
    }

    #[test]
    fn already_sorted_window_needs_no_moves() {
        let targets = [(TabId(1), 0), (TabId(2), 1), (TabId(3), 2)];
        assert!(plan_moves(ids(&[1, 2, 3]), &targets).is_empty());
    }

    #[test]
    fn reversed_window_is_fully_reordered() {
        let targets = [(TabId(3), 0), (TabId(2), 1), (TabId(1), 2)];
        let moves = plan_moves(ids(&[1, 2, 3]), &targets);
        assert_eq!(apply(ids(&[1, 2, 3]), &moves), ids(&[3, 2, 1]));
        assert_eq!(moves.len(), 2);
    }

    #[test]
    fn unsortable_tabs_drift_to_the_back_of_their_group() {
        // Tab 9 has no web location; pinned tab 5 stays in front.
        let order = ids(&[5, 9, 2, 1]);
        let targets = [(TabId(5), 0), (TabId(1), 1), (TabId(2), 2)];
        let moves = plan_moves(order.clone(), &targets);
        assert_eq!(apply(order, &moves), ids(&[5, 1, 2, 9]));
    }
}
