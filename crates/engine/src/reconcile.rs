use log::{debug, warn};
use serde::Serialize;
use tabkeeper_protocol::{TabChange, TabEvent, TabId, TabSnapshot};

use crate::engine::qualifying;
use crate::{DedupOutcome, TabEngine};

/// What applying one lifecycle event did to the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Nothing the engine tracks changed.
    Ignored,
    /// The tab's cache entry was written.
    Cached { tab_id: TabId },
    /// Entries were dropped from the cache.
    Evicted { removed: Vec<TabId> },
    /// The tab settled on a location and was checked for duplicates.
    Checked { tab_id: TabId, dedup: DedupOutcome },
}

impl TabEngine {
    /// Fold one host notification into the cache, resolving duplicates when
    /// a tab settles on a page.
    pub async fn apply_event(&self, event: TabEvent) -> ReconcileOutcome {
        debug!("applying {} event for {:?}", event.kind(), event.tab_id());
        let outcome = match event {
            TabEvent::Created { tab } => self.on_created(&tab),
            TabEvent::Updated { tab_id, change, tab } => {
                self.on_updated(tab_id, &change, &tab).await
            }
            TabEvent::Removed { tab_id, info } => {
                let removed = if info.is_window_closing {
                    self.with_index(|index| index.remove_all_for_window(info.window_id))
                } else {
                    self.with_index(|index| index.remove(tab_id))
                        .map(|entry| vec![entry.tab_id])
                        .unwrap_or_default()
                };
                evicted(removed)
            }
            TabEvent::Attached { tab_id, .. } => match self.host().get_tab(tab_id).await {
                Ok(tab) => {
                    let loaded = tab.is_complete();
                    self.settle_tab(&tab, loaded).await
                }
                Err(err) if err.is_not_found() => {
                    self.purge(tab_id);
                    evicted(vec![tab_id])
                }
                Err(err) => {
                    warn!("could not refresh attached tab {tab_id}: {err}");
                    ReconcileOutcome::Ignored
                }
            },
        };
        self.note(|health| health.events_applied += 1);
        outcome
    }

    fn on_created(&self, tab: &TabSnapshot) -> ReconcileOutcome {
        let Some((tab_id, url)) = qualifying(tab) else {
            return ReconcileOutcome::Ignored;
        };
        self.with_index(|index| index.put(tab_id, url, tab.window_id));
        ReconcileOutcome::Cached { tab_id }
    }

    async fn on_updated(
        &self,
        tab_id: TabId,
        change: &TabChange,
        tab: &TabSnapshot,
    ) -> ReconcileOutcome {
        if change.touches_location() {
            return self.settle_tab(tab, change.completed()).await;
        }
        // A tab we have never seen is cached the first time it shows up,
        // whatever the update was about.
        if self.with_index(|index| index.contains(tab_id)) {
            ReconcileOutcome::Ignored
        } else {
            self.on_created(tab)
        }
    }

    /// `loaded` is true when the host reports the tab finished loading.
    async fn settle_tab(&self, tab: &TabSnapshot, loaded: bool) -> ReconcileOutcome {
        let Some(tab_id) = tab.id else {
            return ReconcileOutcome::Ignored;
        };
        let Some((_, url)) = qualifying(tab) else {
            return evicted(
                self.with_index(|index| index.remove(tab_id))
                    .map(|entry| vec![entry.tab_id])
                    .unwrap_or_default(),
            );
        };

        let window_id = tab.window_id;
        let moved_on = self.with_index(|index| {
            let changed = index
                .get(tab_id)
                .map_or(true, |entry| entry.url.href != url.href || entry.window_id != window_id);
            if changed {
                // A fresh slot makes the tab the newest copy of its page in
                // the window it now lives in.
                index.remove(tab_id);
                index.put(tab_id, url.clone(), window_id);
            }
            changed
        });

        if !self.config().dedupe_on_settle || !(moved_on || loaded) {
            return ReconcileOutcome::Cached { tab_id };
        }
        let dedup = self.resolve_duplicates(tab_id, &url, window_id).await;
        ReconcileOutcome::Checked { tab_id, dedup }
    }
}

fn evicted(removed: Vec<TabId>) -> ReconcileOutcome {
    if removed.is_empty() {
        ReconcileOutcome::Ignored
    } else {
        ReconcileOutcome::Evicted { removed }
    }
}
