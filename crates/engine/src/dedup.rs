use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use tabkeeper_index::{resolve_tab_url, NormalizedUrl};
use tabkeeper_protocol::{TabId, TabSnapshot, TabUpdate, WindowId};

use crate::engine::Probe;
use crate::{EngineAction, TabEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The tab being resolved was closed or navigated before we acted.
    SubjectVanished,
    SubjectChanged,
    /// The tab that would have been kept disappeared during verification.
    CanonicalVanished,
    /// Another resolution already left a single copy behind.
    AlreadyResolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DedupOutcome {
    NoDuplicate,
    Closed {
        closed: TabId,
        kept: TabId,
        focus_moved: bool,
    },
    Aborted {
        reason: AbortReason,
    },
    Failed {
        tab_id: TabId,
        error: String,
    },
}

/// Result of a whole-cache duplicate sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupeReport {
    pub groups: usize,
    pub closed: Vec<TabId>,
    pub aborted: usize,
    pub failed: Vec<TabId>,
}

fn shows(tab: &TabSnapshot, href: &str, window_id: WindowId) -> bool {
    tab.window_id == window_id && resolve_tab_url(tab).is_some_and(|url| url.href == href)
}

impl TabEngine {
    /// Close `tab_id` if an older tab in the same window shows the same page.
    ///
    /// The oldest copy (lowest insertion sequence) always survives. Every
    /// tab is confirmed with the host before anything is closed, and a tab
    /// that vanishes halfway through simply ends the attempt.
    pub async fn resolve_duplicates(
        &self,
        tab_id: TabId,
        url: &NormalizedUrl,
        window_id: WindowId,
    ) -> DedupOutcome {
        let href = url.href.as_str();
        let candidates =
            self.with_index(|index| index.same_window_duplicates(href, window_id, tab_id));
        if candidates.is_empty() {
            return DedupOutcome::NoDuplicate;
        }

        // Every candidate is checked so that stale entries are purged even
        // when an older copy already qualifies.
        let probes = join_all(candidates.iter().map(|slot| self.probe(slot.tab_id))).await;
        let mut canonical = None;
        for (slot, probe) in candidates.iter().zip(probes) {
            match probe {
                Probe::Alive(tab) if shows(&tab, href, window_id) => {
                    canonical.get_or_insert(slot.tab_id);
                }
                Probe::Alive(tab) => {
                    debug!(
                        "candidate {} moved on to {:?} in window {}",
                        slot.tab_id, tab.url, tab.window_id
                    );
                }
                Probe::Gone | Probe::Unreachable(_) => {}
            }
        }
        let Some(kept) = canonical else {
            return DedupOutcome::NoDuplicate;
        };

        let subject = match self.probe(tab_id).await {
            Probe::Alive(tab) if shows(&tab, href, window_id) => tab,
            Probe::Alive(_) => return aborted(AbortReason::SubjectChanged),
            Probe::Gone => return aborted(AbortReason::SubjectVanished),
            Probe::Unreachable(err) => return failed(tab_id, &err),
        };
        match self.probe(kept).await {
            Probe::Alive(tab) if shows(&tab, href, window_id) => {}
            Probe::Alive(_) | Probe::Gone => return aborted(AbortReason::CanonicalVanished),
            Probe::Unreachable(err) => return failed(kept, &err),
        }

        let still_duplicated = self.with_index(|index| {
            index.count_in_window(href, window_id) > 1
                && [tab_id, kept].iter().all(|id| {
                    index
                        .get(*id)
                        .is_some_and(|entry| entry.url.href == href && entry.window_id == window_id)
                })
        });
        if !still_duplicated {
            return aborted(AbortReason::AlreadyResolved);
        }

        let mut focus_moved = false;
        if subject.active {
            match self.host().update_tab(kept, TabUpdate::activate()).await {
                Ok(_) => focus_moved = true,
                Err(err) if err.is_not_found() => {
                    self.purge(kept);
                    return aborted(AbortReason::CanonicalVanished);
                }
                Err(err) => warn!("could not activate tab {kept} before closing {tab_id}: {err}"),
            }
        }

        match self.host().close_tab(tab_id).await {
            Ok(()) => {
                self.with_index(|index| index.remove(tab_id));
                info!("closed duplicate tab {tab_id} of {href} in window {window_id}, kept {kept}");
                self.record(EngineAction::DuplicateClosed {
                    tab_id,
                    kept,
                    window_id,
                    href: href.to_string(),
                });
            }
            // Someone else closed it first; the outcome is the same.
            Err(err) if err.is_not_found() => self.purge(tab_id),
            Err(err) => {
                warn!("could not close duplicate tab {tab_id}: {err}");
                return failed(tab_id, &err);
            }
        }
        DedupOutcome::Closed {
            closed: tab_id,
            kept,
            focus_moved,
        }
    }

    /// Collapse every same-window duplicate the cache knows about, keeping
    /// the oldest tab of each group.
    pub async fn dedupe_all(&self) -> DedupeReport {
        let groups = self.duplicate_groups();
        let mut report = DedupeReport {
            groups: groups.len(),
            ..DedupeReport::default()
        };
        for group in groups {
            for slot in group.slots.iter().skip(1) {
                let Some(entry) = self.cached(slot.tab_id) else {
                    continue;
                };
                match self
                    .resolve_duplicates(slot.tab_id, &entry.url, entry.window_id)
                    .await
                {
                    DedupOutcome::Closed { closed, .. } => report.closed.push(closed),
                    DedupOutcome::Failed { tab_id, .. } => report.failed.push(tab_id),
                    DedupOutcome::Aborted { .. } => report.aborted += 1,
                    DedupOutcome::NoDuplicate => {}
                }
            }
        }
        if !report.closed.is_empty() {
            info!(
                "dedupe sweep closed {} tabs across {} groups",
                report.closed.len(),
                report.groups
            );
        }
        report
    }
}

fn aborted(reason: AbortReason) -> DedupOutcome {
    debug!("duplicate resolution aborted: {reason:?}");
    DedupOutcome::Aborted { reason }
}

fn failed(tab_id: TabId, err: &tabkeeper_protocol::HostError) -> DedupOutcome {
    DedupOutcome::Failed {
        tab_id,
        error: err.to_string(),
    }
}
