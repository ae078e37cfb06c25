use std::collections::HashMap;

use serde::Serialize;
use tabkeeper_protocol::{TabId, WindowId};

use crate::NormalizedUrl;

/// Forward record: what the engine last believed about one tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub tab_id: TabId,
    pub url: NormalizedUrl,
    pub window_id: WindowId,
}

/// Reverse record under one href.
///
/// `seq` is the insertion sequence number; the lowest `seq` in a window is
/// the oldest tab and survives duplicate resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexSlot {
    pub tab_id: TabId,
    pub window_id: WindowId,
    pub seq: u64,
}

/// A same-window duplicate set, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub href: String,
    pub window_id: WindowId,
    pub slots: Vec<IndexSlot>,
}

/// Dual index of the tabs the engine knows about.
///
/// `by_tab` answers "where is this tab and what does it show", `by_href`
/// answers "which tabs show this page". Both sides are updated together by
/// every operation, and no operation can fail: bad input is simply not
/// representable or is ignored.
#[derive(Debug, Default)]
pub struct TabIndex {
    by_tab: HashMap<TabId, IndexEntry>,
    by_href: HashMap<String, Vec<IndexSlot>>,
    next_seq: u64,
}

impl TabIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_tab.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_tab.is_empty()
    }

    #[must_use]
    pub fn get(&self, tab_id: TabId) -> Option<&IndexEntry> {
        self.by_tab.get(&tab_id)
    }

    #[must_use]
    pub fn contains(&self, tab_id: TabId) -> bool {
        self.by_tab.contains_key(&tab_id)
    }

    #[must_use]
    pub fn slots_for(&self, href: &str) -> &[IndexSlot] {
        self.by_href.get(href).map_or(&[], Vec::as_slice)
    }

    /// Insert or overwrite the record for `tab_id`.
    ///
    /// Re-putting a tab under the same href only updates its window and keeps
    /// the sequence number. A new href starts a fresh slot at the back of that
    /// bucket. Callers that want a tab to count as the newest copy remove it
    /// first.
    pub fn put(&mut self, tab_id: TabId, url: NormalizedUrl, window_id: WindowId) {
        if let Some(previous) = self.by_tab.get(&tab_id) {
            if previous.url.href != url.href {
                let old_href = previous.url.href.clone();
                self.strip_slot(tab_id, &old_href);
            }
        }

        let bucket = self.by_href.entry(url.href.clone()).or_default();
        if let Some(slot) = bucket.iter_mut().find(|slot| slot.tab_id == tab_id) {
            slot.window_id = window_id;
        } else {
            bucket.push(IndexSlot {
                tab_id,
                window_id,
                seq: self.next_seq,
            });
            self.next_seq += 1;
        }

        self.by_tab.insert(
            tab_id,
            IndexEntry {
                tab_id,
                url,
                window_id,
            },
        );
    }

    /// Drop a tab from both sides. Returns the forward record if one existed.
    pub fn remove(&mut self, tab_id: TabId) -> Option<IndexEntry> {
        let entry = self.by_tab.remove(&tab_id)?;
        self.strip_slot(tab_id, &entry.url.href);
        Some(entry)
    }

    /// Remove a tab when the caller only trusts the href it observed.
    ///
    /// The forward record is dropped only if it still points at `href`; a
    /// record that already moved on to another page is left alone.
    pub fn remove_from_href(&mut self, tab_id: TabId, href: &str) -> bool {
        let stripped = self.strip_slot(tab_id, href);
        let matches_forward = self
            .by_tab
            .get(&tab_id)
            .is_some_and(|entry| entry.url.href == href);
        if matches_forward {
            self.by_tab.remove(&tab_id);
        }
        stripped || matches_forward
    }

    /// Bulk removal for a window that is closing. Returns the removed tab ids.
    pub fn remove_all_for_window(&mut self, window_id: WindowId) -> Vec<TabId> {
        let doomed: Vec<TabId> = self
            .by_tab
            .values()
            .filter(|entry| entry.window_id == window_id)
            .map(|entry| entry.tab_id)
            .collect();
        for tab_id in &doomed {
            self.remove(*tab_id);
        }
        doomed
    }

    pub fn clear(&mut self) {
        self.by_tab.clear();
        self.by_href.clear();
    }

    /// Other tabs in `window_id` that show `href`, oldest first.
    #[must_use]
    pub fn same_window_duplicates(
        &self,
        href: &str,
        window_id: WindowId,
        except: TabId,
    ) -> Vec<IndexSlot> {
        let mut slots: Vec<IndexSlot> = self
            .slots_for(href)
            .iter()
            .filter(|slot| slot.window_id == window_id && slot.tab_id != except)
            .copied()
            .collect();
        slots.sort_by_key(|slot| slot.seq);
        slots
    }

    #[must_use]
    pub fn count_in_window(&self, href: &str, window_id: WindowId) -> usize {
        self.slots_for(href)
            .iter()
            .filter(|slot| slot.window_id == window_id)
            .count()
    }

    /// Every href/window pair with more than one tab, each group oldest first.
    #[must_use]
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        let mut groups = Vec::new();
        for (href, bucket) in &self.by_href {
            let mut per_window: HashMap<WindowId, Vec<IndexSlot>> = HashMap::new();
            for slot in bucket {
                per_window.entry(slot.window_id).or_default().push(*slot);
            }
            for (window_id, mut slots) in per_window {
                if slots.len() < 2 {
                    continue;
                }
                slots.sort_by_key(|slot| slot.seq);
                groups.push(DuplicateGroup {
                    href: href.clone(),
                    window_id,
                    slots,
                });
            }
        }
        groups.sort_by(|a, b| (a.window_id, &a.href).cmp(&(b.window_id, &b.href)));
        groups
    }

    /// Verify both sides agree. Used by tests and debug assertions.
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut reverse_total = 0usize;
        for (href, bucket) in &self.by_href {
            if bucket.is_empty() {
                return Err(format!("empty bucket left behind for {href}"));
            }
            for slot in bucket {
                reverse_total += 1;
                let Some(entry) = self.by_tab.get(&slot.tab_id) else {
                    return Err(format!("slot for tab {} under {href} has no entry", slot.tab_id));
                };
                if entry.url.href != *href {
                    return Err(format!(
                        "tab {} filed under {href} but entry says {}",
                        slot.tab_id, entry.url.href
                    ));
                }
                if entry.window_id != slot.window_id {
                    return Err(format!(
                        "tab {} window mismatch: entry {} slot {}",
                        slot.tab_id, entry.window_id, slot.window_id
                    ));
                }
            }
        }
        if reverse_total != self.by_tab.len() {
            return Err(format!(
                "{} forward entries but {reverse_total} reverse slots",
                self.by_tab.len()
            ));
        }
        Ok(())
    }

    fn strip_slot(&mut self, tab_id: TabId, href: &str) -> bool {
        let Some(bucket) = self.by_href.get_mut(href) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|slot| slot.tab_id != tab_id);
        let stripped = bucket.len() != before;
        if bucket.is_empty() {
            self.by_href.remove(href);
        }
        stripped
    }
}
