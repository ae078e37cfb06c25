use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use tabkeeper_index::{resolve_tab_url, DuplicateGroup, IndexEntry, NormalizedUrl, TabIndex};
use tabkeeper_protocol::{HostError, TabHost, TabId, TabQuery, TabSnapshot};
use tokio::sync::{broadcast, watch};

use crate::{EngineAction, EngineConfig, EngineHealth, Result};

/// Outcome of asking the host about a tab right before acting on it.
#[derive(Debug)]
pub(crate) enum Probe {
    Alive(TabSnapshot),
    /// The host reported NotFound; the cache entry has been purged.
    Gone,
    Unreachable(HostError),
}

/// Owns the tab cache and drives every host mutation.
///
/// The cache lock is only ever taken for short synchronous sections and is
/// never held across a host call, so reconciliation and long-running
/// commands can interleave freely. Anything learned from the cache is
/// re-verified against the host before a destructive call.
pub struct TabEngine {
    host: Arc<dyn TabHost>,
    config: EngineConfig,
    index: Mutex<TabIndex>,
    health: watch::Sender<EngineHealth>,
    actions: broadcast::Sender<EngineAction>,
    pub(crate) merge_in_flight: AtomicBool,
}

impl TabEngine {
    #[must_use]
    pub fn new(host: Arc<dyn TabHost>, config: EngineConfig) -> Self {
        let (health, _) = watch::channel(EngineHealth::default());
        let (actions, _) = broadcast::channel(config.action_buffer.max(1));
        Self {
            host,
            config,
            index: Mutex::new(TabIndex::new()),
            health,
            actions,
            merge_in_flight: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn host(&self) -> &Arc<dyn TabHost> {
        &self.host
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn health(&self) -> EngineHealth {
        self.health.borrow().clone()
    }

    #[must_use]
    pub fn health_stream(&self) -> watch::Receiver<EngineHealth> {
        self.health.subscribe()
    }

    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<EngineAction> {
        self.actions.subscribe()
    }

    #[must_use]
    pub fn cached(&self, tab_id: TabId) -> Option<IndexEntry> {
        self.lock_index().get(tab_id).cloned()
    }

    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.lock_index().len()
    }

    #[must_use]
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        self.lock_index().duplicate_groups()
    }

    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        self.lock_index().check_consistency()
    }

    /// Clear the cache and repopulate it from every tab of every normal
    /// window. Returns the number of tabs cached.
    pub async fn rebuild(&self) -> Result<usize> {
        let tabs = self.host.list_tabs(TabQuery::normal_windows()).await?;
        let mut fresh = TabIndex::new();
        for tab in &tabs {
            if let Some((tab_id, url)) = qualifying(tab) {
                fresh.put(tab_id, url, tab.window_id);
            }
        }
        let cached = fresh.len();
        self.with_index(|index| *index = fresh);
        info!("rebuilt tab cache: {cached} of {} tabs qualify", tabs.len());
        self.record(EngineAction::Rebuilt { tabs: cached });
        Ok(cached)
    }

    /// Run `f` against the cache. The closure is synchronous so the lock can
    /// never be carried over an await point.
    pub(crate) fn with_index<R>(&self, f: impl FnOnce(&mut TabIndex) -> R) -> R {
        let (out, len) = {
            let mut index = self.lock_index();
            let out = f(&mut index);
            (out, index.len())
        };
        self.health.send_if_modified(|health| {
            let changed = health.cached_tabs != len;
            health.cached_tabs = len;
            changed
        });
        out
    }

    pub(crate) fn note(&self, f: impl FnOnce(&mut EngineHealth)) {
        self.health.send_modify(f);
    }

    pub(crate) fn record(&self, action: EngineAction) {
        debug!("engine action: {action:?}");
        self.health.send_modify(|health| action.count_into(health));
        // No subscribers is fine.
        let _ = self.actions.send(action);
    }

    /// Forget a tab the host no longer knows about.
    pub(crate) fn purge(&self, tab_id: TabId) {
        if self.with_index(|index| index.remove(tab_id)).is_some() {
            debug!("purged stale tab {tab_id}");
            self.record(EngineAction::Purged { tab_id });
        }
    }

    pub(crate) async fn probe(&self, tab_id: TabId) -> Probe {
        match self.host.get_tab(tab_id).await {
            Ok(tab) => Probe::Alive(tab),
            Err(err) if err.is_not_found() => {
                self.purge(tab_id);
                Probe::Gone
            }
            Err(err) => {
                warn!("could not verify tab {tab_id}: {err}");
                Probe::Unreachable(err)
            }
        }
    }

    fn lock_index(&self) -> MutexGuard<'_, TabIndex> {
        self.index.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Identifier and normalized location of a tab the engine may cache.
pub(crate) fn qualifying(tab: &TabSnapshot) -> Option<(TabId, NormalizedUrl)> {
    let tab_id = tab.id?;
    resolve_tab_url(tab).map(|url| (tab_id, url))
}
