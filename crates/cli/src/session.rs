use std::sync::Arc;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use log::{debug, info, warn};
use serde::Serialize;
use tabkeeper_engine::{
    DedupeReport, EngineAction, EngineConfig, EngineHandle, EngineHealth, MergeReport,
    SortReport, TabEngine,
};
use tabkeeper_memory_host::{MemoryHost, SessionLayout};
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::script::Step;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandReport {
    Merge(MergeReport),
    Sort(SortReport),
    Dedupe(DedupeReport),
}

/// Everything a run produced, in the shape printed to stdout.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutput {
    pub layout: SessionLayout,
    pub reports: Vec<CommandReport>,
    pub actions: Vec<EngineAction>,
    pub health: EngineHealth,
}

/// Load `layout` into an in-memory host, start an engine against it, play
/// `steps` in order and report the final state.
///
/// Every step is followed by a flush, so the engine has reacted to one step
/// before the next begins.
pub async fn run_session(
    layout: &SessionLayout,
    steps: &[Step],
    config: EngineConfig,
) -> Result<SessionOutput> {
    let host = Arc::new(MemoryHost::from_layout(layout));
    let engine = Arc::new(TabEngine::new(host.clone(), config));
    let handle = EngineHandle::start(engine);
    let mut actions = handle.subscribe_actions();
    host.connect(handle.event_sender());
    handle.flush().await?;
    info!(
        "session loaded: {} windows, {} tabs",
        layout.windows.len(),
        layout.tab_count()
    );

    let mut reports = Vec::new();
    let mut log = Vec::new();
    for (n, step) in steps.iter().enumerate() {
        debug!("step {n}: {step:?}");
        if let Some(report) = play(&host, &handle, step)
            .await
            .with_context(|| format!("Step {n} ({step:?}) failed"))?
        {
            reports.push(report);
        }
        handle.flush().await?;
        drain_actions(&mut actions, &mut log);
    }

    let health = handle.health_snapshot();
    handle.shutdown().await?;
    drain_actions(&mut actions, &mut log);
    host.disconnect();

    Ok(SessionOutput {
        layout: host.layout(),
        reports,
        actions: log,
        health,
    })
}

async fn play(
    host: &MemoryHost,
    handle: &EngineHandle,
    step: &Step,
) -> Result<Option<CommandReport>> {
    match step {
        Step::Open {
            window,
            url,
            pinned,
        } => {
            let opened = if *pinned {
                host.open_pinned_tab(*window, url)
            } else {
                host.open_tab(*window, url)
            };
            opened.ok_or_else(|| anyhow!("window {window} does not exist"))?;
        }
        Step::Navigate { tab, url } => {
            if !host.navigate(*tab, url) {
                return Err(anyhow!("tab {tab} does not exist"));
            }
        }
        Step::Close { tab } => {
            if !host.user_close_tab(*tab) {
                warn!("tab {tab} was already closed");
            }
        }
        Step::Focus { window } => {
            if !host.focus(*window) {
                return Err(anyhow!("window {window} does not exist"));
            }
        }
        Step::Merge => return Ok(Some(CommandReport::Merge(handle.merge_windows().await?))),
        Step::Sort { window } => {
            let report = match window {
                Some(window) => handle.sort_window(*window).await?,
                None => handle.sort_current_window().await?,
            };
            return Ok(Some(CommandReport::Sort(report)));
        }
        Step::Dedupe => return Ok(Some(CommandReport::Dedupe(handle.dedupe_all().await?))),
    }
    Ok(None)
}

fn drain_actions(rx: &mut broadcast::Receiver<EngineAction>, log: &mut Vec<EngineAction>) {
    loop {
        match rx.try_recv() {
            Ok(action) => log.push(action),
            Err(TryRecvError::Lagged(missed)) => {
                warn!("action log overflowed; {missed} actions were not recorded");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}
