use std::sync::{Arc, Mutex};

use log::{info, warn};
use tabkeeper_protocol::{TabEvent, WindowId};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::{
    DedupeReport, EngineAction, EngineError, EngineHealth, MergeReport, Result, SortReport,
    TabEngine,
};

type Reply<T> = oneshot::Sender<T>;

enum EngineCommand {
    Merge(Reply<Result<MergeReport>>),
    Sort {
        window_id: Option<WindowId>,
        reply: Reply<Result<SortReport>>,
    },
    DedupeAll(Reply<DedupeReport>),
    Rebuild(Reply<Result<usize>>),
    /// Answered once every event queued ahead of it has been applied.
    Flush(Reply<()>),
    Shutdown,
}

/// Handle to a running engine loop.
///
/// The loop is the single consumer of host lifecycle events. User commands
/// travel on a separate channel and run on their own tasks, so a long merge
/// never holds up reconciliation. Dropping the last clone stops the loop.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<EngineHandleInner>,
}

struct EngineHandleInner {
    engine: Arc<TabEngine>,
    event_tx: mpsc::Sender<TabEvent>,
    command_tx: mpsc::Sender<EngineCommand>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EngineHandle {
    /// Spawn the engine loop on the current tokio runtime.
    pub fn start(engine: Arc<TabEngine>) -> Self {
        let config = engine.config().clone();
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));

        let task = spawn_engine_loop(engine.clone(), event_rx, command_rx);

        Self {
            inner: Arc::new(EngineHandleInner {
                engine,
                event_tx,
                command_tx,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Sender the host feeds lifecycle events into.
    #[must_use]
    pub fn event_sender(&self) -> mpsc::Sender<TabEvent> {
        self.inner.event_tx.clone()
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<TabEngine> {
        &self.inner.engine
    }

    pub async fn merge_windows(&self) -> Result<MergeReport> {
        self.request(EngineCommand::Merge).await?
    }

    pub async fn sort_current_window(&self) -> Result<SortReport> {
        self.request(|reply| EngineCommand::Sort {
            window_id: None,
            reply,
        })
        .await?
    }

    pub async fn sort_window(&self, window_id: WindowId) -> Result<SortReport> {
        self.request(|reply| EngineCommand::Sort {
            window_id: Some(window_id),
            reply,
        })
        .await?
    }

    pub async fn dedupe_all(&self) -> Result<DedupeReport> {
        self.request(EngineCommand::DedupeAll).await
    }

    pub async fn rebuild(&self) -> Result<usize> {
        self.request(EngineCommand::Rebuild).await?
    }

    /// Wait until every event sent before this call has been applied.
    pub async fn flush(&self) -> Result<()> {
        self.request(EngineCommand::Flush).await
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner
            .command_tx
            .send(EngineCommand::Shutdown)
            .await
            .map_err(|e| EngineError::ChannelClosed(format!("failed to send shutdown: {e}")))?;
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(task) = task {
            task.await
                .map_err(|e| EngineError::Other(format!("engine loop panicked: {e}")))?;
        }
        Ok(())
    }

    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<EngineAction> {
        self.inner.engine.subscribe_actions()
    }

    #[must_use]
    pub fn health_snapshot(&self) -> EngineHealth {
        self.inner.engine.health()
    }

    #[must_use]
    pub fn health_stream(&self) -> watch::Receiver<EngineHealth> {
        self.inner.engine.health_stream()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> EngineCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(build(reply))
            .await
            .map_err(|e| EngineError::ChannelClosed(format!("failed to send command: {e}")))?;
        rx.await
            .map_err(|_| EngineError::ChannelClosed("command dropped without a reply".to_string()))
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.try_send(EngineCommand::Shutdown);
        }
    }
}

fn spawn_engine_loop(
    engine: Arc<TabEngine>,
    mut event_rx: mpsc::Receiver<TabEvent>,
    mut command_rx: mpsc::Receiver<EngineCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if engine.config().rebuild_on_start {
            if let Err(err) = engine.rebuild().await {
                warn!("initial cache rebuild failed: {err}");
            }
        }

        loop {
            tokio::select! {
                biased;

                Some(event) = event_rx.recv() => {
                    engine.apply_event(event).await;
                }
                cmd = command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        break;
                    };
                    match cmd {
                        EngineCommand::Shutdown => break,
                        EngineCommand::Flush(reply) => {
                            while let Ok(event) = event_rx.try_recv() {
                                engine.apply_event(event).await;
                            }
                            let _ = reply.send(());
                        }
                        EngineCommand::Merge(reply) => {
                            let engine = engine.clone();
                            tokio::spawn(async move {
                                let _ = reply.send(engine.merge_windows().await);
                            });
                        }
                        EngineCommand::Sort { window_id, reply } => {
                            let engine = engine.clone();
                            tokio::spawn(async move {
                                let result = match window_id {
                                    Some(window_id) => engine.sort_window(window_id).await,
                                    None => engine.sort_current_window().await,
                                };
                                let _ = reply.send(result);
                            });
                        }
                        EngineCommand::DedupeAll(reply) => {
                            let engine = engine.clone();
                            tokio::spawn(async move {
                                let _ = reply.send(engine.dedupe_all().await);
                            });
                        }
                        EngineCommand::Rebuild(reply) => {
                            let _ = reply.send(engine.rebuild().await);
                        }
                    }
                }
            }
        }

        info!("engine loop stopped; {} tabs cached", engine.cached_len());
    })
}
