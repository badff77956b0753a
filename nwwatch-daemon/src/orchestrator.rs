//! The serialized core: one task owns the step store, the debouncer and the
//! broadcast hub.
//!
//! Everything that mutates shared state arrives as a message on one of three
//! channels (commands from the server, raw changes from the watcher, timer
//! expiries from the debouncer) and is handled to completion before the next
//! message is taken. A settled change is read, applied and broadcast within
//! one loop turn, so every viewer sees a sequential history.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use nwwatch_core::{ChangeTranslator, RawChange, Step, StepSource, StepStore};

use crate::config::{StopPolicy, COMMAND_BUFFER};
use crate::debounce::{Debouncer, TimerFired};
use crate::error::DaemonError;
use crate::hub::{BroadcastHub, BroadcastReport, ClientId};
use crate::protocol::Frame;
use crate::watcher::ChangeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Stopped,
    Watching,
}

/// Point-in-time view of the core, served on `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStatus {
    pub watching: bool,
    pub steps: usize,
    pub clients: usize,
    pub pending_changes: usize,
}

enum Command {
    StartWatching {
        respond_to: oneshot::Sender<Result<(), DaemonError>>,
    },
    StopWatching {
        respond_to: oneshot::Sender<Result<(), DaemonError>>,
    },
    Connect {
        tx: mpsc::Sender<Frame>,
        respond_to: oneshot::Sender<Result<ClientId, DaemonError>>,
    },
    Disconnect {
        client: ClientId,
    },
    Snapshot {
        respond_to: oneshot::Sender<Vec<Step>>,
    },
    Status {
        respond_to: oneshot::Sender<WatchStatus>,
    },
    Shutdown,
}

pub struct Orchestrator {
    state: WatchState,
    stop_policy: StopPolicy,
    store: StepStore,
    translator: ChangeTranslator,
    hub: BroadcastHub,
    debouncer: Debouncer,
    change_source: Box<dyn ChangeSource>,
    raw_tx: mpsc::UnboundedSender<RawChange>,
    raw_rx: mpsc::UnboundedReceiver<RawChange>,
    fired_rx: mpsc::UnboundedReceiver<TimerFired>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state)
            .field("steps", &self.store.len())
            .field("clients", &self.hub.len())
            .field("debouncer", &self.debouncer)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn StepSource>,
        change_source: Box<dyn ChangeSource>,
        debounce: Duration,
        stop_policy: StopPolicy,
    ) -> Self {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        Self {
            state: WatchState::Stopped,
            stop_policy,
            store: StepStore::new(),
            translator: ChangeTranslator::new(source),
            hub: BroadcastHub::new(),
            debouncer: Debouncer::new(debounce, fired_tx),
            change_source,
            raw_tx,
            raw_rx,
            fired_rx,
        }
    }

    /// Load the store if needed and begin accepting raw changes.
    pub fn start_watching(&mut self) -> Result<(), DaemonError> {
        if self.state == WatchState::Watching {
            return Err(DaemonError::AlreadyWatching);
        }
        if !self.store.is_loaded() {
            let loaded = self.store.ensure_loaded(self.translator.source());
            tracing::info!(steps = loaded, "loaded steps folder");
        }
        self.change_source.start(self.raw_tx.clone())?;
        self.state = WatchState::Watching;
        tracing::info!(steps = self.store.len(), "started watching");
        Ok(())
    }

    /// Stop accepting raw changes and drop every pending debounce.
    pub fn stop_watching(&mut self) -> Result<(), DaemonError> {
        if self.state == WatchState::Stopped {
            return match self.stop_policy {
                StopPolicy::Strict => Err(DaemonError::NotWatching),
                StopPolicy::Lenient => {
                    tracing::debug!("stop requested while not watching, ignoring");
                    Ok(())
                }
            };
        }

        self.change_source.stop();
        let mut discarded = 0usize;
        while self.raw_rx.try_recv().is_ok() {
            discarded += 1;
        }
        let cancelled = self.debouncer.cancel_all();
        self.state = WatchState::Stopped;
        tracing::info!(cancelled, discarded, "stopped watching");
        Ok(())
    }

    pub fn on_raw_change(&mut self, change: RawChange) {
        if self.state != WatchState::Watching {
            tracing::debug!(path = %change.path.display(), "change arrived while stopped, ignoring");
            return;
        }
        tracing::trace!(path = %change.path.display(), kind = %change.kind, "raw change");
        self.debouncer.schedule(change.path, change.kind);
    }

    /// Settle one timer expiry and broadcast the resulting transition, if any.
    pub fn on_timer_fired(&mut self, fired: TimerFired) -> Option<BroadcastReport> {
        let event = self.debouncer.settle(fired)?;
        tracing::debug!(event = %event, "change settled");

        let transition = self.translator.apply(&mut self.store, &event)?;
        match self.hub.broadcast_transition(&transition) {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::error!(error = %err, task_id = %transition.step_id(), "broadcast failed");
                None
            }
        }
    }

    /// Send the snapshot to a new viewer and register it, in one step.
    ///
    /// No transition can be broadcast between the two, so the viewer's first
    /// frame is always `init` and it misses no delta that follows.
    pub fn connect(&mut self, tx: mpsc::Sender<Frame>) -> Result<ClientId, DaemonError> {
        let steps = self.snapshot();
        let channel = self.hub.open_channel(tx);
        if let Err(err) = self.hub.send_snapshot(&channel, &steps) {
            tracing::warn!(client = %channel.id(), error = %err, "initial snapshot failed");
            return Err(err);
        }
        Ok(self.hub.register(channel))
    }

    pub fn disconnect(&mut self, client: ClientId) {
        self.hub.unregister(client);
    }

    /// All known steps ordered by version. Triggers the lazy load.
    pub fn snapshot(&mut self) -> Vec<Step> {
        let mut steps = self.store.all(self.translator.source());
        steps.sort_by_key(|step| (step.major(), step.minor()));
        steps
    }

    pub fn status(&self) -> WatchStatus {
        WatchStatus {
            watching: self.state == WatchState::Watching,
            steps: self.store.len(),
            clients: self.hub.len(),
            pending_changes: self.debouncer.pending_count(),
        }
    }

    /// Move the core onto its own task.
    pub fn spawn(self) -> (OrchestratorHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(self.run(commands_rx));
        (
            OrchestratorHandle {
                commands: commands_tx,
            },
            task,
        )
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Some(change) = self.raw_rx.recv() => self.on_raw_change(change),
                Some(fired) = self.fired_rx.recv() => {
                    self.on_timer_fired(fired);
                }
            }
        }

        if self.state == WatchState::Watching {
            let _ = self.stop_watching();
        }
        tracing::debug!("orchestrator loop exited");
    }

    /// Returns `false` when the loop should exit.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::StartWatching { respond_to } => {
                let _ = respond_to.send(self.start_watching());
            }
            Command::StopWatching { respond_to } => {
                let _ = respond_to.send(self.stop_watching());
            }
            Command::Connect { tx, respond_to } => {
                let _ = respond_to.send(self.connect(tx));
            }
            Command::Disconnect { client } => self.disconnect(client),
            Command::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
            Command::Status { respond_to } => {
                let _ = respond_to.send(self.status());
            }
            Command::Shutdown => return false,
        }
        true
    }
}

/// Cloneable access to a running [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
}

impl OrchestratorHandle {
    pub async fn start_watching(&self) -> Result<(), DaemonError> {
        self.request(|respond_to| Command::StartWatching { respond_to })
            .await?
    }

    pub async fn stop_watching(&self) -> Result<(), DaemonError> {
        self.request(|respond_to| Command::StopWatching { respond_to })
            .await?
    }

    /// Register a viewer whose frames are written from `tx`'s receiver.
    ///
    /// On success the `init` frame is already queued on `tx`.
    pub async fn connect(&self, tx: mpsc::Sender<Frame>) -> Result<ClientId, DaemonError> {
        self.request(|respond_to| Command::Connect { tx, respond_to })
            .await?
    }

    pub async fn disconnect(&self, client: ClientId) {
        let _ = self.commands.send(Command::Disconnect { client }).await;
    }

    pub async fn snapshot(&self) -> Result<Vec<Step>, DaemonError> {
        self.request(|respond_to| Command::Snapshot { respond_to })
            .await
    }

    pub async fn status(&self) -> Result<WatchStatus, DaemonError> {
        self.request(|respond_to| Command::Status { respond_to })
            .await
    }

    /// Ask the loop to exit. Watching is stopped on the way out.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, DaemonError> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(build(respond_to))
            .await
            .map_err(|_| DaemonError::ChannelClosed("orchestrator commands"))?;
        response
            .await
            .map_err(|_| DaemonError::ChannelClosed("orchestrator response"))
    }
}
