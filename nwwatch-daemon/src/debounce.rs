//! Per-path debouncing of raw change notifications.
//!
//! Each [`Debouncer::schedule`] cancels the path's previous timer and starts a
//! new one. Timers do not touch shared state: on expiry they send a
//! [`TimerFired`] back into the core loop, which calls [`Debouncer::settle`].
//! The generation number makes expiries of replaced or cancelled timers
//! no-ops, even if the abort raced the send.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use nwwatch_core::{ChangeKind, LogicalFileEvent};

/// Expiry notice for one scheduled timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub path: PathBuf,
    pub generation: u64,
}

struct PendingChange {
    kind: ChangeKind,
    generation: u64,
    timer: JoinHandle<()>,
}

pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, PendingChange>,
    next_generation: u64,
    fired_tx: mpsc::UnboundedSender<TimerFired>,
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.window)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Debouncer {
    /// Timer expiries are delivered on `fired_tx`.
    pub fn new(window: Duration, fired_tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            window,
            pending: HashMap::new(),
            next_generation: 0,
            fired_tx,
        }
    }

    /// Record a change for `path` and (re)start its quiet-period timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&mut self, path: PathBuf, kind: ChangeKind) {
        if let Some(previous) = self.pending.remove(&path) {
            previous.timer.abort();
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let deadline = tokio::time::Instant::now() + self.window;
        let fired_tx = self.fired_tx.clone();
        let fired = TimerFired {
            path: path.clone(),
            generation,
        };
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = fired_tx.send(fired);
        });

        self.pending.insert(
            path,
            PendingChange {
                kind,
                generation,
                timer,
            },
        );
    }

    /// Turn a timer expiry into the settled event for its path.
    ///
    /// `None` when the expiry belongs to a timer that was since replaced or
    /// cancelled.
    pub fn settle(&mut self, fired: TimerFired) -> Option<LogicalFileEvent> {
        match self.pending.get(&fired.path) {
            Some(pending) if pending.generation == fired.generation => {}
            _ => return None,
        }
        let pending = self.pending.remove(&fired.path)?;
        Some(LogicalFileEvent::new(fired.path, pending.kind))
    }

    /// Drop every pending timer without delivering. Returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.pending.len();
        for (_, pending) in self.pending.drain() {
            pending.timer.abort();
        }
        dropped
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
