//! Fan-out of encoded frames to connected viewers.
//!
//! The hub is owned by the core loop, so registration, removal and broadcast
//! passes never overlap. Each client is a bounded queue drained by its
//! WebSocket writer task; sends use `try_send`, so a stalled client fails
//! instead of stalling the loop.

use std::collections::BTreeMap;
use std::fmt;

use tokio::sync::mpsc::{self, error::TrySendError};

use nwwatch_core::{Step, Transition};

use crate::error::DaemonError;
use crate::protocol::{Frame, ServerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// Outbound side of one viewer connection.
#[derive(Debug)]
pub struct ClientChannel {
    id: ClientId,
    tx: mpsc::Sender<Frame>,
    state: ChannelState,
}

impl ClientChannel {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    fn try_send(&self, frame: Frame) -> Result<(), DaemonError> {
        if self.state == ChannelState::Closed {
            return Err(DaemonError::ClientSend {
                client: self.id,
                reason: "channel closed".to_string(),
            });
        }
        self.tx.try_send(frame).map_err(|err| {
            let reason = match err {
                TrySendError::Full(_) => "outbound queue full",
                TrySendError::Closed(_) => "connection closed",
            };
            DaemonError::ClientSend {
                client: self.id,
                reason: reason.to_string(),
            }
        })
    }
}

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: Vec<ClientId>,
}

#[derive(Debug, Default)]
pub struct BroadcastHub {
    clients: BTreeMap<ClientId, ClientChannel>,
    next_id: u64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a sender as a not-yet-registered channel.
    pub fn open_channel(&mut self, tx: mpsc::Sender<Frame>) -> ClientChannel {
        self.next_id += 1;
        ClientChannel {
            id: ClientId(self.next_id),
            tx,
            state: ChannelState::Connecting,
        }
    }

    /// Add `channel` to the active set. The handshake is the caller's job.
    pub fn register(&mut self, mut channel: ClientChannel) -> ClientId {
        channel.state = ChannelState::Open;
        let id = channel.id;
        self.clients.insert(id, channel);
        tracing::info!(client = %id, total = self.clients.len(), "viewer connected");
        id
    }

    /// Remove a client. Returns `false` if it was already gone.
    pub fn unregister(&mut self, id: ClientId) -> bool {
        self.close(id).is_some()
    }

    /// Take a client out of the active set and hand back its channel, marked
    /// closed. Sends on it fail from here on.
    fn close(&mut self, id: ClientId) -> Option<ClientChannel> {
        let Some(mut channel) = self.clients.remove(&id) else {
            tracing::debug!(client = %id, "unregister of unknown viewer");
            return None;
        };
        channel.state = ChannelState::Closed;
        tracing::info!(client = %id, total = self.clients.len(), "viewer disconnected");
        Some(channel)
    }

    /// Send the full-state `init` frame to exactly one channel.
    ///
    /// Failure is returned to the caller; the channel is not unregistered.
    pub fn send_snapshot(&self, channel: &ClientChannel, steps: &[Step]) -> Result<(), DaemonError> {
        let frame = ServerMessage::init(steps).encode()?;
        channel.try_send(frame)?;
        tracing::debug!(client = %channel.id, steps = steps.len(), "sent snapshot");
        Ok(())
    }

    /// Encode `transition` once and deliver it to every registered client.
    ///
    /// Clients whose send fails are removed after the pass completes.
    pub fn broadcast_transition(&mut self, transition: &Transition) -> Result<BroadcastReport, DaemonError> {
        let frame = ServerMessage::transition(transition).encode()?;
        let mut report = BroadcastReport::default();

        for channel in self.clients.values() {
            match channel.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    tracing::warn!(error = %err, "dropping viewer after failed send");
                    report.dropped.push(channel.id);
                }
            }
        }

        for id in &report.dropped {
            self.unregister(*id);
        }

        tracing::info!(
            task_id = %transition.step_id(),
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "broadcast transition",
        );
        Ok(report)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }
}
