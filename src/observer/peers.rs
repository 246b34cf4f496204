use std::sync::Arc;

use hashbrown::HashMap;
use tokio::{sync::mpsc, task::AbortHandle};
use tracing::debug;

use super::{
    addr::PeerAddr,
    channel::{ChannelEvent, ChannelId, Connector},
};

/// Lifecycle of the observation channel to one address.
///
/// `Idle` and `Closed` are never stored: an address without an entry is
/// idle, and closing an entry removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closed,
}

struct PeerChannel {
    id: ChannelId,
    state: ChannelState,
    task: AbortHandle,
    /// Observation address the node behind this channel reports for itself,
    /// once it has sent a description.
    reports: Option<PeerAddr>,
}

/// Owns every observation channel, at most one per address.
pub struct PeerRegistry {
    channels: HashMap<PeerAddr, PeerChannel>,
    /// Reported observation address to the channel address serving it.
    aliases: HashMap<PeerAddr, PeerAddr>,
    connector: Arc<dyn Connector>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    next_id: ChannelId,
}

impl PeerRegistry {
    pub fn new(
        connector: Arc<dyn Connector>,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            channels: HashMap::new(),
            aliases: HashMap::new(),
            connector,
            events,
            next_id: 0,
        }
    }

    /// Starts connecting to `addr` unless a channel to it already exists.
    /// Returns immediately; the outcome arrives later as channel events.
    pub fn ensure_connected(&mut self, addr: &PeerAddr) -> bool {
        if self.channels.contains_key(addr) {
            return false;
        }
        let id = self.next_id;
        self.next_id += 1;
        debug!(peer = %addr, id, "connecting to peer");
        let task = self.connector.open(addr.clone(), id, self.events.clone());
        self.channels.insert(
            addr.clone(),
            PeerChannel {
                id,
                state: ChannelState::Connecting,
                task,
                reports: None,
            },
        );
        true
    }

    /// Moves a connecting channel to `Open`. Events from a replaced channel
    /// are ignored.
    pub fn mark_open(&mut self, addr: &PeerAddr, id: ChannelId) -> bool {
        match self.channels.get_mut(addr) {
            Some(channel) if channel.id == id && channel.state == ChannelState::Connecting => {
                channel.state = ChannelState::Open;
                debug!(peer = %addr, id, "channel open");
                true
            }
            _ => false,
        }
    }

    /// Whether `id` is the live channel for `addr`.
    pub fn is_current(&self, addr: &PeerAddr, id: ChannelId) -> bool {
        self.channels
            .get(addr)
            .map_or(false, |channel| channel.id == id)
    }

    /// Records which observation address the node behind the channel at
    /// `addr` reports for itself.
    pub fn record_report(&mut self, addr: &PeerAddr, reported: &PeerAddr) {
        let Some(channel) = self.channels.get_mut(addr) else {
            return;
        };
        if channel.reports.as_ref() == Some(reported) {
            return;
        }
        if let Some(old) = channel.reports.replace(reported.clone()) {
            self.aliases.remove(&old);
        }
        if reported != addr {
            debug!(peer = %addr, %reported, "peer reports a different observation address");
            self.aliases.insert(reported.clone(), addr.clone());
        }
    }

    /// Whether some channel, open or opening, covers `addr`, either directly
    /// or because the node behind it reports `addr` as its own.
    pub fn knows(&self, addr: &PeerAddr) -> bool {
        self.channels.contains_key(addr) || self.aliases.contains_key(addr)
    }

    /// The transport reported channel `id` to `addr` as closed. Returns
    /// `Closed` if that channel was removed, or `Idle` if it had already been
    /// replaced or forgotten.
    pub fn closed(&mut self, addr: &PeerAddr, id: ChannelId) -> ChannelState {
        if !self.is_current(addr, id) {
            return ChannelState::Idle;
        }
        self.remove(addr)
    }

    /// Closes the channel to `addr` in whatever state it is in, aborting its
    /// task.
    pub fn close(&mut self, addr: &PeerAddr) -> ChannelState {
        self.remove(addr)
    }

    fn remove(&mut self, addr: &PeerAddr) -> ChannelState {
        let Some(channel) = self.channels.remove(addr) else {
            return ChannelState::Idle;
        };
        channel.task.abort();
        if let Some(reported) = channel.reports {
            if self.aliases.get(&reported) == Some(addr) {
                self.aliases.remove(&reported);
            }
        }
        debug!(peer = %addr, id = channel.id, was = ?channel.state, "channel closed");
        ChannelState::Closed
    }

    pub fn close_all(&mut self) {
        for (addr, channel) in self.channels.drain() {
            debug!(peer = %addr, id = channel.id, "aborting channel");
            channel.task.abort();
        }
        self.aliases.clear();
    }

    pub fn state(&self, addr: &PeerAddr) -> ChannelState {
        self.channels
            .get(addr)
            .map_or(ChannelState::Idle, |channel| channel.state)
    }

    pub fn count(&self, state: ChannelState) -> usize {
        self.channels
            .values()
            .filter(|channel| channel.state == state)
            .count()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Drop for PeerRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
