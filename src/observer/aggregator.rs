use std::sync::Arc;

use chrono::Utc;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, trace, warn};

use super::{
    addr::PeerAddr,
    animator::{AnimationEvent, Category, EventAnimator, StyleTable},
    channel::{ChannelEvent, Connector},
    config::ObserverConfig,
    error::Error,
    frame::{FrameEntry, RenderFrame},
    peers::{ChannelState, PeerRegistry},
    ring::{Identifier, RingCoordinate},
    topology::{Discovered, NodeSnapshot, TopologyView},
    wire::{Activity, Notification, RingChange},
};

/// All mutable observer state. Only the aggregator task touches it, one
/// event at a time.
pub struct AggregatorState {
    registry: PeerRegistry,
    view: TopologyView,
    animator: EventAnimator,
    ring: RingCoordinate,
    styles: StyleTable,
}

impl AggregatorState {
    pub fn new(
        config: &ObserverConfig,
        connector: Arc<dyn Connector>,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        Self {
            registry: PeerRegistry::new(connector, events),
            view: TopologyView::new(),
            animator: EventAnimator::with_capacity(config.capacity),
            ring: config.ring,
            styles: config.styles.clone(),
        }
    }

    /// Starts observing from `addr`.
    pub fn seed(&mut self, addr: &PeerAddr) -> bool {
        debug!(peer = %addr, "seeding observer");
        self.registry.ensure_connected(addr)
    }

    pub fn handle_channel_event(&mut self, event: ChannelEvent, now: Instant) {
        match event {
            ChannelEvent::Opened { addr, id } => {
                if !self.registry.mark_open(&addr, id) {
                    trace!(peer = %addr, id, "ignoring open from a replaced channel");
                }
            }
            ChannelEvent::Received {
                addr,
                id,
                notification,
            } => {
                if !self.registry.is_current(&addr, id) {
                    trace!(peer = %addr, id, tag = notification.tag(), "ignoring notification from a replaced channel");
                    return;
                }
                self.handle_notification(&addr, notification, now);
            }
            ChannelEvent::Closed { addr, id, error } => {
                if let Some(e) = &error {
                    debug!(peer = %addr, id, error = %e, "channel failed");
                }
                if self.registry.closed(&addr, id) == ChannelState::Closed {
                    self.forget(&addr);
                }
            }
        }
    }

    fn handle_notification(&mut self, from: &PeerAddr, notification: Notification, now: Instant) {
        let tag = notification.tag();
        let result = match notification {
            Notification::RingChange(change) => self.ring_change(from, change),
            Notification::Comm(comm) => {
                trace!(peer = %from, kind = %comm.kind, sub_key = ?comm.sub_key, "comm");
                self.animate(
                    Category::Transfer,
                    &comm.source,
                    &comm.destination,
                    comm.key.as_deref(),
                    now,
                )
            }
            Notification::Sync(activity) => {
                self.animate(Category::Sync, &activity.source, &activity.destination, None, now)
            }
            Notification::Clean(activity) => {
                self.animate(Category::Cleanup, &activity.source, &activity.destination, None, now)
            }
            Notification::Migration(activity) => self.migration(from, &activity),
        };
        if let Err(e) = result {
            warn!(peer = %from, tag, error = %e, "discarding malformed notification");
        }
    }

    fn ring_change(&mut self, from: &PeerAddr, change: RingChange) -> Result<(), Error> {
        let snapshot = NodeSnapshot::from_descriptor(&change.description)?;
        let peers: Vec<Discovered> = change
            .routes
            .iter()
            .filter_map(|route| match Discovered::from_descriptor(route) {
                Ok(peer) => Some(peer),
                Err(e) => {
                    warn!(peer = %from, route = %route.addr, error = %e, "ignoring malformed route");
                    None
                }
            })
            .collect();

        self.registry.record_report(from, &snapshot.observation);
        for peer in self.view.apply_snapshot(from, snapshot, &peers) {
            if self.registry.knows(&peer.observation) {
                continue;
            }
            debug!(via = %from, peer = %peer.observation, primary = %peer.primary, "discovered peer");
            self.registry.ensure_connected(&peer.observation);
        }
        Ok(())
    }

    fn animate(
        &mut self,
        category: Category,
        source: &str,
        destination: &str,
        key: Option<&str>,
        now: Instant,
    ) -> Result<(), Error> {
        let source = Identifier::from_base64(source)?;
        let destination = Identifier::from_base64(destination)?;
        let key = key.map(Identifier::from_base64).transpose()?;

        let event = AnimationEvent::new(
            category,
            self.styles.get(category),
            self.ring.point(&source),
            self.ring.point(&destination),
            key.map(|key| self.ring.point(&key)),
            now,
        );
        if self.animator.enqueue(event) {
            trace!(?category, %source, %destination, "animating");
        }
        Ok(())
    }

    fn migration(&mut self, from: &PeerAddr, activity: &Activity) -> Result<(), Error> {
        let source = Identifier::from_base64(&activity.source)?;
        let destination = Identifier::from_base64(&activity.destination)?;
        debug!(peer = %from, %source, %destination, "migration");
        Ok(())
    }

    /// Drops what the closed channel at `addr` told us.
    fn forget(&mut self, addr: &PeerAddr) {
        for snapshot in self.view.evict_source(addr) {
            debug!(peer = %addr, node = %snapshot, "evicted node of closed channel");
        }
    }

    pub fn select_node(&mut self, addr: &PeerAddr) -> bool {
        let selected = self.view.select_node(addr);
        if selected {
            debug!(peer = %addr, "selected node");
        } else {
            debug!(peer = %addr, "cannot select unknown node");
        }
        selected
    }

    /// Closes the channel to `addr` as if the transport had dropped it.
    pub fn close_peer(&mut self, addr: &PeerAddr) -> bool {
        if self.registry.close(addr) != ChannelState::Closed {
            return false;
        }
        self.forget(addr);
        true
    }

    /// Expires animation events and captures the current state for the
    /// renderer. The change flags stay raised until the renderer
    /// acknowledges the versions through `mark_rendered`.
    pub fn tick(&mut self, now: Instant) -> RenderFrame {
        let events = self.animator.tick(now);
        let ring = self.ring;
        let entries = self
            .view
            .ring_order()
            .into_iter()
            .map(|(address, entry)| FrameEntry {
                address: address.clone(),
                snapshot: entry.snapshot.clone(),
                last_seen: entry.last_seen,
                point: ring.point(&entry.snapshot.identifier),
            })
            .collect();

        let frame = RenderFrame {
            generated_at: Utc::now(),
            entries,
            selected: self.view.selected().cloned(),
            events,
            routes_changed: self.view.routes().is_stale(),
            selection_changed: self.view.meta().is_stale(),
            routes_version: self.view.routes().last_update(),
            meta_version: self.view.meta().last_update(),
            connecting: self.registry.count(ChannelState::Connecting),
            open: self.registry.count(ChannelState::Open),
            dropped_events: self.animator.dropped(),
        };
        frame
    }

    /// The renderer has drawn the node list at `routes` and the detail panel
    /// at `meta`, as carried by some frame.
    pub fn mark_rendered(&mut self, routes: u64, meta: u64) {
        trace!(routes, meta, "frame rendered");
        self.view.mark_routes_rendered(routes);
        self.view.mark_meta_rendered(meta);
    }

    /// Aborts every channel.
    pub fn shutdown(&mut self) {
        self.registry.close_all();
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn view(&self) -> &TopologyView {
        &self.view
    }

    pub fn animator(&self) -> &EventAnimator {
        &self.animator
    }
}
