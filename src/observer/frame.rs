use chrono::{DateTime, Utc};

use super::{addr::PeerAddr, animator::LiveEvent, ring::Point, topology::NodeSnapshot};

/// One node as it should be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameEntry {
    /// Observation address the entry is kept under.
    pub address: PeerAddr,
    pub snapshot: NodeSnapshot,
    pub last_seen: DateTime<Utc>,
    pub point: Point,
}

/// Everything a renderer needs for one tick. Frames are shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub generated_at: DateTime<Utc>,
    /// Nodes in ring order.
    pub entries: Vec<FrameEntry>,
    pub selected: Option<NodeSnapshot>,
    pub events: Vec<LiveEvent>,
    /// The node list changed since the renderer last confirmed drawing it.
    /// Stays set on every frame until `routes_version` is acknowledged.
    pub routes_changed: bool,
    /// The selected node, or what is known about it, changed since the
    /// renderer last confirmed drawing the detail panel.
    pub selection_changed: bool,
    /// Update counter of the node list this frame shows.
    pub routes_version: u64,
    /// Update counter of the selection this frame shows.
    pub meta_version: u64,
    pub connecting: usize,
    pub open: usize,
    pub dropped_events: u64,
}

impl RenderFrame {
    pub fn empty() -> Self {
        Self {
            generated_at: Utc::now(),
            entries: Vec::new(),
            selected: None,
            events: Vec::new(),
            routes_changed: false,
            selection_changed: false,
            routes_version: 0,
            meta_version: 0,
            connecting: 0,
            open: 0,
            dropped_events: 0,
        }
    }

    pub fn entry(&self, address: &PeerAddr) -> Option<&FrameEntry> {
        self.entries.iter().find(|entry| &entry.address == address)
    }
}
