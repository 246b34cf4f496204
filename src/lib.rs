pub mod observer;

pub use observer::{
    Error, Identifier, NodeSnapshot, Notification, Observer, ObserverConfig, ObserverHandle,
    PeerAddr, RenderFrame,
};
#[cfg(feature = "websocket")]
pub use observer::{start, WsConnector};

// RINGSCOPE watches a ring-structured store from the outside. It holds no
// authoritative state: every node it can reach pushes its own description and
// its view of the membership over an observation channel, and RINGSCOPE keeps
// whatever it heard last. Partial and stale views are the normal case, not a
// failure.

// Discovery is transitive. Each topology notification lists the sender's view
// of the whole membership, and any listed node without a channel gets one, so
// a single seed address is enough to end up connected to everything reachable
// from it. A closed channel is not reopened on its own; the node comes back
// only if somebody still lists it.

// All state lives in one aggregator task. Channel tasks do nothing but decode
// frames and queue events for it, and rendering runs off a fixed tick rather
// than off event arrival, so a burst of notifications costs one queue drain
// and never more than one frame per tick.
