pub mod addr;
pub mod aggregator;
pub mod animator;
pub mod channel;
pub mod config;
pub mod error;
pub mod frame;
pub mod peers;
pub mod ring;
pub mod runtime;
pub mod topology;
pub mod wire;

#[cfg(test)]
mod testing;

pub use addr::PeerAddr;
pub use aggregator::AggregatorState;
pub use animator::{AnimationEvent, Category, EventAnimator, LiveEvent, Style, StyleTable};
pub use channel::{ChannelEvent, ChannelId, Connector};
pub use config::ObserverConfig;
pub use error::Error;
pub use frame::{FrameEntry, RenderFrame};
pub use peers::{ChannelState, PeerRegistry};
pub use ring::{Identifier, Point, RingCoordinate};
pub use runtime::{Observer, ObserverHandle};
pub use topology::{NodeSnapshot, TopologyView};
pub use wire::Notification;

#[cfg(feature = "websocket")]
pub use channel::WsConnector;
#[cfg(feature = "websocket")]
pub use runtime::start;
