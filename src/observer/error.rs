use thiserror::Error;

/// Everything that can go wrong while observing the ring. None of these are
/// fatal to the aggregator: the notification or channel involved is dropped
/// and observation carries on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0:?} is not a host:port address")]
    InvalidAddress(String),
    #[error("{0} has no observation port above it")]
    PortOverflow(String),
    #[error("identifier is {0} bytes wide, expected 16")]
    IdentifierWidth(usize),
    #[error("identifier is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("identifier is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("no seed address given")]
    MissingSeed,
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidSetting { name: &'static str, value: String },
    #[error("unknown notification type {0:?}")]
    UnknownTag(String),
    #[error("could not decode notification: {0}")]
    Decode(#[from] serde_json::Error),
    #[cfg(feature = "websocket")]
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}
