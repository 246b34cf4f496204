use tokio::{sync::mpsc, task::AbortHandle};

use super::{addr::PeerAddr, error::Error, wire::Notification};

/// Distinguishes successive channels to the same address, so events from a
/// channel that has already been replaced are recognised and ignored.
pub type ChannelId = u64;

/// What a channel task reports back to the aggregator. Channel tasks never
/// touch shared state themselves; they only send these.
#[derive(Debug)]
pub enum ChannelEvent {
    Opened {
        addr: PeerAddr,
        id: ChannelId,
    },
    Received {
        addr: PeerAddr,
        id: ChannelId,
        notification: Notification,
    },
    /// The last event a channel sends. `error` is `None` for an orderly
    /// close.
    Closed {
        addr: PeerAddr,
        id: ChannelId,
        error: Option<Error>,
    },
}

/// Opens observation channels.
///
/// `open` must return immediately: it spawns a task that connects to `addr`
/// and reports its progress through `events`, ending with exactly one
/// `Closed` unless it is aborted through the returned handle first.
pub trait Connector: Send + Sync + 'static {
    fn open(
        &self,
        addr: PeerAddr,
        id: ChannelId,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> AbortHandle;
}

#[cfg(feature = "websocket")]
pub use self::websocket::WsConnector;

#[cfg(feature = "websocket")]
mod websocket {
    use futures::StreamExt;
    use tokio::{sync::mpsc, task::AbortHandle};
    use tokio_tungstenite::{connect_async, tungstenite::Message};
    use tracing::{debug, debug_span, trace, warn, Instrument};

    use super::{ChannelEvent, ChannelId, Connector};
    use crate::observer::{addr::PeerAddr, error::Error, wire::Notification};

    /// Connects to `ws://host:port/ws` and reads one JSON notification per
    /// text frame.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WsConnector;

    impl Connector for WsConnector {
        fn open(
            &self,
            addr: PeerAddr,
            id: ChannelId,
            events: mpsc::UnboundedSender<ChannelEvent>,
        ) -> AbortHandle {
            let span = debug_span!("channel", peer = %addr, id);
            tokio::spawn(
                async move {
                    let error = receive(&addr, id, &events).await.err();
                    match &error {
                        Some(e) => debug!(error = %e, "observation channel failed"),
                        None => debug!("observation channel closed"),
                    }
                    // the aggregator may already be gone
                    let _ = events.send(ChannelEvent::Closed { addr, id, error });
                }
                .instrument(span),
            )
            .abort_handle()
        }
    }

    async fn receive(
        addr: &PeerAddr,
        id: ChannelId,
        events: &mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<(), Error> {
        let url = addr.ws_url();
        debug!(%url, "opening observation channel");
        let (mut stream, _response) = connect_async(url.as_str()).await?;
        debug!("observation channel open");
        if events
            .send(ChannelEvent::Opened {
                addr: addr.clone(),
                id,
            })
            .is_err()
        {
            return Ok(());
        }

        while let Some(msg) = stream.next().await {
            match msg? {
                Message::Text(text) => match Notification::decode(&text) {
                    Ok(notification) => {
                        trace!(tag = notification.tag(), "received notification");
                        let event = ChannelEvent::Received {
                            addr: addr.clone(),
                            id,
                            notification,
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "discarding malformed notification");
                    }
                },
                Message::Close(frame) => {
                    debug!(?frame, "peer closed observation channel");
                    break;
                }
                // tungstenite answers pings itself
                _ => {}
            }
        }
        Ok(())
    }
}
