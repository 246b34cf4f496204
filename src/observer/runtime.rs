use std::{sync::Arc, time::Duration};

use tokio::{
    select,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, debug_span, warn, Instrument};

use super::{
    addr::PeerAddr,
    aggregator::AggregatorState,
    channel::{ChannelEvent, Connector},
    config::ObserverConfig,
    frame::RenderFrame,
};

enum Command {
    SelectNode(PeerAddr),
    ClosePeer(PeerAddr),
    Rendered { routes: u64, meta: u64 },
}

pub struct Observer;

impl Observer {
    /// Spawns the aggregator task and seeds it with `config.seed`. Must be
    /// called from within a tokio runtime.
    pub fn start(config: ObserverConfig, connector: Arc<dyn Connector>) -> ObserverHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = watch::channel(Arc::new(RenderFrame::empty()));
        let shutdown = CancellationToken::new();

        let state = AggregatorState::new(&config, connector, events_tx);
        let span = debug_span!("observer", seed = %config.seed);
        let task = tokio::spawn(
            run(
                state,
                config.seed,
                config.tick,
                events_rx,
                commands_rx,
                frames_tx,
                shutdown.clone(),
            )
            .instrument(span),
        );

        ObserverHandle {
            commands: commands_tx,
            frames: frames_rx,
            _guard: shutdown.clone().drop_guard(),
            shutdown,
            task,
        }
    }
}

/// Starts observing the ring from `seed` over WebSocket observation channels
/// with the default configuration.
#[cfg(feature = "websocket")]
pub fn start(seed: PeerAddr) -> ObserverHandle {
    Observer::start(
        ObserverConfig::builder().seed(seed).build(),
        Arc::new(super::channel::WsConnector),
    )
}

/// Control surface of a running observer. Dropping it stops the observer.
pub struct ObserverHandle {
    commands: mpsc::UnboundedSender<Command>,
    frames: watch::Receiver<Arc<RenderFrame>>,
    shutdown: CancellationToken,
    _guard: DropGuard,
    task: JoinHandle<()>,
}

impl ObserverHandle {
    /// The latest render frame, replaced on every tick.
    pub fn frames(&self) -> watch::Receiver<Arc<RenderFrame>> {
        self.frames.clone()
    }

    /// Shows `addr`'s details, if the observer knows that node.
    pub fn select_node(&self, addr: PeerAddr) {
        let _ = self.commands.send(Command::SelectNode(addr));
    }

    pub fn close_peer(&self, addr: PeerAddr) {
        let _ = self.commands.send(Command::ClosePeer(addr));
    }

    /// Confirms that `frame` has been drawn. Until this is called for a
    /// frame carrying the latest versions, every frame keeps reporting the
    /// node list or the selection as changed.
    pub fn mark_rendered(&self, frame: &RenderFrame) {
        let _ = self.commands.send(Command::Rendered {
            routes: frame.routes_version,
            meta: frame.meta_version,
        });
    }

    /// Stops the observer, closes every channel and waits for the task to
    /// finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "observer task did not finish cleanly");
        }
    }
}

async fn run(
    mut state: AggregatorState,
    seed: PeerAddr,
    tick: Duration,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    frames: watch::Sender<Arc<RenderFrame>>,
    shutdown: CancellationToken,
) {
    debug!("observer started");
    state.seed(&seed);

    let mut ticker = tokio::time::interval(tick.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        select! {
            _ = shutdown.cancelled() => break,
            Some(event) = events.recv() => {
                state.handle_channel_event(event, Instant::now());
            }
            Some(command) = commands.recv() => match command {
                Command::SelectNode(addr) => {
                    state.select_node(&addr);
                }
                Command::ClosePeer(addr) => {
                    state.close_peer(&addr);
                }
                Command::Rendered { routes, meta } => {
                    state.mark_rendered(routes, meta);
                }
            },
            _ = ticker.tick() => {
                let frame = state.tick(Instant::now());
                frames.send_replace(Arc::new(frame));
            }
        }
    }

    state.shutdown();
    debug!("observer stopped");
}
