use std::process::ExitCode;
use std::sync::Arc;

use ringscope::{Observer, ObserverConfig, RenderFrame, WsConnector};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match ObserverConfig::from_env(std::env::args().nth(1)) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "usage: ringscope-cli <host:port>");
            return ExitCode::FAILURE;
        }
    };
    info!(seed = %config.seed, tick = ?config.tick, "observing ring");

    let observer = Observer::start(config, Arc::new(WsConnector));
    let mut frames = observer.frames();
    let mut drawn = Drawn::default();

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                break;
            }
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = frames.borrow_and_update().clone();
                if render(&frame, &mut drawn) {
                    observer.mark_rendered(&frame);
                }
            }
        }
    }

    info!("shutting down");
    observer.shutdown().await;
    ExitCode::SUCCESS
}

/// What the log already shows.
#[derive(Default)]
struct Drawn {
    routes: u64,
    meta: u64,
    live: usize,
}

/// Logs what a graphical renderer would redraw. Returns whether the ring or
/// the selection was redrawn.
fn render(frame: &RenderFrame, drawn: &mut Drawn) -> bool {
    // acknowledgements trail the frames, so a flag may still be up for a
    // version that is already on screen
    let routes = frame.routes_changed && frame.routes_version != drawn.routes;
    let meta = frame.selection_changed && frame.meta_version != drawn.meta;

    if routes {
        drawn.routes = frame.routes_version;
        info!(
            nodes = frame.entries.len(),
            open = frame.open,
            connecting = frame.connecting,
            "ring changed"
        );
        for entry in &frame.entries {
            info!(
                "  {} owned={} held={} at {}",
                entry.snapshot, entry.snapshot.owned_entries, entry.snapshot.held_entries, entry.point
            );
        }
    }
    if meta {
        drawn.meta = frame.meta_version;
        match &frame.selected {
            Some(node) => info!(
                node = %node,
                owned = node.owned_entries,
                held = node.held_entries,
                last_reroute = ?node.activity.last_reroute,
                last_sync = ?node.activity.last_sync,
                last_migrate = ?node.activity.last_migrate,
                "selected"
            ),
            None => info!("nothing selected"),
        }
    }
    if frame.events.len() != drawn.live {
        drawn.live = frame.events.len();
        info!(live = drawn.live, dropped = frame.dropped_events, "activity");
    }
    routes || meta
}
