use std::sync::Mutex;

use tokio::{sync::mpsc, task::AbortHandle};

use super::{
    addr::PeerAddr,
    channel::{ChannelEvent, ChannelId, Connector},
};

/// Records every channel it is asked to open and leaves the channel pending
/// forever; tests drive the channel events by hand.
#[derive(Default)]
pub struct RecordingConnector {
    opened: Mutex<Vec<PeerAddr>>,
}

impl RecordingConnector {
    pub fn opened(&self) -> Vec<PeerAddr> {
        self.opened.lock().unwrap().clone()
    }
}

impl Connector for RecordingConnector {
    fn open(
        &self,
        addr: PeerAddr,
        _id: ChannelId,
        _events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> AbortHandle {
        self.opened.lock().unwrap().push(addr);
        tokio::spawn(futures::future::pending::<()>()).abort_handle()
    }
}
