//! Session shutdown coordination.

use tokio::sync::broadcast;

/// Fan-out of a single "stop now" notification.
///
/// `watch` and any other long-running command subscribe before they start
/// waiting; the signal handler (or a test) calls `trigger` once.
#[derive(Debug, Clone)]
pub struct Shutdown {
    notify: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self { notify }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }

    /// Wake every subscriber. A no-op when nobody is listening.
    pub fn trigger(&self) {
        if self.notify.send(()).is_err() {
            tracing::debug!("Shutdown triggered with no listeners");
        }
    }

    pub fn listeners(&self) -> usize {
        self.notify.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
