//! A debounced "try buffer" that coalesces bursts of requests into one action.
use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::debug;

/// The deferred action run by a [`TryBuffer`]
pub type Action = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Coalesces calls to [`TryBuffer::try_fire`].
///
/// The first call arms the buffer; the action runs once `window` has passed
/// without further calls. Calls made while the action runs arm the next
/// round. Without `rearm`, the buffer runs its action at most once.
pub struct TryBuffer {
    requests: mpsc::UnboundedSender<()>,
    closed: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TryBuffer {
    pub fn new(window: Duration, rearm: bool, action: Action) -> Self {
        let (requests, rx) = mpsc::unbounded_channel();
        let (closed, closed_rx) = watch::channel(false);
        let task = tokio::spawn(debounce(window, rearm, action, rx, closed_rx));
        Self {
            requests,
            closed,
            task,
        }
    }

    /// Request the action, coalescing with any pending request
    pub fn try_fire(&self) {
        if *self.closed.borrow() {
            return;
        }
        // the receiver only goes away once the buffer is spent or closed
        let _ = self.requests.send(());
    }

    /// Drop any pending request and stop accepting new ones
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl Drop for TryBuffer {
    fn drop(&mut self) {
        self.close();
        self.task.abort();
    }
}

async fn debounce(
    window: Duration,
    rearm: bool,
    action: Action,
    mut requests: mpsc::UnboundedReceiver<()>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        // Wait for the first request of a burst
        tokio::select! {
            biased;
            _ = closed_signal(&mut closed) => return,
            req = requests.recv() => if req.is_none() { return },
        }

        // Extend the window while requests keep arriving
        loop {
            tokio::select! {
                biased;
                _ = closed_signal(&mut closed) => return,
                req = requests.recv() => if req.is_none() { return },
                _ = tokio::time::sleep(window) => break,
            }
        }

        debug!("try buffer firing");
        tokio::select! {
            biased;
            _ = closed_signal(&mut closed) => return,
            _ = action() => {}
        }

        if !rearm {
            return;
        }
    }
}

/// Resolves once the buffer is closed or dropped
async fn closed_signal(closed: &mut watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed || closed.changed().await.is_err() {
            return;
        }
    }
}
