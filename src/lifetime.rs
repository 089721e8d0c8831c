use std::fmt;

use tokio::sync::watch;

/// Why a [`Lifetime`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// The process was asked to stop
    Signal,
    /// A watcher stopped consuming its change stream
    WatcherStopped { kind: String, error: Option<String> },
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Signal => write!(f, "shutdown requested"),
            Cause::WatcherStopped { kind, error: None } => write!(f, "{kind} watcher stopped"),
            Cause::WatcherStopped {
                kind,
                error: Some(e),
            } => write!(f, "{kind} watcher failed: {e}"),
        }
    }
}

/// Shared cancellation handle for one reconciliation session.
///
/// Clones observe the same state. The first call to [`Lifetime::cancel`] wins
/// and its cause is kept; later calls are ignored.
#[derive(Clone)]
pub struct Lifetime {
    tx: watch::Sender<Option<Cause>>,
    rx: watch::Receiver<Option<Cause>>,
}

impl Default for Lifetime {
    fn default() -> Self {
        let (tx, rx) = watch::channel(None);
        Self { tx, rx }
    }
}

impl Lifetime {
    pub fn new() -> Self {
        Self::default()
    }

    /// End the lifetime, returning false if it had already ended
    pub fn cancel(&self, cause: Cause) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause);
            true
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn cause(&self) -> Option<Cause> {
        self.rx.borrow().clone()
    }

    /// Wait until the lifetime ends and return its cause
    pub async fn cancelled(&self) -> Cause {
        let mut rx = self.rx.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(cause) = current {
                return cause;
            }
            // the sender lives in self, so the channel cannot close while we wait
            if rx.changed().await.is_err() {
                return Cause::Signal;
            }
        }
    }
}
