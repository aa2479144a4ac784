//! Confirmation bridge between receive sessions and the interactive UI.
//!
//! The bridge is a passive queue: receive sessions push pending offers and
//! block on a verdict; the UI pulls them in arrival order and resolves
//! each one. Nothing here calls into the UI, which keeps the dependency
//! arrow pointing one way.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{oneshot, Notify};

use crate::CONFIRM_TIMEOUT;

/// An incoming transfer proposal, as shown to the user.
#[derive(Debug, Clone)]
pub struct FileOffer {
    /// Remote end of the TCP connection that made the offer.
    pub peer: SocketAddr,
    pub filename: String,
    pub size: u64,
    pub md5: String,
}

/// The user's decision on an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
}

/// An offer waiting for a verdict, handed to the UI.
#[derive(Debug)]
pub struct PendingOffer {
    offer: FileOffer,
    responder: oneshot::Sender<Verdict>,
}

impl PendingOffer {
    pub fn offer(&self) -> &FileOffer {
        &self.offer
    }

    /// Delivers the verdict to the waiting receive session.
    ///
    /// A session that already timed out is gone; the verdict is then
    /// dropped silently.
    pub fn resolve(self, verdict: Verdict) {
        let _ = self.responder.send(verdict);
    }
}

/// Queue of offers awaiting user confirmation.
pub struct ConfirmBridge {
    queue: Mutex<VecDeque<PendingOffer>>,
    notify: Notify,
    timeout: Duration,
}

impl Default for ConfirmBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmBridge {
    pub fn new() -> Self {
        Self::with_timeout(CONFIRM_TIMEOUT)
    }

    /// Custom decision timeout; tests shrink it.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            timeout,
        }
    }

    /// Enqueues `offer` and blocks until the UI resolves it.
    ///
    /// Times out to [`Verdict::Reject`]; a dropped responder counts as a
    /// rejection too.
    pub async fn request(&self, offer: FileOffer) -> Verdict {
        let (tx, rx) = oneshot::channel();
        self.queue.lock().unwrap().push_back(PendingOffer {
            offer,
            responder: tx,
        });
        self.notify.notify_one();

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(_)) | Err(_) => Verdict::Reject,
        }
    }

    /// Read-only view of offers not yet pulled by the UI.
    pub fn pending(&self) -> Vec<FileOffer> {
        self.queue
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.offer.clone())
            .collect()
    }

    /// Waits for the next pending offer, in arrival order.
    pub async fn next(&self) -> PendingOffer {
        loop {
            if let Some(pending) = self.queue.lock().unwrap().pop_front() {
                return pending;
            }
            self.notify.notified().await;
        }
    }
}
