//! Cancellable timers for transient notifications.
//!
//! A fired timer does not touch any session itself. It reports an
//! [`Expiry`] on a channel, and whoever owns the runner turns that into
//! `Event::NotificationExpired`.

use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::AbortHandle};
use tracing::debug;

/// A notification whose display time ran out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    pub session_id: String,
    pub notification_id: u64,
}

#[derive(Clone)]
pub struct NotificationScheduler {
    timers: Arc<DashMap<(String, u64), AbortHandle>>,
    expired_tx: mpsc::UnboundedSender<Expiry>,
}

impl NotificationScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Expiry>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            timers: Arc::new(DashMap::new()),
            expired_tx,
        };
        (scheduler, expired_rx)
    }

    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, session_id: &str, notification_id: u64, after: Duration) {
        let key = (session_id.to_string(), notification_id);
        let timers = self.timers.clone();
        let tx = self.expired_tx.clone();
        let expiry = Expiry {
            session_id: session_id.to_string(),
            notification_id,
        };

        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            timers.remove(&task_key);
            debug!(
                session_id = %expiry.session_id,
                notification_id = expiry.notification_id,
                "Notification expired"
            );
            let _ = tx.send(expiry);
        });

        if let Some(previous) = self.timers.insert(key, handle.abort_handle()) {
            previous.abort();
        }
    }

    /// Returns whether a live timer was cancelled.
    pub fn cancel(&self, session_id: &str, notification_id: u64) -> bool {
        match self
            .timers
            .remove(&(session_id.to_string(), notification_id))
        {
            Some((_, handle)) => {
                handle.abort();
                debug!(session_id, notification_id, "Notification timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }
}
