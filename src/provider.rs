use std::sync::mpsc;
use std::sync::Mutex;

use crate::alert::Alert;

/// Alert update delivered over an [`AlertStream`] after the initial snapshot
/// (spec §6 "Alert provider").
#[derive(Debug, Clone)]
pub enum AlertUpdate {
    Upsert(Alert),
    StreamError(String),
}

pub type AlertStream = mpsc::Receiver<AlertUpdate>;

/// A snapshot of currently-tracked alerts plus the live channel of
/// subsequent updates (spec §6). The stream is closed, from the provider's
/// point of view, once its `Sender` is dropped — i.e. when the subscriber
/// releases the subscription.
pub struct Subscription {
    pub initial: Vec<Alert>,
    pub stream: AlertStream,
}

/// The alert-ingestion collaborator (spec §6, out of scope for this crate
/// beyond its interface). `subscribe` may be called more than once; each
/// call gets its own independent stream from the same snapshot.
pub trait AlertProvider: Send + Sync {
    fn subscribe(&self) -> Subscription;
}

struct Inner {
    snapshot: Vec<Alert>,
    senders: Vec<mpsc::Sender<AlertUpdate>>,
}

/// In-tree reference `AlertProvider`, playing the role `datasource::fakes`
/// plays for the teacher's `Querier` trait: a real, test-friendly
/// implementation callers can push updates into and fan out to every live
/// subscriber.
pub struct ChannelAlertProvider {
    inner: Mutex<Inner>,
}

impl ChannelAlertProvider {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshot: Vec::new(),
                senders: Vec::new(),
            }),
        }
    }

    /// Publishes an alert update: replaces the snapshot entry with the same
    /// fingerprint (if any) and fans the update out to every live
    /// subscriber, dropping senders whose receiver has gone away.
    pub fn push(&self, alert: Alert) {
        let mut inner = self.inner.lock().unwrap();
        let fp = alert.fingerprint();
        if let Some(existing) = inner.snapshot.iter_mut().find(|a| a.fingerprint() == fp) {
            *existing = alert.clone();
        } else {
            inner.snapshot.push(alert.clone());
        }
        inner
            .senders
            .retain(|tx| tx.send(AlertUpdate::Upsert(alert.clone())).is_ok());
    }

    pub fn push_stream_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut inner = self.inner.lock().unwrap();
        inner
            .senders
            .retain(|tx| tx.send(AlertUpdate::StreamError(message.clone())).is_ok());
    }
}

impl Default for ChannelAlertProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertProvider for ChannelAlertProvider {
    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.inner.lock().unwrap();
        let initial = inner.snapshot.clone();
        inner.senders.push(tx);
        Subscription { initial, stream: rx }
    }
}
