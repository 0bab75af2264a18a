//! A process-wide wake signal: ingress sends one per persisted event, and
//! whichever worker is free to receive it runs a claim/dispatch batch (which
//! drains the whole queue, not just one event, so waking any single worker
//! is sufficient). The channel carries no payload and coalesces bursts — a
//! full channel means a wake is already pending, so the extra send is
//! dropped without semantic loss; the periodic per-worker timeout is the
//! backstop against a missed or coalesced wake.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

#[derive(Clone)]
pub struct Trigger {
    tx: mpsc::Sender<()>,
}

/// A handle workers clone to share one underlying receiver: a trigger fire
/// wakes exactly one waiting worker, matching the original single
/// producer/multi-consumer queue this is modeled on.
#[derive(Clone)]
pub struct TriggerReceiver {
    rx: Arc<Mutex<mpsc::Receiver<()>>>,
}

/// Builds a linked trigger/receiver pair. Clone the `Trigger` into every
/// producer (ingress callbacks); clone the `TriggerReceiver` into every
/// worker.
pub fn channel() -> (Trigger, TriggerReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (
        Trigger { tx },
        TriggerReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

impl Trigger {
    /// Best-effort wake. Never blocks; drops the signal if one is already
    /// queued.
    pub fn fire(&self) {
        if self.tx.try_send(()).is_err() {
            tracing::trace!("trigger already pending, coalesced");
        }
    }
}

impl TriggerReceiver {
    /// Waits for a wake. Returns `None` once every `Trigger` clone has been
    /// dropped.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.lock().await.recv().await
    }
}
