//! The worker pool: N long-lived tasks, each alternating between waiting on
//! a trigger (or timing out) and running a bounded claim/dispatch batch.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::HarnessConfig;
use crate::dispatcher::Dispatcher;
use crate::handler::{EventHandler, HarnessContext};
use crate::queue::QueueStore;
use crate::trigger::{channel, Trigger, TriggerReceiver};

/// Per-cycle cap on claim/dispatch iterations, so one worker's run never
/// starves the others for too long.
const MAX_BATCH_PER_CYCLE: usize = 20;

pub struct WorkerPool {
    config: HarnessConfig,
    queue: QueueStore,
    handler: Arc<dyn EventHandler>,
    ctx: HarnessContext,
    receiver: TriggerReceiver,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Builds the pool and returns the [`Trigger`] handle ingress should
    /// clone into its event callbacks.
    pub fn new(
        config: HarnessConfig,
        queue: QueueStore,
        handler: Arc<dyn EventHandler>,
        ctx: HarnessContext,
    ) -> (Self, Trigger) {
        let (trigger, receiver) = channel();
        let pool = Self {
            config,
            queue,
            handler,
            ctx,
            receiver,
            cancel: CancellationToken::new(),
        };
        (pool, trigger)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawns `num_workers` tasks and returns immediately; the returned
    /// handles are for the embedding application to await on shutdown, not
    /// required for normal operation.
    pub fn spawn(self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.config.num_workers);

        for worker_id in 0..self.config.num_workers {
            let dispatcher = Arc::new(Dispatcher::new(
                self.queue.clone(),
                self.handler.clone(),
                self.ctx.clone(),
                self.config.max_attempts,
                self.config.invisibility,
            ));
            let config = self.config.clone();
            let queue = self.queue.clone();
            let receiver = self.receiver.clone();
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(run_worker(
                worker_id, dispatcher, queue, config, receiver, cancel,
            )));
        }
        handles
    }
}

async fn run_worker(
    worker_id: usize,
    dispatcher: Arc<Dispatcher>,
    queue: QueueStore,
    config: HarnessConfig,
    mut trigger: TriggerReceiver,
    cancel: CancellationToken,
) {
    if worker_id > 0 {
        let offset = rand::thread_rng().gen_range(0..=config.worker_sleep.as_secs().max(1));
        tracing::debug!(worker_id, offset_secs = offset, "staggering worker startup");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(offset)) => {},
            _ = cancel.cancelled() => return,
        }
    }

    loop {
        let jitter = rand::thread_rng()
            .gen_range(config.worker_min_jitter_secs..=config.worker_max_jitter_secs);
        let wait = Duration::from_secs(
            (config.worker_sleep.as_secs() as i64 + jitter).max(1) as u64,
        );

        tokio::select! {
            woken = trigger.recv() => {
                if woken.is_none() {
                    tracing::info!(worker_id, "trigger channel closed, stopping worker");
                    return;
                }
                tracing::trace!(worker_id, "woke via trigger");
            }
            _ = tokio::time::sleep(wait) => {
                tracing::trace!(worker_id, "woke via timeout");
            }
            _ = cancel.cancelled() => {
                tracing::info!(worker_id, "worker cancelled");
                return;
            }
        }

        match dispatcher.process_batch(MAX_BATCH_PER_CYCLE).await {
            Ok(count) if count > 0 => tracing::debug!(worker_id, count, "processed batch"),
            Ok(_) => {}
            Err(err) => tracing::error!(worker_id, error = %err, "batch processing failed"),
        }

        if let Err(err) = queue
            .delete_expired_events(config.max_attempts, config.max_age)
            .await
        {
            tracing::error!(worker_id, error = %err, "expiry sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_window_keeps_wait_positive() {
        let config = HarnessConfig {
            worker_sleep: Duration::from_secs(5),
            worker_min_jitter_secs: -15,
            worker_max_jitter_secs: 15,
            ..HarnessConfig::default()
        };
        // Mirrors the clamp in `run_worker`'s wait computation.
        for jitter in config.worker_min_jitter_secs..=config.worker_max_jitter_secs {
            let wait = (config.worker_sleep.as_secs() as i64 + jitter).max(1);
            assert!(wait >= 1);
        }
    }
}
