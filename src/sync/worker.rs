use std::{
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::MissedTickBehavior,
};

use super::{
    flush_pending,
    ReviewBackend,
};
use crate::{
    core::{
        EngineSettings,
        KiokuError,
    },
    history::HistoryStore,
};

/// Periodically pushes pending records of its own store instance.
pub struct SyncWorker {
    store: HistoryStore,
    backend: Arc<dyn ReviewBackend>,
    interval: Duration,
}

impl SyncWorker {
    pub fn new(store: HistoryStore, backend: Arc<dyn ReviewBackend>, interval: Duration) -> Self {
        Self { store, backend, interval }
    }

    pub fn from_settings(
        store: HistoryStore,
        backend: Arc<dyn ReviewBackend>,
        settings: &EngineSettings,
    ) -> Self {
        Self::new(store, backend, settings.flush_interval())
    }

    /// Starts the flush loop on the current tokio runtime.
    pub fn spawn(self) -> SyncHandle {
        let cancel_token = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());

        let join_handle = tokio::spawn(self.run(cancel_token.clone(), notify.clone()));
        SyncHandle { cancel_token, notify, join_handle: Some(join_handle) }
    }

    async fn run(mut self, cancel_token: Arc<AtomicBool>, notify: Arc<Notify>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(
            content_id = %self.store.channel().content_id(),
            interval_ms = self.interval.as_millis() as u64,
            "sync worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = notify.notified() => {}
            }
            if cancel_token.load(Ordering::Relaxed) {
                break;
            }
            self.flush().await;
        }

        // Last chance for answers given since the previous tick.
        self.flush().await;
        tracing::debug!(content_id = %self.store.channel().content_id(), "sync worker stopped");
    }

    async fn flush(&mut self) {
        // Failures are logged by flush_pending and retried on the next tick.
        let _ = flush_pending(&mut self.store, self.backend.as_ref()).await;
    }
}

pub struct SyncHandle {
    cancel_token: Arc<AtomicBool>,
    notify: Arc<Notify>,
    join_handle: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Runs a flush without waiting for the next tick.
    pub fn flush_now(&self) {
        self.notify.notify_one();
    }

    pub fn cancel(&self) {
        self.cancel_token.store(true, Ordering::Relaxed);
        self.notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Stops the loop after one final flush and waits for it.
    pub async fn shutdown(mut self) -> Result<(), KiokuError> {
        self.cancel();
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.await?;
        }
        Ok(())
    }
}
