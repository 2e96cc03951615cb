//! Backend persistence: pulling the server history and pushing records that are not saved yet.
//!
//! A push never drops anything. Records stay `saved_in_db: false` until a push succeeds and
//! the local value still equals what was sent; otherwise the next flush sends them again.

use async_trait::async_trait;

use crate::{
    core::KiokuError,
    history::{
        HistoryStore,
        ReviewRecord,
    },
};

pub mod api;
pub mod memory;
pub mod worker;

pub use api::HttpBackend;
pub use memory::MemoryBackend;
pub use worker::{
    SyncHandle,
    SyncWorker,
};

/// Remote store of review records. Pushes overwrite by key, so resending is harmless.
#[async_trait]
pub trait ReviewBackend: Send + Sync {
    async fn pull_all_records(&self) -> Result<Vec<ReviewRecord>, KiokuError>;

    async fn push_records(&self, records: &[ReviewRecord]) -> Result<(), KiokuError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub pushed: usize,
    pub saved: usize,
    /// Unsaved records left after the flush, including ones written during the push.
    pub still_pending: usize,
}

/// Replaces the local history with the server's while keeping local records the server has
/// not confirmed yet. Returns the number of server records.
pub async fn initial_load(
    store: &mut HistoryStore,
    backend: &dyn ReviewBackend,
) -> Result<usize, KiokuError> {
    let server_records = backend.pull_all_records().await?;
    let pending = store.unsaved_records();
    let count = server_records.len();

    store.load_in_db(server_records, pending, true);
    Ok(count)
}

pub async fn flush_pending(
    store: &mut HistoryStore,
    backend: &dyn ReviewBackend,
) -> Result<FlushReport, KiokuError> {
    let pending = store.unsaved_records();
    if pending.is_empty() {
        return Ok(FlushReport::default());
    }

    if let Err(e) = backend.push_records(&pending).await {
        tracing::warn!(pending = pending.len(), error = %e, "push failed, records stay pending");
        return Err(e);
    }

    let saved = store.mark_as_saved_in_db(&pending);
    let report = FlushReport {
        pushed: pending.len(),
        saved,
        still_pending: store.unsaved_records().len(),
    };

    tracing::info!(
        pushed = report.pushed,
        saved = report.saved,
        still_pending = report.still_pending,
        "flushed review records"
    );
    Ok(report)
}
