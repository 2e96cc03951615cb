use std::{
    collections::BTreeMap,
    sync::{
        atomic::{
            AtomicBool,
            AtomicUsize,
            Ordering,
        },
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

use async_trait::async_trait;

use super::ReviewBackend;
use crate::{
    core::KiokuError,
    history::{
        HistoryRecord,
        RecordKey,
        ReviewRecord,
    },
};

/// Backend held in process memory. Used by tests and offline sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<BTreeMap<RecordKey, HistoryRecord>>,
    fail_pushes: AtomicBool,
    push_count: AtomicUsize,
}

impl MemoryBackend {
    pub fn with_records(records: Vec<ReviewRecord>) -> Self {
        let backend = Self::default();
        backend.lock().extend(records.into_iter().map(|r| (r.key, r.record)));
        backend
    }

    pub fn records(&self) -> Vec<ReviewRecord> {
        self.lock()
            .iter()
            .map(|(key, record)| ReviewRecord { key: key.clone(), record: record.clone() })
            .collect()
    }

    /// While set, every push is rejected.
    pub fn set_fail_pushes(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::Relaxed);
    }

    /// Push attempts seen so far, failed ones included.
    pub fn push_count(&self) -> usize {
        self.push_count.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<RecordKey, HistoryRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReviewBackend for MemoryBackend {
    async fn pull_all_records(&self) -> Result<Vec<ReviewRecord>, KiokuError> {
        Ok(self.records())
    }

    async fn push_records(&self, records: &[ReviewRecord]) -> Result<(), KiokuError> {
        self.push_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_pushes.load(Ordering::Relaxed) {
            return Err(KiokuError::Backend("push rejected".to_string()));
        }

        let mut stored = self.lock();
        for record in records {
            stored.insert(record.key.clone(), record.record.clone());
        }
        Ok(())
    }
}
