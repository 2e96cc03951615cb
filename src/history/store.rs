use std::{
    collections::HashSet,
    sync::Arc,
};

use chrono::{
    DateTime,
    SubsecRound,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::broadcast::{
    self,
    error::TryRecvError,
};
use uuid::Uuid;

use super::{
    channel::{
        HistoryChannel,
        HistoryUpdate,
    },
    record::{
        HistoryRecord,
        HistorySnapshot,
        RecordKey,
        ReviewRecord,
        StoredRecord,
    },
};
use crate::{
    core::{
        KiokuError,
        TestableVariant,
        ViewMode,
    },
    curve::{
        elapsed_secs,
        next_stability,
    },
    keys::KeyPattern,
    modifier::{
        ModifierScope,
        ModifierState,
        ModifierValue,
    },
};

/// In-memory log of what was answered since this store was created. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub card_id: String,
    pub mode: ViewMode,
    pub success: bool,
    pub date: DateTime<Utc>,
    pub key: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub answers: usize,
    pub successes: usize,
    pub failures: usize,
    pub views: usize,
    pub distinct_cards: usize,
}

/// Cached view of one channel's review history.
///
/// The cache is loaded lazily on first read. Every write goes through the channel, which
/// publishes the resulting snapshot; other stores on the same channel adopt it on their
/// next access.
pub struct HistoryStore {
    instance_id: Uuid,
    channel: HistoryChannel,
    receiver: broadcast::Receiver<HistoryUpdate>,
    cache: Option<Arc<HistorySnapshot>>,
    cache_version: u64,
    session: Vec<SessionEntry>,
}

impl HistoryStore {
    pub fn new(channel: HistoryChannel) -> Self {
        let receiver = channel.subscribe();
        Self {
            instance_id: Uuid::new_v4(),
            channel,
            receiver,
            cache: None,
            cache_version: 0,
            session: Vec::new(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn channel(&self) -> &HistoryChannel {
        &self.channel
    }

    pub fn is_loaded(&self) -> bool {
        self.cache.is_some()
    }

    /// Current snapshot after adopting any update published by other instances.
    pub fn snapshot(&mut self) -> Arc<HistorySnapshot> {
        self.refresh();
        if let Some(snapshot) = &self.cache {
            return snapshot.clone();
        }
        self.load()
    }

    fn load(&mut self) -> Arc<HistorySnapshot> {
        // Anything queued so far is already part of the source.
        while self.receiver.try_recv().is_ok() {}
        let (version, snapshot) = self.channel.current_versioned();
        tracing::debug!(
            instance = %self.instance_id,
            content_id = %self.channel.content_id(),
            records = snapshot.len(),
            "history loaded"
        );
        self.cache = Some(snapshot.clone());
        self.cache_version = version;
        snapshot
    }

    fn refresh(&mut self) {
        if self.cache.is_none() {
            return;
        }

        loop {
            match self.receiver.try_recv() {
                // Snapshots older than the cached one were already folded into it.
                Ok(update) => {
                    if update.updater_id != self.instance_id && update.version > self.cache_version
                    {
                        self.cache = Some(update.snapshot);
                        self.cache_version = update.version;
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(instance = %self.instance_id, skipped, "history receiver lagged");
                    let (version, snapshot) = self.channel.current_versioned();
                    self.cache = Some(snapshot);
                    self.cache_version = version;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    fn write<R>(&mut self, mutate: impl FnOnce(&mut HistorySnapshot) -> R) -> R {
        let (update, result) = self.channel.update(self.instance_id, mutate);
        self.cache = Some(update.snapshot);
        self.cache_version = update.version;
        result
    }

    pub fn get_card_history(
        &mut self,
        card_id: &str,
        mode: ViewMode,
        key: &str,
    ) -> Option<StoredRecord> {
        self.snapshot().get_for(card_id, mode, key).cloned()
    }

    pub fn get_record(&mut self, key: &RecordKey) -> Option<StoredRecord> {
        self.snapshot().get(key).cloned()
    }

    /// Records a test answer or an introduction view of `variant`.
    pub fn save_card_result(
        &mut self,
        variant: &TestableVariant,
        mode: ViewMode,
        success: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<StoredRecord, KiokuError> {
        if mode == ViewMode::Modifier {
            return Err(KiokuError::InvalidKey(format!(
                "modifier records are written through save_modifier ({})",
                variant.test_key
            )));
        }
        let final_key = variant.final_key(mode).ok_or_else(|| {
            KiokuError::InvalidKey(format!("{} has no {:?} key", variant.variant_id, mode))
        })?;

        let timestamp = timestamp.trunc_subsecs(3);
        let key = RecordKey::new(variant.card_id.as_str(), final_key.as_str());
        let grouped = variant.is_grouped;

        self.session.push(SessionEntry {
            card_id: variant.card_id.clone(),
            mode,
            success,
            date: timestamp,
            key: final_key,
        });

        let stored = self.write(|snapshot| {
            let previous = snapshot.get(&key).map(|stored| &stored.record);
            let record = if mode == ViewMode::Test {
                next_test_record(previous, success, grouped, timestamp)
            } else {
                next_view_record(previous, timestamp)
            };
            let stored = StoredRecord { record, saved_in_db: false };
            snapshot.insert(key.clone(), stored.clone());
            stored
        });

        tracing::debug!(
            instance = %self.instance_id,
            key = %key,
            success,
            repetition = stored.record.repetition,
            last_s = ?stored.record.last_s,
            "card result saved"
        );
        Ok(stored)
    }

    /// Writes an override as a synthetic record. Clearing writes the default value.
    pub fn save_modifier(
        &mut self,
        card_id: &str,
        scope: &ModifierScope,
        value: ModifierValue,
        timestamp: DateTime<Utc>,
    ) -> StoredRecord {
        let timestamp = timestamp.trunc_subsecs(3);
        let key = RecordKey::new(card_id, scope.final_key());

        let stored = self.write(|snapshot| {
            let previous = snapshot.get(&key).map(|stored| &stored.record);
            let mut record = next_view_record(previous, timestamp);
            record.repetition = u32::from(value.0);
            let stored = StoredRecord { record, saved_in_db: false };
            snapshot.insert(key.clone(), stored.clone());
            stored
        });

        tracing::debug!(instance = %self.instance_id, key = %key, value = value.0, "modifier saved");
        stored
    }

    pub fn modifier_state(&mut self, card_id: &str) -> ModifierState {
        let snapshot = self.snapshot();
        ModifierState::decode(
            snapshot
                .card_records(card_id)
                .map(|(key, stored)| (key.final_key.as_str(), stored.record.repetition)),
        )
    }

    /// Whether any test record of the card matches one of `patterns`.
    pub fn was_ever_tested(&mut self, card_id: &str, patterns: &[KeyPattern]) -> bool {
        let snapshot = self.snapshot();
        let tested = snapshot.card_records(card_id).any(|(key, stored)| {
            key.mode() == Some(ViewMode::Test)
                && stored.record.is_tested()
                && key
                    .final_key
                    .split_once('@')
                    .map(|(_, bare)| patterns.iter().any(|pattern| pattern.matches(bare)))
                    .unwrap_or(false)
        });
        tested
    }

    /// Seeds the cache from the backend. Server records count as saved; `pending` are local
    /// records the backend has not confirmed yet. Without `overwrite`, unsaved local records
    /// win over server values.
    pub fn load_in_db(
        &mut self,
        server_records: Vec<ReviewRecord>,
        pending: Vec<ReviewRecord>,
        overwrite: bool,
    ) {
        let server_count = server_records.len();
        let pending_count = pending.len();

        let total = self.write(|snapshot| {
            if overwrite {
                snapshot.clear();
            }

            for ReviewRecord { key, record } in server_records {
                let keep_local = !overwrite
                    && snapshot.get(&key).map(|stored| !stored.saved_in_db).unwrap_or(false);
                if !keep_local {
                    snapshot.insert(key, StoredRecord { record, saved_in_db: true });
                }
            }

            for ReviewRecord { key, record } in pending {
                snapshot.insert(key, StoredRecord { record, saved_in_db: false });
            }

            snapshot.len()
        });

        tracing::info!(
            instance = %self.instance_id,
            server = server_count,
            pending = pending_count,
            total,
            overwrite,
            "history loaded from backend"
        );
    }

    pub fn unsaved_records(&mut self) -> Vec<ReviewRecord> {
        self.snapshot().unsaved().collect()
    }

    /// Marks pushed records as saved, but only where the local value still equals what was
    /// pushed. Returns the number of records marked.
    pub fn mark_as_saved_in_db(&mut self, pushed: &[ReviewRecord]) -> usize {
        let marked = self.write(|snapshot| {
            let mut marked = 0;
            for ReviewRecord { key, record } in pushed {
                if let Some(stored) = snapshot.get_mut(key) {
                    if !stored.saved_in_db && stored.record == *record {
                        stored.saved_in_db = true;
                        marked += 1;
                    }
                }
            }
            marked
        });

        tracing::debug!(
            instance = %self.instance_id,
            pushed = pushed.len(),
            marked,
            "records marked as saved"
        );
        marked
    }

    pub fn session_history(&self) -> &[SessionEntry] {
        &self.session
    }

    pub fn session_summary(&self) -> SessionSummary {
        let mut summary = SessionSummary::default();
        let mut cards = HashSet::new();

        for entry in &self.session {
            cards.insert(entry.card_id.as_str());
            if entry.mode == ViewMode::Test {
                summary.answers += 1;
                if entry.success {
                    summary.successes += 1;
                } else {
                    summary.failures += 1;
                }
            } else if entry.mode.is_introduction() {
                summary.views += 1;
            }
        }

        summary.distinct_cards = cards.len();
        summary
    }
}

fn next_test_record(
    previous: Option<&HistoryRecord>,
    success: bool,
    grouped: bool,
    timestamp: DateTime<Utc>,
) -> HistoryRecord {
    let elapsed = previous.map(|record| elapsed_secs(record.last_date, timestamp)).unwrap_or(0.0);
    let last_s = next_stability(previous.and_then(|record| record.last_s), elapsed, success, grouped);

    HistoryRecord {
        last_s: Some(last_s),
        last_has_failed: Some(!success),
        ..next_view_record(previous, timestamp)
    }
}

fn next_view_record(previous: Option<&HistoryRecord>, timestamp: DateTime<Utc>) -> HistoryRecord {
    match previous {
        Some(record) => HistoryRecord {
            last_date: record.last_date.max(timestamp),
            repetition: record.repetition.saturating_add(1),
            ..record.clone()
        },
        None => HistoryRecord { repetition: 1, ..HistoryRecord::first(timestamp) },
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
