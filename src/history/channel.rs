use std::{
    collections::{
        BTreeMap,
        HashMap,
    },
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

use tokio::sync::broadcast;
use uuid::Uuid;

use super::record::{
    HistorySnapshot,
    RecordKey,
    StoredRecord,
};
use crate::{
    core::{
        utils::hash8,
        EngineSettings,
        KiokuError,
    },
    persistence::{
        get_app_data_dir,
        load_json_from,
        save_json_compact_to,
    },
};

const CHANNEL_CAPACITY: usize = 64;

/// Full snapshot published after every mutation.
#[derive(Debug, Clone)]
pub struct HistoryUpdate {
    pub updater_id: Uuid,
    /// Increases by one with every update on the channel.
    pub version: u64,
    pub snapshot: Arc<HistorySnapshot>,
}

struct SourceState {
    version: u64,
    snapshot: Arc<HistorySnapshot>,
}

struct ChannelInner {
    content_id: String,
    sender: broadcast::Sender<HistoryUpdate>,
    source: Mutex<SourceState>,
    file_path: Option<PathBuf>,
}

/// Source of truth shared by every store instance working on the same content.
#[derive(Clone)]
pub struct HistoryChannel {
    inner: Arc<ChannelInner>,
}

impl HistoryChannel {
    pub fn in_memory(content_id: impl Into<String>) -> Self {
        Self::build(content_id.into(), HistorySnapshot::default(), None)
    }

    /// Channel mirrored to `file_path`. Unreadable records are skipped and the original
    /// file is kept next to it as `<name>.json.corrupt`.
    pub fn with_file(content_id: impl Into<String>, file_path: PathBuf) -> Self {
        let snapshot = load_snapshot(&file_path);
        Self::build(content_id.into(), snapshot, Some(file_path))
    }

    fn build(content_id: String, snapshot: HistorySnapshot, file_path: Option<PathBuf>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        tracing::debug!(content_id = %content_id, records = snapshot.len(), "history channel opened");

        Self {
            inner: Arc::new(ChannelInner {
                content_id,
                sender,
                source: Mutex::new(SourceState { version: 0, snapshot: Arc::new(snapshot) }),
                file_path,
            }),
        }
    }

    pub fn content_id(&self) -> &str {
        &self.inner.content_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HistoryUpdate> {
        self.inner.sender.subscribe()
    }

    pub fn current(&self) -> Arc<HistorySnapshot> {
        self.lock_source().snapshot.clone()
    }

    pub(crate) fn current_versioned(&self) -> (u64, Arc<HistorySnapshot>) {
        let source = self.lock_source();
        (source.version, source.snapshot.clone())
    }

    pub fn same_channel(&self, other: &HistoryChannel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Applies `mutate` to the latest snapshot and publishes the result as one update.
    pub(crate) fn update<R>(
        &self,
        updater_id: Uuid,
        mutate: impl FnOnce(&mut HistorySnapshot) -> R,
    ) -> (HistoryUpdate, R) {
        let mut source = self.lock_source();

        let mut next = HistorySnapshot::clone(&source.snapshot);
        let result = mutate(&mut next);
        source.version += 1;
        source.snapshot = Arc::new(next);

        let update =
            HistoryUpdate { updater_id, version: source.version, snapshot: source.snapshot.clone() };

        // Written under the lock so the file never goes back to an older version.
        if let Some(file_path) = &self.inner.file_path {
            if let Err(e) = save_json_compact_to(update.snapshot.as_ref(), file_path) {
                tracing::warn!(
                    content_id = %self.inner.content_id,
                    error = %e,
                    "failed to persist history snapshot"
                );
            }
        }
        drop(source);

        // Receivers skip versions they already have, so send order does not matter.
        // No receivers is fine: every store also reads the source on first use.
        let _ = self.inner.sender.send(update.clone());

        (update, result)
    }

    fn lock_source(&self) -> MutexGuard<'_, SourceState> {
        self.inner.source.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hands out one channel per content identity. Owned by the host and passed to stores.
#[derive(Clone, Default)]
pub struct HistoryHub {
    channels: Arc<Mutex<HashMap<String, HistoryChannel>>>,
    data_dir: Option<PathBuf>,
}

impl HistoryHub {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn persistent(data_dir: PathBuf) -> Self {
        Self { channels: Arc::default(), data_dir: Some(data_dir) }
    }

    /// Mirrors channels to the per-user data directory when `persist_history` is set.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        if settings.persist_history {
            Self::persistent(get_app_data_dir())
        } else {
            Self::in_memory()
        }
    }

    pub fn channel(&self, content_id: &str) -> HistoryChannel {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);

        channels
            .entry(content_id.to_string())
            .or_insert_with(|| match &self.data_dir {
                Some(dir) => HistoryChannel::with_file(content_id, dir.join(file_name(content_id))),
                None => HistoryChannel::in_memory(content_id),
            })
            .clone()
    }
}

/// Readable stem plus a hash of the full id, so ids that sanitize alike keep separate files.
fn file_name(content_id: &str) -> String {
    let stem: String = content_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("history-{stem}-{}.json", hash8(content_id))
}

fn load_snapshot(file_path: &Path) -> HistorySnapshot {
    let entries: BTreeMap<String, serde_json::Value> = match load_json_from(file_path) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %file_path.display(), error = %e, "history file unreadable");
            set_aside(file_path, false);
            return HistorySnapshot::default();
        }
    };

    let mut snapshot = HistorySnapshot::default();
    let mut skipped = 0usize;
    for (raw_key, value) in entries {
        let parsed = RecordKey::parse(&raw_key).and_then(|key| {
            let stored: StoredRecord = serde_json::from_value(value)?;
            Ok::<_, KiokuError>((key, stored))
        });
        match parsed {
            Ok((key, stored)) => snapshot.insert(key, stored),
            Err(e) => {
                skipped += 1;
                tracing::warn!(key = %raw_key, error = %e, "skipping unreadable history record");
            }
        }
    }

    if skipped > 0 {
        set_aside(file_path, true);
    }
    snapshot
}

/// Preserves a damaged history file before the next update overwrites it.
fn set_aside(file_path: &Path, keep_original: bool) {
    let corrupt_path = file_path.with_extension("json.corrupt");
    let result = if keep_original {
        fs::copy(file_path, &corrupt_path).map(|_| ())
    } else {
        fs::rename(file_path, &corrupt_path)
    };

    match result {
        Ok(()) => tracing::warn!(path = %corrupt_path.display(), "history file set aside"),
        Err(e) => tracing::warn!(
            path = %file_path.display(),
            error = %e,
            "failed to set history file aside"
        ),
    }
}
