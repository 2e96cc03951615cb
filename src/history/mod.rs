//! Local review history shared between store instances, with backend sync bookkeeping.

pub mod channel;
pub mod record;
pub mod store;

pub use channel::{
    HistoryChannel,
    HistoryHub,
    HistoryUpdate,
};
pub use record::{
    HistoryRecord,
    HistorySnapshot,
    RecordKey,
    ReviewRecord,
    StoredRecord,
};
pub use store::{
    HistoryStore,
    SessionEntry,
    SessionSummary,
};
