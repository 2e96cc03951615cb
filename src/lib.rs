//! Flashcard review scheduling on a continuous forgetting curve.
//!
//! Every presentable fact gets a stable identity key (`keys`), its review history is kept in
//! a store shared by every instance working on the same content (`history`), and the
//! `scheduler` ranks variants by how close they are to being forgotten. `sync` pushes the
//! history to a backend in the background.

pub mod core;
pub mod curve;
pub mod history;
pub mod keys;
pub mod modifier;
pub mod persistence;
pub mod scheduler;
pub mod sync;

pub use crate::core::{
    CatalogVariant,
    EngineSettings,
    KiokuError,
    SelectionMode,
    TestableVariant,
    ViewMode,
};
pub use history::{
    HistoryChannel,
    HistoryHub,
    HistoryStore,
};
pub use keys::Block;
pub use modifier::{
    ModifierScope,
    ModifierValue,
};
pub use scheduler::{
    Candidate,
    NextCard,
    Scheduler,
};
pub use sync::{
    ReviewBackend,
    SyncWorker,
};
