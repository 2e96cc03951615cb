pub mod errors;
pub mod models;
pub mod settings;
pub mod utils;

pub use errors::KiokuError;
pub use models::{
    final_key,
    CatalogVariant,
    SelectionMode,
    TestableVariant,
    ViewMode,
    ROOT_CATEGORY,
};
pub use settings::EngineSettings;
