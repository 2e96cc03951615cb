use std::time::Duration;

use serde::{
    Deserialize,
    Serialize,
};

use super::{
    KiokuError,
    SelectionMode,
};
use crate::{
    keys::Block,
    persistence::{
        load_json_or_default,
        save_json,
    },
};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub block: u8,
    pub selection: SelectionMode,
    pub flush_interval_secs: u64,
    pub backend_url: String,
    pub include_reversed: bool,
    pub persist_history: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            block: Block::Standard.number(),
            selection: SelectionMode::Normal,
            flush_interval_secs: 5,
            backend_url: "http://localhost:8765/".to_string(),
            include_reversed: true,
            persist_history: true,
        }
    }
}

impl EngineSettings {
    pub fn load() -> Self {
        load_json_or_default(SETTINGS_FILE)
    }

    pub fn save(&self) -> Result<(), KiokuError> {
        save_json(self, SETTINGS_FILE)
    }

    pub fn block(&self) -> Result<Block, KiokuError> {
        Block::from_number(self.block)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }
}
