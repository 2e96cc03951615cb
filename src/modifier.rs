//! User overrides that take a variant, a group of forms or a whole card out of testing.
//!
//! Overrides travel as synthetic history records under `m@f`, `m@g_<group>` and
//! `m@v_<variant>` so they sync exactly like real reviews. The record payload is the bitmask.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::LazyLock,
};

use regex::Regex;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    core::{
        final_key,
        KiokuError,
        TestableVariant,
        ViewMode,
    },
    persistence::{
        get_data_file_path,
        load_json_from_or_default,
        save_json_to,
    },
};

pub const MODIFIER_CACHE_FILE: &str = "modifiers.json";

static MODIFIER_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^m@(?:(f)|g_(.+)|v_(.+))$").expect("modifier key pattern is valid")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifierValue(pub u8);

impl ModifierValue {
    pub const NONE: ModifierValue = ModifierValue(0);
    pub const I_KNOW: ModifierValue = ModifierValue(1);
    pub const IGNORE: ModifierValue = ModifierValue(2);

    pub fn contains(&self, other: ModifierValue) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn with(self, other: ModifierValue) -> ModifierValue {
        ModifierValue(self.0 | other.0)
    }

    pub fn without(self, other: ModifierValue) -> ModifierValue {
        ModifierValue(self.0 & !other.0)
    }

    pub fn is_default(&self) -> bool {
        self.0 == 0
    }
}

/// Both "I know this" and "ignore this" mean: do not ask.
pub fn should_skip_testing(value: ModifierValue) -> bool {
    value.contains(ModifierValue::IGNORE) || value.contains(ModifierValue::I_KNOW)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModifierScope {
    FullCard,
    Group(String),
    Variant(String),
}

impl ModifierScope {
    /// Bare key without the mode prefix, e.g. `g_plural`.
    pub fn key(&self) -> String {
        match self {
            ModifierScope::FullCard => "f".to_string(),
            ModifierScope::Group(group_id) => format!("g_{group_id}"),
            ModifierScope::Variant(variant_id) => format!("v_{variant_id}"),
        }
    }

    pub fn final_key(&self) -> String {
        final_key(ViewMode::Modifier, &self.key())
    }

    pub fn parse(final_key: &str) -> Option<Self> {
        let captures = MODIFIER_KEY.captures(final_key)?;
        if captures.get(1).is_some() {
            Some(ModifierScope::FullCard)
        } else if let Some(group) = captures.get(2) {
            Some(ModifierScope::Group(group.as_str().to_string()))
        } else {
            captures.get(3).map(|variant| ModifierScope::Variant(variant.as_str().to_string()))
        }
    }
}

/// Decoded overrides of one card. Ids are stored lowercased, as they appear in final keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModifierState {
    pub full_card: ModifierValue,
    pub groups: BTreeMap<String, ModifierValue>,
    pub variants: BTreeMap<String, ModifierValue>,
}

impl ModifierState {
    /// Builds the state from `(final key, payload)` pairs; non-modifier keys are ignored.
    pub fn decode<'a>(records: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        let mut state = ModifierState::default();

        for (key, payload) in records {
            let Some(scope) = ModifierScope::parse(key) else {
                continue;
            };
            let value = ModifierValue(u8::try_from(payload).unwrap_or(u8::MAX));
            state.set(scope, value);
        }

        state
    }

    /// Active overrides only; a cleared override is not re-encoded.
    pub fn encode(&self) -> Vec<(ModifierScope, ModifierValue)> {
        let mut encoded = Vec::new();
        if !self.full_card.is_default() {
            encoded.push((ModifierScope::FullCard, self.full_card));
        }
        for (group_id, value) in &self.groups {
            encoded.push((ModifierScope::Group(group_id.clone()), *value));
        }
        for (variant_id, value) in &self.variants {
            encoded.push((ModifierScope::Variant(variant_id.clone()), *value));
        }
        encoded
    }

    pub fn get(&self, scope: &ModifierScope) -> ModifierValue {
        match scope {
            ModifierScope::FullCard => self.full_card,
            ModifierScope::Group(group_id) => {
                self.groups.get(&group_id.to_lowercase()).copied().unwrap_or_default()
            }
            ModifierScope::Variant(variant_id) => {
                self.variants.get(&variant_id.to_lowercase()).copied().unwrap_or_default()
            }
        }
    }

    pub fn set(&mut self, scope: ModifierScope, value: ModifierValue) {
        match scope {
            ModifierScope::FullCard => self.full_card = value,
            ModifierScope::Group(group_id) => {
                Self::set_entry(&mut self.groups, group_id, value);
            }
            ModifierScope::Variant(variant_id) => {
                Self::set_entry(&mut self.variants, variant_id, value);
            }
        }
    }

    fn set_entry(map: &mut BTreeMap<String, ModifierValue>, id: String, value: ModifierValue) {
        let id = id.to_lowercase();
        if value.is_default() {
            map.remove(&id);
        } else {
            map.insert(id, value);
        }
    }

    pub fn is_default(&self) -> bool {
        self.full_card.is_default() && self.groups.is_empty() && self.variants.is_empty()
    }

    /// Whether any scope covering `variant` asks to skip it.
    pub fn skips(&self, variant: &TestableVariant) -> bool {
        if should_skip_testing(self.full_card) {
            return true;
        }

        let group_skipped = variant
            .group_id
            .as_ref()
            .map(|group_id| should_skip_testing(self.get(&ModifierScope::Group(group_id.clone()))))
            .unwrap_or(false);

        group_skipped
            || should_skip_testing(self.get(&ModifierScope::Variant(variant.variant_id.clone())))
            || should_skip_testing(self.get(&ModifierScope::Variant(variant.test_key.clone())))
    }
}

/// Locally cached modifier states keyed by card, used before the history has been pulled.
#[derive(Debug)]
pub struct ModifierCache {
    states: BTreeMap<String, ModifierState>,
    file_path: PathBuf,
}

impl ModifierCache {
    pub fn load() -> Self {
        Self::load_from(get_data_file_path(MODIFIER_CACHE_FILE))
    }

    /// Unreadable or corrupt content is treated as an empty cache.
    pub fn load_from(file_path: PathBuf) -> Self {
        let states = load_json_from_or_default(&file_path);
        Self { states, file_path }
    }

    pub fn save(&self) -> Result<(), KiokuError> {
        save_json_to(&self.states, &self.file_path)
    }

    pub fn get(&self, card_id: &str) -> ModifierState {
        self.states.get(card_id).cloned().unwrap_or_default()
    }

    pub fn update(&mut self, card_id: &str, state: ModifierState) -> Result<(), KiokuError> {
        if state.is_default() {
            self.states.remove(card_id);
        } else {
            self.states.insert(card_id.to_string(), state);
        }
        self.save()
    }
}
