use serde::{
    Deserialize,
    Serialize,
};

/// Category assigned by the catalog to the canonical (dictionary) form of a card.
pub const ROOT_CATEGORY: u32 = 1;

/// One testable fact as delivered by the card catalog, before any identity key is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogVariant {
    pub card_id: String,
    pub variant_id: String,
    pub category: u32,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub translation: Option<String>,
    #[serde(default)]
    pub is_grouped: bool,
    #[serde(default)]
    pub has_group_view_mode: bool,
    #[serde(default)]
    pub has_individual_view_mode: bool,
}

impl CatalogVariant {
    pub fn is_root(&self) -> bool {
        self.category == ROOT_CATEGORY
    }
}

/// A catalog variant with its identity keys resolved for one testing block and direction.
///
/// Rebuilt on every catalog load; only the keys carry identity between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestableVariant {
    pub card_id: String,
    pub variant_id: String,
    pub category: u32,
    pub group_id: Option<String>,
    pub translation: Option<String>,
    pub is_grouped: bool,
    pub is_reversed: bool,
    pub test_key: String,
    pub group_view_key: Option<String>,
    pub has_group_view_mode: bool,
    pub has_individual_view_mode: bool,
}

impl TestableVariant {
    /// Key under which `mode` is recorded for this variant, if the mode applies at all.
    pub fn key_for(&self, mode: ViewMode) -> Option<&str> {
        match mode {
            ViewMode::Test | ViewMode::IndividualView => Some(self.test_key.as_str()),
            ViewMode::GroupView => self.group_view_key.as_deref(),
            ViewMode::Modifier => None,
        }
    }

    pub fn final_key(&self, mode: ViewMode) -> Option<String> {
        self.key_for(mode).map(|key| final_key(mode, key))
    }
}

/// How a history entry was produced. The prefix is part of the persisted final key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    Test,
    IndividualView,
    GroupView,
    Modifier,
}

impl ViewMode {
    pub fn prefix(&self) -> &'static str {
        match self {
            ViewMode::Test => "t",
            ViewMode::IndividualView => "iv",
            ViewMode::GroupView => "gv",
            ViewMode::Modifier => "m",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "t" => Some(ViewMode::Test),
            "iv" => Some(ViewMode::IndividualView),
            "gv" => Some(ViewMode::GroupView),
            "m" => Some(ViewMode::Modifier),
            _ => None,
        }
    }

    /// Mode encoded in a final key such as `t@ind-12`.
    pub fn of_final_key(final_key: &str) -> Option<Self> {
        final_key.split_once('@').and_then(|(prefix, _)| Self::from_prefix(prefix))
    }

    pub fn is_introduction(&self) -> bool {
        matches!(self, ViewMode::IndividualView | ViewMode::GroupView)
    }
}

pub fn final_key(mode: ViewMode, key: &str) -> String {
    format!("{}@{}", mode.prefix(), key.to_lowercase())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Stop offering cards once nothing is due.
    #[default]
    Normal,
    /// Always offer the best-ranked card.
    Endless,
}
