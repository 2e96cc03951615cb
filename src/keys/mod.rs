//! Identity keys for testable variants.
//!
//! A key must come out identical every time the catalog is regenerated, otherwise review
//! history stops accumulating under it. Each testing block owns its key scheme.

use serde::{
    Deserialize,
    Serialize,
};

use crate::core::{
    CatalogVariant,
    KiokuError,
    TestableVariant,
};

pub mod generated;
pub mod standard;

pub use generated::GeneratedBlock;
pub use standard::StandardBlock;

const HASH_LEN: usize = 8;

/// Capabilities every testing block provides.
pub trait TestingBlock {
    fn test_key(&self, variant: &CatalogVariant, reversed: bool) -> String;

    fn disables_group_view(&self) -> bool;

    fn disables_individual_view(&self) -> bool;

    /// Every key the variant may have been recorded under in this block.
    fn keys_within_block(&self, variant: &CatalogVariant) -> Vec<KeyPattern>;

    /// Reversed-direction sibling of a freshly built forward entry.
    fn regenerate_testable_card(
        &self,
        forward: &TestableVariant,
        inverted_key: String,
    ) -> TestableVariant;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Block {
    Standard,
    AiGenerated,
}

impl Block {
    pub fn from_number(number: u8) -> Result<Self, KiokuError> {
        match number {
            1 => Ok(Block::Standard),
            2 => Ok(Block::AiGenerated),
            other => {
                tracing::error!(block = other, "unknown testing block");
                Err(KiokuError::UnknownBlock(other))
            }
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Block::Standard => 1,
            Block::AiGenerated => 2,
        }
    }

    fn inner(&self) -> &'static dyn TestingBlock {
        match self {
            Block::Standard => &StandardBlock,
            Block::AiGenerated => &GeneratedBlock,
        }
    }

    pub fn test_key(&self, variant: &CatalogVariant, reversed: bool) -> String {
        self.inner().test_key(variant, reversed)
    }

    pub fn disables_group_view(&self) -> bool {
        self.inner().disables_group_view()
    }

    pub fn disables_individual_view(&self) -> bool {
        self.inner().disables_individual_view()
    }

    pub fn keys_within_block(&self, variant: &CatalogVariant) -> Vec<KeyPattern> {
        self.inner().keys_within_block(variant)
    }

    pub fn regenerate_testable_card(
        &self,
        forward: &TestableVariant,
        inverted_key: String,
    ) -> TestableVariant {
        self.inner().regenerate_testable_card(forward, inverted_key)
    }

    pub fn group_view_key(&self, variant: &CatalogVariant) -> Option<String> {
        if !variant.has_group_view_mode || self.disables_group_view() {
            return None;
        }
        variant.group_id.as_ref().map(|group_id| format!("grp-{group_id}"))
    }

    /// Forward-direction entry for `variant` with this block's view rules applied.
    pub fn testable(&self, variant: &CatalogVariant) -> TestableVariant {
        let group_view_key = self.group_view_key(variant);

        TestableVariant {
            card_id: variant.card_id.clone(),
            variant_id: variant.variant_id.clone(),
            category: variant.category,
            group_id: variant.group_id.clone(),
            translation: variant.translation.clone(),
            is_grouped: variant.is_grouped,
            is_reversed: false,
            test_key: self.test_key(variant, false),
            has_group_view_mode: group_view_key.is_some(),
            group_view_key,
            has_individual_view_mode: variant.has_individual_view_mode
                && !self.disables_individual_view(),
        }
    }

    pub fn build_testables(
        &self,
        catalog: &[CatalogVariant],
        include_reversed: bool,
    ) -> Vec<TestableVariant> {
        let mut testables = Vec::with_capacity(catalog.len() * 2);

        for variant in catalog {
            let forward = self.testable(variant);
            if include_reversed {
                let inverted_key = self.test_key(variant, true);
                let reversed = self.regenerate_testable_card(&forward, inverted_key);
                testables.push(forward);
                testables.push(reversed);
            } else {
                testables.push(forward);
            }
        }

        tracing::debug!(
            block = self.number(),
            catalog = catalog.len(),
            testables = testables.len(),
            "built testable variants"
        );
        testables
    }
}

/// Matches the bare test keys (without mode prefix) a variant can be stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    Exact(String),
    /// `prefix` followed by an eight character translation hash.
    Hashed(String),
}

impl KeyPattern {
    pub fn matches(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        match self {
            KeyPattern::Exact(exact) => key == exact.to_lowercase(),
            KeyPattern::Hashed(prefix) => key
                .strip_prefix(&prefix.to_lowercase())
                .map(|rest| {
                    rest.len() == HASH_LEN
                        && rest.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
                })
                .unwrap_or(false),
        }
    }
}
