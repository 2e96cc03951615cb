use super::{
    KeyPattern,
    TestingBlock,
};
use crate::core::{
    CatalogVariant,
    TestableVariant,
};

pub(crate) fn plain_key(variant_id: &str, reversed: bool) -> String {
    if reversed {
        format!("ind-t-{variant_id}")
    } else {
        format!("ind-{variant_id}")
    }
}

/// Curated content: the catalog's own variant id is the whole identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardBlock;

impl TestingBlock for StandardBlock {
    fn test_key(&self, variant: &CatalogVariant, reversed: bool) -> String {
        plain_key(&variant.variant_id, reversed)
    }

    fn disables_group_view(&self) -> bool {
        false
    }

    fn disables_individual_view(&self) -> bool {
        false
    }

    fn keys_within_block(&self, variant: &CatalogVariant) -> Vec<KeyPattern> {
        vec![
            KeyPattern::Exact(plain_key(&variant.variant_id, false)),
            KeyPattern::Exact(plain_key(&variant.variant_id, true)),
        ]
    }

    fn regenerate_testable_card(
        &self,
        forward: &TestableVariant,
        inverted_key: String,
    ) -> TestableVariant {
        // The forward entry already introduces the form; only the group view is shared.
        TestableVariant {
            is_reversed: !forward.is_reversed,
            test_key: inverted_key,
            has_individual_view_mode: false,
            ..forward.clone()
        }
    }
}
