use super::{
    standard::plain_key,
    KeyPattern,
    TestingBlock,
};
use crate::core::{
    utils::{
        hash8,
        NormalizeTranslation,
    },
    CatalogVariant,
    TestableVariant,
};

fn hashed_prefix(variant_id: &str, reversed: bool) -> String {
    if reversed {
        format!("ind-tH-{variant_id}-")
    } else {
        format!("indH-{variant_id}-")
    }
}

/// Dynamically generated sentences. The wording of a root form depends on the translation it
/// was generated for, so the normalized translation is folded into the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneratedBlock;

impl TestingBlock for GeneratedBlock {
    fn test_key(&self, variant: &CatalogVariant, reversed: bool) -> String {
        match variant.translation.as_deref() {
            Some(translation) if variant.is_root() => format!(
                "{}{}",
                hashed_prefix(&variant.variant_id, reversed),
                hash8(&translation.normalize_translation())
            ),
            _ => plain_key(&variant.variant_id, reversed),
        }
    }

    // Generated content has no group of related forms to introduce.
    fn disables_group_view(&self) -> bool {
        true
    }

    fn disables_individual_view(&self) -> bool {
        true
    }

    fn keys_within_block(&self, variant: &CatalogVariant) -> Vec<KeyPattern> {
        let mut keys = vec![
            KeyPattern::Exact(plain_key(&variant.variant_id, false)),
            KeyPattern::Exact(plain_key(&variant.variant_id, true)),
        ];
        if variant.is_root() {
            keys.push(KeyPattern::Hashed(hashed_prefix(&variant.variant_id, false)));
            keys.push(KeyPattern::Hashed(hashed_prefix(&variant.variant_id, true)));
        }
        keys
    }

    fn regenerate_testable_card(
        &self,
        forward: &TestableVariant,
        inverted_key: String,
    ) -> TestableVariant {
        TestableVariant {
            is_reversed: !forward.is_reversed,
            test_key: inverted_key,
            group_view_key: None,
            has_group_view_mode: false,
            has_individual_view_mode: false,
            ..forward.clone()
        }
    }
}
