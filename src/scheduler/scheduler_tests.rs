use chrono::{
    Duration,
    TimeZone,
};

use super::*;
use crate::{
    curve::{
        half_life_coefficient,
        INITIAL_TEST_S,
    },
    history::{
        HistoryChannel,
        HistoryRecord,
        RecordKey,
        ReviewRecord,
    },
};

fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn variant(card_id: &str, variant_id: &str) -> TestableVariant {
    TestableVariant {
        card_id: card_id.to_string(),
        variant_id: variant_id.to_string(),
        category: 2,
        group_id: None,
        translation: None,
        is_grouped: false,
        is_reversed: false,
        test_key: format!("ind-{variant_id}"),
        group_view_key: None,
        has_group_view_mode: false,
        has_individual_view_mode: false,
    }
}

fn scheduler(selection: SelectionMode) -> Scheduler {
    let store = HistoryStore::new(HistoryChannel::in_memory("deck"));
    Scheduler::new(store, Block::Standard, selection)
}

/// Seeds a test record answered `ago_secs` before `now()` with stability `s`.
fn seed_tested(scheduler: &mut Scheduler, variant: &TestableVariant, s: f64, ago_secs: i64) {
    let last_date = now() - Duration::seconds(ago_secs);
    let record = ReviewRecord {
        key: RecordKey::for_mode(&variant.card_id, ViewMode::Test, &variant.test_key),
        record: HistoryRecord {
            first_date: last_date - Duration::days(1),
            last_date,
            repetition: 3,
            last_s: Some(s),
            last_has_failed: Some(false),
        },
    };
    scheduler.store_mut().load_in_db(vec![record], Vec::new(), false);
}

fn position(candidates: &[Candidate<'_>], variant: &TestableVariant) -> usize {
    candidates.iter().position(|c| c.variant.test_key == variant.test_key).unwrap()
}

#[test]
fn test_empty_catalog_has_no_card() {
    let mut scheduler = scheduler(SelectionMode::Endless);
    assert!(scheduler.get_next_card(&[], now()).is_none());
    assert!(scheduler.rank(&[], now()).is_empty());
}

#[test]
fn test_untested_card_is_offered_then_replaced() {
    let mut scheduler = scheduler(SelectionMode::Normal);
    let variants = vec![variant("c1", "1"), variant("c1", "2")];

    let first = scheduler.get_next_card(&variants, now()).unwrap();
    assert_eq!(first.variant.test_key, "ind-1");
    assert_eq!(first.mode, ViewMode::Test);

    let stored = scheduler.mark_viewed(first.variant, ViewMode::Test, true, now()).unwrap();
    assert_eq!(stored.record.last_s, Some(INITIAL_TEST_S));

    let second = scheduler.get_next_card(&variants, now()).unwrap();
    assert_eq!(second.variant.test_key, "ind-2");

    let ranked = scheduler.rank(&variants, now());
    let answered = &ranked[position(&ranked, &variants[0])];
    assert!(answered.is_tested);
    assert_eq!(answered.probability, 1.0);
    assert!(!answered.is_ready_for_review);
}

#[test]
fn test_critical_card_outranks_everything() {
    let mut scheduler = scheduler(SelectionMode::Normal);
    let untested = variant("c1", "1");
    let overdue = variant("c1", "2");
    let critical = variant("c2", "3");
    seed_tested(&mut scheduler, &overdue, half_life_coefficient(60.0), 600);
    seed_tested(&mut scheduler, &critical, half_life_coefficient(60.0), 60);
    let variants = vec![untested, overdue, critical];

    let ranked = scheduler.rank(&variants, now());
    let top = &ranked[0];
    assert_eq!(top.variant.test_key, "ind-3");
    assert!((top.probability - 0.5).abs() < 1e-9);
    assert!(top.is_critical_for_review);
    assert!(top.seconds_until_half.unwrap().abs() < 1e-6);
    assert!(ranked[1].review_coefficient > top.review_coefficient - 1e-9);

    let next = scheduler.get_next_card(&variants, now()).unwrap();
    assert_eq!(next.variant.test_key, "ind-3");
}

#[test]
fn test_shorter_memory_never_ranked_behind_in_same_tier() {
    let stabilities: Vec<f64> =
        [20.0, 45.0, 90.0, 300.0, 900.0, 3600.0, 20_000.0, 86_400.0, 900_000.0]
            .into_iter()
            .map(half_life_coefficient)
            .collect();

    for ago in [5, 30, 60, 120, 600, 3600, 40_000, 200_000] {
        for (i, &short) in stabilities.iter().enumerate() {
            for &long in &stabilities[i + 1..] {
                let mut scheduler = scheduler(SelectionMode::Endless);
                let weak = variant("c1", "weak");
                let strong = variant("c2", "strong");
                seed_tested(&mut scheduler, &weak, short, ago);
                seed_tested(&mut scheduler, &strong, long, ago);

                // Strong listed first so catalog order cannot hide a wrong ordering.
                let variants = vec![strong.clone(), weak.clone()];
                let ranked = scheduler.rank(&variants, now());
                let weak_at = position(&ranked, &weak);
                let strong_at = position(&ranked, &strong);

                if weak_at > strong_at {
                    // Only a critical card may jump ahead of an overdue one.
                    assert!(ranked[strong_at].is_critical_for_review, "ago={ago} short={short}");
                    assert!(ranked[weak_at].probability < CRITICAL_RANGE.0);
                }
            }
        }
    }
}

#[test]
fn test_ignored_variant_is_excluded() {
    let mut scheduler = scheduler(SelectionMode::Normal);
    let ignored = variant("c1", "1");
    let other = variant("c1", "2");
    let variants = vec![ignored.clone(), other];

    assert_eq!(scheduler.get_next_card(&variants, now()).unwrap().variant.test_key, "ind-1");

    scheduler.set_modifier("c1", &ModifierScope::Variant("1".into()), ModifierValue::IGNORE, now());
    let next = scheduler.get_next_card(&variants, now()).unwrap();
    assert_eq!(next.variant.test_key, "ind-2");
    assert_eq!(scheduler.rank(&variants, now()).len(), 1);

    scheduler.set_modifier("c1", &ModifierScope::FullCard, ModifierValue::I_KNOW, now());
    assert!(scheduler.get_next_card(&variants, now()).is_none());

    scheduler.set_modifier("c1", &ModifierScope::FullCard, ModifierValue::NONE, now());
    scheduler.set_modifier("c1", &ModifierScope::Variant("1".into()), ModifierValue::NONE, now());
    assert_eq!(scheduler.rank(&variants, now()).len(), 2);
}

#[test]
fn test_normal_mode_stops_when_nothing_due() {
    let mut normal = scheduler(SelectionMode::Normal);
    let variants = vec![variant("c1", "1"), variant("c1", "2")];
    for v in &variants {
        seed_tested(&mut normal, v, half_life_coefficient(86_400.0), 10);
    }
    assert!(normal.get_next_card(&variants, now()).is_none());

    normal.set_selection(SelectionMode::Endless);
    assert!(normal.get_next_card(&variants, now()).is_some());

    // A day later both cards sit at their half-life.
    let later = now() + Duration::seconds(86_390);
    normal.set_selection(SelectionMode::Normal);
    let due = normal.get_next_card(&variants, later).unwrap();
    assert_eq!(due.mode, ViewMode::Test);
}

#[test]
fn test_introduction_modes_come_first() {
    let mut scheduler = scheduler(SelectionMode::Normal);
    let mut intro = variant("c1", "1");
    intro.group_id = Some("plural".to_string());
    intro.group_view_key = Some("grp-plural".to_string());
    intro.has_group_view_mode = true;
    intro.has_individual_view_mode = true;
    let variants = vec![intro];

    let first = scheduler.get_next_card(&variants, now()).unwrap();
    assert_eq!(first.mode, ViewMode::GroupView);
    scheduler.mark_viewed(first.variant, first.mode, true, now()).unwrap();

    let second = scheduler.get_next_card(&variants, now()).unwrap();
    assert_eq!(second.mode, ViewMode::IndividualView);
    scheduler.mark_viewed(second.variant, second.mode, true, now()).unwrap();

    let ranked = scheduler.rank(&variants, now());
    assert_eq!(ranked[0].next_mode, ViewMode::Test);
    assert!(ranked[0].review_coefficient < 0.01);
    assert!(ranked[0].individual_view_record.is_some());

    // The introduction fades and the coefficient climbs back towards the initial value.
    let later = scheduler.rank(&variants, now() + Duration::hours(1));
    assert!((later[0].review_coefficient - INITIAL_VIEW_COEFFICIENT).abs() < 1e-6);
}

#[test]
fn test_view_introduced_card_waits_behind_new_ones() {
    let mut scheduler = scheduler(SelectionMode::Normal);
    let mut introduced = variant("c1", "1");
    introduced.has_individual_view_mode = true;
    let fresh = variant("c1", "2");
    let variants = vec![introduced.clone(), fresh];

    scheduler.mark_viewed(&introduced, ViewMode::IndividualView, true, now()).unwrap();
    let next = scheduler.get_next_card(&variants, now() + Duration::seconds(2)).unwrap();
    assert_eq!(next.variant.test_key, "ind-2");
}

#[test]
fn test_modifier_cache_applies_until_history_has_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("modifiers.json");

    let mut cache = ModifierCache::load_from(path.clone());
    let mut state = ModifierState::default();
    state.set(ModifierScope::FullCard, ModifierValue::IGNORE);
    cache.update("c1", state).unwrap();

    let mut scheduler = scheduler(SelectionMode::Normal).with_modifier_cache(cache);
    let variants = vec![variant("c1", "1")];
    assert!(scheduler.get_next_card(&variants, now()).is_none());

    scheduler.set_modifier("c1", &ModifierScope::FullCard, ModifierValue::NONE, now());
    assert!(scheduler.get_next_card(&variants, now()).is_some());
    assert!(ModifierCache::load_from(path).get("c1").is_default());
}

fn catalog_variant() -> CatalogVariant {
    CatalogVariant {
        card_id: "c1".to_string(),
        variant_id: "4".to_string(),
        category: 3,
        group_id: None,
        translation: None,
        is_grouped: false,
        has_group_view_mode: false,
        has_individual_view_mode: false,
    }
}

#[test]
fn test_from_settings_and_ever_tested() {
    let store = HistoryStore::new(HistoryChannel::in_memory("deck"));
    let forward_only = EngineSettings { include_reversed: false, ..EngineSettings::default() };
    let single = Scheduler::from_settings(store, &forward_only).unwrap();
    assert_eq!(single.testables(&[catalog_variant()]).len(), 1);

    let store = HistoryStore::new(HistoryChannel::in_memory("deck"));
    let bad = EngineSettings { block: 7, ..EngineSettings::default() };
    assert!(matches!(Scheduler::from_settings(store, &bad), Err(KiokuError::UnknownBlock(7))));

    let store = HistoryStore::new(HistoryChannel::in_memory("deck"));
    let mut scheduler = Scheduler::from_settings(store, &EngineSettings::default()).unwrap();
    assert_eq!(scheduler.block(), Block::Standard);
    assert_eq!(scheduler.selection(), SelectionMode::Normal);

    let catalog = catalog_variant();
    assert!(!scheduler.was_ever_tested(&catalog));

    let reversed = scheduler.testables(std::slice::from_ref(&catalog)).remove(1);
    assert!(reversed.is_reversed);
    scheduler.mark_viewed(&reversed, ViewMode::Test, true, now()).unwrap();
    assert!(scheduler.was_ever_tested(&catalog));
}
