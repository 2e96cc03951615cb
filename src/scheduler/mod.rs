//! Picks the next card to present from the testable variants and their review history.

use std::{
    cmp::Ordering,
    collections::HashMap,
};

use chrono::{
    DateTime,
    Utc,
};

use crate::{
    core::{
        CatalogVariant,
        EngineSettings,
        KiokuError,
        SelectionMode,
        TestableVariant,
        ViewMode,
    },
    curve::{
        elapsed_secs,
        probability,
        seconds_until_half,
        INITIAL_VIEW_COEFFICIENT,
        INITIAL_VIEW_S,
    },
    history::{
        HistorySnapshot,
        HistoryStore,
        StoredRecord,
    },
    keys::Block,
    modifier::{
        ModifierCache,
        ModifierScope,
        ModifierState,
        ModifierValue,
    },
};

pub const CRITICAL_RANGE: (f64, f64) = (0.45, 0.55);
pub const READY_THRESHOLD: f64 = 0.6;

/// One variant with everything the ranking looked at.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub variant: &'a TestableVariant,
    pub test_record: Option<StoredRecord>,
    pub individual_view_record: Option<StoredRecord>,
    pub group_view_record: Option<StoredRecord>,
    /// Zero when the variant was never tested.
    pub probability: f64,
    pub is_tested: bool,
    pub is_critical_for_review: bool,
    pub is_ready_for_review: bool,
    pub review_coefficient: f64,
    /// Negative once the half-life has passed. `None` for untested variants.
    pub seconds_until_half: Option<f64>,
    pub next_mode: ViewMode,
}

impl Candidate<'_> {
    fn is_due(&self) -> bool {
        !self.is_tested || self.is_critical_for_review || self.is_ready_for_review
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextCard<'a> {
    pub variant: &'a TestableVariant,
    pub mode: ViewMode,
}

pub struct Scheduler {
    store: HistoryStore,
    block: Block,
    selection: SelectionMode,
    include_reversed: bool,
    modifier_cache: Option<ModifierCache>,
}

impl Scheduler {
    pub fn new(store: HistoryStore, block: Block, selection: SelectionMode) -> Self {
        Self { store, block, selection, include_reversed: true, modifier_cache: None }
    }

    /// Fails when the configured block number is unknown.
    pub fn from_settings(store: HistoryStore, settings: &EngineSettings) -> Result<Self, KiokuError> {
        let mut scheduler = Self::new(store, settings.block()?, settings.selection);
        scheduler.include_reversed = settings.include_reversed;
        Ok(scheduler)
    }

    /// Overrides from `cache` apply to cards whose history carries none yet.
    pub fn with_modifier_cache(mut self, cache: ModifierCache) -> Self {
        self.modifier_cache = Some(cache);
        self
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut HistoryStore {
        &mut self.store
    }

    pub fn block(&self) -> Block {
        self.block
    }

    pub fn selection(&self) -> SelectionMode {
        self.selection
    }

    pub fn set_selection(&mut self, selection: SelectionMode) {
        self.selection = selection;
    }

    /// Testable variants of `catalog` under this scheduler's block.
    pub fn testables(&self, catalog: &[CatalogVariant]) -> Vec<TestableVariant> {
        self.block.build_testables(catalog, self.include_reversed)
    }

    /// Every variant not skipped by a modifier, best first.
    pub fn rank<'a>(
        &mut self,
        variants: &'a [TestableVariant],
        now: DateTime<Utc>,
    ) -> Vec<Candidate<'a>> {
        let snapshot = self.store.snapshot();
        let mut states: HashMap<&str, ModifierState> = HashMap::new();
        let mut candidates = Vec::with_capacity(variants.len());

        for variant in variants {
            let state = states
                .entry(variant.card_id.as_str())
                .or_insert_with(|| self.effective_modifier_state(&snapshot, &variant.card_id));
            if state.skips(variant) {
                continue;
            }
            candidates.push(evaluate(&snapshot, variant, now));
        }

        candidates.sort_by(compare_candidates);
        candidates
    }

    /// `None` when nothing is due in normal mode or every variant is skipped.
    pub fn get_next_card<'a>(
        &mut self,
        variants: &'a [TestableVariant],
        now: DateTime<Utc>,
    ) -> Option<NextCard<'a>> {
        let candidates = self.rank(variants, now);
        let Some(top) = candidates.into_iter().next() else {
            tracing::debug!(variants = variants.len(), "no candidates left");
            return None;
        };

        if self.selection == SelectionMode::Normal && !top.is_due() {
            tracing::debug!(
                key = %top.variant.test_key,
                probability = top.probability,
                "nothing due for review"
            );
            return None;
        }

        tracing::debug!(
            key = %top.variant.test_key,
            mode = ?top.next_mode,
            probability = top.probability,
            coefficient = top.review_coefficient,
            "next card selected"
        );
        Some(NextCard { variant: top.variant, mode: top.next_mode })
    }

    pub fn mark_viewed(
        &mut self,
        variant: &TestableVariant,
        mode: ViewMode,
        success: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<StoredRecord, KiokuError> {
        self.store.save_card_result(variant, mode, success, timestamp)
    }

    /// Records the override and mirrors the card's resulting state to the modifier cache.
    pub fn set_modifier(
        &mut self,
        card_id: &str,
        scope: &ModifierScope,
        value: ModifierValue,
        timestamp: DateTime<Utc>,
    ) -> StoredRecord {
        let stored = self.store.save_modifier(card_id, scope, value, timestamp);

        if let Some(cache) = self.modifier_cache.as_mut() {
            let state = self.store.modifier_state(card_id);
            if let Err(e) = cache.update(card_id, state) {
                tracing::warn!(card_id, error = %e, "failed to update modifier cache");
            }
        }

        stored
    }

    /// Whether `variant` was ever tested under any key this block could have given it.
    pub fn was_ever_tested(&mut self, variant: &CatalogVariant) -> bool {
        let patterns = self.block.keys_within_block(variant);
        self.store.was_ever_tested(&variant.card_id, &patterns)
    }

    fn effective_modifier_state(&self, snapshot: &HistorySnapshot, card_id: &str) -> ModifierState {
        let has_records = snapshot
            .card_records(card_id)
            .any(|(key, _)| key.mode() == Some(ViewMode::Modifier));
        if has_records {
            return modifier_state_of(snapshot, card_id);
        }

        self.modifier_cache.as_ref().map(|cache| cache.get(card_id)).unwrap_or_default()
    }
}

fn modifier_state_of(snapshot: &HistorySnapshot, card_id: &str) -> ModifierState {
    ModifierState::decode(
        snapshot
            .card_records(card_id)
            .map(|(key, stored)| (key.final_key.as_str(), stored.record.repetition)),
    )
}

fn evaluate<'a>(
    snapshot: &HistorySnapshot,
    variant: &'a TestableVariant,
    now: DateTime<Utc>,
) -> Candidate<'a> {
    let record_for = |mode: ViewMode| {
        variant
            .key_for(mode)
            .and_then(|key| snapshot.get_for(&variant.card_id, mode, key))
            .cloned()
    };
    let test_record = record_for(ViewMode::Test).filter(|stored| stored.record.is_tested());
    let individual_view_record = record_for(ViewMode::IndividualView);
    let group_view_record = record_for(ViewMode::GroupView);

    let tested = test_record
        .as_ref()
        .and_then(|stored| stored.record.last_s.map(|s| (stored.record.last_date, s)));

    let (probability, review_coefficient, seconds_left) = match tested {
        Some((last_date, s)) => {
            let p = probability(elapsed_secs(last_date, now), s);
            (p, tested_coefficient(p), Some(seconds_until_half(last_date, now, s)))
        }
        None => {
            let latest_view = [&individual_view_record, &group_view_record]
                .into_iter()
                .flatten()
                .map(|stored| stored.record.last_date)
                .max();
            (0.0, untested_coefficient(latest_view, now), None)
        }
    };

    let is_tested = tested.is_some();
    let next_mode = if is_tested {
        ViewMode::Test
    } else if variant.has_group_view_mode
        && variant.group_view_key.is_some()
        && group_view_record.is_none()
    {
        ViewMode::GroupView
    } else if variant.has_individual_view_mode && individual_view_record.is_none() {
        ViewMode::IndividualView
    } else {
        ViewMode::Test
    };

    Candidate {
        variant,
        test_record,
        individual_view_record,
        group_view_record,
        probability,
        is_tested,
        is_critical_for_review: is_tested
            && (CRITICAL_RANGE.0..=CRITICAL_RANGE.1).contains(&probability),
        is_ready_for_review: probability <= READY_THRESHOLD,
        review_coefficient,
        seconds_until_half: seconds_left,
        next_mode,
    }
}

/// Peaks at probability 0.5 and stays at the peak once the card is overdue.
fn tested_coefficient(probability: f64) -> f64 {
    if probability < 0.5 {
        return 1.0;
    }
    1.0 - (2.0 * (0.5 - probability)).powi(2)
}

/// Never-viewed variants get the full initial coefficient; a fresh introduction waits.
fn untested_coefficient(latest_view: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match latest_view {
        Some(viewed_at) => {
            INITIAL_VIEW_COEFFICIENT * (1.0 - probability(elapsed_secs(viewed_at, now), INITIAL_VIEW_S))
        }
        None => INITIAL_VIEW_COEFFICIENT,
    }
}

fn compare_candidates(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    b.is_critical_for_review
        .cmp(&a.is_critical_for_review)
        .then(b.is_ready_for_review.cmp(&a.is_ready_for_review))
        .then(b.review_coefficient.total_cmp(&a.review_coefficient))
        .then(a.probability.total_cmp(&b.probability))
        .then(until_half(a).total_cmp(&until_half(b)))
}

fn until_half(candidate: &Candidate<'_>) -> f64 {
    candidate.seconds_until_half.unwrap_or(f64::INFINITY)
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod scheduler_tests;
