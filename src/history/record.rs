use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt,
};

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::core::{
    final_key,
    KiokuError,
    ViewMode,
};

/// Card id plus final key (`<mode>@<lowercased key>`). Serialized as `<card>/<final key>`,
/// with `%` and `/` in the card id written as `%25` and `%2F`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordKey {
    pub card_id: String,
    pub final_key: String,
}

impl RecordKey {
    pub fn new(card_id: impl Into<String>, final_key: impl Into<String>) -> Self {
        Self { card_id: card_id.into(), final_key: final_key.into() }
    }

    pub fn for_mode(card_id: &str, mode: ViewMode, key: &str) -> Self {
        Self::new(card_id, final_key(mode, key))
    }

    pub fn mode(&self) -> Option<ViewMode> {
        ViewMode::of_final_key(&self.final_key)
    }

    pub fn parse(raw: &str) -> Result<Self, KiokuError> {
        match raw.split_once('/') {
            Some((card_id, final_key))
                if !card_id.is_empty() && ViewMode::of_final_key(final_key).is_some() =>
            {
                Ok(Self::new(unescape_card_id(card_id), final_key))
            }
            _ => Err(KiokuError::InvalidKey(raw.to_string())),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", escape_card_id(&self.card_id), self.final_key)
    }
}

fn escape_card_id(card_id: &str) -> Cow<'_, str> {
    if !card_id.contains(['%', '/']) {
        return Cow::Borrowed(card_id);
    }
    Cow::Owned(card_id.replace('%', "%25").replace('/', "%2F"))
}

/// Unknown `%` sequences are kept as written.
fn unescape_card_id(raw: &str) -> String {
    let mut card_id = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(at) = rest.find('%') {
        card_id.push_str(&rest[..at]);
        let escape = rest.get(at..at + 3);
        match escape {
            Some("%25") => card_id.push('%'),
            Some("%2F" | "%2f") => card_id.push('/'),
            _ => {
                card_id.push('%');
                rest = &rest[at + 1..];
                continue;
            }
        }
        rest = &rest[at + 3..];
    }
    card_id.push_str(rest);
    card_id
}

impl TryFrom<String> for RecordKey {
    type Error = KiokuError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RecordKey::parse(&value)
    }
}

impl From<RecordKey> for String {
    fn from(key: RecordKey) -> Self {
        key.to_string()
    }
}

/// One history entry. Test records carry `last_s`; introduction records leave it empty.
///
/// `repetition` never decreases for test and view records. Modifier records keep their
/// current bitmask there instead, so theirs goes down when an override is cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub first_date: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_date: DateTime<Utc>,
    pub repetition: u32,
    pub last_s: Option<f64>,
    pub last_has_failed: Option<bool>,
}

impl HistoryRecord {
    pub fn first(timestamp: DateTime<Utc>) -> Self {
        Self {
            first_date: timestamp,
            last_date: timestamp,
            repetition: 0,
            last_s: None,
            last_has_failed: None,
        }
    }

    pub fn is_tested(&self) -> bool {
        self.last_s.is_some()
    }
}

/// A record as held locally, with its backend sync flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    #[serde(flatten)]
    pub record: HistoryRecord,
    pub saved_in_db: bool,
}

/// Wire shape exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub key: RecordKey,
    #[serde(flatten)]
    pub record: HistoryRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistorySnapshot {
    records: BTreeMap<RecordKey, StoredRecord>,
}

impl HistorySnapshot {
    pub fn get(&self, key: &RecordKey) -> Option<&StoredRecord> {
        self.records.get(key)
    }

    pub fn get_for(&self, card_id: &str, mode: ViewMode, key: &str) -> Option<&StoredRecord> {
        self.records.get(&RecordKey::for_mode(card_id, mode, key))
    }

    pub fn insert(&mut self, key: RecordKey, record: StoredRecord) {
        self.records.insert(key, record);
    }

    pub fn get_mut(&mut self, key: &RecordKey) -> Option<&mut StoredRecord> {
        self.records.get_mut(key)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordKey, &StoredRecord)> {
        self.records.iter()
    }

    pub fn card_records<'a>(
        &'a self,
        card_id: &'a str,
    ) -> impl Iterator<Item = (&'a RecordKey, &'a StoredRecord)> + 'a {
        self.records
            .range(RecordKey::new(card_id, "")..)
            .take_while(move |(key, _)| key.card_id == card_id)
    }

    pub fn unsaved(&self) -> impl Iterator<Item = ReviewRecord> + '_ {
        self.records
            .iter()
            .filter(|(_, stored)| !stored.saved_in_db)
            .map(|(key, stored)| ReviewRecord { key: key.clone(), record: stored.record.clone() })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_record_key_parsing() {
        let key = RecordKey::parse("card-1/t@ind-4").unwrap();
        assert_eq!(key.card_id, "card-1");
        assert_eq!(key.final_key, "t@ind-4");
        assert_eq!(key.mode(), Some(ViewMode::Test));
        assert_eq!(key.to_string(), "card-1/t@ind-4");

        // Only the first separator splits; keys may contain slashes.
        let nested = RecordKey::parse("c/m@v_a/b").unwrap();
        assert_eq!(nested.final_key, "m@v_a/b");

        assert!(RecordKey::parse("no-card").is_err());
        assert!(RecordKey::parse("/t@ind-4").is_err());
        assert!(RecordKey::parse("c/zz@ind-4").is_err());
    }

    #[test]
    fn test_card_ids_with_separators_round_trip() {
        for card_id in ["de/haus", "50%/off", "%2F", "a//b/"] {
            let key = RecordKey::new(card_id, "t@ind-2");
            let wire = key.to_string();
            assert!(wire.ends_with("/t@ind-2"), "{wire}");
            assert_eq!(RecordKey::parse(&wire).unwrap(), key);

            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(serde_json::from_str::<RecordKey>(&json).unwrap(), key);
        }
        assert_eq!(RecordKey::new("de/haus", "t@ind-2").to_string(), "de%2Fhaus/t@ind-2");

        // Stray percent signs from other writers survive parsing.
        assert_eq!(RecordKey::parse("100%/t@ind-1").unwrap().card_id, "100%");
        assert_eq!(RecordKey::parse("a%zz/t@ind-1").unwrap().card_id, "a%zz");
    }

    #[test]
    fn test_wire_field_names() {
        let date = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let record = ReviewRecord {
            key: RecordKey::new("c1", "t@ind-1"),
            record: HistoryRecord {
                first_date: date,
                last_date: date,
                repetition: 3,
                last_s: Some(64.9),
                last_has_failed: None,
            },
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["key"], "c1/t@ind-1");
        assert_eq!(value["firstDate"], 1_700_000_000_123i64);
        assert_eq!(value["lastDate"], 1_700_000_000_123i64);
        assert_eq!(value["repetition"], 3);
        assert_eq!(value["lastS"], 64.9);
        assert!(value["lastHasFailed"].is_null());

        let parsed: ReviewRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_card_records_are_scoped() {
        let date = Utc.timestamp_millis_opt(0).unwrap();
        let stored = StoredRecord { record: HistoryRecord::first(date), saved_in_db: true };

        let mut snapshot = HistorySnapshot::default();
        snapshot.insert(RecordKey::new("a", "t@ind-1"), stored.clone());
        snapshot.insert(RecordKey::new("ab", "t@ind-1"), stored.clone());
        snapshot.insert(RecordKey::new("b", "m@f"), stored.clone());
        snapshot.insert(RecordKey::new("a", "m@f"), stored);

        let keys: Vec<_> = snapshot.card_records("a").map(|(k, _)| k.final_key.as_str()).collect();
        assert_eq!(keys, vec!["m@f", "t@ind-1"]);
        assert_eq!(snapshot.card_records("c").count(), 0);
    }
}
