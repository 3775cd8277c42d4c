//! Snapshot of every sync-relevant collection.
//!
//! The sync core treats domain records (patients, visits, results, ...) as
//! opaque JSON objects grouped into named collections. A [`Snapshot`] is the
//! unit exchanged with the remote: `GET /sync` returns one, `POST /sync`
//! accepts one.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "patients": [{"patientId": "P-1", "name": "..."}],
//!   "visits": [],
//!   "settings": {"labName": "..."}
//! }
//! ```
//!
//! A collection missing from a decoded payload is remembered as absent, which
//! is different from present-but-empty: absent collections are left alone when
//! merging into local storage.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Storage key holding the settings object.
pub const SETTINGS_KEY: &str = "lab-settings";
/// Field under `state` (and wire key) for the settings object.
pub const SETTINGS_FIELD: &str = "settings";

/// A named collection of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Patients,
    Visits,
    Results,
    Invoices,
    Expenses,
    ExpenseCategories,
    Reminders,
    Activities,
    Users,
}

impl Collection {
    /// Every collection, in upload order.
    pub const ALL: [Collection; 9] = [
        Collection::Patients,
        Collection::Visits,
        Collection::Results,
        Collection::Invoices,
        Collection::Expenses,
        Collection::ExpenseCategories,
        Collection::Reminders,
        Collection::Activities,
        Collection::Users,
    ];

    /// Key used for this collection in remote payloads.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Collection::Patients => "patients",
            Collection::Visits => "visits",
            Collection::Results => "results",
            Collection::Invoices => "invoices",
            Collection::Expenses => "expenses",
            Collection::ExpenseCategories => "expenseCategories",
            Collection::Reminders => "reminders",
            Collection::Activities => "activities",
            Collection::Users => "users",
        }
    }

    /// Local storage key of the entry holding this collection.
    ///
    /// Several collections can share one entry (patients and visits live
    /// together, as do the financial collections).
    pub fn storage_key(&self) -> &'static str {
        match self {
            Collection::Patients | Collection::Visits => "lab-patients",
            Collection::Results => "lab-results",
            Collection::Invoices => "lab-invoices",
            Collection::Expenses | Collection::ExpenseCategories | Collection::Reminders => {
                "lab-financial"
            }
            Collection::Activities => "lab-activities",
            Collection::Users => "lab-users",
        }
    }

    /// Field under the entry's `state` object that holds the record array.
    pub fn state_field(&self) -> &'static str {
        match self {
            Collection::Patients => "patients",
            Collection::Visits => "visits",
            Collection::Results => "results",
            Collection::Invoices => "invoices",
            Collection::Expenses => "expenses",
            Collection::ExpenseCategories => "categories",
            Collection::Reminders => "reminders",
            Collection::Activities => "activities",
            Collection::Users => "users",
        }
    }

    /// Per-entity id field. Records lacking it fall back to `id`.
    pub fn id_field(&self) -> &'static str {
        match self {
            Collection::Patients => "patientId",
            Collection::Visits => "visitId",
            Collection::Results => "resultId",
            Collection::Invoices => "invoiceId",
            Collection::Expenses => "expenseId",
            Collection::ExpenseCategories => "categoryId",
            Collection::Reminders => "reminderId",
            Collection::Activities => "activityId",
            Collection::Users => "userId",
        }
    }

    /// Parse from a wire name.
    pub fn parse(s: &str) -> Option<Self> {
        Collection::ALL.into_iter().find(|c| c.wire_name() == s)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Returns the id of a record: its collection id field, else `id`.
///
/// Numeric ids are rendered as strings so either representation matches.
pub fn record_id(collection: Collection, record: &Value) -> Option<String> {
    let value = record
        .get(collection.id_field())
        .or_else(|| record.get("id"))?;
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Last modification time of a record (`updatedAt`, else `createdAt`).
fn modified_at(record: &Value) -> Option<DateTime<Utc>> {
    ["updatedAt", "createdAt"].iter().find_map(|field| {
        record
            .get(*field)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Full export of all sync-relevant collections at a point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    collections: BTreeMap<Collection, Vec<Value>>,
    settings: Option<Value>,
}

impl Snapshot {
    /// Creates a snapshot with no collections present.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Snapshot::insert`].
    pub fn with_collection(mut self, collection: Collection, records: Vec<Value>) -> Self {
        self.insert(collection, records);
        self
    }

    /// Marks a collection present with the given records, replacing any previous value.
    pub fn insert(&mut self, collection: Collection, records: Vec<Value>) {
        self.collections.insert(collection, records);
    }

    /// Records of a collection, or `None` if the collection is absent.
    pub fn collection(&self, collection: Collection) -> Option<&[Value]> {
        self.collections.get(&collection).map(Vec::as_slice)
    }

    /// Records of a collection; absent collections read as empty.
    pub fn records(&self, collection: Collection) -> &[Value] {
        self.collection(collection).unwrap_or(&[])
    }

    /// Mutable records of a collection, marking it present.
    pub fn records_mut(&mut self, collection: Collection) -> &mut Vec<Value> {
        self.collections.entry(collection).or_default()
    }

    /// Present collections with their records.
    pub fn collections(&self) -> impl Iterator<Item = (Collection, &[Value])> {
        self.collections.iter().map(|(c, r)| (*c, r.as_slice()))
    }

    pub fn settings(&self) -> Option<&Value> {
        self.settings.as_ref()
    }

    pub fn set_settings(&mut self, settings: Value) {
        self.settings = Some(settings);
    }

    /// Total number of records across collections.
    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    /// True when no collection holds a record. Settings do not count.
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Record count per present collection.
    pub fn counts(&self) -> BTreeMap<Collection, usize> {
        self.collections
            .iter()
            .map(|(c, records)| (*c, records.len()))
            .collect()
    }

    /// Decodes a snapshot from a JSON object.
    ///
    /// Unknown keys are ignored. A known key whose value is not an array is
    /// treated as absent; so is a non-object `settings`.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let mut snapshot = Snapshot::new();

        for collection in Collection::ALL {
            match object.get(collection.wire_name()) {
                Some(Value::Array(records)) => snapshot.insert(collection, records.clone()),
                Some(Value::Null) | None => {}
                Some(_) => {
                    tracing::warn!(collection = %collection, "Ignoring non-array collection");
                }
            }
        }

        if let Some(settings @ Value::Object(_)) = object.get(SETTINGS_FIELD) {
            snapshot.settings = Some(settings.clone());
        }

        Some(snapshot)
    }

    /// Encodes the snapshot as a JSON object with only present collections.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (collection, records) in &self.collections {
            object.insert(
                collection.wire_name().to_string(),
                Value::Array(records.clone()),
            );
        }
        if let Some(settings) = &self.settings {
            object.insert(SETTINGS_FIELD.to_string(), settings.clone());
        }
        Value::Object(object)
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Snapshot::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("snapshot must be a JSON object"))
    }
}

/// How a downloaded collection is folded into the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// The remote collection replaces the local collection wholesale.
    #[default]
    Replace,
    /// Per-record reconciliation by id; the newer `updatedAt` wins.
    LastWriterWins,
}

impl MergePolicy {
    /// Merges `remote` into `local` for one collection.
    ///
    /// Under [`MergePolicy::LastWriterWins`] remote order is kept, a local
    /// record replaces its remote twin only when strictly newer, local-only
    /// records are appended, and records without an id are kept from both
    /// sides (local ones skipped when an identical remote record exists).
    pub fn merge(&self, collection: Collection, local: &[Value], remote: &[Value]) -> Vec<Value> {
        match self {
            MergePolicy::Replace => remote.to_vec(),
            MergePolicy::LastWriterWins => merge_last_writer_wins(collection, local, remote),
        }
    }
}

impl std::fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergePolicy::Replace => write!(f, "replace"),
            MergePolicy::LastWriterWins => write!(f, "last-writer-wins"),
        }
    }
}

fn merge_last_writer_wins(collection: Collection, local: &[Value], remote: &[Value]) -> Vec<Value> {
    let mut local_by_id: HashMap<String, &Value> = HashMap::new();
    for record in local {
        if let Some(id) = record_id(collection, record) {
            local_by_id.entry(id).or_insert(record);
        }
    }

    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(remote.len().max(local.len()));

    for record in remote {
        match record_id(collection, record) {
            Some(id) => {
                let chosen = match local_by_id.get(&id) {
                    Some(local) if is_newer(local, record) => (*local).clone(),
                    _ => record.clone(),
                };
                seen.insert(id);
                merged.push(chosen);
            }
            None => merged.push(record.clone()),
        }
    }

    for record in local {
        match record_id(collection, record) {
            Some(id) if seen.contains(&id) => {}
            Some(id) => {
                seen.insert(id);
                merged.push(record.clone());
            }
            None if remote.contains(record) => {}
            None => merged.push(record.clone()),
        }
    }

    merged
}

/// True when `candidate` carries a strictly later timestamp than `other`.
fn is_newer(candidate: &Value, other: &Value) -> bool {
    match (modified_at(candidate), modified_at(other)) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_parse_matches_wire_name() {
        for collection in Collection::ALL {
            assert_eq!(Collection::parse(collection.wire_name()), Some(collection));
        }
        assert_eq!(Collection::parse("dishes"), None);
    }

    #[test]
    fn test_patients_and_visits_share_storage_key() {
        assert_eq!(
            Collection::Patients.storage_key(),
            Collection::Visits.storage_key()
        );
        assert_ne!(
            Collection::Patients.state_field(),
            Collection::Visits.state_field()
        );
    }

    #[test]
    fn test_record_id_uses_entity_field_then_id() {
        let with_field = json!({"patientId": "P-1", "id": "other"});
        let with_id = json!({"id": 7});
        let without = json!({"name": "x"});

        assert_eq!(
            record_id(Collection::Patients, &with_field),
            Some("P-1".to_string())
        );
        assert_eq!(record_id(Collection::Patients, &with_id), Some("7".to_string()));
        assert_eq!(record_id(Collection::Patients, &without), None);
    }

    #[test]
    fn test_empty_snapshot_ignores_settings() {
        let mut snapshot = Snapshot::new()
            .with_collection(Collection::Patients, vec![])
            .with_collection(Collection::Visits, vec![]);
        snapshot.set_settings(json!({"labName": "Central"}));

        assert!(snapshot.is_empty());
        assert_eq!(snapshot.record_count(), 0);
    }

    #[test]
    fn test_from_json_distinguishes_absent_and_empty() {
        let value = json!({
            "patients": [{"patientId": "P-1"}],
            "visits": [],
            "unknown": [1, 2, 3]
        });
        let snapshot = Snapshot::from_json(&value).unwrap();

        assert_eq!(snapshot.records(Collection::Patients).len(), 1);
        assert_eq!(snapshot.collection(Collection::Visits), Some(&[][..]));
        assert_eq!(snapshot.collection(Collection::Results), None);
        assert_eq!(snapshot.counts().len(), 2);
    }

    #[test]
    fn test_from_json_skips_malformed_entries() {
        let value = json!({"patients": {"not": "an array"}, "settings": [1]});
        let snapshot = Snapshot::from_json(&value).unwrap();

        assert_eq!(snapshot.collection(Collection::Patients), None);
        assert!(snapshot.settings().is_none());
        assert!(Snapshot::from_json(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_deserialize_rejects_non_object() {
        let result: Result<Snapshot, _> = serde_json::from_str("[]");
        assert!(result.is_err());
    }

    #[test]
    fn test_to_json_skips_absent_collections() {
        let snapshot =
            Snapshot::new().with_collection(Collection::Results, vec![json!({"resultId": "R-1"})]);
        let value = snapshot.to_json();

        assert_eq!(value, json!({"results": [{"resultId": "R-1"}]}));
    }

    #[test]
    fn test_replace_policy_discards_local_records() {
        let local = vec![json!({"patientId": "P-1"}), json!({"patientId": "P-2"})];
        let remote = vec![json!({"patientId": "P-3"})];

        let merged = MergePolicy::Replace.merge(Collection::Patients, &local, &remote);
        assert_eq!(merged, remote);
    }

    #[test]
    fn test_last_writer_wins_prefers_newer_record() {
        let local = vec![
            json!({"patientId": "P-1", "name": "local", "updatedAt": "2024-03-02T10:00:00Z"}),
            json!({"patientId": "P-2", "name": "stale", "updatedAt": "2024-03-01T10:00:00Z"}),
        ];
        let remote = vec![
            json!({"patientId": "P-1", "name": "remote", "updatedAt": "2024-03-01T10:00:00Z"}),
            json!({"patientId": "P-2", "name": "fresh", "updatedAt": "2024-03-02T10:00:00Z"}),
        ];

        let merged = MergePolicy::LastWriterWins.merge(Collection::Patients, &local, &remote);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0]["name"], "local");
        assert_eq!(merged[1]["name"], "fresh");
    }

    #[test]
    fn test_last_writer_wins_keeps_local_only_records() {
        let local = vec![json!({"visitId": "V-9", "status": "pending"})];
        let remote = vec![json!({"visitId": "V-1"})];

        let merged = MergePolicy::LastWriterWins.merge(Collection::Visits, &local, &remote);
        let ids: Vec<_> = merged
            .iter()
            .filter_map(|r| record_id(Collection::Visits, r))
            .collect();
        assert_eq!(ids, vec!["V-1", "V-9"]);
    }

    #[test]
    fn test_last_writer_wins_tie_favours_remote() {
        let local = vec![json!({"resultId": "R-1", "value": 1})];
        let remote = vec![json!({"resultId": "R-1", "value": 2})];

        let merged = MergePolicy::LastWriterWins.merge(Collection::Results, &local, &remote);
        assert_eq!(merged, remote);
    }

    #[test]
    fn test_last_writer_wins_does_not_duplicate_idless_records() {
        let note = json!({"message": "calibrated analyser"});
        let local = vec![note.clone(), json!({"message": "local only"})];
        let remote = vec![note.clone()];

        let merged = MergePolicy::LastWriterWins.merge(Collection::Activities, &local, &remote);
        assert_eq!(merged, vec![note, json!({"message": "local only"})]);
    }

    #[test]
    fn test_merge_policy_serde_names() {
        let policy: MergePolicy = serde_yaml::from_str("last-writer-wins").unwrap();
        assert_eq!(policy, MergePolicy::LastWriterWins);
        assert_eq!(MergePolicy::default().to_string(), "replace");
    }
}
