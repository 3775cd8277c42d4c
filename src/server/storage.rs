//! Server-side record storage.
//!
//! All records are held in memory as one [`Snapshot`]. When a data directory
//! is configured the whole snapshot is written after every change:
//! ```text
//! <DATA_DIR>/
//!   labsync-data.json
//! ```

use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::snapshot::{record_id, Collection, Snapshot};

/// File name of the persisted snapshot.
pub const DATA_FILE: &str = "labsync-data.json";

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum ServerStorageError {
    /// I/O error reading or writing the data file.
    IoError(PathBuf, io::Error),
    /// The data file could not be parsed or written as JSON.
    SerializeError(PathBuf, serde_json::Error),
    /// No record with this id.
    NotFound { collection: Collection, id: String },
    /// A record with this id already exists.
    Conflict { collection: Collection, id: String },
    /// The request body is not a JSON object.
    InvalidRecord(String),
}

impl std::fmt::Display for ServerStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            ServerStorageError::SerializeError(path, e) => {
                write!(f, "Invalid data file {}: {}", path.display(), e)
            }
            ServerStorageError::NotFound { collection, id } => {
                write!(f, "{} not found: {}", collection, id)
            }
            ServerStorageError::Conflict { collection, id } => {
                write!(f, "{} already exists: {}", collection, id)
            }
            ServerStorageError::InvalidRecord(reason) => {
                write!(f, "Invalid record: {}", reason)
            }
        }
    }
}

impl std::error::Error for ServerStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerStorageError::IoError(_, e) => Some(e),
            ServerStorageError::SerializeError(_, e) => Some(e),
            _ => None,
        }
    }
}

/// In-memory record store with optional JSON file persistence.
#[derive(Debug, Clone)]
pub struct ServerStorage {
    data: Snapshot,
    path: Option<PathBuf>,
}

impl Default for ServerStorage {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ServerStorage {
    /// Creates a storage that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            data: empty_snapshot(),
            path: None,
        }
    }

    /// Opens (or creates) the data file in `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, ServerStorageError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .map_err(|e| ServerStorageError::IoError(data_dir.to_path_buf(), e))?;

        let path = data_dir.join(DATA_FILE);
        let mut data = empty_snapshot();

        match fs::read_to_string(&path) {
            Ok(contents) => {
                let stored: Snapshot = serde_json::from_str(&contents)
                    .map_err(|e| ServerStorageError::SerializeError(path.clone(), e))?;
                for (collection, records) in stored.collections() {
                    data.insert(collection, records.to_vec());
                }
                if let Some(settings) = stored.settings() {
                    data.set_settings(settings.clone());
                }
                tracing::info!(
                    records = data.record_count(),
                    "Loaded data from {}",
                    path.display()
                );
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ServerStorageError::IoError(path, e)),
        }

        Ok(Self {
            data,
            path: Some(path),
        })
    }

    /// Whether writes are persisted to disk.
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    /// The full data set.
    pub fn snapshot(&self) -> &Snapshot {
        &self.data
    }

    /// Upserts every record of `incoming` by id and replaces settings if present.
    ///
    /// Records without an id are appended unless an equal record is already
    /// stored. Returns the number of records inserted or updated.
    pub fn merge_snapshot(&mut self, incoming: &Snapshot) -> Result<usize, ServerStorageError> {
        let mut data = self.data.clone();
        let mut changed = 0;

        for (collection, records) in incoming.collections() {
            let stored = data.records_mut(collection);
            for record in records {
                match record_id(collection, record) {
                    Some(id) => {
                        match stored
                            .iter_mut()
                            .find(|r| record_id(collection, r).as_deref() == Some(id.as_str()))
                        {
                            Some(existing) if existing == record => continue,
                            Some(existing) => *existing = record.clone(),
                            None => stored.push(record.clone()),
                        }
                    }
                    None => {
                        if stored.contains(record) {
                            continue;
                        }
                        stored.push(record.clone());
                    }
                }
                changed += 1;
            }
        }

        if let Some(settings) = incoming.settings() {
            data.set_settings(settings.clone());
        }

        self.commit(data)?;
        Ok(changed)
    }

    /// All records of a collection.
    pub fn list(&self, collection: Collection) -> &[Value] {
        self.data.records(collection)
    }

    /// One record by id.
    pub fn get(&self, collection: Collection, id: &str) -> Option<&Value> {
        self.data
            .records(collection)
            .iter()
            .find(|r| record_id(collection, r).as_deref() == Some(id))
    }

    /// Inserts a new record, assigning a UUID when it has no id.
    pub fn create(
        &mut self,
        collection: Collection,
        record: Value,
    ) -> Result<Value, ServerStorageError> {
        let mut record = into_object(record)?;

        let id = match record_id(collection, &Value::Object(record.clone())) {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                record.insert(collection.id_field().to_string(), Value::String(id.clone()));
                id
            }
        };

        if self.get(collection, &id).is_some() {
            return Err(ServerStorageError::Conflict { collection, id });
        }

        let record = Value::Object(record);
        let mut data = self.data.clone();
        data.records_mut(collection).push(record.clone());
        self.commit(data)?;
        Ok(record)
    }

    /// Replaces an existing record. The stored record keeps the id from the path.
    pub fn update(
        &mut self,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<Value, ServerStorageError> {
        let mut record = into_object(record)?;
        record.insert(collection.id_field().to_string(), Value::String(id.to_string()));
        let record = Value::Object(record);

        let mut data = self.data.clone();
        let existing = data
            .records_mut(collection)
            .iter_mut()
            .find(|r| record_id(collection, r).as_deref() == Some(id))
            .ok_or_else(|| ServerStorageError::NotFound {
                collection,
                id: id.to_string(),
            })?;
        *existing = record.clone();

        self.commit(data)?;
        Ok(record)
    }

    /// Removes a record.
    pub fn delete(&mut self, collection: Collection, id: &str) -> Result<(), ServerStorageError> {
        let mut data = self.data.clone();
        let records = data.records_mut(collection);
        let before = records.len();
        records.retain(|r| record_id(collection, r).as_deref() != Some(id));

        if records.len() == before {
            return Err(ServerStorageError::NotFound {
                collection,
                id: id.to_string(),
            });
        }

        self.commit(data)
    }

    /// The settings object, `{}` if never set.
    pub fn settings(&self) -> Value {
        self.data
            .settings()
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Replaces the settings object.
    pub fn set_settings(&mut self, settings: Value) -> Result<Value, ServerStorageError> {
        let settings = Value::Object(into_object(settings)?);
        let mut data = self.data.clone();
        data.set_settings(settings.clone());
        self.commit(data)?;
        Ok(settings)
    }

    /// Persists `data`, then makes it the current data set. A failed write
    /// leaves the current data untouched.
    fn commit(&mut self, data: Snapshot) -> Result<(), ServerStorageError> {
        self.persist(&data)?;
        self.data = data;
        Ok(())
    }

    /// Writes the snapshot atomically using temp file + rename.
    fn persist(&self, data: &Snapshot) -> Result<(), ServerStorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(data)
            .map_err(|e| ServerStorageError::SerializeError(path.clone(), e))?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, bytes).map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
        fs::rename(&temp_path, path).map_err(|e| ServerStorageError::IoError(path.clone(), e))?;

        Ok(())
    }
}

fn empty_snapshot() -> Snapshot {
    let mut snapshot = Snapshot::new();
    for collection in Collection::ALL {
        snapshot.insert(collection, Vec::new());
    }
    snapshot
}

fn into_object(value: Value) -> Result<Map<String, Value>, ServerStorageError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ServerStorageError::InvalidRecord(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_has_every_collection() {
        let storage = ServerStorage::in_memory();
        assert!(!storage.is_persistent());
        for collection in Collection::ALL {
            assert_eq!(storage.snapshot().collection(collection), Some(&[][..]));
        }
        assert_eq!(storage.settings(), json!({}));
    }

    #[test]
    fn test_merge_snapshot_upserts_by_id() {
        let mut storage = ServerStorage::in_memory();
        storage
            .create(Collection::Patients, json!({"patientId": "P-1", "name": "Old"}))
            .unwrap();

        let incoming = Snapshot::new().with_collection(
            Collection::Patients,
            vec![
                json!({"patientId": "P-1", "name": "New"}),
                json!({"patientId": "P-2", "name": "Second"}),
            ],
        );
        let changed = storage.merge_snapshot(&incoming).unwrap();

        assert_eq!(changed, 2);
        assert_eq!(storage.list(Collection::Patients).len(), 2);
        assert_eq!(
            storage.get(Collection::Patients, "P-1").unwrap()["name"],
            "New"
        );

        // Same upload again changes nothing
        assert_eq!(storage.merge_snapshot(&incoming).unwrap(), 0);
    }

    #[test]
    fn test_merge_snapshot_dedupes_records_without_id() {
        let mut storage = ServerStorage::in_memory();
        let incoming = Snapshot::new()
            .with_collection(Collection::Reminders, vec![json!({"note": "calibrate"})]);

        storage.merge_snapshot(&incoming).unwrap();
        storage.merge_snapshot(&incoming).unwrap();

        assert_eq!(storage.list(Collection::Reminders), &[json!({"note": "calibrate"})]);
    }

    #[test]
    fn test_merge_snapshot_replaces_settings() {
        let mut storage = ServerStorage::in_memory();
        let mut incoming = Snapshot::new();
        incoming.set_settings(json!({"labName": "North"}));

        storage.merge_snapshot(&incoming).unwrap();
        assert_eq!(storage.settings(), json!({"labName": "North"}));
    }

    #[test]
    fn test_create_assigns_uuid() {
        let mut storage = ServerStorage::in_memory();
        let created = storage
            .create(Collection::Expenses, json!({"amount": 12}))
            .unwrap();

        let id = created["expenseId"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
        assert!(storage.get(Collection::Expenses, id).is_some());
    }

    #[test]
    fn test_create_duplicate_conflicts() {
        let mut storage = ServerStorage::in_memory();
        storage
            .create(Collection::Users, json!({"userId": "U-1"}))
            .unwrap();

        let err = storage
            .create(Collection::Users, json!({"userId": "U-1"}))
            .unwrap_err();
        assert!(matches!(err, ServerStorageError::Conflict { .. }));
    }

    #[test]
    fn test_create_rejects_non_object() {
        let mut storage = ServerStorage::in_memory();
        let err = storage.create(Collection::Users, json!([1])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid record: expected a JSON object, got an array");
    }

    #[test]
    fn test_update_and_delete() {
        let mut storage = ServerStorage::in_memory();
        storage
            .create(Collection::Results, json!({"resultId": "R-1", "value": 1}))
            .unwrap();

        let updated = storage
            .update(Collection::Results, "R-1", json!({"value": 2}))
            .unwrap();
        assert_eq!(updated, json!({"resultId": "R-1", "value": 2}));

        storage.delete(Collection::Results, "R-1").unwrap();
        let err = storage.delete(Collection::Results, "R-1").unwrap_err();
        assert_eq!(err.to_string(), "results not found: R-1");
    }

    #[test]
    fn test_update_missing_record() {
        let mut storage = ServerStorage::in_memory();
        let err = storage
            .update(Collection::Patients, "P-404", json!({}))
            .unwrap_err();
        assert!(matches!(err, ServerStorageError::NotFound { .. }));
    }

    #[test]
    fn test_persists_and_reloads() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut storage = ServerStorage::open(temp_dir.path()).unwrap();
            assert!(storage.is_persistent());
            storage
                .create(Collection::Activities, json!({"activityId": "A-1"}))
                .unwrap();
            storage.set_settings(json!({"currency": "USD"})).unwrap();
        }

        assert!(temp_dir.path().join(DATA_FILE).exists());
        assert!(!temp_dir.path().join("labsync-data.json.tmp").exists());

        let storage = ServerStorage::open(temp_dir.path()).unwrap();
        assert_eq!(storage.list(Collection::Activities).len(), 1);
        assert_eq!(storage.list(Collection::Patients).len(), 0);
        assert_eq!(storage.settings(), json!({"currency": "USD"}));
    }

    #[test]
    fn test_failed_write_keeps_previous_data() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        let mut storage = ServerStorage::open(&data_dir).unwrap();
        storage
            .create(Collection::Patients, json!({"patientId": "P-1"}))
            .unwrap();

        fs::remove_dir_all(&data_dir).unwrap();

        let err = storage
            .create(Collection::Patients, json!({"patientId": "P-2"}))
            .unwrap_err();
        assert!(matches!(err, ServerStorageError::IoError(..)));
        assert!(storage.get(Collection::Patients, "P-2").is_none());

        let incoming = Snapshot::new()
            .with_collection(Collection::Patients, vec![json!({"patientId": "P-1", "name": "New"})]);
        assert!(storage.merge_snapshot(&incoming).is_err());
        assert_eq!(
            storage.get(Collection::Patients, "P-1"),
            Some(&json!({"patientId": "P-1"}))
        );

        assert!(storage.delete(Collection::Patients, "P-1").is_err());
        assert!(storage.set_settings(json!({"labName": "North"})).is_err());
        assert_eq!(storage.list(Collection::Patients).len(), 1);
        assert_eq!(storage.settings(), json!({}));
    }

    #[test]
    fn test_open_rejects_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(DATA_FILE), "not json").unwrap();

        let err = ServerStorage::open(temp_dir.path()).unwrap_err();
        assert!(matches!(err, ServerStorageError::SerializeError(..)));
    }
}
