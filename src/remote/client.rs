//! HTTP client for the laboratory remote API.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{HealthStatus, RemoteError, SyncEnvelope, SyncRemote};
use crate::snapshot::{Collection, Snapshot};

/// Entities with per-record CRUD endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Patients,
    Results,
    Expenses,
    Activities,
    Users,
}

impl Entity {
    pub const ALL: [Entity; 5] = [
        Entity::Patients,
        Entity::Results,
        Entity::Expenses,
        Entity::Activities,
        Entity::Users,
    ];

    /// Path segment for this entity.
    pub fn path(&self) -> &'static str {
        self.collection().wire_name()
    }

    /// Snapshot collection holding this entity's records.
    pub fn collection(&self) -> Collection {
        match self {
            Entity::Patients => Collection::Patients,
            Entity::Results => Collection::Results,
            Entity::Expenses => Collection::Expenses,
            Entity::Activities => Collection::Activities,
            Entity::Users => Collection::Users,
        }
    }

    /// Parse from a path segment.
    pub fn parse(s: &str) -> Option<Self> {
        Entity::ALL.into_iter().find(|e| e.path() == s)
    }
}

/// Request wrapper around the remote CRUD API.
///
/// Every call either yields the parsed JSON body or a [`RemoteError`]; there
/// is no retry or backoff here.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    base_url: String,
    http: reqwest::Client,
}

impl RemoteClient {
    /// Creates a client for `base_url` (e.g. `http://localhost:5000/api`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(base_url, reqwest::Client::new())
    }

    /// Creates a client using a preconfigured reqwest client.
    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Issues a request and parses the JSON response body.
    ///
    /// An empty success body parses as `null`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        let url = self.url(path);
        tracing::debug!(%method, %url, "Remote request");

        let mut builder = self.http.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(RemoteError::from_status(status.as_u16(), &text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn request_as<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, RemoteError> {
        let value = self.request(method, path, body).await?;
        serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    fn record_path(entity: Entity, id: &str) -> String {
        format!("/{}/{}", entity.path(), urlencoding::encode(id))
    }

    /// Lists every record of an entity.
    pub async fn list(&self, entity: Entity) -> Result<Vec<Value>, RemoteError> {
        self.request_as(Method::GET, &format!("/{}", entity.path()), None)
            .await
    }

    /// Fetches one record by id.
    pub async fn get(&self, entity: Entity, id: &str) -> Result<Value, RemoteError> {
        self.request(Method::GET, &Self::record_path(entity, id), None)
            .await
    }

    /// Creates a record and returns the stored version.
    pub async fn create(&self, entity: Entity, record: &Value) -> Result<Value, RemoteError> {
        self.request(Method::POST, &format!("/{}", entity.path()), Some(record))
            .await
    }

    /// Replaces a record and returns the stored version.
    pub async fn update(
        &self,
        entity: Entity,
        id: &str,
        record: &Value,
    ) -> Result<Value, RemoteError> {
        self.request(Method::PUT, &Self::record_path(entity, id), Some(record))
            .await
    }

    /// Deletes a record.
    pub async fn delete(&self, entity: Entity, id: &str) -> Result<(), RemoteError> {
        self.request(Method::DELETE, &Self::record_path(entity, id), None)
            .await
            .map(|_| ())
    }

    /// Fetches the settings object.
    pub async fn get_settings(&self) -> Result<Value, RemoteError> {
        self.request(Method::GET, "/settings", None).await
    }

    /// Replaces the settings object.
    pub async fn update_settings(&self, settings: &Value) -> Result<Value, RemoteError> {
        self.request(Method::PUT, "/settings", Some(settings)).await
    }
}

impl SyncRemote for RemoteClient {
    async fn health_check(&self) -> Result<HealthStatus, RemoteError> {
        self.request_as(Method::GET, "/health", None).await
    }

    async fn get_all_data(&self) -> Result<SyncEnvelope, RemoteError> {
        self.request_as(Method::GET, "/sync", None).await
    }

    async fn sync_all_data(&self, snapshot: &Snapshot) -> Result<SyncEnvelope, RemoteError> {
        let body = snapshot.to_json();
        self.request_as(Method::POST, "/sync", Some(&body)).await
    }
}
