//! Remote API access.
//!
//! [`SyncRemote`] is the seam the sync core depends on: a health check plus the
//! two bulk endpoints. [`RemoteClient`] implements it over HTTP and also
//! exposes the per-entity CRUD calls used by direct user actions.
//!
//! ## Endpoints
//!
//! - `GET /health` → `{"status": "ok", "database": "connected"}`
//! - `GET /sync` → `{"success": true, "data": Snapshot}`
//! - `POST /sync` with a `Snapshot` body → `{"success": bool, "error"?: string}`
//! - `GET/POST /<entity>`, `GET/PUT/DELETE /<entity>/<id>`, `GET/PUT /settings`

mod client;
mod error;
#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

pub use client::{Entity, RemoteClient};
pub use error::RemoteError;

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub database: String,
}

impl HealthStatus {
    /// True when the server reports `status: "ok"`.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// True when the server has a database behind it.
    pub fn database_connected(&self) -> bool {
        self.database == "connected"
    }
}

/// Response envelope of both `/sync` endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncEnvelope {
    /// A successful envelope carrying `data`.
    pub fn ok(data: Option<Snapshot>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// A failed envelope with an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Remote operations used by the sync core.
///
/// Implementations perform no retries; callers decide whether a failure is
/// fatal to their operation.
pub trait SyncRemote: Send + Sync {
    /// Checks whether the remote is reachable and has a database.
    fn health_check(&self) -> impl Future<Output = Result<HealthStatus, RemoteError>> + Send;

    /// Fetches the full remote snapshot in one round trip.
    fn get_all_data(&self) -> impl Future<Output = Result<SyncEnvelope, RemoteError>> + Send;

    /// Uploads a full local snapshot. Merging is the remote's responsibility.
    fn sync_all_data(
        &self,
        snapshot: &Snapshot,
    ) -> impl Future<Output = Result<SyncEnvelope, RemoteError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Collection;

    #[test]
    fn test_envelope_without_data_field() {
        let envelope: SyncEnvelope = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(envelope.success);
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_envelope_with_null_data() {
        let envelope: SyncEnvelope =
            serde_json::from_str(r#"{"success": true, "data": null}"#).unwrap();
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_envelope_decodes_snapshot() {
        let envelope: SyncEnvelope = serde_json::from_str(
            r#"{"success": true, "data": {"patients": [{"patientId": "P-1"}]}, "extra": 1}"#,
        )
        .unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.records(Collection::Patients).len(), 1);
    }

    #[test]
    fn test_health_status_flags() {
        let health: HealthStatus =
            serde_json::from_str(r#"{"status": "ok", "database": "not configured"}"#).unwrap();
        assert!(health.is_ok());
        assert!(!health.database_connected());
    }
}
