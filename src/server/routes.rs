//! HTTP routes of the reference server.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use super::storage::{ServerStorage, ServerStorageError};
use crate::remote::{Entity, HealthStatus, SyncEnvelope};
use crate::snapshot::{Collection, Snapshot};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    storage: Arc<RwLock<ServerStorage>>,
}

impl AppState {
    pub fn new(storage: ServerStorage) -> Self {
        Self {
            storage: Arc::new(RwLock::new(storage)),
        }
    }
}

/// Error response: `{"error": message}` with a status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<ServerStorageError> for ApiError {
    fn from(e: ServerStorageError) -> Self {
        let status = match &e {
            ServerStorageError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServerStorageError::Conflict { .. } => StatusCode::CONFLICT,
            ServerStorageError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
            ServerStorageError::IoError(..) | ServerStorageError::SerializeError(..) => {
                tracing::error!("Storage failure: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Builds the router with every route nested under `/api`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/sync", get(download).post(upload))
        .route("/settings", get(get_settings).put(put_settings))
        .route("/{entity}", get(list_records).post(create_record))
        .route(
            "/{entity}/{id}",
            get(get_record).put(update_record).delete(delete_record),
        )
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

fn collection_for(name: &str) -> Result<Collection, ApiError> {
    Entity::parse(name)
        .map(|entity| entity.collection())
        .ok_or_else(|| ApiError::not_found(format!("Unknown entity: {}", name)))
}

// ============================================================================
// Health and bulk sync
// ============================================================================

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    let persistent = state.storage.read().await.is_persistent();
    Json(HealthStatus {
        status: "ok".to_string(),
        database: if persistent {
            "connected"
        } else {
            "not configured"
        }
        .to_string(),
    })
}

async fn download(State(state): State<AppState>) -> Json<SyncEnvelope> {
    let data = state.storage.read().await.snapshot().clone();
    Json(SyncEnvelope::ok(Some(data)))
}

async fn upload(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<SyncEnvelope>) {
    let Some(snapshot) = Snapshot::from_json(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(SyncEnvelope::failed("Sync body must be a JSON object")),
        );
    };

    match state.storage.write().await.merge_snapshot(&snapshot) {
        Ok(changed) => {
            tracing::info!(changed, "Merged uploaded snapshot");
            (StatusCode::OK, Json(SyncEnvelope::ok(None)))
        }
        Err(e) => {
            tracing::error!("Failed to store uploaded snapshot: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SyncEnvelope::failed(e.to_string())),
            )
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

async fn get_settings(State(state): State<AppState>) -> Json<Value> {
    Json(state.storage.read().await.settings())
}

async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let stored = state.storage.write().await.set_settings(settings)?;
    Ok(Json(stored))
}

// ============================================================================
// Entity CRUD
// ============================================================================

async fn list_records(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let collection = collection_for(&entity)?;
    let records = state.storage.read().await.list(collection).to_vec();
    Ok(Json(records))
}

async fn create_record(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(record): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let collection = collection_for(&entity)?;
    let created = state.storage.write().await.create(collection, record)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let collection = collection_for(&entity)?;
    let storage = state.storage.read().await;
    storage
        .get(collection, &id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("{} not found: {}", collection, id)))
}

async fn update_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    Json(record): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let collection = collection_for(&entity)?;
    let updated = state.storage.write().await.update(collection, &id, record)?;
    Ok(Json(updated))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let collection = collection_for(&entity)?;
    state.storage.write().await.delete(collection, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    fn app() -> Router {
        router(AppState::new(ServerStorage::in_memory()))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_without_database() {
        let (status, body) = send(&app(), Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "database": "not configured"}));
    }

    #[tokio::test]
    async fn test_health_with_persistent_storage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let app = router(AppState::new(ServerStorage::open(temp_dir.path()).unwrap()));

        let (_, body) = send(&app, Method::GET, "/api/health", None).await;
        assert_eq!(body["database"], "connected");
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/sync",
            Some(json!({
                "patients": [{"patientId": "P-1"}],
                "settings": {"labName": "Central"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));

        let (_, body) = send(&app, Method::GET, "/api/sync", None).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["patients"], json!([{"patientId": "P-1"}]));
        assert_eq!(body["data"]["visits"], json!([]));
        assert_eq!(body["data"]["expenseCategories"], json!([]));
        assert_eq!(body["data"]["settings"], json!({"labName": "Central"}));
    }

    #[tokio::test]
    async fn test_upload_rejects_non_object() {
        let (status, body) = send(&app(), Method::POST, "/api/sync", Some(json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_entity_crud() {
        let app = app();

        let (status, created) = send(
            &app,
            Method::POST,
            "/api/patients",
            Some(json!({"name": "Ada"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["patientId"].as_str().unwrap().to_string();

        let (status, list) = send(&app, Method::GET, "/api/patients", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let uri = format!("/api/patients/{}", id);
        let (status, updated) = send(&app, Method::PUT, &uri, Some(json!({"name": "Grace"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Grace");
        assert_eq!(updated["patientId"], id.as_str());

        let (_, fetched) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(fetched["name"], "Grace");

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], format!("patients not found: {}", id));
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let app = app();
        let record = json!({"userId": "U-1"});
        send(&app, Method::POST, "/api/users", Some(record.clone())).await;

        let (status, body) = send(&app, Method::POST, "/api/users", Some(record)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("U-1"));
    }

    #[tokio::test]
    async fn test_unknown_entity() {
        let (status, body) = send(&app(), Method::GET, "/api/widgets", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Unknown entity: widgets"}));
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let app = app();
        let (_, body) = send(&app, Method::GET, "/api/settings", None).await;
        assert_eq!(body, json!({}));

        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/settings",
            Some(json!({"currency": "EUR"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::GET, "/api/settings", None).await;
        assert_eq!(body, json!({"currency": "EUR"}));
    }
}
