//! Reference implementation of the remote API, served by `labsync-server`.

pub mod routes;
pub mod storage;

pub use routes::{router, ApiError, AppState};
pub use storage::{ServerStorage, ServerStorageError, DATA_FILE};
