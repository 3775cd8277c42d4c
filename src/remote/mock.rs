//! Counting in-memory remote for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{HealthStatus, RemoteError, SyncEnvelope, SyncRemote};
use crate::snapshot::Snapshot;

/// Decrements the in-flight gauge even when the call future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockRemote {
    download: Mutex<Result<SyncEnvelope, RemoteError>>,
    upload: Mutex<Result<SyncEnvelope, RemoteError>>,
    delay: Mutex<Duration>,
    download_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    uploaded: Mutex<Vec<Snapshot>>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockRemote {
    pub(crate) fn new() -> Self {
        Self::with_remote_data(Snapshot::new())
    }

    pub(crate) fn with_remote_data(snapshot: Snapshot) -> Self {
        Self {
            download: Mutex::new(Ok(SyncEnvelope::ok(Some(snapshot)))),
            upload: Mutex::new(Ok(SyncEnvelope::ok(None))),
            delay: Mutex::new(Duration::ZERO),
            download_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            uploaded: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_download(&self, response: Result<SyncEnvelope, RemoteError>) {
        *self.download.lock().unwrap() = response;
    }

    pub(crate) fn set_upload(&self, response: Result<SyncEnvelope, RemoteError>) {
        *self.upload.lock().unwrap() = response;
    }

    /// Makes every bulk call wait `delay` before answering.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub(crate) fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Total bulk calls (downloads plus uploads).
    pub(crate) fn network_calls(&self) -> usize {
        self.download_calls() + self.upload_calls()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn uploaded(&self) -> Vec<Snapshot> {
        self.uploaded.lock().unwrap().clone()
    }

    /// Call names in invocation order.
    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, name: &'static str) -> InFlight<'_> {
        self.calls.lock().unwrap().push(name);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        guard
    }
}

impl SyncRemote for MockRemote {
    async fn health_check(&self) -> Result<HealthStatus, RemoteError> {
        self.calls.lock().unwrap().push("health");
        Ok(HealthStatus {
            status: "ok".into(),
            database: "connected".into(),
        })
    }

    async fn get_all_data(&self) -> Result<SyncEnvelope, RemoteError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter("download").await;
        self.download.lock().unwrap().clone()
    }

    async fn sync_all_data(&self, snapshot: &Snapshot) -> Result<SyncEnvelope, RemoteError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.uploaded.lock().unwrap().push(snapshot.clone());
        let _guard = self.enter("upload").await;
        self.upload.lock().unwrap().clone()
    }
}
