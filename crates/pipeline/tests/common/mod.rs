//! In-memory backends shared by the pipeline integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use atelier_client::keyword::KeywordThemeTransform;
use atelier_client::{
    Credential, CredentialProvider, SessionBackend, SessionSnapshot, StaticCredential,
    ThemeTransformBackend,
};
use atelier_core::error::CoreError;
use atelier_core::job::{JobPayload, JobStatusReport};
use atelier_core::theme::ThemeSlot;
use atelier_core::types::JobId;
use atelier_pipeline::poller::PollConfig;
use atelier_pipeline::{SessionController, ThemeStore};
use tokio::sync::Notify;

pub const SESSION_ID: &str = "session-1";

/// The default interval and threshold, spelled out so tests read plainly.
pub fn poll_config() -> PollConfig {
    PollConfig {
        interval: Duration::from_secs(2),
        error_threshold: 3,
    }
}

pub fn signed_in() -> Arc<dyn CredentialProvider> {
    Arc::new(StaticCredential::new(Some("test-token".to_string())))
}

pub fn signed_out() -> Arc<dyn CredentialProvider> {
    Arc::new(StaticCredential::new(None))
}

// ---------------------------------------------------------------------------
// Session backend
// ---------------------------------------------------------------------------

/// Session backend replaying scripted status responses.
///
/// Once the script runs out, every status call reports `PENDING`.
#[derive(Default)]
pub struct FakeSessionBackend {
    statuses: Mutex<VecDeque<Result<JobStatusReport, CoreError>>>,
    status_calls: AtomicUsize,
    created: Mutex<Vec<JobPayload>>,
    create_calls: AtomicUsize,
    create_errors: Mutex<VecDeque<CoreError>>,
    create_error: Mutex<Option<CoreError>>,
    saved: Mutex<Vec<(ThemeSlot, Option<String>)>>,
    save_calls: AtomicUsize,
    save_errors: Mutex<VecDeque<CoreError>>,
    save_error: Mutex<Option<CoreError>>,
    save_delay: Mutex<Duration>,
    snapshot: Mutex<SessionSnapshot>,
}

impl FakeSessionBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_statuses(
        &self,
        statuses: impl IntoIterator<Item = Result<JobStatusReport, CoreError>>,
    ) {
        self.statuses.lock().unwrap().extend(statuses);
    }

    pub fn fail_create(&self, error: CoreError) {
        *self.create_error.lock().unwrap() = Some(error);
    }

    /// Fail the next `create_job` calls with `errors`, one each.
    pub fn fail_next_creates(&self, errors: impl IntoIterator<Item = CoreError>) {
        self.create_errors.lock().unwrap().extend(errors);
    }

    pub fn fail_saves(&self, error: Option<CoreError>) {
        *self.save_error.lock().unwrap() = error;
    }

    /// Fail the next `save_theme` calls with `errors`, one each.
    pub fn fail_next_saves(&self, errors: impl IntoIterator<Item = CoreError>) {
        self.save_errors.lock().unwrap().extend(errors);
    }

    /// Make every `save_theme` call take `delay` before it lands.
    pub fn slow_saves(&self, delay: Duration) {
        *self.save_delay.lock().unwrap() = delay;
    }

    pub fn set_snapshot(&self, snapshot: SessionSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<JobPayload> {
        self.created.lock().unwrap().clone()
    }

    pub fn saved(&self) -> Vec<(ThemeSlot, Option<String>)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionBackend for FakeSessionBackend {
    async fn create_job(
        &self,
        _credential: &Credential,
        _session_id: &str,
        payload: &JobPayload,
    ) -> Result<JobId, CoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.create_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        if let Some(e) = self.create_error.lock().unwrap().clone() {
            return Err(e);
        }
        let mut created = self.created.lock().unwrap();
        created.push(payload.clone());
        Ok(format!("job-{}", created.len()))
    }

    async fn get_job_status(
        &self,
        _credential: &Credential,
        _job_id: &str,
    ) -> Result<JobStatusReport, CoreError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(JobStatusReport::pending()))
    }

    async fn get_session_snapshot(
        &self,
        _credential: &Credential,
        _session_id: &str,
    ) -> Result<SessionSnapshot, CoreError> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn save_theme(
        &self,
        _credential: &Credential,
        _session_id: &str,
        slot: ThemeSlot,
        theme_json: Option<&str>,
    ) -> Result<(), CoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.save_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.save_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        if let Some(e) = self.save_error.lock().unwrap().clone() {
            return Err(e);
        }
        self.saved
            .lock()
            .unwrap()
            .push((slot, theme_json.map(str::to_string)));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Theme transforms
// ---------------------------------------------------------------------------

/// Keyword transform that holds every call until [`GatedTransform::open`].
#[derive(Default)]
pub struct GatedTransform {
    inner: KeywordThemeTransform,
    gate: Notify,
    calls: AtomicUsize,
}

impl GatedTransform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThemeTransformBackend for GatedTransform {
    async fn derive_parent_theme(
        &self,
        credential: &Credential,
        raw_text: &str,
    ) -> Result<String, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        self.inner.derive_parent_theme(credential, raw_text).await
    }

    async fn derive_child_theme(
        &self,
        credential: &Credential,
        raw_text: &str,
        parent_json: &str,
    ) -> Result<String, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        self.inner
            .derive_child_theme(credential, raw_text, parent_json)
            .await
    }
}

/// Transform that answers with fixed text, valid or not.
pub struct FixedTransform(pub &'static str);

#[async_trait]
impl ThemeTransformBackend for FixedTransform {
    async fn derive_parent_theme(
        &self,
        _credential: &Credential,
        _raw_text: &str,
    ) -> Result<String, CoreError> {
        Ok(self.0.to_string())
    }

    async fn derive_child_theme(
        &self,
        _credential: &Credential,
        _raw_text: &str,
        _parent_json: &str,
    ) -> Result<String, CoreError> {
        Ok(self.0.to_string())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn keyword_store(backend: &Arc<FakeSessionBackend>) -> ThemeStore {
    ThemeStore::new(
        SESSION_ID,
        backend.clone(),
        Arc::new(KeywordThemeTransform::new()),
        signed_in(),
    )
}

pub fn controller(backend: &Arc<FakeSessionBackend>) -> SessionController {
    SessionController::new(
        SESSION_ID,
        backend.clone(),
        Arc::new(KeywordThemeTransform::new()),
        signed_in(),
        poll_config(),
    )
}
