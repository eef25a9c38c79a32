//! Interfaces to the external collaborators the engine depends on.
//!
//! The engine never talks HTTP directly; it goes through
//! [`SessionBackend`] and [`ThemeTransformBackend`]. Every call carries a
//! [`Credential`], obtained up front from a [`CredentialProvider`] so that
//! a signed-out user fails before any request leaves the process.

use std::fmt;

use async_trait::async_trait;
use atelier_core::error::CoreError;
use atelier_core::job::{JobPayload, JobStatusReport};
use atelier_core::theme::ThemeSlot;
use atelier_core::types::JobId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A bearer token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn bearer(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Supplies the current bearer credential, if the user is signed in.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<Credential>;
}

/// A fixed credential, e.g. read once from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(Option<Credential>);

impl StaticCredential {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()).map(Credential::new))
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Option<Credential> {
        self.0.clone()
    }
}

/// Fetch the credential or fail with [`CoreError::MissingCredential`].
pub fn require_credential(provider: &dyn CredentialProvider) -> Result<Credential, CoreError> {
    provider.credential().ok_or(CoreError::MissingCredential)
}

// ---------------------------------------------------------------------------
// Session snapshot
// ---------------------------------------------------------------------------

/// The job recorded on a session, with its last known status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotJob {
    pub id: JobId,
    #[serde(flatten)]
    pub report: JobStatusReport,
}

/// Everything the backend remembers about a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Raw theme text as last committed; validated on import.
    #[serde(default)]
    pub parent_theme: Option<String>,
    #[serde(default)]
    pub derived_theme: Option<String>,
    #[serde(default)]
    pub job: Option<SnapshotJob>,
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Session and job persistence.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Queue a generation job and return its id.
    async fn create_job(
        &self,
        credential: &Credential,
        session_id: &str,
        payload: &JobPayload,
    ) -> Result<JobId, CoreError>;

    /// Fetch the current status of a job.
    async fn get_job_status(
        &self,
        credential: &Credential,
        job_id: &str,
    ) -> Result<JobStatusReport, CoreError>;

    /// Load everything stored for a session.
    async fn get_session_snapshot(
        &self,
        credential: &Credential,
        session_id: &str,
    ) -> Result<SessionSnapshot, CoreError>;

    /// Persist committed theme text for one slot (`None` clears it).
    async fn save_theme(
        &self,
        credential: &Credential,
        session_id: &str,
        slot: ThemeSlot,
        theme_json: Option<&str>,
    ) -> Result<(), CoreError>;
}

/// Free text to structured theme derivation.
#[async_trait]
pub trait ThemeTransformBackend: Send + Sync {
    /// Derive a parent theme from basic keywords or custom text.
    async fn derive_parent_theme(
        &self,
        credential: &Credential,
        raw_text: &str,
    ) -> Result<String, CoreError>;

    /// Derive a child theme from free text relative to `parent_json`.
    async fn derive_child_theme(
        &self,
        credential: &Credential,
        raw_text: &str,
        parent_json: &str,
    ) -> Result<String, CoreError>;
}
