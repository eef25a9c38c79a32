//! Generation job model and submission payload validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::theme::ThemeDocument;
use crate::types::{JobId, SessionId, Timestamp};

/// Maximum prompt length in characters, as enforced by the `Validate`
/// derive on [`JobPayload`].
pub const MAX_PROMPT_LENGTH: usize = 4_000;

// ---------------------------------------------------------------------------
// Job status
// ---------------------------------------------------------------------------

/// Status of a generation job as reported by the session backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

/// One `getJobStatus` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobStatusReport {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            result_url: None,
            error_message: None,
        }
    }

    pub fn completed(result_url: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Completed,
            result_url: Some(result_url.into()),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            result_url: None,
            error_message: Some(error_message.into()),
        }
    }
}

/// The single live generation job of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: JobId,
    pub session_id: SessionId,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub consecutive_error_count: u32,
    pub submitted_at: Timestamp,
}

impl GenerationJob {
    pub fn new(id: JobId, session_id: SessionId) -> Self {
        Self {
            id,
            session_id,
            status: JobStatus::Pending,
            result_url: None,
            error_message: None,
            consecutive_error_count: 0,
            submitted_at: chrono::Utc::now(),
        }
    }

    /// Apply a status report fetched from the backend.
    pub fn apply_report(&mut self, report: &JobStatusReport) {
        self.status = report.status;
        self.consecutive_error_count = 0;
        if report.result_url.is_some() {
            self.result_url = report.result_url.clone();
        }
        if report.error_message.is_some() {
            self.error_message = report.error_message.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Session status
// ---------------------------------------------------------------------------

/// Externally observable status of a session's generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Pending,
    Complete,
    Failed,
}

// ---------------------------------------------------------------------------
// Submission payload
// ---------------------------------------------------------------------------

/// Body of a `createJob` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct JobPayload {
    #[validate(length(min = 1, message = "session id must not be empty"))]
    pub session_id: SessionId,

    #[validate(length(
        min = 1,
        max = 4000,
        message = "prompt must be between 1 and 4000 characters"
    ))]
    pub prompt: String,

    /// The theme guiding the generation (derived theme if present, else parent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemeDocument>,
}

impl JobPayload {
    pub fn new(session_id: impl Into<SessionId>, prompt: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            prompt: prompt.into(),
            theme: None,
        }
    }

    pub fn with_theme(mut self, theme: Option<ThemeDocument>) -> Self {
        self.theme = theme;
        self
    }
}

/// Validate a payload before it is sent to the backend.
///
/// Beyond the derived rules (including the [`MAX_PROMPT_LENGTH`] cap),
/// whitespace-only prompts and session ids are rejected.
pub fn validate_payload(payload: &JobPayload) -> Result<(), CoreError> {
    payload
        .validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    if payload.session_id.trim().is_empty() {
        return Err(CoreError::Validation(
            "session id must not be blank".to_string(),
        ));
    }
    if payload.prompt.trim().is_empty() {
        return Err(CoreError::Validation(
            "prompt must not be blank".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
