/// Errors surfaced by the theme and job engine.
///
/// Every variant is cheap to clone so the same value can be recorded in
/// `last_error` / view state and returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Malformed theme text or submission payload. The user corrects the
    /// input; nothing was changed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A derived-theme operation was attempted before a parent theme exists.
    #[error("A parent theme is required before a derived theme can be created")]
    MissingParent,

    /// No bearer credential was available; no request was sent.
    #[error("Missing credential: sign in before contacting the backend")]
    MissingCredential,

    /// A theme submission or commit is already outstanding.
    #[error("A submission is already in progress")]
    SubmissionInProgress,

    /// The operation conflicts with the current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A single backend call failed in a way that may succeed on retry.
    #[error("Network error: {0}")]
    TransientNetwork(String),

    /// The backend rejected the request and retrying will not help.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The backend reported the generation job itself as failed.
    #[error("Generation job failed: {0}")]
    TerminalJobFailure(String),

    /// Polling gave up after too many consecutive transient errors. The job
    /// may still finish server-side.
    #[error("Polling abandoned after {attempts} consecutive errors: {last_error}")]
    PollAbandoned { attempts: u32, last_error: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },
}

impl CoreError {
    /// Whether the failure is worth offering a "retry" action for.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork(_) | Self::PollAbandoned { .. } | Self::SubmissionInProgress
        )
    }
}
