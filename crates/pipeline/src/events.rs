//! Session-level events emitted by the [`SessionController`].
//!
//! These are the high-level state changes a view cares about; subscribe
//! with [`SessionController::subscribe`].
//!
//! [`SessionController`]: crate::controller::SessionController
//! [`SessionController::subscribe`]: crate::controller::SessionController::subscribe

use atelier_core::types::{JobId, SessionId};
use serde::Serialize;

/// Broadcast channel capacity for session events.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A state change of a session's generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A job was created and polling started.
    JobSubmitted { session_id: SessionId, job_id: JobId },

    /// The job completed successfully.
    JobCompleted {
        session_id: SessionId,
        job_id: JobId,
        result_url: Option<String>,
    },

    /// The backend reported the job as failed.
    JobFailed {
        session_id: SessionId,
        job_id: JobId,
        /// Human-readable error description.
        error: String,
    },

    /// Polling gave up after repeated transient errors; the job may still
    /// be running remotely.
    PollAbandoned {
        session_id: SessionId,
        job_id: JobId,
        attempts: u32,
    },

    /// The job was discarded by the user.
    JobReset { session_id: SessionId },
}
