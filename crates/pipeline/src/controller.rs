//! One session's generation job and the poll that follows it.
//!
//! [`SessionController`] owns a [`ThemeStore`], a [`JobPoller`] and at most
//! one [`GenerationJob`]. It never exposes poll counters: callers read a
//! [`SessionView`] or subscribe to [`SessionEvent`]s. Dropping the
//! controller stops its poll.

use std::sync::Arc;

use atelier_client::{
    require_credential, Credential, CredentialProvider, SessionBackend, ThemeTransformBackend,
};
use atelier_core::error::CoreError;
use atelier_core::job::{
    validate_payload, GenerationJob, JobPayload, JobStatus, JobStatusReport, SessionStatus,
};
use atelier_core::types::{JobId, SessionId};
use tokio::sync::broadcast;

use crate::events::{SessionEvent, EVENT_CHANNEL_CAPACITY};
use crate::poller::{JobPoller, PollConfig, PollFailure, PollHandle, PollState, PollVerdict};
use crate::retry::with_retries;
use crate::theme_store::ThemeStore;

/// What a view needs to render a session's generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub status: SessionStatus,
    pub result_url: Option<String>,
    pub error: Option<CoreError>,
}

impl SessionView {
    fn idle() -> Self {
        Self {
            status: SessionStatus::Idle,
            result_url: None,
            error: None,
        }
    }
}

/// Terminal classification of backend job statuses.
fn classify_report(report: &JobStatusReport) -> PollVerdict {
    match report.status {
        JobStatus::Pending => PollVerdict::Continue,
        JobStatus::Completed => PollVerdict::Done,
        JobStatus::Failed => PollVerdict::Failed,
    }
}

pub struct SessionController {
    session_id: SessionId,
    sessions: Arc<dyn SessionBackend>,
    credentials: Arc<dyn CredentialProvider>,
    themes: Arc<ThemeStore>,
    poller: JobPoller<JobStatusReport>,
    poll_config: PollConfig,
    job: Option<GenerationJob>,
    handle: Option<PollHandle<JobStatusReport>>,
    /// Last submission-side failure (validation, create or retry errors).
    failure: Option<CoreError>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(
        session_id: impl Into<SessionId>,
        sessions: Arc<dyn SessionBackend>,
        transform: Arc<dyn ThemeTransformBackend>,
        credentials: Arc<dyn CredentialProvider>,
        poll_config: PollConfig,
    ) -> Self {
        let session_id = session_id.into();
        let themes = Arc::new(
            ThemeStore::new(
                session_id.clone(),
                Arc::clone(&sessions),
                transform,
                Arc::clone(&credentials),
            )
            .with_retry(poll_config),
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session_id,
            sessions,
            credentials,
            themes,
            poller: JobPoller::new(),
            poll_config,
            job: None,
            handle: None,
            failure: None,
            events,
        }
    }

    /// Build a controller from the backend's snapshot of `session_id`.
    ///
    /// Stored themes are validated into the [`ThemeStore`]; invalid text is
    /// kept for editing and flagged there rather than failing the import.
    /// A pending job resumes polling, a finished one is shown as is.
    pub async fn import(
        session_id: impl Into<SessionId>,
        sessions: Arc<dyn SessionBackend>,
        transform: Arc<dyn ThemeTransformBackend>,
        credentials: Arc<dyn CredentialProvider>,
        poll_config: PollConfig,
    ) -> Result<Self, CoreError> {
        let mut controller = Self::new(session_id, sessions, transform, credentials, poll_config);
        let credential = require_credential(controller.credentials.as_ref())?;
        let snapshot = controller
            .sessions
            .get_session_snapshot(&credential, &controller.session_id)
            .await?;

        // Problems are recorded in the store's last_error.
        let _ = controller
            .themes
            .hydrate(
                snapshot.parent_theme.as_deref(),
                snapshot.derived_theme.as_deref(),
            )
            .await;

        if let Some(stored) = snapshot.job {
            let mut job = GenerationJob::new(stored.id, controller.session_id.clone());
            job.apply_report(&stored.report);
            let pending = job.status == JobStatus::Pending;
            let job_id = job.id.clone();
            controller.job = Some(job);
            if pending {
                tracing::info!(session_id = %controller.session_id, job_id = %job_id, "Resuming poll for imported job");
                controller.start_polling(job_id, credential).await;
            }
        }
        Ok(controller)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn themes(&self) -> &Arc<ThemeStore> {
        &self.themes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // ---- submission ----

    /// Submit a generation job and start following it.
    ///
    /// An invalid payload or missing credential is rejected before anything
    /// changes. Otherwise the current job (if any) is discarded, the new one
    /// is created and polled until it finishes. Transient errors from job
    /// creation are retried with the poll interval and threshold.
    pub async fn submit(&mut self, payload: JobPayload) -> Result<JobId, CoreError> {
        let result = self.submit_inner(payload).await;
        if let Err(e) = &result {
            tracing::warn!(session_id = %self.session_id, error = %e, "Job submission failed");
            self.failure = Some(e.clone());
        }
        result
    }

    /// Submit `prompt` with the session's effective theme.
    pub async fn submit_prompt(&mut self, prompt: impl Into<String>) -> Result<JobId, CoreError> {
        let theme = self.themes.effective_theme().await;
        let payload = JobPayload::new(self.session_id.clone(), prompt).with_theme(theme);
        self.submit(payload).await
    }

    async fn submit_inner(&mut self, payload: JobPayload) -> Result<JobId, CoreError> {
        validate_payload(&payload)?;
        if payload.session_id != self.session_id {
            return Err(CoreError::Validation(format!(
                "payload targets session '{}' but this controller owns '{}'",
                payload.session_id, self.session_id
            )));
        }
        let credential = require_credential(self.credentials.as_ref())?;

        self.discard_job().await;
        self.failure = None;

        let job_id = with_retries("create_job", self.poll_config, || {
            self.sessions
                .create_job(&credential, &self.session_id, &payload)
        })
        .await?;
        tracing::info!(session_id = %self.session_id, job_id = %job_id, "Job submitted");

        self.job = Some(GenerationJob::new(job_id.clone(), self.session_id.clone()));
        let _ = self.events.send(SessionEvent::JobSubmitted {
            session_id: self.session_id.clone(),
            job_id: job_id.clone(),
        });
        self.start_polling(job_id.clone(), credential).await;
        Ok(job_id)
    }

    /// Resume polling after it was abandoned, without resubmitting.
    pub async fn retry_polling(&mut self) -> Result<(), CoreError> {
        let result = self.retry_inner().await;
        if let Err(e) = &result {
            self.failure = Some(e.clone());
        }
        result
    }

    async fn retry_inner(&mut self) -> Result<(), CoreError> {
        let abandoned = matches!(
            self.handle.as_ref().map(PollHandle::state),
            Some(PollState::Failed(PollFailure::Abandoned { .. }))
        );
        let job_id = match (&self.job, abandoned) {
            (Some(job), true) => job.id.clone(),
            _ => {
                return Err(CoreError::Conflict(
                    "Only an abandoned poll can be retried".to_string(),
                ))
            }
        };
        let credential = require_credential(self.credentials.as_ref())?;

        self.failure = None;
        tracing::info!(session_id = %self.session_id, job_id = %job_id, "Retrying abandoned poll");
        self.start_polling(job_id, credential).await;
        Ok(())
    }

    /// Stop polling, discard the job and return to idle. Idempotent.
    pub async fn reset(&mut self) {
        let had_job = self.discard_job().await;
        self.failure = None;
        if had_job {
            tracing::info!(session_id = %self.session_id, "Job reset");
            let _ = self.events.send(SessionEvent::JobReset {
                session_id: self.session_id.clone(),
            });
        }
    }

    async fn discard_job(&mut self) -> bool {
        self.poller.stop().await;
        self.handle = None;
        self.job.take().is_some()
    }

    async fn start_polling(&mut self, job_id: JobId, credential: Credential) {
        let sessions = Arc::clone(&self.sessions);
        let fetch_job_id = job_id.clone();
        let fetch_status = move || {
            let sessions = Arc::clone(&sessions);
            let credential = credential.clone();
            let job_id = fetch_job_id.clone();
            async move { sessions.get_job_status(&credential, &job_id).await }
        };

        let handle = self
            .poller
            .start(fetch_status, classify_report, self.poll_config)
            .await;
        self.spawn_event_forwarder(handle.clone(), job_id);
        self.handle = Some(handle);
    }

    /// Publish the outcome of a poll once it reaches a terminal state.
    fn spawn_event_forwarder(&self, handle: PollHandle<JobStatusReport>, job_id: JobId) {
        let events = self.events.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            let event = match handle.finished().await {
                PollState::Done(report) => SessionEvent::JobCompleted {
                    session_id,
                    job_id,
                    result_url: report.result_url,
                },
                PollState::Failed(PollFailure::Terminal(report)) => SessionEvent::JobFailed {
                    session_id,
                    job_id,
                    error: report
                        .error_message
                        .unwrap_or_else(|| "Generation failed".to_string()),
                },
                PollState::Failed(PollFailure::Abandoned { attempts, .. }) => {
                    SessionEvent::PollAbandoned {
                        session_id,
                        job_id,
                        attempts,
                    }
                }
                PollState::Polling { .. } | PollState::Stopped => return,
            };
            let _ = events.send(event);
        });
    }

    // ---- observation ----

    /// The current job with the latest polled status folded in.
    pub fn job(&self) -> Option<GenerationJob> {
        let mut job = self.job.clone()?;
        if let Some(handle) = &self.handle {
            match handle.state() {
                PollState::Polling {
                    last,
                    consecutive_errors,
                } => {
                    if let Some(report) = last {
                        job.apply_report(&report);
                    }
                    job.consecutive_error_count = consecutive_errors;
                }
                PollState::Done(report) | PollState::Failed(PollFailure::Terminal(report)) => {
                    job.apply_report(&report)
                }
                PollState::Failed(PollFailure::Abandoned { attempts, .. }) => {
                    job.consecutive_error_count = attempts
                }
                PollState::Stopped => {}
            }
        }
        Some(job)
    }

    /// Whether a poll is currently running for this session.
    pub fn is_polling(&self) -> bool {
        self.handle.as_ref().is_some_and(PollHandle::is_active)
    }

    pub fn view(&self) -> SessionView {
        let Some(job) = self.job() else {
            return match &self.failure {
                Some(e) => SessionView {
                    status: SessionStatus::Failed,
                    result_url: None,
                    error: Some(e.clone()),
                },
                None => SessionView::idle(),
            };
        };

        let mut view = match job.status {
            JobStatus::Completed => SessionView {
                status: SessionStatus::Complete,
                result_url: job.result_url,
                error: None,
            },
            JobStatus::Failed => SessionView {
                status: SessionStatus::Failed,
                result_url: None,
                error: Some(CoreError::TerminalJobFailure(
                    job.error_message
                        .unwrap_or_else(|| "Generation failed".to_string()),
                )),
            },
            JobStatus::Pending => match self.handle.as_ref().map(PollHandle::state) {
                Some(PollState::Failed(PollFailure::Abandoned {
                    attempts,
                    last_error,
                })) => SessionView {
                    status: SessionStatus::Failed,
                    result_url: None,
                    error: Some(CoreError::PollAbandoned {
                        attempts,
                        last_error,
                    }),
                },
                _ => SessionView {
                    status: SessionStatus::Pending,
                    result_url: None,
                    error: None,
                },
            },
        };
        if self.failure.is_some() {
            view.error = self.failure.clone();
        }
        view
    }
}
