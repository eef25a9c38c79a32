//! REST implementations of the backend traits.
//!
//! Wraps the session/job API and the theme transform service using
//! [`reqwest`]. Every request carries the caller's bearer credential and a
//! fresh `x-request-id` for log correlation.

use async_trait::async_trait;
use atelier_core::error::CoreError;
use atelier_core::job::{JobPayload, JobStatusReport};
use atelier_core::theme::ThemeSlot;
use atelier_core::types::JobId;
use serde::Deserialize;

use crate::backend::{Credential, SessionBackend, SessionSnapshot, ThemeTransformBackend};
use crate::config::ClientConfig;
use crate::error::ClientError;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Response of `POST /sessions/{id}/jobs`.
#[derive(Debug, Deserialize)]
struct CreateJobResponse {
    job_id: JobId,
}

/// Response of the theme transform endpoints. The service may return the
/// theme either as a JSON object or as already-serialized text.
#[derive(Debug, Deserialize)]
struct ThemeResponse {
    theme: serde_json::Value,
}

impl ThemeResponse {
    fn into_text(self) -> String {
        match self.theme {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        }
    }
}

/// Shared request plumbing for both services.
#[derive(Clone)]
struct RestClient {
    client: reqwest::Client,
    base_url: String,
}

impl RestClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
        credential: &Credential,
    ) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(credential.bearer())
            .header(REQUEST_ID_HEADER, uuid::Uuid::new_v4().to_string())
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ClientError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

fn build_client(config: &ClientConfig) -> Result<reqwest::Client, ClientError> {
    Ok(reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?)
}

// ---------------------------------------------------------------------------
// Session backend
// ---------------------------------------------------------------------------

/// HTTP client for the session/job API.
pub struct HttpSessionBackend {
    rest: RestClient,
}

impl HttpSessionBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::with_client(build_client(config)?, config.api_url.clone()))
    }

    /// Create a backend reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            rest: RestClient {
                client,
                base_url: api_url,
            },
        }
    }

    async fn create_job_inner(
        &self,
        credential: &Credential,
        session_id: &str,
        payload: &JobPayload,
    ) -> Result<JobId, ClientError> {
        let request = self
            .rest
            .client
            .post(self.rest.url(&format!("/sessions/{session_id}/jobs")))
            .json(payload);
        let response = self.rest.authorized(request, credential).send().await?;
        let body: CreateJobResponse = RestClient::parse_response(response).await?;
        Ok(body.job_id)
    }

    async fn get_job_status_inner(
        &self,
        credential: &Credential,
        job_id: &str,
    ) -> Result<JobStatusReport, ClientError> {
        let request = self.rest.client.get(self.rest.url(&format!("/jobs/{job_id}")));
        let response = self.rest.authorized(request, credential).send().await?;
        RestClient::parse_response(response).await
    }

    async fn get_session_snapshot_inner(
        &self,
        credential: &Credential,
        session_id: &str,
    ) -> Result<SessionSnapshot, ClientError> {
        let request = self
            .rest
            .client
            .get(self.rest.url(&format!("/sessions/{session_id}")));
        let response = self.rest.authorized(request, credential).send().await?;
        RestClient::parse_response(response).await
    }

    async fn save_theme_inner(
        &self,
        credential: &Credential,
        session_id: &str,
        slot: ThemeSlot,
        theme_json: Option<&str>,
    ) -> Result<(), ClientError> {
        let body = serde_json::json!({ "theme": theme_json });
        let request = self
            .rest
            .client
            .put(self.rest.url(&format!(
                "/sessions/{session_id}/themes/{}",
                slot.as_str()
            )))
            .json(&body);
        let response = self.rest.authorized(request, credential).send().await?;
        RestClient::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn create_job(
        &self,
        credential: &Credential,
        session_id: &str,
        payload: &JobPayload,
    ) -> Result<JobId, CoreError> {
        let job_id = self
            .create_job_inner(credential, session_id, payload)
            .await
            .map_err(|e| {
                tracing::warn!(session_id, error = %e, "Job creation failed");
                CoreError::from(e)
            })?;
        tracing::info!(session_id, job_id = %job_id, "Job created");
        Ok(job_id)
    }

    async fn get_job_status(
        &self,
        credential: &Credential,
        job_id: &str,
    ) -> Result<JobStatusReport, CoreError> {
        self.get_job_status_inner(credential, job_id)
            .await
            .map_err(|e| {
                tracing::debug!(job_id, error = %e, "Job status fetch failed");
                CoreError::from(e)
            })
    }

    async fn get_session_snapshot(
        &self,
        credential: &Credential,
        session_id: &str,
    ) -> Result<SessionSnapshot, CoreError> {
        Ok(self
            .get_session_snapshot_inner(credential, session_id)
            .await?)
    }

    async fn save_theme(
        &self,
        credential: &Credential,
        session_id: &str,
        slot: ThemeSlot,
        theme_json: Option<&str>,
    ) -> Result<(), CoreError> {
        self.save_theme_inner(credential, session_id, slot, theme_json)
            .await
            .map_err(|e| {
                tracing::warn!(session_id, slot = slot.as_str(), error = %e, "Saving theme failed");
                CoreError::from(e)
            })
    }
}

// ---------------------------------------------------------------------------
// Theme transform backend
// ---------------------------------------------------------------------------

/// HTTP client for the theme transform service.
pub struct HttpThemeBackend {
    rest: RestClient,
}

impl HttpThemeBackend {
    pub fn new(config: &ClientConfig, transform_url: String) -> Result<Self, ClientError> {
        Ok(Self {
            rest: RestClient {
                client: build_client(config)?,
                base_url: transform_url,
            },
        })
    }

    async fn derive(
        &self,
        credential: &Credential,
        path: &str,
        body: serde_json::Value,
    ) -> Result<String, ClientError> {
        let request = self.rest.client.post(self.rest.url(path)).json(&body);
        let response = self.rest.authorized(request, credential).send().await?;
        let body: ThemeResponse = RestClient::parse_response(response).await?;
        Ok(body.into_text())
    }
}

#[async_trait]
impl ThemeTransformBackend for HttpThemeBackend {
    async fn derive_parent_theme(
        &self,
        credential: &Credential,
        raw_text: &str,
    ) -> Result<String, CoreError> {
        let body = serde_json::json!({ "text": raw_text });
        Ok(self.derive(credential, "/themes/parent", body).await?)
    }

    async fn derive_child_theme(
        &self,
        credential: &Credential,
        raw_text: &str,
        parent_json: &str,
    ) -> Result<String, CoreError> {
        let body = serde_json::json!({ "text": raw_text, "parent": parent_json });
        Ok(self.derive(credential, "/themes/child", body).await?)
    }
}
