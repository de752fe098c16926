use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::models::thumbnail::{CreateJobResponse, CreateThumbnailRequest, JobStatusResponse};

/// The two server calls the poller needs.
#[async_trait]
pub trait ThumbnailApi: Send + Sync {
    async fn create_job(
        &self,
        request: &CreateThumbnailRequest,
    ) -> Result<CreateJobResponse, ApiError>;

    async fn job_status(&self, job_id: Uuid) -> Result<JobStatusResponse, ApiError>;
}

/// HTTP implementation of [`ThumbnailApi`].
pub struct HttpThumbnailApi {
    http: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: Option<String>,
}

impl HttpThumbnailApi {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ApiError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(ApiError::Http);
        }

        let text = response.text().await.unwrap_or_default();
        let (message, code) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error, body.code),
            Err(_) if text.is_empty() => (format!("Request failed with HTTP {}", status), None),
            Err(_) => (text, None),
        };

        Err(ApiError::Status {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

#[async_trait]
impl ThumbnailApi for HttpThumbnailApi {
    async fn create_job(
        &self,
        request: &CreateThumbnailRequest,
    ) -> Result<CreateJobResponse, ApiError> {
        let response = self
            .authorize(self.http.post(format!("{}/api/thumbnail", self.base_url)))
            .json(request)
            .send()
            .await
            .map_err(ApiError::Http)?;

        Self::read(response).await
    }

    async fn job_status(&self, job_id: Uuid) -> Result<JobStatusResponse, ApiError> {
        let response = self
            .authorize(
                self.http
                    .get(format!("{}/api/thumbnail/{}/status", self.base_url, job_id)),
            )
            .send()
            .await
            .map_err(ApiError::Http)?;

        Self::read(response).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message} (HTTP {status})")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
}

impl ApiError {
    /// Worth retrying on the next poll: network trouble, overload, or a
    /// server-side error.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(_) => true,
            ApiError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(status)
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Status { status: 401, .. })
    }
}
