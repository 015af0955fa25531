use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{Company, CompanyId, JobRecord, UserId},
    error::{ApiException, ErrorBody, ErrorCode},
    protocol::{
        ApiEnvelope, AuthProviderConfig, CreateCompanyRequest, EnhancementResult,
        ExtractedJobDescription, HealthResponse, SubmitJobRequest, UpdateCompanyRequest,
    },
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::pipeline::DocumentFile;

pub const EXTRACT_FAILED: &str = "Failed to extract job description";
pub const ENHANCE_FAILED: &str = "Failed to enhance job description";

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error(transparent)]
    Api(#[from] ApiException),
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("unexpected backend response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) => err.message.clone(),
            other => other.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Api(err) => err.code,
            Self::Transport(_) | Self::Decode(_) => ErrorCode::Internal,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[async_trait]
pub trait CompanyService: Send + Sync {
    async fn get_company_by_user(&self, user_id: &UserId) -> Result<Option<Company>, BackendError>;
    async fn create_company(&self, request: &CreateCompanyRequest) -> Result<Company, BackendError>;
    async fn update_company(&self, request: &UpdateCompanyRequest) -> Result<Company, BackendError>;
}

#[async_trait]
pub trait JobService: Send + Sync {
    async fn list_jobs(&self, company_id: CompanyId) -> Result<Vec<JobRecord>, BackendError>;
    async fn submit_job(&self, request: &SubmitJobRequest) -> Result<Value, BackendError>;
}

#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn extract_document(
        &self,
        file: &DocumentFile,
    ) -> Result<ExtractedJobDescription, BackendError>;
    async fn enhance_document(
        &self,
        extracted: &ExtractedJobDescription,
    ) -> Result<EnhancementResult, BackendError>;
}

#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: Url,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    fn url(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| BackendError::Decode(format!("invalid route {path}: {err}")))
    }

    pub async fn health(&self) -> Result<HealthResponse, BackendError> {
        let response = self.http.get(self.url("api/health")?).send().await?;
        read_plain(response, "Backend health check failed").await
    }

    pub async fn fetch_auth_config(&self) -> Result<AuthProviderConfig, BackendError> {
        let response = self.http.get(self.url("api/config/firebase")?).send().await?;
        read_plain(response, "Failed to load auth configuration").await
    }
}

#[async_trait]
impl CompanyService for BackendClient {
    async fn get_company_by_user(&self, user_id: &UserId) -> Result<Option<Company>, BackendError> {
        let mut url = self.url("company/user/")?;
        url.path_segments_mut()
            .map_err(|_| BackendError::Decode("backend url cannot be a base".into()))?
            .pop_if_empty()
            .push(user_id.as_str());

        let response = self.http.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(user_id = %user_id, "backend: company lookup returned 404");
            return Ok(None);
        }
        read_envelope(response, "Failed to retrieve company profile").await
    }

    async fn create_company(&self, request: &CreateCompanyRequest) -> Result<Company, BackendError> {
        let builder = self.http.post(self.url("company/create")?).json(request);
        send_required(builder, "Failed to create company profile").await
    }

    async fn update_company(&self, request: &UpdateCompanyRequest) -> Result<Company, BackendError> {
        let builder = self.http.put(self.url("company/update")?).json(request);
        send_required(builder, "Failed to update company profile").await
    }
}

#[async_trait]
impl JobService for BackendClient {
    async fn list_jobs(&self, company_id: CompanyId) -> Result<Vec<JobRecord>, BackendError> {
        let response = self
            .http
            .get(self.url(&format!("jd/company/{company_id}"))?)
            .send()
            .await?;
        let jobs: Option<Vec<JobRecord>> =
            read_envelope(response, "Error loading job descriptions").await?;
        Ok(jobs.unwrap_or_default())
    }

    async fn submit_job(&self, request: &SubmitJobRequest) -> Result<Value, BackendError> {
        let response = self
            .http
            .post(self.url("jd/submit")?)
            .json(request)
            .send()
            .await?;
        let data: Option<Value> = read_envelope(response, "Failed to add job description").await?;
        Ok(data.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl DocumentService for BackendClient {
    async fn extract_document(
        &self,
        file: &DocumentFile,
    ) -> Result<ExtractedJobDescription, BackendError> {
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let form = multipart::Form::new().part("file", part);
        let builder = self.http.post(self.url("jd/extract")?).multipart(form);
        send_required(builder, EXTRACT_FAILED).await
    }

    async fn enhance_document(
        &self,
        extracted: &ExtractedJobDescription,
    ) -> Result<EnhancementResult, BackendError> {
        let builder = self.http.post(self.url("jd/enhance")?).json(extracted);
        send_required(builder, ENHANCE_FAILED).await
    }
}

async fn send_required<T: DeserializeOwned>(
    builder: RequestBuilder,
    fallback: &str,
) -> Result<T, BackendError> {
    let response = builder.send().await?;
    read_envelope::<T>(response, fallback)
        .await?
        .ok_or_else(|| BackendError::Decode(format!("{fallback}: response carried no data")))
}

async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
    fallback: &str,
) -> Result<Option<T>, BackendError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let body = serde_json::from_slice::<ErrorBody>(&bytes).unwrap_or_default();
        let err = ApiException::from_response(status.as_u16(), &body, fallback);
        warn!(%status, error = %err, "backend: request failed");
        return Err(err.into());
    }

    let envelope: ApiEnvelope<T> = serde_json::from_slice(&bytes)
        .map_err(|err| BackendError::Decode(format!("{fallback}: {err}")))?;
    if !envelope.is_success() {
        let message = envelope.detail.unwrap_or_else(|| fallback.to_string());
        return Err(ApiException::new(ErrorCode::Internal, message).into());
    }
    Ok(envelope.data)
}

async fn read_plain<T: DeserializeOwned>(
    response: reqwest::Response,
    fallback: &str,
) -> Result<T, BackendError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        let body = serde_json::from_slice::<ErrorBody>(&bytes).unwrap_or_default();
        return Err(ApiException::from_response(status.as_u16(), &body, fallback).into());
    }
    serde_json::from_slice(&bytes).map_err(|err| BackendError::Decode(format!("{fallback}: {err}")))
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
