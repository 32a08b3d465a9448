//! HTTP client for the jobs API; the submit handler behind [`crate::form::JobForm`].

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::applications::JobRecord;
use crate::form::{FormError, JobSubmission};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("server responded {status}: {message}")]
    Api {
        status: u16,
        message: String,
        kind: Option<String>,
    },
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    kind: Option<String>,
}

#[derive(Clone)]
pub struct JobsClient {
    client: Client,
    base_url: Url,
}

impl JobsClient {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobRecord>, ClientError> {
        let request = self.request(Method::GET, "api/jobs")?;
        decode(request.send().await?).await
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<JobRecord, ClientError> {
        let request = self.request(Method::GET, &format!("api/jobs/{job_id}"))?;
        decode(request.send().await?).await
    }

    pub async fn create_job(&self, submission: JobSubmission) -> Result<JobRecord, ClientError> {
        let request = self
            .request(Method::POST, "api/jobs")?
            .multipart(submission.into_multipart()?);
        decode(request.send().await?).await
    }

    pub async fn update_job(
        &self,
        job_id: Uuid,
        submission: JobSubmission,
    ) -> Result<JobRecord, ClientError> {
        let request = self
            .request(Method::PATCH, &format!("api/jobs/{job_id}"))?
            .multipart(submission.into_multipart()?);
        decode(request.send().await?).await
    }

    pub async fn delete_job(&self, job_id: Uuid) -> Result<(), ClientError> {
        let request = self.request(Method::DELETE, &format!("api/jobs/{job_id}"))?;
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let url = endpoint(&self.base_url, path)?;
        Ok(self.client.request(method, url))
    }
}

fn endpoint(base_url: &Url, path: &str) -> Result<Url, url::ParseError> {
    // Keep any path prefix on the base URL.
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(response.json().await?)
}

async fn api_error(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => ClientError::Api {
            status,
            message: body.error,
            kind: body.kind,
        },
        Err(_) => ClientError::Api {
            status,
            message: text,
            kind: None,
        },
    }
}
