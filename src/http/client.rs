use std::time::Duration;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use crate::{
    constants::{DEFAULT_REQUEST_TIMEOUT_MS, SUBMISSION_FIELDS},
    core::{
        domain::{EnvironmentCatalog, EnvironmentId, Submission, SubmissionToken},
        traits::judge::{JudgeBackend, JudgeError},
    },
    http::models::{CreateSubmissionDto, EnvironmentDto, SubmissionDto, TokenDto},
};

/// [`JudgeBackend`] speaking the judge's JSON-over-HTTP contract.
#[derive(Debug, Clone)]
pub struct HttpJudgeClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpJudgeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, JudgeError> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| JudgeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                body
            };
            return Err(JudgeError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| JudgeError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl JudgeBackend for HttpJudgeClient {
    #[tracing::instrument(skip(self))]
    async fn environments(&self) -> Result<EnvironmentCatalog, JudgeError> {
        let url = format!("{}/environments", self.base_url);
        let environments: Vec<EnvironmentDto> = self.send(self.client.get(&url)).await?;
        tracing::debug!("Judge advertises {} environments", environments.len());

        Ok(environments.into())
    }

    #[tracing::instrument(skip(self, source_code, stdin))]
    async fn create(
        &self,
        environment_id: EnvironmentId,
        source_code: &str,
        stdin: &str,
    ) -> Result<SubmissionToken, JudgeError> {
        let url = format!("{}/submissions?wait=false", self.base_url);
        let body = CreateSubmissionDto {
            environment_id,
            source_code: source_code.to_string(),
            stdin: stdin.to_string(),
        };
        let created: TokenDto = self.send(self.client.post(&url).json(&body)).await?;

        Ok(SubmissionToken(created.token))
    }

    #[tracing::instrument(skip(self))]
    async fn fetch(&self, token: &SubmissionToken) -> Result<Submission, JudgeError> {
        let url = format!(
            "{}/submissions/{}?fields={}",
            self.base_url,
            urlencoding::encode(&token.0),
            SUBMISSION_FIELDS
        );
        let snapshot: SubmissionDto = self.send(self.client.get(&url)).await?;

        Ok((token.clone(), snapshot).into())
    }
}
