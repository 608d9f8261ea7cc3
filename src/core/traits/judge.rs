use crate::core::domain::{EnvironmentCatalog, EnvironmentId, Submission, SubmissionToken};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JudgeError {
    #[error("judge responded with HTTP {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("failed to reach judge: {0}")]
    Transport(String),
    #[error("failed to decode judge response: {0}")]
    Decode(String),
}

/// Client side of the remote judge contract. Implementations perform a single
/// request per call and never retry on their own.
#[mockall::automock]
#[async_trait::async_trait]
pub trait JudgeBackend: std::fmt::Debug + Send + Sync {
    async fn environments(&self) -> Result<EnvironmentCatalog, JudgeError>;

    async fn create(
        &self,
        environment_id: EnvironmentId,
        source_code: &str,
        stdin: &str,
    ) -> Result<SubmissionToken, JudgeError>;

    async fn fetch(&self, token: &SubmissionToken) -> Result<Submission, JudgeError>;
}
