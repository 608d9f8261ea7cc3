use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    constants::{DEFAULT_DEADLINE_MS, DEFAULT_POLL_INTERVAL_MS},
    core::{
        catalog::CatalogCache,
        domain::{ExecutionRequest, RunResult, Submission, SubmissionToken},
        resolver::EnvironmentRules,
        traits::judge::{JudgeBackend, JudgeError},
    },
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error("{0}")]
    Validation(String),
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error(transparent)]
    Remote(#[from] JudgeError),
}

impl RunError {
    pub fn is_user_error(&self) -> bool {
        matches!(self, RunError::Validation(_) | RunError::UnsupportedLanguage(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub deadline: Duration,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(DEFAULT_DEADLINE_MS),
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Submits a program to the judge once, then polls it until it reaches a
/// terminal status or the deadline passes. Running out of time is not an
/// error: the last snapshot observed is normalized and returned.
#[derive(Debug)]
pub struct PollOrchestrator {
    backend: Arc<dyn JudgeBackend>,
    catalog: CatalogCache,
    rules: EnvironmentRules,
    policy: PollPolicy,
}

impl PollOrchestrator {
    pub fn new(backend: Arc<dyn JudgeBackend>, rules: EnvironmentRules, policy: PollPolicy) -> Self {
        Self {
            catalog: CatalogCache::new(backend.clone()),
            backend,
            rules,
            policy,
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub async fn run(&self, request: &ExecutionRequest) -> Result<RunResult, RunError> {
        self.run_until(request, &CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but stops polling early when `cancel` fires,
    /// returning whatever was observed so far.
    #[tracing::instrument(skip(self, request, cancel), fields(language = %request.language_key))]
    pub async fn run_until(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<RunResult, RunError> {
        if request.language_key.trim().is_empty() || request.source_code.is_empty() {
            return Err(RunError::Validation(
                "Missing `languageKey` or `sourceCode`".to_string(),
            ));
        }

        let catalog = self.catalog.get().await?;
        let Some(environment_id) = self.rules.resolve(&catalog, &request.language_key) else {
            tracing::warn!("No judge environment for language {}", request.language_key);
            return Err(RunError::UnsupportedLanguage(request.language_key.clone()));
        };

        let token = self
            .backend
            .create(environment_id, &request.source_code, &request.stdin)
            .await
            .inspect_err(|e| tracing::error!("Failed to create submission: {}", e))?;
        tracing::info!(
            "Created submission {} in environment {}",
            token,
            environment_id
        );

        let snapshot = self.poll(&token, cancel).await?;
        let result = RunResult::from(snapshot.as_ref());
        tracing::info!("Submission {} settled: status={:?}", token, result.status_code);

        Ok(result)
    }

    async fn poll(
        &self,
        token: &SubmissionToken,
        cancel: &CancellationToken,
    ) -> Result<Option<Submission>, JudgeError> {
        let started = Instant::now();
        let mut last = None;

        while started.elapsed() < self.policy.deadline {
            let submission = self.backend.fetch(token).await?;
            let status = submission.status();
            tracing::debug!(
                "Polled submission {}: {:?} after {:?}",
                token,
                status,
                started.elapsed()
            );
            last = Some(submission);

            if status.is_terminal() {
                return Ok(last);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.policy.interval) => {}
                _ = cancel.cancelled() => {
                    tracing::info!("Polling of submission {} cancelled", token);
                    return Ok(last);
                }
            }
        }

        tracing::warn!(
            "Submission {} not finished within {:?}, returning last snapshot",
            token,
            self.policy.deadline
        );
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::EnvironmentCatalog;
    use crate::core::traits::judge::MockJudgeBackend;
    use crate::stubs::judge::{JudgeStub, snapshot};

    const INTERVAL: Duration = Duration::from_millis(350);
    const DEADLINE: Duration = Duration::from_millis(8000);

    fn catalog() -> EnvironmentCatalog {
        EnvironmentCatalog::from_iter([(54, "C++ (GCC 9.2.0)"), (71, "Python (3.8.1)")])
    }

    fn policy() -> PollPolicy {
        PollPolicy {
            deadline: DEADLINE,
            interval: INTERVAL,
        }
    }

    fn orchestrator(backend: Arc<dyn JudgeBackend>) -> PollOrchestrator {
        PollOrchestrator::new(backend, EnvironmentRules::default(), policy())
    }

    fn python_request() -> ExecutionRequest {
        ExecutionRequest::new("python", "print(input())", "Ada\n")
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_after_k_polls() {
        let k = 4;
        let mut snapshots: Vec<_> = (0..k).map(|i| Ok(snapshot(if i == 0 { 1 } else { 2 }, ""))).collect();
        let done = Submission {
            compile_output: Some("note: ok\n".to_string()),
            stderr: Some("warn\n".to_string()),
            time_ms: Some(21),
            memory_kb: Some(3320),
            ..snapshot(3, "Ada\n")
        };
        snapshots.push(Ok(done));
        let stub = Arc::new(JudgeStub::new(catalog()).with_snapshots(snapshots));
        let orchestrator = orchestrator(stub.clone());

        let started = Instant::now();
        let result = orchestrator.run(&python_request()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(
            result,
            RunResult {
                stdout_text: "Ada\n".to_string(),
                stderr_text: "note: ok\nwarn\n".to_string(),
                time_ms: Some(21),
                memory_kb: Some(3320),
                status_code: Some(3),
            }
        );
        assert!(elapsed >= INTERVAL * k as u32);
        assert!(elapsed < DEADLINE);
        assert_eq!(stub.fetch_calls(), k + 1);
        assert_eq!(
            stub.created(),
            vec![(71, "print(input())".to_string(), "Ada\n".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_is_terminal() {
        let compile_error = Submission {
            compile_output: Some("main.cpp:1: error\n".to_string()),
            ..snapshot(6, "")
        };
        let stub = Arc::new(
            JudgeStub::new(catalog()).with_snapshots(vec![Ok(snapshot(2, "")), Ok(compile_error)]),
        );

        let result = orchestrator(stub.clone())
            .run(&ExecutionRequest::new("cpp", "int main( {", ""))
            .await
            .unwrap();

        assert_eq!(result.status_code, Some(6));
        assert_eq!(result.stderr_text, "main.cpp:1: error\n");
        assert_eq!(result.stdout_text, "");
        assert_eq!(stub.fetch_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_last_snapshot() {
        let stub = Arc::new(
            JudgeStub::new(catalog())
                .with_snapshots(vec![Ok(snapshot(1, "")), Ok(snapshot(2, "partial"))]),
        );

        let started = Instant::now();
        let result = orchestrator(stub.clone()).run(&python_request()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result.status_code, Some(2));
        assert_eq!(result.stdout_text, "partial");
        assert!(elapsed >= DEADLINE);
        assert!(elapsed < DEADLINE + INTERVAL);
        assert!(stub.fetch_calls() >= 20);
    }

    #[tokio::test]
    async fn test_create_failure_raises_before_polling() {
        let mut backend = MockJudgeBackend::new();
        backend
            .expect_environments()
            .times(1)
            .returning(|| Ok(catalog()));
        backend.expect_create().times(1).returning(|_, _, _| {
            Err(JudgeError::Remote {
                status: 500,
                message: "Internal Server Error".to_string(),
            })
        });
        backend.expect_fetch().never();

        let err = orchestrator(Arc::new(backend))
            .run(&python_request())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RunError::Remote(JudgeError::Remote {
                status: 500,
                message: "Internal Server Error".to_string(),
            })
        );
        assert!(!err.is_user_error());
    }

    #[tokio::test]
    async fn test_unsupported_language_makes_no_submission() {
        let mut backend = MockJudgeBackend::new();
        backend
            .expect_environments()
            .times(1)
            .returning(|| Ok(catalog()));
        backend.expect_create().never();
        backend.expect_fetch().never();

        let err = orchestrator(Arc::new(backend))
            .run(&ExecutionRequest::new("vb", "Module M\nEnd Module", ""))
            .await
            .unwrap_err();

        assert_eq!(err, RunError::UnsupportedLanguage("vb".to_string()));
        assert!(err.is_user_error());
    }

    #[tokio::test]
    async fn test_missing_fields_are_rejected_without_network() {
        let mut backend = MockJudgeBackend::new();
        backend.expect_environments().never();
        backend.expect_create().never();
        let orchestrator = orchestrator(Arc::new(backend));

        let err = orchestrator
            .run(&ExecutionRequest::new("python", "", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Validation(_)));

        let err = orchestrator
            .run(&ExecutionRequest::new("  ", "print(1)", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_propagates() {
        let stub = Arc::new(JudgeStub::new(catalog()).with_snapshots(vec![
            Ok(snapshot(1, "")),
            Err(JudgeError::Remote {
                status: 502,
                message: "Bad Gateway".to_string(),
            }),
        ]));

        let err = orchestrator(stub).run(&python_request()).await.unwrap_err();
        assert!(matches!(err, RunError::Remote(JudgeError::Remote { status: 502, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_last_snapshot() {
        let stub = Arc::new(
            JudgeStub::new(catalog()).with_snapshots(vec![Ok(snapshot(2, "so far"))]),
        );
        let orchestrator = orchestrator(stub.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = orchestrator
            .run_until(&python_request(), &cancel)
            .await
            .unwrap();

        assert_eq!(result.stdout_text, "so far");
        assert_eq!(result.status_code, Some(2));
        assert!(started.elapsed() < DEADLINE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_is_fetched_once_across_runs() {
        let stub = Arc::new(JudgeStub::new(catalog()).with_snapshots(vec![Ok(snapshot(3, "1\n"))]));
        let orchestrator = orchestrator(stub.clone());

        for _ in 0..3 {
            orchestrator.run(&python_request()).await.unwrap();
        }

        assert_eq!(stub.environment_calls(), 1);
        assert_eq!(stub.created().len(), 3);
    }
}
