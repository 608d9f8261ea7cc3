use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::core::{
    domain::{EnvironmentCatalog, EnvironmentId, Submission, SubmissionToken},
    traits::judge::{JudgeBackend, JudgeError},
};

/// Judge that replays a scripted sequence of submission snapshots. Once the
/// script runs out, the last snapshot is returned forever.
#[derive(Debug)]
pub struct JudgeStub {
    catalog: EnvironmentCatalog,
    create_result: Result<SubmissionToken, JudgeError>,
    snapshots: Mutex<VecDeque<Result<Submission, JudgeError>>>,
    last: Mutex<Option<Submission>>,
    delay: Duration,
    environment_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    created: Mutex<Vec<(EnvironmentId, String, String)>>,
}

impl JudgeStub {
    pub fn new(catalog: EnvironmentCatalog) -> Self {
        Self {
            catalog,
            create_result: Ok(SubmissionToken("token-1".to_string())),
            snapshots: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            delay: Duration::ZERO,
            environment_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_create_result(mut self, result: Result<SubmissionToken, JudgeError>) -> Self {
        self.create_result = result;
        self
    }

    pub fn with_snapshots(self, snapshots: Vec<Result<Submission, JudgeError>>) -> Self {
        self.snapshots.lock().unwrap().extend(snapshots);
        self
    }

    pub fn environment_calls(&self) -> usize {
        self.environment_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<(EnvironmentId, String, String)> {
        self.created.lock().unwrap().clone()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait::async_trait]
impl JudgeBackend for JudgeStub {
    async fn environments(&self) -> Result<EnvironmentCatalog, JudgeError> {
        self.environment_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(self.catalog.clone())
    }

    async fn create(
        &self,
        environment_id: EnvironmentId,
        source_code: &str,
        stdin: &str,
    ) -> Result<SubmissionToken, JudgeError> {
        tracing::debug!("Stub create: environment_id={}", environment_id);
        self.pause().await;
        self.created.lock().unwrap().push((
            environment_id,
            source_code.to_string(),
            stdin.to_string(),
        ));
        self.create_result.clone()
    }

    async fn fetch(&self, token: &SubmissionToken) -> Result<Submission, JudgeError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let next = self.snapshots.lock().unwrap().pop_front();
        match next {
            Some(Ok(submission)) => {
                *self.last.lock().unwrap() = Some(submission.clone());
                Ok(submission)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Submission::pending(token.clone()))),
        }
    }
}

pub fn snapshot(status_code: i32, stdout: &str) -> Submission {
    Submission {
        status_code: Some(status_code),
        stdout: Some(stdout.to_string()),
        ..Submission::pending(SubmissionToken("token-1".to_string()))
    }
}
