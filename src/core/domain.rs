use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub language_key: String,
    pub source_code: String,
    pub stdin: String,
}

impl ExecutionRequest {
    pub fn new(language_key: &str, source_code: &str, stdin: &str) -> Self {
        Self {
            language_key: language_key.to_string(),
            source_code: source_code.to_string(),
            stdin: stdin.to_string(),
        }
    }
}

pub type EnvironmentId = i64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment {
    pub id: EnvironmentId,
    pub name: String,
}

/// Execution environments advertised by the judge, in the order it listed them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvironmentCatalog {
    environments: Vec<Environment>,
}

impl EnvironmentCatalog {
    pub fn new(environments: Vec<Environment>) -> Self {
        Self { environments }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Environment> {
        self.environments.iter()
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }
}

impl FromIterator<(EnvironmentId, &'static str)> for EnvironmentCatalog {
    fn from_iter<T: IntoIterator<Item = (EnvironmentId, &'static str)>>(iter: T) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(id, name)| Environment {
                    id,
                    name: name.to_string(),
                })
                .collect(),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubmissionToken(pub String);

impl fmt::Display for SubmissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl SubmissionStatus {
    /// Maps the judge's numeric status: 1 queued, 2 processing, 3 accepted,
    /// anything above is a compile, runtime or internal error.
    pub fn from_code(code: i32) -> Self {
        match code {
            i32::MIN..=1 => SubmissionStatus::Queued,
            2 => SubmissionStatus::Processing,
            3 => SubmissionStatus::Done,
            _ => SubmissionStatus::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Done | SubmissionStatus::Error)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub token: SubmissionToken,
    pub status_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub time_ms: Option<u64>,
    pub memory_kb: Option<u64>,
}

impl Submission {
    pub fn pending(token: SubmissionToken) -> Self {
        Self {
            token,
            status_code: None,
            stdout: None,
            stderr: None,
            compile_output: None,
            time_ms: None,
            memory_kb: None,
        }
    }

    /// A snapshot without a status code has not been picked up yet.
    pub fn status(&self) -> SubmissionStatus {
        self.status_code
            .map(SubmissionStatus::from_code)
            .unwrap_or(SubmissionStatus::Queued)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunResult {
    pub stdout_text: String,
    pub stderr_text: String,
    pub time_ms: Option<u64>,
    pub memory_kb: Option<u64>,
    pub status_code: Option<i32>,
}

impl From<Option<&Submission>> for RunResult {
    fn from(snapshot: Option<&Submission>) -> Self {
        let Some(submission) = snapshot else {
            return RunResult::default();
        };

        let mut stderr_text = submission.compile_output.clone().unwrap_or_default();
        stderr_text.push_str(submission.stderr.as_deref().unwrap_or_default());

        RunResult {
            stdout_text: submission.stdout.clone().unwrap_or_default(),
            stderr_text,
            time_ms: submission.time_ms,
            memory_kb: submission.memory_kb,
            status_code: submission.status_code,
        }
    }
}
