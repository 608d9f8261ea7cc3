pub const DEFAULT_JUDGE_URL: &str = "https://ce.judge0.com";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

pub const DEFAULT_DEADLINE_MS: u64 = 8000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 350;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

pub const DEFAULT_INPUT_TIMEOUT_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_INPUT_CAPACITY: usize = 64 * 1024;

/// Fields requested from the judge when polling a submission.
pub const SUBMISSION_FIELDS: &str = "stdout,stderr,compileOutput,status,timeMs,memoryKb";

pub const WORKER_THREAD_NAME: &str = "interpreter-worker";
