use std::time::Duration;

use crate::interactive::io::WorkerIo;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("runtime `{program}` not found: {msg}")]
    NotFound { program: String, msg: String },
    #[error("runtime failed to initialize: {0}")]
    Failed(String),
}

/// A failure of the submitted program or of its launch. Reported to the user
/// as error text and a non-zero exit code, never as a host crash.
#[derive(Debug, thiserror::Error)]
pub enum RunFault {
    #[error("{0}")]
    Program(String),
    #[error("no input received within {0:?}")]
    InputTimeout(Duration),
    #[error("line of {len} bytes exceeds input buffer of {capacity} bytes")]
    InputTooLong { len: usize, capacity: usize },
    #[error("failed to launch program: {0}")]
    Launch(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunFault {
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Produces a ready interpreter. Called lazily on the worker thread; may take
/// seconds, and a failure leaves the host free to try again on the next run.
pub trait InterpreterFactory: std::fmt::Debug + Send + Sync {
    fn bootstrap(&self) -> Result<Box<dyn Interpreter>, BootstrapError>;
}

/// Runs one program to completion on the calling (worker) thread. Reading
/// input through `io` may block that thread until the host supplies a line.
pub trait Interpreter: Send {
    fn run(&mut self, source: &str, io: WorkerIo) -> Result<i32, RunFault>;
}
