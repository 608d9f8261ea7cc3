use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::{
    core::traits::interpreter::RunFault,
    interactive::relay::{RelayError, StdinRelay},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Messages from the worker thread to its host, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The interpreter finished its one-time bootstrap.
    Ready,
    BootstrapFailed { message: String },
    /// The program has been handed to the interpreter.
    Started,
    Output { stream: OutputStream, text: String },
    /// The program is blocked until a line of input is delivered.
    InputRequested,
    Finished { exit_code: i32 },
}

/// The worker-side view of a run: output sinks and a blocking line reader.
/// Cheap to clone, so interpreters can hand copies to helper threads.
#[derive(Debug, Clone)]
pub struct WorkerIo {
    events: UnboundedSender<WorkerEvent>,
    relay: Arc<StdinRelay>,
    input_timeout: Option<Duration>,
}

impl WorkerIo {
    pub fn new(
        events: UnboundedSender<WorkerEvent>,
        relay: Arc<StdinRelay>,
        input_timeout: Option<Duration>,
    ) -> Self {
        Self {
            events,
            relay,
            input_timeout,
        }
    }

    pub fn write(&self, stream: OutputStream, text: &str) {
        if text.is_empty() {
            return;
        }
        self.emit(WorkerEvent::Output {
            stream,
            text: text.to_string(),
        });
    }

    pub fn stdout(&self, text: &str) {
        self.write(OutputStream::Stdout, text);
    }

    pub fn stderr(&self, text: &str) {
        self.write(OutputStream::Stderr, text);
    }

    /// Blocks the calling thread until the host supplies the next line.
    /// `Ok(None)` means input has ended.
    pub fn read_line(&self) -> Result<Option<String>, RunFault> {
        self.relay
            .read_line(self.input_timeout, || self.emit(WorkerEvent::InputRequested))
            .map_err(|e| match e {
                RelayError::InputTimeout(after) => RunFault::InputTimeout(after),
                RelayError::LineTooLong { len, capacity } => {
                    RunFault::InputTooLong { len, capacity }
                }
                other => RunFault::Program(other.to_string()),
            })
    }

    /// Wakes any thread blocked in [`read_line`](Self::read_line) with end-of-input.
    pub fn close_input(&self) {
        self.relay.close();
    }

    pub(crate) fn emit(&self, event: WorkerEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Host stopped listening to worker events");
        }
    }
}

/// Turns arbitrary byte chunks into text without splitting a UTF-8 sequence
/// across two output events.
#[derive(Debug, Default)]
pub struct Utf8Chunks {
    carry: Vec<u8>,
}

impl Utf8Chunks {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);
        match std::str::from_utf8(&self.carry) {
            Ok(text) => {
                let text = text.to_string();
                self.carry.clear();
                text
            }
            Err(e) if e.error_len().is_none() => {
                // Incomplete sequence at the end: keep it for the next chunk.
                let valid = e.valid_up_to();
                let text = String::from_utf8_lossy(&self.carry[..valid]).into_owned();
                self.carry.drain(..valid);
                text
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.carry).into_owned();
                self.carry.clear();
                text
            }
        }
    }

    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        text
    }
}
