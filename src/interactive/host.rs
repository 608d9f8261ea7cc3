use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    constants::{DEFAULT_INPUT_CAPACITY, DEFAULT_INPUT_TIMEOUT_MS, WORKER_THREAD_NAME},
    core::traits::interpreter::{Interpreter, InterpreterFactory},
    interactive::{
        io::{OutputStream, WorkerEvent, WorkerIo},
        relay::{RelayError, StdinRelay},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Initializing,
    Ready,
    Running,
    AwaitingInput,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Lines collected before the run are the whole input; once they are
    /// used up the program sees end-of-input.
    Batched,
    /// Lines are delivered as they arrive, each only when the program blocks
    /// for it. Input ends when the session closes it.
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("a program is already running")]
    AlreadyRunning,
    #[error("worker thread unavailable: {0}")]
    WorkerUnavailable(String),
    #[error("interpreter failed to start: {0}")]
    Bootstrap(String),
    #[error("worker stopped before the run finished")]
    Interrupted,
    #[error("input rejected: {0}")]
    Input(RelayError),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// `None` waits for input forever.
    pub input_timeout: Option<Duration>,
    pub input_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            input_timeout: Some(Duration::from_millis(DEFAULT_INPUT_TIMEOUT_MS)),
            input_capacity: DEFAULT_INPUT_CAPACITY,
        }
    }
}

#[derive(Debug)]
struct HostState {
    worker: WorkerState,
    in_flight: bool,
}

type SharedState = Arc<Mutex<HostState>>;

fn lock_state(state: &SharedState) -> MutexGuard<'_, HostState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn transition(state: &SharedState, next: WorkerState) {
    let mut state = lock_state(state);
    if state.worker != next {
        tracing::debug!("Worker state {:?} -> {:?}", state.worker, next);
        state.worker = next;
    }
}

enum WorkerCommand {
    Run {
        source: String,
        io: WorkerIo,
        relay: Arc<StdinRelay>,
    },
}

#[derive(Debug)]
struct WorkerThread {
    commands: std_mpsc::Sender<WorkerCommand>,
    handle: JoinHandle<()>,
}

/// Owns one long-lived worker thread running an interpreter and mediates all
/// traffic with it. The interpreter is bootstrapped lazily on the first run;
/// a failed bootstrap is retried on the next one. Only one run may be in
/// flight at a time.
///
/// `run` must be called from within a tokio runtime; it spawns the task that
/// relays worker events and feeds queued input.
#[derive(Debug)]
pub struct WorkerHost {
    factory: Arc<dyn InterpreterFactory>,
    config: WorkerConfig,
    state: SharedState,
    worker: Mutex<Option<WorkerThread>>,
}

impl WorkerHost {
    pub fn new(factory: Arc<dyn InterpreterFactory>, config: WorkerConfig) -> Self {
        Self {
            factory,
            config,
            state: Arc::new(Mutex::new(HostState {
                worker: WorkerState::Uninitialized,
                in_flight: false,
            })),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> WorkerState {
        lock_state(&self.state).worker
    }

    /// Dispatches `source` to the worker. `lines` are queued before the run
    /// starts; more may be pushed through the returned session.
    #[tracing::instrument(skip(self, source, lines))]
    pub fn run(
        &self,
        source: &str,
        mode: InputMode,
        lines: Vec<String>,
    ) -> Result<RunSession, HostError> {
        let capacity = self.config.input_capacity;
        if let Some(line) = lines.iter().find(|line| line.len() > capacity) {
            return Err(HostError::Input(RelayError::LineTooLong {
                len: line.len(),
                capacity,
            }));
        }

        let previous = {
            let mut state = lock_state(&self.state);
            if state.in_flight {
                return Err(HostError::AlreadyRunning);
            }
            let previous = state.worker;
            state.in_flight = true;
            state.worker = match previous {
                WorkerState::Uninitialized => WorkerState::Initializing,
                _ => WorkerState::Ready,
            };
            previous
        };

        let relay = Arc::new(StdinRelay::new(self.config.input_capacity));
        let (worker_tx, worker_rx) = unbounded_channel();
        let io = WorkerIo::new(worker_tx, relay.clone(), self.config.input_timeout);
        let command = WorkerCommand::Run {
            source: source.to_string(),
            io,
            relay: relay.clone(),
        };

        if let Err(e) = self.dispatch(command) {
            let mut state = lock_state(&self.state);
            state.in_flight = false;
            state.worker = previous;
            return Err(e);
        }

        let feed = Arc::new(InputFeed::new(mode, lines, relay, self.state.clone()));
        let (session_tx, session_rx) = unbounded_channel();
        tokio::spawn(relay_events(
            worker_rx,
            session_tx,
            feed.clone(),
            self.state.clone(),
        ));

        Ok(RunSession {
            events: session_rx,
            input: InputHandle { feed },
        })
    }

    /// Batched run over a newline-joined payload; each line answers one read.
    pub fn run_batched(&self, source: &str, payload: &str) -> Result<RunSession, HostError> {
        let lines = payload.lines().map(str::to_string).collect();
        self.run(source, InputMode::Batched, lines)
    }

    fn dispatch(&self, command: WorkerCommand) -> Result<(), HostError> {
        let mut worker = self.worker.lock().unwrap_or_else(|p| p.into_inner());

        if worker.as_ref().is_some_and(|w| w.handle.is_finished()) {
            tracing::warn!("Worker thread exited, starting a new one");
            *worker = None;
            transition(&self.state, WorkerState::Initializing);
        }

        if worker.is_none() {
            *worker = Some(self.spawn_worker()?);
        }

        let Some(thread) = worker.as_ref() else {
            return Err(HostError::WorkerUnavailable("no worker thread".to_string()));
        };
        if thread.commands.send(command).is_err() {
            *worker = None;
            return Err(HostError::WorkerUnavailable(
                "worker thread is gone".to_string(),
            ));
        }
        Ok(())
    }

    fn spawn_worker(&self) -> Result<WorkerThread, HostError> {
        let (commands, inbox) = std_mpsc::channel();
        let factory = self.factory.clone();
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_loop(factory, inbox))
            .map_err(|e| HostError::WorkerUnavailable(e.to_string()))?;
        tracing::debug!("Spawned worker thread");

        Ok(WorkerThread { commands, handle })
    }
}

fn worker_loop(factory: Arc<dyn InterpreterFactory>, inbox: std_mpsc::Receiver<WorkerCommand>) {
    let mut interpreter: Option<Box<dyn Interpreter>> = None;

    while let Ok(WorkerCommand::Run { source, io, relay }) = inbox.recv() {
        if interpreter.is_none() {
            tracing::info!("Bootstrapping interpreter runtime");
            match factory.bootstrap() {
                Ok(ready) => {
                    interpreter = Some(ready);
                    io.emit(WorkerEvent::Ready);
                }
                Err(e) => {
                    tracing::error!("Interpreter bootstrap failed: {}", e);
                    relay.close();
                    io.emit(WorkerEvent::BootstrapFailed {
                        message: e.to_string(),
                    });
                    continue;
                }
            }
        }
        let Some(active) = interpreter.as_mut() else {
            continue;
        };

        io.emit(WorkerEvent::Started);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| active.run(&source, io.clone())));
        let exit_code = match outcome {
            Ok(Ok(code)) => code,
            Ok(Err(fault)) => {
                tracing::warn!("Program fault: {}", fault);
                io.stderr(&format!("{}\n", fault));
                fault.exit_code()
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                tracing::error!("Interpreter panicked: {}", msg);
                io.stderr(&format!("interpreter crashed: {}\n", msg));
                // A panicking interpreter may be left inconsistent.
                interpreter = None;
                1
            }
        };

        relay.close();
        io.emit(WorkerEvent::Finished { exit_code });
    }

    tracing::debug!("Worker thread exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Forwards worker events to the session in arrival order and hands queued
/// lines to the worker whenever it blocks for input.
async fn relay_events(
    mut worker_rx: UnboundedReceiver<WorkerEvent>,
    session_tx: UnboundedSender<WorkerEvent>,
    feed: Arc<InputFeed>,
    state: SharedState,
) {
    let mut settled = false;

    while let Some(event) = worker_rx.recv().await {
        match &event {
            WorkerEvent::Ready => transition(&state, WorkerState::Ready),
            WorkerEvent::Started => transition(&state, WorkerState::Running),
            WorkerEvent::InputRequested => {
                if feed.relay.is_awaiting() {
                    transition(&state, WorkerState::AwaitingInput);
                }
            }
            WorkerEvent::Output { .. } => {}
            WorkerEvent::BootstrapFailed { .. } => {
                let mut state = lock_state(&state);
                state.worker = WorkerState::Uninitialized;
                state.in_flight = false;
                settled = true;
            }
            WorkerEvent::Finished { exit_code } => {
                tracing::info!("Program finished with exit code {}", exit_code);
                let mut state = lock_state(&state);
                state.worker = WorkerState::Finished;
                state.in_flight = false;
                settled = true;
            }
        }

        let wants_input = event == WorkerEvent::InputRequested;
        if session_tx.send(event).is_err() {
            // Nobody can type into a dropped session.
            feed.close();
        }
        if wants_input {
            feed.offer();
        }
        if settled {
            return;
        }
    }

    tracing::error!("Worker event channel closed mid-run");
    let mut state = lock_state(&state);
    state.worker = WorkerState::Uninitialized;
    state.in_flight = false;
}

#[derive(Debug)]
struct PendingInput {
    lines: VecDeque<String>,
    end_of_input: bool,
}

/// Host-side queue of lines waiting for the worker to ask for them.
#[derive(Debug)]
struct InputFeed {
    pending: Mutex<PendingInput>,
    relay: Arc<StdinRelay>,
    state: SharedState,
}

impl InputFeed {
    fn new(mode: InputMode, lines: Vec<String>, relay: Arc<StdinRelay>, state: SharedState) -> Self {
        Self {
            pending: Mutex::new(PendingInput {
                lines: lines.into(),
                end_of_input: mode == InputMode::Batched,
            }),
            relay,
            state,
        }
    }

    fn push(&self, line: String) -> Result<(), RelayError> {
        if line.len() > self.relay.capacity() {
            return Err(RelayError::LineTooLong {
                len: line.len(),
                capacity: self.relay.capacity(),
            });
        }

        let mut pending = self.lock();
        if pending.end_of_input || self.relay.is_closed() {
            return Err(RelayError::Closed);
        }
        pending.lines.push_back(line);
        self.offer_locked(&mut pending);
        Ok(())
    }

    fn offer(&self) {
        let mut pending = self.lock();
        self.offer_locked(&mut pending);
    }

    fn close(&self) {
        let mut pending = self.lock();
        pending.end_of_input = true;
        self.offer_locked(&mut pending);
    }

    /// Delivers the next line only if the worker is blocked waiting for one.
    fn offer_locked(&self, pending: &mut PendingInput) {
        if !self.relay.is_awaiting() {
            return;
        }

        let Some(line) = pending.lines.front() else {
            if pending.end_of_input {
                self.relay.close();
            }
            return;
        };

        match self.relay.deliver(line) {
            Ok(()) => {
                pending.lines.pop_front();
                transition(&self.state, WorkerState::Running);
            }
            // The worker already has a line or is between reads; its next
            // input request triggers another offer.
            Err(RelayError::Busy) | Err(RelayError::NotWaiting) => {}
            // The line can never be delivered; end the input so the worker
            // is not left waiting on it.
            Err(e) => {
                tracing::warn!("Ending input, queued line undeliverable: {}", e);
                pending.lines.clear();
                pending.end_of_input = true;
                self.relay.close();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, PendingInput> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable handle for supplying input to a running program.
#[derive(Debug, Clone)]
pub struct InputHandle {
    feed: Arc<InputFeed>,
}

impl InputHandle {
    /// Queues a line. It reaches the program as soon as the program asks for
    /// input; this call never blocks on the worker.
    pub fn push_line(&self, line: impl Into<String>) -> Result<(), RelayError> {
        self.feed.push(line.into())
    }

    /// Marks the end of input. Lines already queued are still delivered.
    pub fn close(&self) {
        self.feed.close();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Stdout and stderr interleaved in arrival order.
    pub output: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// One dispatched program. Events arrive in the order the worker produced them.
#[derive(Debug)]
pub struct RunSession {
    events: UnboundedReceiver<WorkerEvent>,
    input: InputHandle,
}

impl RunSession {
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    pub fn input(&self) -> InputHandle {
        self.input.clone()
    }

    pub fn push_line(&self, line: impl Into<String>) -> Result<(), RelayError> {
        self.input.push_line(line)
    }

    pub fn close_input(&self) {
        self.input.close();
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<WorkerEvent> {
        let RunSession { events, input: _ } = self;
        UnboundedReceiverStream::new(events)
    }

    /// Drains the session until the program finishes.
    pub async fn collect(mut self) -> Result<RunOutcome, HostError> {
        let mut outcome = RunOutcome::default();

        while let Some(event) = self.next_event().await {
            match event {
                WorkerEvent::Output { stream, text } => {
                    match stream {
                        OutputStream::Stdout => outcome.stdout.push_str(&text),
                        OutputStream::Stderr => outcome.stderr.push_str(&text),
                    }
                    outcome.output.push_str(&text);
                }
                WorkerEvent::Finished { exit_code } => {
                    outcome.exit_code = exit_code;
                    return Ok(outcome);
                }
                WorkerEvent::BootstrapFailed { message } => {
                    return Err(HostError::Bootstrap(message));
                }
                WorkerEvent::Ready | WorkerEvent::Started | WorkerEvent::InputRequested => {}
            }
        }

        Err(HostError::Interrupted)
    }
}
