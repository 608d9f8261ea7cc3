use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    core::traits::interpreter::{BootstrapError, Interpreter, InterpreterFactory, RunFault},
    interactive::io::WorkerIo,
};

type Script = dyn Fn(&str, WorkerIo) -> Result<i32, RunFault> + Send + Sync;

/// Runtime whose "interpreter" is a closure. Can be told to fail its first
/// bootstraps.
pub struct ScriptedRuntime {
    script: Arc<Script>,
    failing_bootstraps: usize,
    bootstraps: AtomicUsize,
}

impl std::fmt::Debug for ScriptedRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRuntime")
            .field("failing_bootstraps", &self.failing_bootstraps)
            .field("bootstraps", &self.bootstraps)
            .finish()
    }
}

impl ScriptedRuntime {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, WorkerIo) -> Result<i32, RunFault> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            failing_bootstraps: 0,
            bootstraps: AtomicUsize::new(0),
        }
    }

    pub fn failing_bootstraps(mut self, count: usize) -> Self {
        self.failing_bootstraps = count;
        self
    }

    /// Bootstrap attempts so far, failed ones included.
    pub fn bootstraps(&self) -> usize {
        self.bootstraps.load(Ordering::SeqCst)
    }
}

impl InterpreterFactory for ScriptedRuntime {
    fn bootstrap(&self) -> Result<Box<dyn Interpreter>, BootstrapError> {
        let attempt = self.bootstraps.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Stub bootstrap attempt {}", attempt + 1);
        if attempt < self.failing_bootstraps {
            return Err(BootstrapError::Failed("stub runtime unavailable".to_string()));
        }

        Ok(Box::new(ScriptedInterpreter {
            script: self.script.clone(),
        }))
    }
}

struct ScriptedInterpreter {
    script: Arc<Script>,
}

impl Interpreter for ScriptedInterpreter {
    fn run(&mut self, source: &str, io: WorkerIo) -> Result<i32, RunFault> {
        (self.script)(source, io)
    }
}
