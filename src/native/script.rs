use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};

use crate::{
    core::traits::interpreter::{BootstrapError, Interpreter, InterpreterFactory, RunFault},
    interactive::io::{OutputStream, Utf8Chunks, WorkerIo},
};

const READ_CHUNK: usize = 4096;

/// Runs each program as `<program> <args..> <source>`, e.g. `python3 -u -c`.
#[derive(Clone, Debug)]
pub struct ScriptRuntime {
    program: String,
    args: Vec<String>,
}

impl ScriptRuntime {
    pub fn new<S: AsRef<str>>(program: &str, args: &[S]) -> Self {
        ScriptRuntime {
            program: program.to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }
}

impl InterpreterFactory for ScriptRuntime {
    #[tracing::instrument]
    fn bootstrap(&self) -> Result<Box<dyn Interpreter>, BootstrapError> {
        let binary = which::which(&self.program).map_err(|e| BootstrapError::NotFound {
            program: self.program.clone(),
            msg: e.to_string(),
        })?;
        tracing::info!("Using interpreter at {}", binary.display());

        Ok(Box::new(ScriptInterpreter {
            binary,
            args: self.args.clone(),
        }))
    }
}

#[derive(Debug)]
struct ScriptInterpreter {
    binary: PathBuf,
    args: Vec<String>,
}

impl Interpreter for ScriptInterpreter {
    fn run(&mut self, source: &str, io: WorkerIo) -> Result<i32, RunFault> {
        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .arg(source)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RunFault::Launch(e.to_string()))?;

        let readers = [
            child
                .stdout
                .take()
                .map(|out| forward_output(out, io.clone(), OutputStream::Stdout)),
            child
                .stderr
                .take()
                .map(|err| forward_output(err, io.clone(), OutputStream::Stderr)),
        ];
        // A pipe read cannot be observed, so input is requested up front and
        // whatever the host supplies is written to the child as it arrives.
        let feeder = child.stdin.take().map(|stdin| {
            let io = io.clone();
            thread::spawn(move || feed_input(stdin, io))
        });

        let status = child.wait()?;
        io.close_input();

        for reader in readers.into_iter().flatten() {
            if reader.join().is_err() {
                tracing::warn!("Output reader thread panicked");
            }
        }
        let fed = match feeder.map(JoinHandle::join) {
            Some(Ok(fed)) => fed,
            Some(Err(_)) => Err(RunFault::Program("input feeder panicked".to_string())),
            None => Ok(()),
        };
        fed?;

        let code = status.code().unwrap_or(-1);
        tracing::debug!("Interpreter exited with {}", code);
        Ok(code)
    }
}

fn forward_output<R>(mut pipe: R, io: WorkerIo, stream: OutputStream) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut chunks = Utf8Chunks::default();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => io.write(stream, &chunks.push(&buf[..n])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Failed to read program {:?}: {}", stream, e);
                    break;
                }
            }
        }
        io.write(stream, &chunks.finish());
    })
}

fn feed_input(mut stdin: ChildStdin, io: WorkerIo) -> Result<(), RunFault> {
    loop {
        let line = match io.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => break,
            // Nothing typed in time: the child sees end-of-input and its own
            // exit status decides the outcome.
            Err(RunFault::InputTimeout(after)) => {
                tracing::debug!("No input within {:?}, closing program stdin", after);
                break;
            }
            Err(e) => return Err(e),
        };
        let written = stdin
            .write_all(line.as_bytes())
            .and_then(|_| stdin.write_all(b"\n"))
            .and_then(|_| stdin.flush());
        if let Err(e) = written {
            // The program stopped reading, usually because it exited.
            tracing::debug!("Dropping input line: {}", e);
            break;
        }
    }
    Ok(())
}
