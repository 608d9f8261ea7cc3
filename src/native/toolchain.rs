use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use uuid::Uuid;

use crate::{
    core::traits::interpreter::{BootstrapError, Interpreter, InterpreterFactory, RunFault},
    interactive::io::WorkerIo,
};

const STDIN_FILE: &str = "stdin.txt";
const STDOUT_FILE: &str = "stdout.txt";
const STDERR_FILE: &str = "stderr.txt";

const SOURCE_PLACEHOLDER: &str = "{source}";
const DIR_PLACEHOLDER: &str = "{dir}";

/// Backend for compiled languages: the source is written into a fresh
/// directory, compiled, and the result launched with stdin and stdout
/// passed through files.
///
/// Arguments may contain `{source}` (path of the written source file) and
/// `{dir}` (the run directory); both are substituted per run.
#[derive(Clone, Debug)]
pub struct ToolchainRuntime {
    pub compiler: String,
    pub compiler_args: Vec<String>,
    pub launcher: String,
    pub launcher_args: Vec<String>,
    pub source_file: String,
    pub work_root: PathBuf,
}

impl ToolchainRuntime {
    pub fn default_work_root() -> PathBuf {
        std::env::temp_dir().join("coderunner")
    }
}

impl InterpreterFactory for ToolchainRuntime {
    #[tracing::instrument]
    fn bootstrap(&self) -> Result<Box<dyn Interpreter>, BootstrapError> {
        let locate = |program: &str| {
            which::which(program).map_err(|e| BootstrapError::NotFound {
                program: program.to_string(),
                msg: e.to_string(),
            })
        };
        let compiler = locate(&self.compiler)?;
        // A launcher inside the run directory only exists once compiled.
        let launcher = if self.launcher.contains(DIR_PLACEHOLDER) {
            None
        } else {
            Some(locate(&self.launcher)?)
        };

        fs::create_dir_all(&self.work_root).map_err(|e| {
            BootstrapError::Failed(format!(
                "cannot create work dir {}: {}",
                self.work_root.display(),
                e
            ))
        })?;
        tracing::info!(
            "Toolchain ready: compiler={}, launcher={}",
            compiler.display(),
            self.launcher
        );

        Ok(Box::new(ToolchainInterpreter {
            compiler,
            launcher,
            toolchain: self.clone(),
        }))
    }
}

#[derive(Debug)]
struct ToolchainInterpreter {
    compiler: PathBuf,
    launcher: Option<PathBuf>,
    toolchain: ToolchainRuntime,
}

impl ToolchainInterpreter {
    fn expand_one(arg: &str, source: &Path, dir: &Path) -> String {
        arg.replace(SOURCE_PLACEHOLDER, &source.to_string_lossy())
            .replace(DIR_PLACEHOLDER, &dir.to_string_lossy())
    }

    fn expand(args: &[String], source: &Path, dir: &Path) -> Vec<String> {
        args.iter()
            .map(|arg| Self::expand_one(arg, source, dir))
            .collect()
    }

    fn run_in(&self, dir: &Path, source: &str, io: &WorkerIo) -> Result<i32, RunFault> {
        let source_path = dir.join(&self.toolchain.source_file);
        fs::write(&source_path, source)?;

        // The launched program reads its stdin from a file, so all input has
        // to be known before it starts.
        let mut stdin = String::new();
        while let Some(line) = io.read_line()? {
            stdin.push_str(&line);
            stdin.push('\n');
        }

        let compiled = Command::new(&self.compiler)
            .args(Self::expand(&self.toolchain.compiler_args, &source_path, dir))
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RunFault::Launch(format!("{}: {}", self.compiler.display(), e)))?;

        if !compiled.status.success() {
            let code = compiled.status.code().unwrap_or(-1);
            tracing::debug!("Compilation failed with {}", code);
            io.stdout(&String::from_utf8_lossy(&compiled.stdout));
            io.stderr(&String::from_utf8_lossy(&compiled.stderr));
            return Ok(code);
        }

        let stdin_path = dir.join(STDIN_FILE);
        let stdout_path = dir.join(STDOUT_FILE);
        let stderr_path = dir.join(STDERR_FILE);
        fs::write(&stdin_path, &stdin)?;

        let launcher = match &self.launcher {
            Some(path) => path.clone(),
            None => PathBuf::from(Self::expand_one(&self.toolchain.launcher, &source_path, dir)),
        };
        let status = Command::new(&launcher)
            .args(Self::expand(&self.toolchain.launcher_args, &source_path, dir))
            .current_dir(dir)
            .stdin(File::open(&stdin_path)?)
            .stdout(File::create(&stdout_path)?)
            .stderr(File::create(&stderr_path)?)
            .status()
            .map_err(|e| RunFault::Launch(format!("{}: {}", launcher.display(), e)))?;

        io.stdout(&String::from_utf8_lossy(&fs::read(&stdout_path)?));
        io.stderr(&String::from_utf8_lossy(&fs::read(&stderr_path)?));

        Ok(status.code().unwrap_or(-1))
    }
}

impl Interpreter for ToolchainInterpreter {
    fn run(&mut self, source: &str, io: WorkerIo) -> Result<i32, RunFault> {
        let dir = self.toolchain.work_root.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dir)?;

        let result = self.run_in(&dir, source, &io);

        if let Err(e) = fs::remove_dir_all(&dir) {
            tracing::warn!("Failed to clean up {}: {}", dir.display(), e);
        }
        result
    }
}
