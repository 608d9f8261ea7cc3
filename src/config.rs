use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::{
    constants::{
        DEFAULT_BIND_ADDR, DEFAULT_DEADLINE_MS, DEFAULT_INPUT_CAPACITY, DEFAULT_INPUT_TIMEOUT_MS,
        DEFAULT_JUDGE_URL, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS,
    },
    core::{pipeline::polling::PollPolicy, traits::interpreter::InterpreterFactory},
    interactive::host::WorkerConfig,
    native::{script::ScriptRuntime, toolchain::ToolchainRuntime},
};

pub const ENV_JUDGE_URL: &str = "CODERUNNER_JUDGE_URL";
pub const ENV_BIND_ADDR: &str = "CODERUNNER_BIND_ADDR";
pub const ENV_DEADLINE_MS: &str = "CODERUNNER_DEADLINE_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "CODERUNNER_POLL_INTERVAL_MS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub judge: JudgeConfig,
    pub server: ServerConfig,
    pub worker: WorkerSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub base_url: String,
    pub deadline_ms: u64,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_JUDGE_URL.to_string(),
            deadline_ms: DEFAULT_DEADLINE_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl JudgeConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            deadline: Duration::from_millis(self.deadline_ms),
            interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("bind_addr `{}`: {}", self.bind_addr, e)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    /// `0` waits for input forever.
    pub input_timeout_ms: u64,
    pub input_capacity: usize,
    pub runtimes: BTreeMap<String, RuntimeSpec>,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            input_timeout_ms: DEFAULT_INPUT_TIMEOUT_MS,
            input_capacity: DEFAULT_INPUT_CAPACITY,
            runtimes: default_runtimes(),
        }
    }
}

impl WorkerSection {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            input_timeout: (self.input_timeout_ms > 0)
                .then(|| Duration::from_millis(self.input_timeout_ms)),
            input_capacity: self.input_capacity,
        }
    }

    pub fn runtime(&self, language_key: &str) -> Option<&RuntimeSpec> {
        self.runtimes.get(language_key)
    }
}

/// How a language is run locally.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuntimeSpec {
    Script {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Toolchain {
        compiler: String,
        #[serde(default)]
        compiler_args: Vec<String>,
        launcher: String,
        #[serde(default)]
        launcher_args: Vec<String>,
        source_file: String,
        #[serde(default)]
        work_root: Option<PathBuf>,
    },
}

impl RuntimeSpec {
    pub fn factory(&self) -> Arc<dyn InterpreterFactory> {
        match self {
            RuntimeSpec::Script { program, args } => {
                Arc::new(ScriptRuntime::new(program, args.as_slice()))
            }
            RuntimeSpec::Toolchain {
                compiler,
                compiler_args,
                launcher,
                launcher_args,
                source_file,
                work_root,
            } => Arc::new(ToolchainRuntime {
                compiler: compiler.clone(),
                compiler_args: compiler_args.clone(),
                launcher: launcher.clone(),
                launcher_args: launcher_args.clone(),
                source_file: source_file.clone(),
                work_root: work_root
                    .clone()
                    .unwrap_or_else(ToolchainRuntime::default_work_root),
            }),
        }
    }
}

fn script(program: &str, args: &[&str]) -> RuntimeSpec {
    RuntimeSpec::Script {
        program: program.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
    }
}

fn default_runtimes() -> BTreeMap<String, RuntimeSpec> {
    let strings = |args: &[&str]| args.iter().map(|a| a.to_string()).collect::<Vec<_>>();

    BTreeMap::from([
        ("python".to_string(), script("python3", &["-u", "-c"])),
        ("javascript".to_string(), script("node", &["-e"])),
        ("sh".to_string(), script("sh", &["-c"])),
        (
            "java".to_string(),
            RuntimeSpec::Toolchain {
                compiler: "javac".to_string(),
                compiler_args: strings(&["-d", "{dir}", "{source}"]),
                launcher: "java".to_string(),
                launcher_args: strings(&["-cp", "{dir}", "Main"]),
                source_file: "Main.java".to_string(),
                work_root: None,
            },
        ),
    ])
}

impl Config {
    /// Reads the optional TOML file, then applies `CODERUNNER_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Runtimes named in the file replace the built-in ones of the same key;
    /// the rest of the built-ins are kept.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        for (key, runtime) in default_runtimes() {
            config.worker.runtimes.entry(key).or_insert(runtime);
        }

        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |key: &str, value: String| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::Invalid(format!("{}=`{}`: {}", key, value, e)))
        };

        if let Some(url) = lookup(ENV_JUDGE_URL) {
            self.judge.base_url = url;
        }
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            self.server.bind_addr = addr;
        }
        if let Some(value) = lookup(ENV_DEADLINE_MS) {
            self.judge.deadline_ms = millis(ENV_DEADLINE_MS, value)?;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            self.judge.poll_interval_ms = millis(ENV_POLL_INTERVAL_MS, value)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.judge.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("judge.base_url is empty".to_string()));
        }
        if self.judge.deadline_ms == 0 {
            return Err(ConfigError::Invalid(
                "judge.deadline_ms must be positive".to_string(),
            ));
        }
        if self.judge.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "judge.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.worker.input_capacity == 0 {
            return Err(ConfigError::Invalid(
                "worker.input_capacity must be positive".to_string(),
            ));
        }
        self.server.socket_addr()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.judge.base_url, "https://ce.judge0.com");
        assert_eq!(config.judge.poll_policy(), PollPolicy::default());
        assert_eq!(config.server.socket_addr().unwrap().port(), 8080);
        assert_eq!(
            config.worker.worker_config().input_timeout,
            Some(Duration::from_secs(300))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
[judge]
base_url = "http://localhost:2358"
poll_interval_ms = 300
"#,
        )
        .unwrap();

        assert_eq!(config.judge.base_url, "http://localhost:2358");
        assert_eq!(config.judge.poll_interval_ms, 300);
        assert_eq!(config.judge.deadline_ms, 8000);
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_runtimes_merge_with_builtins() {
        let config = Config::from_toml(
            r#"
[worker.runtimes.python]
kind = "script"
program = "python3.12"
args = ["-u", "-c"]

[worker.runtimes.ruby]
kind = "script"
program = "ruby"
args = ["-e"]
"#,
        )
        .unwrap();

        assert_eq!(
            config.worker.runtime("python"),
            Some(&script("python3.12", &["-u", "-c"]))
        );
        assert_eq!(config.worker.runtime("ruby"), Some(&script("ruby", &["-e"])));
        assert!(matches!(
            config.worker.runtime("java"),
            Some(RuntimeSpec::Toolchain { source_file, .. }) if source_file == "Main.java"
        ));
        assert!(config.worker.runtime("cobol").is_none());
    }

    #[test]
    fn test_toolchain_runtime_from_toml() {
        let config = Config::from_toml(
            r#"
[worker]
input_timeout_ms = 0

[worker.runtimes.c]
kind = "toolchain"
compiler = "cc"
compiler_args = ["-o", "{dir}/main", "{source}"]
launcher = "{dir}/main"
source_file = "main.c"
work_root = "/var/tmp/runs"
"#,
        )
        .unwrap();

        assert_eq!(config.worker.worker_config().input_timeout, None);
        assert_eq!(
            config.worker.runtime("c"),
            Some(&RuntimeSpec::Toolchain {
                compiler: "cc".to_string(),
                compiler_args: vec![
                    "-o".to_string(),
                    "{dir}/main".to_string(),
                    "{source}".to_string()
                ],
                launcher: "{dir}/main".to_string(),
                launcher_args: vec![],
                source_file: "main.c".to_string(),
                work_root: Some(PathBuf::from("/var/tmp/runs")),
            })
        );
    }

    #[test]
    fn test_unknown_runtime_kind_is_rejected() {
        let err = Config::from_toml(
            r#"
[worker.runtimes.x]
kind = "wasm"
program = "x"
"#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_environment_overrides() {
        let vars = HashMap::from([
            (ENV_JUDGE_URL, "http://judge.internal"),
            (ENV_DEADLINE_MS, "12000"),
            (ENV_BIND_ADDR, "0.0.0.0:9000"),
        ]);
        let mut config = Config::default();

        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.judge.base_url, "http://judge.internal");
        assert_eq!(config.judge.deadline_ms, 12000);
        assert_eq!(config.judge.poll_interval_ms, 350);
        assert_eq!(config.server.socket_addr().unwrap().port(), 9000);
    }

    #[test]
    fn test_malformed_override_is_invalid() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| (key == ENV_POLL_INTERVAL_MS).then(|| "fast".to_string()))
            .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains(ENV_POLL_INTERVAL_MS)));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.server.bind_addr = "not an address".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.judge.poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.judge.deadline_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(msg)) if msg.contains("deadline_ms")
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[server]\nbind_addr = \"127.0.0.1:3000\"\n")
            .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:3000");

        let missing = Config::from_file(Path::new("/nonexistent/coderunner.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
