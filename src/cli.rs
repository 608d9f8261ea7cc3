use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use itertools::Itertools;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    core::{
        domain::ExecutionRequest, pipeline::polling::PollOrchestrator,
        resolver::EnvironmentRules,
    },
    http::{
        client::HttpJudgeClient,
        models::RunResponseDto,
        server::{self, build_router},
    },
    interactive::{
        host::{InputMode, WorkerHost},
        io::WorkerEvent,
        relay::RelayError,
    },
};

#[derive(Parser, Debug)]
#[command(
    name = "coderunner-relay",
    version,
    about = "Runs programs on a remote judge or on a local interpreter"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Used when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the `POST /api/run` control plane
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run a program once on the remote judge and print the result as JSON
    Remote {
        #[arg(long, short)]
        lang: String,
        #[arg(long, short)]
        file: PathBuf,
        #[arg(long)]
        stdin_file: Option<PathBuf>,
    },
    /// Run a program on a local interpreter, relaying terminal input
    Local {
        #[arg(long, short)]
        lang: String,
        #[arg(long, short)]
        file: PathBuf,
        /// Read all of stdin before starting instead of on demand
        #[arg(long)]
        batch: bool,
    },
}

pub fn orchestrator(config: &Config) -> PollOrchestrator {
    let client = HttpJudgeClient::new(config.judge.base_url.clone())
        .with_timeout(config.judge.request_timeout());

    PollOrchestrator::new(
        Arc::new(client),
        EnvironmentRules::default(),
        config.judge.poll_policy(),
    )
}

pub async fn serve(config: &Config, bind: Option<String>) -> anyhow::Result<()> {
    let addr: SocketAddr = match bind {
        Some(bind) => bind
            .parse()
            .with_context(|| format!("invalid bind address `{}`", bind))?,
        None => config.server.socket_addr()?,
    };
    let router = build_router(Arc::new(orchestrator(config)));

    server::serve(addr, router).await?;
    Ok(())
}

#[tracing::instrument(skip(orchestrator, source, stdin, cancel))]
pub async fn run_remote(
    orchestrator: &PollOrchestrator,
    lang: &str,
    source: &str,
    stdin: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<RunResponseDto> {
    let request = ExecutionRequest::new(lang, source, stdin);
    let result = orchestrator.run_until(&request, cancel).await?;

    Ok(RunResponseDto::from((request.language_key, result)))
}

/// Runs `source` on the configured local runtime, writing program output to
/// `out` as it arrives. Returns the program's exit code.
#[tracing::instrument(skip(config, source, input, out))]
pub async fn run_local<R, W>(
    config: &Config,
    lang: &str,
    source: &str,
    batch: bool,
    input: R,
    out: &mut W,
) -> anyhow::Result<i32>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: Write,
{
    let Some(runtime) = config.worker.runtime(lang) else {
        bail!(
            "no local runtime for `{}` (configured: {})",
            lang,
            config.worker.runtimes.keys().join(", ")
        );
    };
    let host = WorkerHost::new(runtime.factory(), config.worker.worker_config());
    let session = if batch {
        let mut payload = String::new();
        let mut input = input;
        input.read_to_string(&mut payload).await?;
        host.run_batched(source, &payload)?
    } else {
        let mut lines = input.lines();
        let session = host.run(source, InputMode::Interactive, Vec::new())?;
        let input = session.input();
        tokio::spawn(async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match input.push_line(line) {
                        Ok(()) => {}
                        Err(RelayError::Closed) => break,
                        Err(e) => tracing::warn!("Line not sent: {}", e),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Failed to read input: {}", e);
                        break;
                    }
                }
            }
            input.close();
        });
        session
    };

    let mut events = session.into_stream();
    while let Some(event) = events.next().await {
        match event {
            WorkerEvent::Output { text, .. } => {
                out.write_all(text.as_bytes())?;
                out.flush()?;
            }
            WorkerEvent::BootstrapFailed { message } => {
                bail!("interpreter failed to start: {}", message)
            }
            WorkerEvent::Finished { exit_code } => return Ok(exit_code),
            WorkerEvent::Ready | WorkerEvent::Started | WorkerEvent::InputRequested => {}
        }
    }

    bail!("worker stopped before the program finished")
}
