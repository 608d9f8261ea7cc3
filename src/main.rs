use std::panic;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use coderunner_relay::{
    cli::{self, Cli, Command},
    config::Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { bind } => cli::serve(&config, bind).await?,
        Command::Remote {
            lang,
            file,
            stdin_file,
        } => {
            let source = read_source(&file)?;
            let stdin = stdin_file
                .as_deref()
                .map(read_source)
                .transpose()?
                .unwrap_or_default();

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, returning what the judge reported so far");
                    on_interrupt.cancel();
                }
            });

            let orchestrator = cli::orchestrator(&config);
            let response = cli::run_remote(&orchestrator, &lang, &source, &stdin, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Local { lang, file, batch } => {
            let source = read_source(&file)?;
            let input = tokio::io::BufReader::new(tokio::io::stdin());

            let exit_code =
                cli::run_local(&config, &lang, &source, batch, input, &mut std::io::stdout())
                    .await?;
            // The terminal reader may still be blocked on stdin.
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
