mod cli;
mod config;
mod deploy;
mod error;
mod git;
mod salt;
mod ui;

use std::path::PathBuf;

use clap::Parser;
use console::Style;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::FileConfig;
use deploy::Deployment;
use git::GitFetcher;
use ui::ConsoleReporter;

fn init_logging(verbose: bool) {
    let default = if verbose { "saltdeploy=debug,warn" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli, cancel: CancellationToken) -> anyhow::Result<String> {
    let mut file = FileConfig::load(cli.config.as_deref())?;
    file.keep_on_failure |= cli.keep_on_failure;
    let workdir = match cli.workdir {
        Some(dir) => dir,
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };

    let mut reporter = ConsoleReporter::new();
    let jid = deploy::run_from_lookup(
        |key| std::env::var_os(key),
        file,
        &workdir,
        GitFetcher,
        Deployment::client,
        &mut reporter,
        &cancel,
    )
    .await?;
    Ok(jid)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            cancel_on_signal.cancel();
        }
    });

    if let Err(e) = run(cli, cancel).await {
        let code = e
            .downcast_ref::<error::DeployError>()
            .map(error::DeployError::exit_code)
            .unwrap_or(1);
        eprintln!("{} {e:#}", Style::new().red().bold().apply_to("Error:"));
        std::process::exit(code);
    }
}
