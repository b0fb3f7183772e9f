use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    novelcast::logging::init().context("init logging")?;

    let cli = novelcast::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        novelcast::cli::Command::Listen(args) => {
            novelcast::listen::run(args).await.context("listen")?;
        }
        novelcast::cli::Command::Fetch(args) => {
            novelcast::fetch::run(args).await.context("fetch")?;
        }
    }

    Ok(())
}
