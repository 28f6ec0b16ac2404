//! Production-order round automation - Entry Point
//!
//! `serve` (default) starts the operator dashboard; `run`, `check` and
//! `count` drive the same engine from the console.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use opauto_bot::console::{confirm, describe_run, print_header};
use opauto_bot::{render_summary, AppConfig, Application, Args, Command, ConsoleSink, RunArgs};
use opauto_engine::DynProgressSink;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;
    opauto_telemetry::init_logging(&config.telemetry.log_filter)?;

    info!("Starting opauto v{}", env!("CARGO_PKG_VERSION"));
    info!(mode = ?config.mode, "Configuration loaded");

    match args.command() {
        Command::Serve => {
            let app = Application::new(config, Vec::new())?;
            app.serve().await?;
        }
        Command::Check => {
            let app = Application::new(config, Vec::new())?;
            app.check().await?;
            println!("Database and ERP gateway reachable.");
        }
        Command::Count(range) => {
            let params = range.to_params()?;
            let app = Application::new(config, Vec::new())?;
            let total = app.count(params).await?;
            println!("{}", describe_run(&params, total));
        }
        Command::Run(run) => run_console(config, run).await?,
    }

    Ok(())
}

async fn run_console(config: AppConfig, run: RunArgs) -> Result<()> {
    let params = run.range.to_params()?;
    let console: DynProgressSink = Arc::new(ConsoleSink::new());
    let app = Application::new(config, vec![console])?;

    print_header();
    let pending = app.count(params).await?;
    println!("{}", describe_run(&params, pending));
    if pending == 0 {
        println!("Nothing to do.");
        return Ok(());
    }

    if !run.yes {
        let proceed = tokio::task::spawn_blocking(|| confirm("Create production orders?"))
            .await
            .context("confirmation prompt failed")??;
        if !proceed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let result = app.run(params).await;
    println!("{}", render_summary(&app.controller().summary()));
    result?;
    Ok(())
}
