use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use daybook::cli::args::Cli;
use daybook::cli::commands;
use daybook::cli::context::Context;
use daybook::config::{Config, Paths};
use daybook::logging;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.output;

    let paths = match cli.home {
        Some(root) => Paths::with_root(root),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let config = Config::load_from_path(&paths.config_file)?;
    let _log_guard = logging::init(&config.logging, &paths)?;

    let mode = commands::connectivity_mode(&cli.command, cli.offline);
    let ctx = Context::open(paths, config, mode).await?;

    let output = commands::run(&ctx, cli.command, format).await?;
    if !output.is_empty() {
        println!("{output}");
    }

    Ok(())
}
