mod cli;
mod workflow;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, ResolveArgs};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;
use workflow::CheckOverrides;

fn init_tracing(verbose: bool) {
    let default = if verbose { "podup=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn overrides(resolve: &ResolveArgs) -> CheckOverrides {
    CheckOverrides {
        include_prerelease: resolve.include_prerelease,
        unlock: resolve.unlock,
        no_cache: resolve.no_cache,
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config.as_deref();

    match &cli.command {
        Commands::Check { pod, resolve } => workflow::execute_check(
            &cli.path,
            config,
            pod.as_deref(),
            &overrides(resolve),
            resolve.json,
        )
        .with_context(|| format!("Update check in '{}' failed", cli.path.display())),
        Commands::List => workflow::execute_list(&cli.path)
            .with_context(|| format!("Cannot list pods in '{}'", cli.path.display())),
        Commands::Requirements { pod, resolve } => workflow::execute_requirements(
            &cli.path,
            config,
            pod,
            &overrides(resolve),
            resolve.json,
        )
        .with_context(|| format!("Cannot rewrite requirements of '{pod}'")),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}
