mod cli;
mod commands;
mod config;
mod progress;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use sacloud::ResourceKind;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    pub json: bool,
    pub dry_run: bool,
    pub overrides: config::Overrides,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        quiet: cli.quiet,
        json: cli.json,
        dry_run: cli.dry_run,
        overrides: config::Overrides {
            token: cli.token,
            secret: cli.secret,
            zone: cli.zone.map(Into::into),
            poll_interval: cli.poll_interval,
            poll_attempts: cli.poll_attempts,
        },
    };

    match cli.command {
        Command::Server(args) => commands::resource::run(
            &ctx,
            ResourceKind::Compute,
            &args.common,
            commands::resource::server_attributes(&args),
        ),
        Command::Disk(args) => commands::resource::run(
            &ctx,
            ResourceKind::Volume,
            &args.common,
            commands::resource::disk_attributes(&args),
        ),
        Command::Router(args) => commands::resource::run(
            &ctx,
            ResourceKind::Router,
            &args.common,
            commands::resource::router_attributes(&args),
        ),
        Command::LoadBalancer(args) => commands::resource::run(
            &ctx,
            ResourceKind::LoadBalancer,
            &args.common,
            commands::resource::load_balancer_attributes(&args),
        ),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "sacloud-converge", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}
