mod cli;
mod commands;
mod config;
mod directory;
mod engine;
mod error;
mod privilege;
mod runner;
mod schema;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use commands::apply::ApplyArgs;
use config::ConfigSource;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_timestamp(None)
        .init();

    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            ui::error_chain(&e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Some(Command::Completions { shell }) = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "provisioner", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    if cli.print_schema {
        commands::schema::run()?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(config) = cli.config.as_deref() else {
        anyhow::bail!("no config given; pass --config <PATH> or set PROVISIONER_CONFIG");
    };

    let ctx = Context { debug: cli.debug };
    let args = ApplyArgs {
        source: ConfigSource::parse(config),
        dry_run: cli.dry_run,
        no_confirm: cli.no_confirm,
        jobs: usize::from(cli.jobs),
        json: cli.json,
    };
    commands::apply::run(&ctx, &args)
}
