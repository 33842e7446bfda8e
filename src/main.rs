mod cli;
mod commands;
mod config;
mod model;
mod storage;
mod timer;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Cli::parse();
    let mut config = config::load_config()?;
    if let Some(store) = args.store {
        config.store_path = Some(store);
    }

    let command = args.command.unwrap_or(cli::Command::List {
        page: None,
        state: cli::StateFilter::All,
    });
    match command {
        cli::Command::Init { title } => commands::init(&config, title),
        cli::Command::List { page, state } => commands::list(&config, page, state),
        cli::Command::Pages => commands::pages(&config),
        cli::Command::Add {
            name,
            timer,
            reward,
            at,
            page,
        } => commands::add(&config, name, timer, reward, at, page),
        cli::Command::Start(target) => commands::start(&config, target),
        cli::Command::Done(target) => commands::done(&config, target),
        cli::Command::Delete(target) => commands::delete(&config, target),
        cli::Command::Page { action } => commands::page(&config, action),
        cli::Command::Tick => commands::tick(&config),
        cli::Command::Single { file, action } => commands::single(&config, file, action),
    }
}
