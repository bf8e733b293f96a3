use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use convoy::conversation::ConversationStore;
use convoy::coordination::Coordinator;
use convoy::delegation::{RenderOptions, render_delegation};
use convoy::domain::{DelegationRecord, LoopStatus, MessageType};
use convoy::recovery::recover_conversation;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

fn setup_logging(level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("convoy")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("convoy.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    let mut builder = env_logger::Builder::new();
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder
        .parse_env(env_logger::Env::default())
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    if cli.is_verbose() {
        println!(
            "{} conversations in {}, debug rendering {}",
            "Config:".yellow(),
            config.storage.conversations_dir.display(),
            config.render.debug
        );
    }

    match &cli.command {
        Commands::Show { conversation, all } => handle_show_command(conversation, *all, config),
        Commands::Loops { conversation } => handle_loops_command(conversation, config),
        Commands::Recover { conversation } => handle_recover_command(conversation, config),
        Commands::Render { file, debug } => handle_render_command(file, *debug, config),
    }
}

fn open_store(conversation: &str, config: &Config) -> Result<ConversationStore> {
    ConversationStore::open(&config.storage.conversations_dir, conversation)
        .context(format!("Failed to open conversation {}", conversation))
}

fn status_label(status: LoopStatus) -> ColoredString {
    match status {
        LoopStatus::Active => status.as_str().green(),
        LoopStatus::AwaitingDelegation => status.as_str().cyan(),
        LoopStatus::Aborting | LoopStatus::Aborted => status.as_str().red(),
        LoopStatus::Completed => status.as_str().blue(),
    }
}

fn handle_show_command(conversation: &str, all: bool, config: &Config) -> Result<()> {
    info!("Showing conversation {} (all: {})", conversation, all);
    let store = open_store(conversation, config)?;

    let messages: Vec<_> = if all {
        store.messages().iter().collect()
    } else {
        store.visible_messages().collect()
    };

    if messages.is_empty() {
        println!("{}", "No messages.".yellow());
        return Ok(());
    }

    for message in messages {
        let header = format!("[{}] {}#{}", message.seq, message.owner, message.loop_number);
        let body = match message.message_type {
            MessageType::AbortNotice => message.content.red().to_string(),
            MessageType::Injected => message.content.yellow().to_string(),
            _ => message.content.clone(),
        };
        println!("{} {:?}: {}", header.dimmed(), message.message_type, body);
    }
    Ok(())
}

fn handle_loops_command(conversation: &str, config: &Config) -> Result<()> {
    info!("Listing loops in conversation {}", conversation);
    let store = open_store(conversation, config)?;

    let mut any = false;
    for record in store.loops() {
        any = true;
        let sealed = record
            .sealed_at
            .map(|seq| format!(" (sealed at {})", seq))
            .unwrap_or_default();
        println!(
            "{}#{}  {}{}",
            record.owner,
            record.loop_number,
            status_label(record.status),
            sealed
        );
    }

    if !any {
        println!("{}", "No loops recorded.".yellow());
    }
    Ok(())
}

fn handle_recover_command(conversation: &str, config: &Config) -> Result<()> {
    info!("Recovering conversation {}", conversation);
    let mut coordinator = Coordinator::with_storage_dir(&config.storage.conversations_dir);
    let abandoned =
        recover_conversation(&mut coordinator, conversation).context("Failed to recover conversation")?;

    if abandoned == 0 {
        println!("{} nothing to recover in {}", "Recover:".green(), conversation);
    } else {
        println!(
            "{} sealed {} interrupted loop(s) in {}",
            "Recover:".yellow(),
            abandoned,
            conversation
        );
    }
    Ok(())
}

fn handle_render_command(file: &Path, debug: bool, config: &Config) -> Result<()> {
    info!("Rendering delegation from {}", file.display());
    let content = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
    let record: DelegationRecord =
        serde_json::from_str(&content).context(format!("Failed to parse delegation in {}", file.display()))?;

    let options = RenderOptions {
        debug: debug || config.render.debug,
    };
    println!("{}", render_delegation(&record, options));
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
