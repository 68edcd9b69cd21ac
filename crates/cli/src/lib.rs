pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "slotguard",
    about = "Slotguard operator CLI",
    long_about = "Operate the review-slot guard: migrations, config inspection, one-off sweeps, whitelists, settings and request listings.",
    after_help = "Examples:\n  slotguard migrate\n  slotguard whitelist add --reviewer alice --project go-concurrency\n  slotguard requests list --status WAITING_FOR_APPROVE"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Run one sweep pass over in-flight review requests")]
    Sweep,
    #[command(subcommand, about = "Manage a reviewer's project whitelist")]
    Whitelist(WhitelistCommand),
    #[command(subcommand, about = "Inspect or change a reviewer's settings")]
    Settings(SettingsCommand),
    #[command(subcommand, about = "Inspect tracked review requests")]
    Requests(RequestsCommand),
}

#[derive(Debug, Subcommand)]
enum WhitelistCommand {
    List {
        #[arg(long)]
        reviewer: String,
    },
    Add {
        #[arg(long)]
        reviewer: String,
        #[arg(long, conflicts_with = "family", required_unless_present = "family")]
        project: Option<String>,
        #[arg(long)]
        family: Option<String>,
    },
    Remove {
        #[arg(long)]
        reviewer: String,
        #[arg(long)]
        name: String,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    Show {
        #[arg(long)]
        reviewer: String,
    },
    Set {
        #[arg(long)]
        reviewer: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
    },
}

#[derive(Debug, Subcommand)]
enum RequestsCommand {
    List {
        #[arg(long)]
        reviewer: Option<String>,
        #[arg(long = "status", help = "Status filter; repeatable. Defaults to in-flight statuses")]
        statuses: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Sweep => commands::sweep::run(),
        Command::Whitelist(WhitelistCommand::List { reviewer }) => commands::whitelist::list(&reviewer),
        Command::Whitelist(WhitelistCommand::Add { reviewer, project, family }) => {
            commands::whitelist::add(&reviewer, project.as_deref(), family.as_deref())
        }
        Command::Whitelist(WhitelistCommand::Remove { reviewer, name }) => {
            commands::whitelist::remove(&reviewer, &name)
        }
        Command::Settings(SettingsCommand::Show { reviewer }) => commands::settings::show(&reviewer),
        Command::Settings(SettingsCommand::Set { reviewer, key, value }) => {
            commands::settings::set(&reviewer, &key, &value)
        }
        Command::Requests(RequestsCommand::List { reviewer, statuses }) => {
            commands::requests::list(reviewer.as_deref(), &statuses)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
