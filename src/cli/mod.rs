pub mod blocklist;
pub mod process;
pub mod report;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use process::{host_executable_path, kill_previous_hosts};
use report::{process_report_command, ReportCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    host::start_host,
    utils::{dir::create_application_default_path, logging::enable_console_logging},
};

#[derive(Parser, Debug)]
#[command(name = "Webtime", version, long_about = None)]
#[command(about = "Per-domain screen time tracking and domain blocking", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(
        about = "Run the native messaging host in the current console, reading browser events from stdin. Browsers registered against the webtime-host binary spawn it themselves"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Stop currently running host processes")]
    Stop {},
    #[command(about = "Display recorded screen time per day and domain")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(about = "Add a domain to the block list; the host closes its tabs")]
    Block { domain: String },
    #[command(about = "Remove a domain from the block list")]
    Unblock { domain: String },
    #[command(about = "List blocked domains")]
    Blocked {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_console_logging(logging_level);

    match args.commands {
        Commands::Serve { dir } => {
            let dir = dir.map_or_else(create_application_default_path, Ok)?;
            start_host(dir).await
        }
        Commands::Stop {} => {
            kill_previous_hosts(&host_executable_path()?);
            Ok(())
        }
        Commands::Report { command } => process_report_command(command).await,
        Commands::Block { domain } => blocklist::process_block_command(&domain).await,
        Commands::Unblock { domain } => blocklist::process_unblock_command(&domain).await,
        Commands::Blocked {} => blocklist::process_blocked_command().await,
    }
}
