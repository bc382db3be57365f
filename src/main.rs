use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use colored::*;

use queuedash::core::store::{DEFAULT_CLEANUP_DAYS, DEFAULT_STALE_TIMEOUT_MINUTES};
use queuedash::core::tasks::{Backend, ParseMethod, ResultFormat, DEFAULT_LIST_LIMIT};
use queuedash::core::TaskStatus;
use queuedash::telemetry;

mod commands;

#[derive(Parser)]
#[command(name = "queuedash", version)]
#[command(about = "Dashboard and control CLI for a document-processing task queue", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Task service base URL (overrides config and QUEUEDASH_API_URL)
    #[arg(long = "base-url", global = true)]
    base_url: Option<String>,

    /// Bearer token (overrides config and QUEUEDASH_API_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,

    /// Never show desktop notifications
    #[arg(long = "no-desktop", global = true)]
    no_desktop: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload documents for processing
    Submit(SubmitArgs),
    /// Show one or more tasks
    Status {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Result representation to include
        #[arg(long, value_enum, default_value_t = ResultFormat::Markdown)]
        format: ResultFormat,
        /// Ask the service to upload result images (not idempotent)
        #[arg(long)]
        upload_images: bool,
        /// Print the result content of completed tasks
        #[arg(long)]
        content: bool,
    },
    /// Block until a task finishes
    Wait {
        id: String,
        /// Seconds between polls
        #[arg(long, default_value = "2")]
        interval: u64,
        #[arg(long, value_enum, default_value_t = ResultFormat::Markdown)]
        format: ResultFormat,
        #[arg(long)]
        content: bool,
    },
    /// Request cancellation of tasks
    Cancel {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// List tasks in the queue
    List {
        /// Only tasks in this status
        #[arg(short, long)]
        status: Option<TaskStatus>,
        #[arg(short, long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Queue counters
    Stats,
    /// Live queue counters until Ctrl+C
    Watch {
        /// Refresh interval in milliseconds (defaults to the configured one)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Recover tasks stuck in processing
    ResetStale {
        #[arg(long = "timeout-minutes", default_value_t = DEFAULT_STALE_TIMEOUT_MINUTES)]
        timeout_minutes: u32,
    },
    /// Purge old finished tasks
    Cleanup {
        #[arg(long, default_value_t = DEFAULT_CLEANUP_DAYS)]
        days: u32,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Service health
    Health,
    /// Available processing engines
    Engines,
    /// Configuration panel
    Config,
}

#[derive(Args)]
struct SubmitArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    /// OCR language
    #[arg(long)]
    lang: Option<String>,

    #[arg(long, value_enum)]
    method: Option<ParseMethod>,

    #[arg(long = "no-formula")]
    no_formula: bool,

    #[arg(long = "no-table")]
    no_table: bool,

    #[arg(short, long)]
    priority: Option<i32>,

    /// Extra backend field as KEY=VALUE (repeatable)
    #[arg(short = 'F', long = "field")]
    fields: Vec<String>,

    /// Wait for every submitted task to finish
    #[arg(short, long)]
    wait: bool,

    /// Seconds between polls with --wait
    #[arg(long, default_value = "2")]
    interval: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = telemetry::init(cli.verbose, cli.quiet) {
        eprintln!("{} Logging disabled: {}", "[!]".yellow(), e);
    }

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // already shown through the notifier
            if !e.is::<commands::Reported>() {
                eprintln!("{} {:#}", "[✗]".red(), e);
            }
            ExitCode::FAILURE
        }
    }
}
