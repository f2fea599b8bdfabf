mod config;
mod error;
mod feeder;
mod logging;
mod pool;
mod report;
mod sim;
mod sink;
mod task_queue;
mod task_source;
mod types;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "taskpool-sim")]
#[command(about = "Simulate a task stream on a fixed worker pool with a bounded queue")]
#[command(version, subcommand_negates_reqs = true)]
struct Cli {
    /// Task file: one `id arrival_delay execution_duration` record per line.
    ///
    /// A file literally named `bench` is read as the subcommand; pass it as
    /// `./bench` instead.
    #[arg(required = true)]
    task_file: Option<PathBuf>,

    /// Pool configuration (`num_threads=` and `queue_size=` lines)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log file (defaults to `log_<task file>` next to the task file)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Do not mirror log lines to stdout
    #[arg(long, short)]
    quiet: bool,

    /// Raise diagnostic verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run synthetic workloads and print CSV metrics
    Bench {
        /// Comma-separated worker counts to sweep (e.g. 1,2,4)
        #[arg(long, default_value = "1,2,4")]
        threads: String,

        /// Queue capacity
        #[arg(long, default_value_t = 8)]
        queue_size: usize,

        /// Number of tasks per run
        #[arg(long, default_value_t = 100)]
        tasks: usize,

        /// Execution time of each task in milliseconds
        #[arg(long, default_value_t = 5)]
        exec_ms: u64,

        /// Arrival delay before each task in milliseconds
        #[arg(long, default_value_t = 0)]
        arrival_ms: u64,
    },
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::Bench {
            threads,
            queue_size,
            tasks,
            exec_ms,
            arrival_ms,
        }) => {
            let thread_sets = sim::parse_count_list(&threads).map_err(|msg| anyhow!(msg))?;
            sim::run_benchmark(&sim::BenchOptions {
                thread_sets,
                queue_size,
                tasks,
                exec_ms,
                arrival_ms,
            })?;
        }
        None => {
            let task_file = cli
                .task_file
                .ok_or_else(|| anyhow!("missing task file argument"))?;
            let summary = sim::run_file(&sim::RunOptions {
                task_file,
                config_path: cli.config,
                log_file: cli.log_file,
                mirror_console: !cli.quiet,
            })?;
            info!(
                completed = summary.report.completed,
                remaining = summary.report.remaining,
                backpressure_waits = summary.feed.backpressure_waits,
                log = %summary.log_file.display(),
                "simulation finished"
            );
            if summary.rejected_records > 0 {
                eprintln!(
                    "skipped {} malformed task record(s); see warnings above",
                    summary.rejected_records
                );
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
