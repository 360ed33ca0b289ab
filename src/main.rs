use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use queuectl::error::{QueueError, Result};
use queuectl::queue::{Job, JobQueue, JobSpec, JobState, ListFilter};
use queuectl::shutdown::install_shutdown_handler;
use queuectl::worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "queuectl")]
#[command(about = "A single-host background job queue with retries and a dead letter queue")]
struct Args {
    /// Directory holding queue state (default: $QUEUECTL_DATA_DIR or ./.queuectl)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enqueue a job from a JSON spec, e.g. '{"id":"job1","command":"echo hi"}'
    Enqueue {
        /// Job spec with "id", "command" and optional "max_retries"
        spec: String,
    },
    /// Manage worker processes
    Worker {
        #[command(subcommand)]
        command: WorkerCommand,
    },
    /// Show queue statistics and configuration
    Status,
    /// List jobs in the active set
    List {
        /// Filter by state (pending, processing, completed, failed, dead)
        #[arg(long)]
        state: Option<JobState>,

        /// Maximum number of jobs to display
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Manage the dead letter queue
    Dlq {
        #[command(subcommand)]
        command: DlqCommand,
    },
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum WorkerCommand {
    /// Start one or more workers and supervise them until signalled
    Start {
        /// Number of workers to start
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

#[derive(Subcommand, Debug)]
enum DlqCommand {
    /// List jobs in the dead letter queue
    List {
        /// Maximum number of jobs to display
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Move a job from the dead letter queue back to the active set
    Retry { id: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show the current configuration
    Show,
    /// Set a configuration value (max-retries, backoff-base, backoff-max-delay)
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn data_dir(args: &Args) -> PathBuf {
    args.data_dir
        .clone()
        .or_else(|| std::env::var_os("QUEUECTL_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(".queuectl"))
}

async fn run(args: Args) -> Result<()> {
    let root = data_dir(&args);

    match args.command {
        Command::Enqueue { spec } => {
            let spec: JobSpec = serde_json::from_str(&spec)
                .map_err(|err| QueueError::Validation(format!("Invalid job spec: {err}")))?;
            let job = JobQueue::open(&root)?.enqueue(spec)?;
            println!("Job {} enqueued", job.id);
        }
        Command::Worker {
            command: WorkerCommand::Start { count },
        } => {
            if count < 1 {
                return Err(QueueError::Validation(
                    "Worker count must be at least 1".to_string(),
                ));
            }
            run_workers(&root, count).await?;
        }
        Command::Status => {
            let queue = JobQueue::open(&root)?;
            let stats = queue.stats()?;
            let config = queue.config()?;

            println!("Total jobs:       {}", stats.total);
            println!("  Pending:        {}", stats.pending);
            println!("  Processing:     {}", stats.processing);
            println!("  Completed:      {}", stats.completed);
            println!("  Failed:         {}", stats.failed);
            println!("  Dead (DLQ):     {}", stats.dead);
            println!();
            println!("Configuration:");
            println!("  max-retries:       {}", config.max_retries);
            println!("  backoff-base:      {}", config.backoff_base);
            println!("  backoff-max-delay: {}s", config.backoff_max_delay);
        }
        Command::List { state, limit } => {
            let jobs = JobQueue::open(&root)?.list(ListFilter {
                state,
                limit: Some(limit),
            })?;
            if jobs.is_empty() {
                println!("No jobs found");
            } else {
                print_job_table(&jobs);
            }
        }
        Command::Dlq {
            command: DlqCommand::List { limit },
        } => {
            let jobs = JobQueue::open(&root)?.dlq_list(Some(limit))?;
            if jobs.is_empty() {
                println!("Dead letter queue is empty");
            } else {
                print_dlq_table(&jobs);
            }
        }
        Command::Dlq {
            command: DlqCommand::Retry { id },
        } => {
            JobQueue::open(&root)?.dlq_requeue(&id)?;
            println!("Job {id} moved back to queue for retry");
        }
        Command::Config {
            command: ConfigCommand::Show,
        } => {
            let config = JobQueue::open(&root)?.config()?;
            println!("max-retries:       {}", config.max_retries);
            println!("backoff-base:      {}", config.backoff_base);
            println!("backoff-max-delay: {}s", config.backoff_max_delay);
        }
        Command::Config {
            command: ConfigCommand::Set { key, value },
        } => {
            JobQueue::open(&root)?.update_config(&key, &value)?;
            println!("Configuration updated: {key} = {value}");
        }
    }

    Ok(())
}

async fn run_workers(root: &PathBuf, count: usize) -> Result<()> {
    let shutdown = install_shutdown_handler();

    let mut handles = Vec::with_capacity(count);
    for worker_id in 1..=count {
        let queue = JobQueue::open(root)?;
        let worker = Worker::new(worker_id, queue);
        handles.push(tokio::spawn(worker.run(shutdown.clone())));
    }
    tracing::info!(count, data_dir = %root.display(), "Workers started");

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

fn print_job_table(jobs: &[Job]) {
    println!(
        "{:<20} {:<12} {:<9} {:<20}",
        "ID", "STATE", "ATTEMPTS", "CREATED"
    );
    for job in jobs {
        println!(
            "{:<20} {:<12} {:<9} {:<20}",
            job.id,
            job.state.to_string(),
            job.attempts,
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
}

fn print_dlq_table(jobs: &[Job]) {
    println!(
        "{:<20} {:<30} {:<9} {:<30}",
        "ID", "COMMAND", "ATTEMPTS", "ERROR"
    );
    for job in jobs {
        let command: String = job.command.chars().take(30).collect();
        let error: String = job
            .error_message
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(30)
            .collect();
        println!(
            "{:<20} {:<30} {:<9} {:<30}",
            job.id, command, job.attempts, error
        );
    }
}
