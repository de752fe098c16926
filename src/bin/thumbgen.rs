//! Command-line client for the thumbnail service.
//!
//! Keeps its state (draft prompt, reference image, active job, cached
//! results) in a local directory so an interrupted run can be resumed.

use base64::Engine;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use thumbnail_gen::client::{
    api::HttpThumbnailApi,
    poller::{ClientPoller, PollConfig, PollError, PollerState, Resolution},
    session::{ClientSession, FileSessionStore},
};
use thumbnail_gen::services::images;

#[derive(Parser)]
#[command(name = "thumbgen", about = "Generate YouTube thumbnails from a prompt")]
struct Cli {
    /// Base URL of the thumbnail service
    #[arg(long, env = "THUMBGEN_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Bearer token sent with every request
    #[arg(long, env = "THUMBGEN_TOKEN")]
    token: Option<String>,

    /// Directory holding the client session
    #[arg(long, env = "THUMBGEN_STATE_DIR", default_value = ".thumbgen")]
    state_dir: PathBuf,

    /// Delay between status checks, in milliseconds
    #[arg(long, default_value_t = 2000)]
    interval_ms: u64,

    /// Status checks before giving up on a job
    #[arg(long, default_value_t = 60)]
    max_attempts: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a prompt and wait for the thumbnails
    Generate {
        prompt: String,
        /// Optional reference image to steer the style
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Continue polling the job left by an interrupted run
    Resume,
    /// Show the saved session
    Status,
    /// Forget the saved prompt and reference image
    ClearDraft,
    /// Manage cached results
    Results {
        #[command(subcommand)]
        action: ResultsAction,
    },
}

#[derive(Subcommand)]
enum ResultsAction {
    List,
    Remove { index: usize },
    Clear,
    /// Write every cached image to a directory
    Export {
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let session = ClientSession::new(Arc::new(FileSessionStore::open(&cli.state_dir)?));
    let api = Arc::new(HttpThumbnailApi::new(&cli.api_url, cli.token.clone())?);
    let poller = ClientPoller::new(
        api,
        session.clone(),
        PollConfig {
            interval: Duration::from_millis(cli.interval_ms),
            max_attempts: cli.max_attempts,
        },
    );

    match cli.command {
        Command::Generate { prompt, image } => {
            let image = image.as_deref().map(read_image).transpose()?;
            let progress = spawn_progress(&poller);

            // Finish whatever the last run left behind before starting anew.
            if let Some(resolution) = poller.resume().await.or_else(report_lost)? {
                print_resolution(&resolution);
            }

            let result = poller.submit(&prompt, image).await;
            progress.abort();
            print_resolution(&result?);
        }
        Command::Resume => {
            let progress = spawn_progress(&poller);
            let result = poller.resume().await;
            progress.abort();
            match result? {
                Some(resolution) => print_resolution(&resolution),
                None => println!("No job in progress"),
            }
        }
        Command::Status => {
            let snapshot = session.snapshot()?;
            println!("prompt:      {}", snapshot.prompt.as_deref().unwrap_or("-"));
            println!(
                "image:       {}",
                if snapshot.input_image.is_some() { "set" } else { "-" }
            );
            match snapshot.active_job {
                Some(job_id) => println!("active job:  {job_id}"),
                None => println!("active job:  -"),
            }
            println!("results:     {}", snapshot.results.len());
        }
        Command::ClearDraft => {
            session.clear_draft()?;
            println!("Cleared draft");
        }
        Command::Results { action } => match action {
            ResultsAction::List => {
                for (index, image) in session.results()?.iter().enumerate() {
                    println!("[{index}] {}", preview(image));
                }
            }
            ResultsAction::Remove { index } => match session.remove_result(index)? {
                Some(_) => println!("Removed result {index}"),
                None => println!("No result at index {index}"),
            },
            ResultsAction::Clear => {
                session.clear_results()?;
                println!("Cleared results");
            }
            ResultsAction::Export { out } => {
                std::fs::create_dir_all(&out)?;
                for (index, image) in session.results()?.iter().enumerate() {
                    let (bytes, extension) = images::decode_to_bytes(image)?;
                    let path = out.join(format!("thumbnail-{index}.{extension}"));
                    std::fs::write(&path, bytes)?;
                    println!("{}", path.display());
                }
            }
        },
    }

    Ok(())
}

/// Read an image file into a data URL, rejecting anything that is not a
/// recognized image.
fn read_image(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    let image = images::decode_reference_image(&encoded)?;
    Ok(images::to_data_url(image.mime_type, &image.base64))
}

/// A lost or timed-out previous job should not block a new submission.
fn report_lost(error: PollError) -> Result<Option<Resolution>, PollError> {
    match error {
        PollError::JobLost { .. } | PollError::TimedOut { .. } => {
            eprintln!("{error}");
            Ok(None)
        }
        other => Err(other),
    }
}

fn spawn_progress(poller: &ClientPoller) -> tokio::task::JoinHandle<()> {
    let mut state = poller.subscribe();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = state.borrow_and_update().clone();
            match current {
                PollerState::Submitting => eprintln!("Submitting..."),
                PollerState::Polling { job_id, attempt } if attempt > 0 => {
                    eprintln!("Waiting for job {job_id} (check {attempt})")
                }
                _ => {}
            }
        }
    })
}

fn print_resolution(resolution: &Resolution) {
    match resolution {
        Resolution::Completed { job_id, results } => {
            println!("Job {job_id} completed with {} image(s)", results.len());
            println!("Use `thumbgen results export` to save them");
        }
        Resolution::Failed { job_id, message } => {
            println!("Job {job_id} failed: {message}");
        }
    }
}

fn preview(image: &str) -> String {
    let head: String = image.chars().take(48).collect();
    format!("{head}... ({} bytes)", image.len())
}
