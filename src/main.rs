// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use video_summarize::utils::logging::{format_error, format_info, format_success, format_warning};
use video_summarize::{
    AppContext, Config, HealthStatus, NewTask, ProgressTracker, Task, TaskId, server,
};

#[derive(Parser)]
#[command(name = "video_summarize")]
#[command(author = "cipher")]
#[command(version = "0.1.0")]
#[command(about = "Keyword-driven short video summarization with live progress", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve,

    /// Run one task in this process and print its summary
    Run {
        #[arg(short, long)]
        keyword: String,

        /// Number of videos to fetch; required unless --skip-download is set
        #[arg(short = 'n', long)]
        count: Option<usize>,

        #[arg(long)]
        skip_download: bool,

        #[arg(long, default_value = "cli@localhost")]
        email: String,
    },

    /// List tasks of a requester, newest first
    Tasks {
        #[arg(long)]
        email: String,
    },

    /// Delete one task
    Delete { task_id: TaskId },

    /// Probe the task table, description log and broker
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    video_summarize::utils::logging::init_logger(cli.color, cli.verbose);
    colored::control::set_override(cli.color);

    info!("Video Summarize");
    info!("Loading configuration from: {}", cli.config.display());

    let config = if cli.config.exists() {
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using defaults and environment",
            cli.config.display()
        );
        Config::load(None).context("Failed to load configuration")?
    };

    let ephemeral = config.database.task_table_url.is_none();
    let app = AppContext::build(config)
        .await
        .context("Failed to initialize application")?;

    match cli.command {
        Commands::Serve => {
            server::serve(app).await.context("Server failed")?;
        }
        Commands::Run {
            keyword,
            count,
            skip_download,
            email,
        } => {
            cmd_run(&app, email, keyword, count, skip_download, cli.color).await?;
        }
        Commands::Tasks { email } => {
            if ephemeral {
                let notice = "No task table configured; only tasks of this process are visible";
                println!("{}", format_warning(notice));
            }
            cmd_tasks(&app, &email).await?;
        }
        Commands::Delete { task_id } => {
            app.service
                .delete_task(task_id)
                .await
                .with_context(|| format!("Failed to delete task {}", task_id))?;
            println!("{}", format_success(&format!("Deleted task {}", task_id)));
        }
        Commands::Health => {
            cmd_health(&app).await?;
        }
    }

    Ok(())
}

async fn cmd_run(
    app: &AppContext,
    email: String,
    keyword: String,
    count: Option<usize>,
    skip_download: bool,
    colored: bool,
) -> Result<()> {
    let task = app
        .service
        .create(NewTask {
            requester: email,
            keyword,
            requested_count: count,
            skip_download,
        })
        .await
        .context("Failed to create task")?;

    let mut subscription = app.service.subscribe(task.task_id).await?;
    let tracker = ProgressTracker::with_color(&task.keyword, colored);
    let renderer = tokio::spawn(async move {
        while let Some(event) = subscription.receiver.recv().await {
            tracker.handle(&event);
            if event.is_terminal() {
                break;
            }
        }
        tracker.finish();
    });

    let outcome = app.service.run(&task).await;
    if let Err(e) = renderer.await {
        warn!("Progress renderer stopped: {}", e);
    }

    match outcome {
        Ok(outcome) => {
            let report = &outcome.report;
            println!("{}", format_success(&format!("Task {} done", task.task_id)));
            println!("\n{}\n", report.summary);
            if !report.justification.is_empty() {
                println!("{}", format_info(&format!("Justification: {}", report.justification)));
            }
            if !report.exclusion.is_empty() {
                println!("{}", format_info(&format!("Exclusion: {}", report.exclusion)));
            }
            println!(
                "{}",
                format_info(&format!(
                    "{} sources, {} batches, {}s",
                    report.sources.len(),
                    outcome.stats.batch_count,
                    outcome.stats.duration_secs
                ))
            );
            Ok(())
        }
        Err(e) => {
            println!("{}", format_error(&format!("Task {} failed: {}", task.task_id, e)));
            Err(e).context("Task failed")
        }
    }
}

async fn cmd_tasks(app: &AppContext, email: &str) -> Result<()> {
    let tasks = app
        .service
        .get_tasks(email)
        .await
        .context("Failed to list tasks")?;

    if tasks.is_empty() {
        println!("{}", format_info(&format!("No tasks for {}", email)));
        return Ok(());
    }

    for task in &tasks {
        println!("{}", task_line(task));
    }
    Ok(())
}

fn task_line(task: &Task) -> String {
    let count = task
        .requested_count
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "#{:<5} {:<12} {:<24} count={:<4} {}",
        task.task_id,
        task.status.as_str(),
        task.keyword,
        count,
        task.created_at.format("%Y-%m-%d %H:%M:%S")
    )
}

async fn cmd_health(app: &AppContext) -> Result<()> {
    let report = app.health().await;
    println!("{}", report.format());

    if report.overall_status == HealthStatus::Unhealthy {
        anyhow::bail!("System is unhealthy");
    }
    Ok(())
}
