use std::fmt;
use std::sync::Arc;

use clap::Parser;
use progress_core::model::{ProgressRecord, StatsReport, UserId};
use services::{
    Clock, ProgressServiceError, ProgressSession, SessionConfig, SessionKind, StatsConfig,
};
use storage::local::{FileMedium, KeyValueMedium, MemoryMedium};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::{Cli, Command};

#[derive(Debug)]
enum ArgsError {
    InvalidDbUrl { raw: String },
    InvalidUtcOffset { minutes: i32 },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUtcOffset { minutes } => {
                write!(f, "invalid UTC offset: {minutes} minutes")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn session_kind(cli: &Cli) -> Result<SessionKind, Box<dyn std::error::Error>> {
    if let Some(user) = &cli.user {
        let database_url = normalize_sqlite_url(&cli.db_url);
        prepare_sqlite_file(&database_url)?;
        return Ok(SessionKind::SignedIn {
            user: UserId::new(user.clone()).map_err(progress_core::Error::from)?,
            database_url,
        });
    }

    // Without a profile directory the demo lives only as long as the process.
    let medium: Arc<dyn KeyValueMedium> = match &cli.demo_dir {
        Some(dir) => Arc::new(FileMedium::open(dir.clone())?),
        None => Arc::new(MemoryMedium::new()),
    };
    Ok(SessionKind::Demo { medium })
}

fn print_record(record: &ProgressRecord) {
    println!(
        "flashcard {}: level {} ({}), {} correct / {} wrong, next review {}",
        record.flashcard_id(),
        record.mastery_level(),
        record.bucket().as_str(),
        record.correct_answers(),
        record.incorrect_answers(),
        record.next_review_at().to_rfc3339(),
    );
}

fn print_report(report: &StatsReport) {
    let overall = &report.overall;
    println!(
        "overall: {} flashcards, {} mastered, {} in progress, {} untouched, average level {:.2}",
        overall.total,
        overall.mastered,
        overall.in_progress,
        overall.untouched,
        overall.average_mastery_level(),
    );
    for category in &report.categories {
        println!(
            "  {}: {} flashcards, {} mastered, {} in progress, {} untouched, average level {:.2}",
            category.name,
            category.total,
            category.mastered,
            category.in_progress,
            category.untouched,
            category.average_mastery_level,
        );
    }
    println!(
        "reviewed today: {} / {}{}",
        report.reviewed_today,
        report.daily_goal,
        if report.goal_reached() { " (goal reached)" } else { "" }
    );
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let stats = StatsConfig::default()
        .with_offset_minutes(cli.utc_offset_minutes)
        .ok_or(ArgsError::InvalidUtcOffset {
            minutes: cli.utc_offset_minutes,
        })?;
    let config = SessionConfig {
        clock: Clock::default_clock(),
        stats,
        ..SessionConfig::default()
    };

    let session = ProgressSession::open(session_kind(&cli)?, config).await?;
    info!(owner = %session.owner(), available = session.is_available(), "session ready");

    match cli.command {
        Command::Answer {
            flashcard_id,
            correct,
            ..
        } => {
            let record = session.record_answer(flashcard_id, correct).await?;
            print_record(&record);
        }
        Command::Seed { flashcard_ids } => {
            let seeded = session.seed_new_flashcards(&flashcard_ids).await?;
            println!("seeded {} flashcards", seeded.len());
        }
        Command::Stats { categories } => {
            let report = session.get_stats(&categories).await?;
            print_report(&report);
        }
        Command::Goal { value: Some(value) } => {
            let goal = session.set_daily_goal(value).await?;
            println!("daily goal set to {goal}");
        }
        Command::Goal { value: None } => {
            println!("daily goal: {}", session.get_daily_goal().await?);
        }
        Command::Due { limit } => {
            let due = session.due_flashcards(limit).await?;
            if due.is_empty() {
                println!("nothing due");
            }
            for record in &due {
                print_record(record);
            }
        }
        Command::Clear => {
            session.clear_progress().await?;
            println!("progress cleared");
        }
    }
    Ok(())
}

/// Append the failure classification to service errors.
fn describe_error(err: &(dyn std::error::Error + 'static)) -> String {
    match err.downcast_ref::<ProgressServiceError>() {
        Some(service_err) => format!("{err} [{}]", service_err.reason().as_str()),
        None => err.to_string(),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run().await {
        eprintln!("{}", describe_error(err.as_ref()));
        std::process::exit(2);
    }
}
