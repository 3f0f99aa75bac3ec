//! Command-line surface of the progress tracker.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};
use progress_core::model::{CategoryFlashcards, FlashcardId};

#[derive(Debug, Parser)]
#[command(name = "app")]
#[command(about = "Track flashcard mastery and review progress", long_about = None)]
#[command(group(ArgGroup::new("backend").args(["user", "demo_dir"])))]
pub struct Cli {
    /// Signed-in user whose progress lives in the database.
    #[arg(long, env = "PROGRESS_USER", global = true)]
    pub user: Option<String>,

    /// Profile directory for an anonymous demo session.
    #[arg(long, env = "PROGRESS_DEMO_DIR", global = true)]
    pub demo_dir: Option<PathBuf>,

    /// `SQLite` URL or file path for signed-in sessions.
    #[arg(
        long = "db",
        env = "PROGRESS_DB_URL",
        default_value = "sqlite://progress.sqlite3",
        global = true
    )]
    pub db_url: String,

    /// Minutes east of UTC where the learner's day starts.
    #[arg(
        long,
        env = "PROGRESS_UTC_OFFSET_MINUTES",
        default_value_t = 0,
        allow_negative_numbers = true,
        global = true
    )]
    pub utc_offset_minutes: i32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record one answer.
    #[command(group(ArgGroup::new("outcome").required(true).args(["correct", "wrong"])))]
    Answer {
        flashcard_id: FlashcardId,
        #[arg(long)]
        correct: bool,
        #[arg(long)]
        wrong: bool,
    },

    /// Create zeroed progress for new flashcards.
    Seed {
        #[arg(required = true)]
        flashcard_ids: Vec<FlashcardId>,
    },

    /// Show overall and per-category stats.
    Stats {
        /// `name=1,2,3`; repeat for more categories.
        #[arg(long = "category", value_parser = parse_category)]
        categories: Vec<CategoryFlashcards>,
    },

    /// Show the daily goal, or set it when a value is given.
    Goal { value: Option<u32> },

    /// List flashcards due for review.
    Due {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Remove every progress record of the session's owner.
    Clear,
}

fn parse_category(raw: &str) -> Result<CategoryFlashcards, String> {
    let (name, ids) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=id,id,..., got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("category name missing in `{raw}`"));
    }
    let flashcard_ids = ids
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.parse::<FlashcardId>()
                .map_err(|e| format!("{e} in category `{name}`"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CategoryFlashcards::new(name, flashcard_ids))
}
