use std::sync::Arc;

use tracing::info;

use progress_core::model::{
    CategoryFlashcards, DailyGoal, FlashcardId, Owner, ProgressRecord, ProgressStats, StatsReport,
    UserId,
};
use storage::Storage;
use storage::local::KeyValueMedium;

use crate::config::SessionConfig;
use crate::error::{ProgressServiceError, SessionInitError};
use crate::progress_service::ProgressService;
use crate::stats_service::StatsService;

/// How a session is backed.
#[derive(Clone)]
pub enum SessionKind {
    /// A signed-in learner whose progress lives in the shared database.
    SignedIn { user: UserId, database_url: String },
    /// An anonymous session kept on a single-profile local medium.
    Demo { medium: Arc<dyn KeyValueMedium> },
}

/// Per-session assembly of the progress and stats services.
///
/// Callers pick a `SessionKind` once; every operation afterwards is bound to
/// the session's owner and knows nothing about the backend.
#[derive(Clone)]
pub struct ProgressSession {
    owner: Owner,
    progress: ProgressService,
    stats: StatsService,
}

impl ProgressSession {
    /// Open the backend for `kind` and wire the services onto it.
    ///
    /// # Errors
    ///
    /// Returns `SessionInitError` if the database cannot be opened or migrated.
    pub async fn open(kind: SessionKind, config: SessionConfig) -> Result<Self, SessionInitError> {
        let (owner, storage) = match kind {
            SessionKind::SignedIn { user, database_url } => {
                let storage = Storage::sqlite(&database_url).await?;
                (Owner::User(user), storage)
            }
            SessionKind::Demo { medium } => (Owner::Anonymous, Storage::local(medium)),
        };
        info!(%owner, "progress session opened");
        Ok(Self::from_storage(owner, storage, config))
    }

    /// Assemble a session on an already opened storage.
    #[must_use]
    pub fn from_storage(owner: Owner, storage: Storage, config: SessionConfig) -> Self {
        let progress = ProgressService::new(config.clock, storage.progress.clone())
            .with_config(config.progress);
        let stats = StatsService::new(config.clock, storage.progress, storage.goals)
            .with_config(config.stats);
        Self {
            owner,
            progress,
            stats,
        }
    }

    #[must_use]
    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.progress.is_available()
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressService {
        &self.progress
    }

    #[must_use]
    pub fn stats(&self) -> &StatsService {
        &self.stats
    }

    /// # Errors
    ///
    /// See [`ProgressService::record_answer`].
    pub async fn record_answer(
        &self,
        flashcard_id: FlashcardId,
        is_correct: bool,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        self.progress
            .record_answer(flashcard_id, &self.owner, is_correct)
            .await
    }

    /// # Errors
    ///
    /// See [`ProgressService::seed_new_flashcards`].
    pub async fn seed_new_flashcards(
        &self,
        flashcard_ids: &[FlashcardId],
    ) -> Result<Vec<ProgressRecord>, ProgressServiceError> {
        self.progress
            .seed_new_flashcards(flashcard_ids, &self.owner)
            .await
    }

    /// # Errors
    ///
    /// See [`StatsService::aggregate`].
    pub async fn get_stats(
        &self,
        categories: &[CategoryFlashcards],
    ) -> Result<StatsReport, ProgressServiceError> {
        self.stats.aggregate(categories, &self.owner).await
    }

    /// # Errors
    ///
    /// See [`StatsService::stats_for`].
    pub async fn stats_for(
        &self,
        flashcard_ids: &[FlashcardId],
    ) -> Result<ProgressStats, ProgressServiceError> {
        self.stats.stats_for(flashcard_ids, &self.owner).await
    }

    /// # Errors
    ///
    /// See [`StatsService::reviewed_today`].
    pub async fn reviewed_today(&self) -> Result<u32, ProgressServiceError> {
        self.stats.reviewed_today(&self.owner).await
    }

    /// # Errors
    ///
    /// See [`StatsService::daily_goal`].
    pub async fn get_daily_goal(&self) -> Result<DailyGoal, ProgressServiceError> {
        self.stats.daily_goal(&self.owner).await
    }

    /// # Errors
    ///
    /// See [`StatsService::set_daily_goal`].
    pub async fn set_daily_goal(&self, goal: u32) -> Result<DailyGoal, ProgressServiceError> {
        self.stats.set_daily_goal(&self.owner, goal).await
    }

    /// # Errors
    ///
    /// See [`ProgressService::clear_progress`].
    pub async fn clear_progress(&self) -> Result<(), ProgressServiceError> {
        self.progress.clear_progress(&self.owner).await
    }

    /// # Errors
    ///
    /// See [`ProgressService::due_flashcards`].
    pub async fn due_flashcards(
        &self,
        limit: u32,
    ) -> Result<Vec<ProgressRecord>, ProgressServiceError> {
        self.progress.due_flashcards(&self.owner, limit).await
    }

    /// # Errors
    ///
    /// See [`ProgressService::progress_for`].
    pub async fn progress_for(
        &self,
        flashcard_id: FlashcardId,
    ) -> Result<Option<ProgressRecord>, ProgressServiceError> {
        self.progress.progress_for(flashcard_id, &self.owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::time::fixed_clock;
    use storage::local::MemoryMedium;

    fn config() -> SessionConfig {
        SessionConfig {
            clock: fixed_clock(),
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn demo_sessions_are_anonymous() {
        let session = ProgressSession::open(
            SessionKind::Demo {
                medium: Arc::new(MemoryMedium::new()),
            },
            config(),
        )
        .await
        .unwrap();
        assert!(session.owner().is_anonymous());
        assert!(session.is_available());
    }

    #[tokio::test]
    async fn signed_in_sessions_use_the_database() {
        let user = UserId::new("learner-7").unwrap();
        let session = ProgressSession::open(
            SessionKind::SignedIn {
                user: user.clone(),
                database_url: "sqlite:file:memdb_session_open?mode=memory&cache=shared".into(),
            },
            config(),
        )
        .await
        .unwrap();
        assert_eq!(session.owner(), &Owner::User(user));

        let record = session
            .record_answer(FlashcardId::new(3), false)
            .await
            .unwrap();
        assert_eq!(record.incorrect_answers(), 1);
        assert_eq!(record.mastery_level().value(), 0);
    }
}
