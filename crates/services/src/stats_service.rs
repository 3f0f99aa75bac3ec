use std::sync::Arc;

use tracing::{debug, warn};

use progress_core::{
    model::{
        CategoryFlashcards, CategoryRollup, DailyGoal, FlashcardId, Owner, ProgressStats,
        StatsReport,
    },
    time::{Clock, local_day_bounds},
};
use storage::repository::{DailyGoalRepository, ProgressRepository};

use crate::config::StatsConfig;
use crate::error::ProgressServiceError;

/// Read-side aggregation over the progress store.
#[derive(Clone)]
pub struct StatsService {
    clock: Clock,
    config: StatsConfig,
    progress: Arc<dyn ProgressRepository>,
    goals: Arc<dyn DailyGoalRepository>,
}

impl StatsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        goals: Arc<dyn DailyGoalRepository>,
    ) -> Self {
        Self {
            clock,
            config: StatsConfig::default(),
            progress,
            goals,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: StatsConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the full dashboard report for `owner`.
    ///
    /// Each category is tallied on its own, so a flashcard listed in two
    /// categories counts in both and `overall` is the sum of the rollups.
    /// An unavailable store yields a zeroed report that keeps the category
    /// names.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` for store failures other than
    /// unavailability.
    pub async fn aggregate(
        &self,
        categories: &[CategoryFlashcards],
        owner: &Owner,
    ) -> Result<StatsReport, ProgressServiceError> {
        match self.try_aggregate(categories, owner).await {
            Err(err) if err.is_unavailable() => {
                warn!(%owner, "progress storage unavailable; reporting empty stats");
                Ok(Self::degraded(categories, self.config.default_daily_goal))
            }
            other => other,
        }
    }

    async fn try_aggregate(
        &self,
        categories: &[CategoryFlashcards],
        owner: &Owner,
    ) -> Result<StatsReport, ProgressServiceError> {
        let mut overall = ProgressStats::default();
        let mut rollups = Vec::with_capacity(categories.len());
        for category in categories {
            let stats = self
                .progress
                .stats_for(&category.flashcard_ids, owner)
                .await?;
            overall = overall.merged(stats);
            rollups.push(CategoryRollup::from_stats(category.name.clone(), &stats));
        }

        let reviewed_today = self.reviewed_today(owner).await?;
        let daily_goal = self.daily_goal(owner).await?;
        debug!(
            %owner,
            categories = rollups.len(),
            total = overall.total,
            reviewed_today,
            "aggregated progress stats"
        );

        Ok(StatsReport {
            overall,
            categories: rollups,
            reviewed_today,
            daily_goal,
        })
    }

    fn degraded(categories: &[CategoryFlashcards], daily_goal: DailyGoal) -> StatsReport {
        let zero = ProgressStats::default();
        StatsReport {
            categories: categories
                .iter()
                .map(|c| CategoryRollup::from_stats(c.name.clone(), &zero))
                .collect(),
            ..StatsReport::empty(daily_goal)
        }
    }

    /// Bucket counts for an arbitrary set of flashcards.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` for store failures other than
    /// unavailability.
    pub async fn stats_for(
        &self,
        flashcard_ids: &[FlashcardId],
        owner: &Owner,
    ) -> Result<ProgressStats, ProgressServiceError> {
        match self.progress.stats_for(flashcard_ids, owner).await {
            Ok(stats) => Ok(stats),
            Err(err) => {
                let err = ProgressServiceError::from(err);
                if err.is_unavailable() {
                    warn!(%owner, "progress storage unavailable; reporting empty stats");
                    Ok(ProgressStats::default())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Flashcards answered during the current local calendar day; 0 when
    /// the store is unavailable.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` for store failures other than
    /// unavailability.
    pub async fn reviewed_today(&self, owner: &Owner) -> Result<u32, ProgressServiceError> {
        let (start, end) = local_day_bounds(self.clock.now(), self.config.utc_offset);
        match self.progress.reviewed_between(owner, start, end).await {
            Ok(count) => Ok(count),
            Err(err) => {
                let err = ProgressServiceError::from(err);
                if err.is_unavailable() {
                    warn!(%owner, "progress storage unavailable; reporting nothing reviewed today");
                    Ok(0)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// The owner's goal, or the configured default when none was set.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` for store failures other than
    /// unavailability.
    pub async fn daily_goal(&self, owner: &Owner) -> Result<DailyGoal, ProgressServiceError> {
        match self.goals.get_daily_goal(owner).await {
            Ok(goal) => Ok(goal.unwrap_or(self.config.default_daily_goal)),
            Err(err) => {
                let err = ProgressServiceError::from(err);
                if err.is_unavailable() {
                    Ok(self.config.default_daily_goal)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Validate and persist a new daily goal.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::DailyGoal` for a goal of 0 and
    /// `ProgressServiceError::Storage` if it cannot be written.
    pub async fn set_daily_goal(
        &self,
        owner: &Owner,
        goal: u32,
    ) -> Result<DailyGoal, ProgressServiceError> {
        let goal = DailyGoal::new(goal)?;
        self.goals.set_daily_goal(owner, goal).await?;
        debug!(%owner, %goal, "daily goal updated");
        Ok(goal)
    }
}
