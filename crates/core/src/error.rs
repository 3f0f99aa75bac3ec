use thiserror::Error;

use crate::model::{DailyGoalError, MasteryLevelError, OwnerError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    MasteryLevel(#[from] MasteryLevelError),
    #[error(transparent)]
    DailyGoal(#[from] DailyGoalError),
    #[error(transparent)]
    Owner(#[from] OwnerError),
}
