#![forbid(unsafe_code)]

pub mod local;
pub mod repository;
pub mod sqlite;

pub use repository::{DailyGoalRepository, ProgressRepository, Storage, StorageError};
