#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod progress_service;
pub mod session;
pub mod stats_service;

pub use progress_core::Clock;

pub use config::{ProgressConfig, SessionConfig, StatsConfig};
pub use error::{FailureReason, ProgressServiceError, SessionInitError};
pub use progress_service::ProgressService;
pub use session::{ProgressSession, SessionKind};
pub use stats_service::StatsService;
