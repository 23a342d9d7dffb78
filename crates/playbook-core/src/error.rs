use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("not initialized: run 'playbook init'")]
    NotInitialized,

    #[error("playbook not found: {0}")]
    PlaybookNotFound(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("invalid run transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("unknown segment: {0}")]
    UnknownSegment(String),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("unknown status: {0}")]
    UnknownStatus(String),

    #[error("unknown goal: {0}")]
    UnknownGoal(String),

    #[error("invalid time range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
