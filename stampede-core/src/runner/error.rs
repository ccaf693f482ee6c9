pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,

    #[error("`maxDuration` must be a positive duration")]
    InvalidMaxDuration,

    #[error("`stages` must be a non-empty list of {{ duration, target }}")]
    InvalidStages,

    #[error("stage {index}: duration must be positive")]
    InvalidStageDuration { index: usize },

    #[error("ramping scenario must target at least one virtual user")]
    NoTargetVus,

    #[error("invalid `executor` (expected `ramping-vus` or `shared-iterations`)")]
    InvalidExecutor,

    #[error("invalid `flow` (expected `reservation` or `token-issue`)")]
    InvalidFlow,

    #[error("invalid threshold for metric `{metric}`: {message}")]
    InvalidThreshold { metric: String, message: String },
}
