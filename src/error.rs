/// Errors raised while training or reporting.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A metric was finalized before any batch was accumulated.
    #[error("no data accumulated for metric `{0}`")]
    NoData(&'static str),

    /// The training configuration can't produce a run.
    #[error("invalid training configuration: {0}")]
    InvalidConfig(String),

    /// The dataset returned nothing for an index in range.
    #[error("dataset item `{0}` is missing")]
    MissingItem(usize),

    /// The log file path has no file name.
    #[error("invalid log file path: `{0}`")]
    InvalidLogPath(String),

    /// The log file couldn't be opened.
    #[error("can't open log file: {0}")]
    LogFile(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The model record couldn't be written.
    #[error("recorder error: {0}")]
    Recorder(String),
}

/// Result type used across the crate.
pub type Result<T> = core::result::Result<T, Error>;
