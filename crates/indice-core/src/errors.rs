use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

/// Rejected caller input. Raised before anything is persisted.
#[derive(Debug, Error)]
#[error("invalid input: {0}")]
pub struct InvalidInput(pub String);

/// Failure of a single official source. Never fatal for a sync: the acquirer
/// turns it into a skip reason and moves on to the next strategy.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("discovery failed: {0}")]
    Discovery(String),
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("parse failed: {0}")]
    Parse(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn parse(msg: impl Into<String>) -> Self {
        SourceError::Parse(msg.into())
    }
}
