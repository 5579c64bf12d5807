use thiserror::Error;

/// Core error types for tailflux
#[derive(Debug, Error)]
pub enum TailfluxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Stage '{stage}' stopped unexpectedly: {message}")]
    Stage { stage: &'static str, message: String },

    #[error("Hand-off downstream of '{0}' closed")]
    HandoffClosed(&'static str),
}

impl TailfluxError {
    /// True for errors a stage reports only because a neighbouring stage went away
    pub fn is_channel_closed(&self) -> bool {
        matches!(
            self,
            TailfluxError::Ingestion(IngestionError::ChannelClosed)
                | TailfluxError::HandoffClosed(_)
        )
    }
}

/// Errors raised while following the input file
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Channel closed")]
    ChannelClosed,
}

/// Errors raised by a location lookup. Never fatal.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Failed to run lookup command '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("Lookup command exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("Lookup request failed: {0}")]
    Http(String),

    #[error("Lookup response could not be decoded: {0}")]
    Decode(String),

    #[error("Lookup timed out after {0} ms")]
    Timeout(u64),
}

/// Errors specific to the time-series sink
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Invalid connection descriptor: {0}")]
    Descriptor(String),

    #[error("Failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Write rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid point: {0}")]
    Point(String),
}

impl OutputError {
    /// Whether a failed write is worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            OutputError::Network(_) => true,
            OutputError::Rejected { status, .. } => !(400..500).contains(status),
            _ => false,
        }
    }
}

/// Result type alias for tailflux operations
pub type Result<T> = std::result::Result<T, TailfluxError>;
