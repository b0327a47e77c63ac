use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dataset error: {message}")]
    Dataset { message: String },
    #[error("event log line {line}: {source}")]
    EventLog {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl InfraError {
    pub fn dataset(message: impl Into<String>) -> Self {
        Self::Dataset {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
