//! Domain error types.

/// Top-level error type for pairtrader.
#[derive(Debug, thiserror::Error)]
pub enum PairtraderError {
    #[error("data integrity error for {instrument}: {reason}")]
    DataIntegrity { instrument: String, reason: String },

    #[error("invalid risk input: {reason}")]
    InvalidRiskInput { reason: String },

    #[error("{collaborator} unavailable: {reason}")]
    CollaboratorUnavailable {
        collaborator: String,
        reason: String,
    },

    #[error("insufficient data for {instrument}: have {bars} bars, need {minimum}")]
    InsufficientData {
        instrument: String,
        bars: usize,
        minimum: usize,
    },

    #[error("unknown trade {id}")]
    UnknownTrade { id: i64 },

    #[error("trade {id} is already closed")]
    TradeAlreadyClosed { id: i64 },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PairtraderError {
    pub fn data_integrity(instrument: &str, reason: impl Into<String>) -> Self {
        PairtraderError::DataIntegrity {
            instrument: instrument.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(collaborator: &str, reason: impl ToString) -> Self {
        PairtraderError::CollaboratorUnavailable {
            collaborator: collaborator.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Failures the live loop may retry on its next scheduled cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PairtraderError::CollaboratorUnavailable { .. } | PairtraderError::Database { .. }
        )
    }
}

impl From<&PairtraderError> for std::process::ExitCode {
    fn from(err: &PairtraderError) -> Self {
        let code: u8 = match err {
            PairtraderError::Io(_) => 1,
            PairtraderError::ConfigParse { .. }
            | PairtraderError::ConfigMissing { .. }
            | PairtraderError::ConfigInvalid { .. } => 2,
            PairtraderError::Database { .. }
            | PairtraderError::CollaboratorUnavailable { .. }
            | PairtraderError::UnknownTrade { .. }
            | PairtraderError::TradeAlreadyClosed { .. } => 3,
            PairtraderError::InvalidRiskInput { .. } => 4,
            PairtraderError::DataIntegrity { .. } | PairtraderError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
