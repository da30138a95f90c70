use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Telemetry fetch failed: {reason}")]
    TelemetryFetch { reason: String },

    #[error("Player '{player_id}' tier state desync: expected '{expected}' before commit")]
    TierStateDesync { player_id: String, expected: String },

    #[error("Player '{player_id}' not found")]
    PlayerNotFound { player_id: String },

    #[error("Invalid config: {reason}")]
    Config { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
