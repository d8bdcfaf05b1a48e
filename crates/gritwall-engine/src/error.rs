use thiserror::Error;

/// Failure taxonomy shared by every engine operation. The engine knows
/// nothing about transports — gritwall-api maps these to HTTP statuses and
/// gritwall-gateway to WebSocket error frames.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Entity absent, or the caller is not allowed to see it.
    #[error("{0}")]
    NotFound(&'static str),

    /// Operation attempted outside its valid temporal or state window.
    #[error("{0}")]
    InvalidState(&'static str),

    /// Duplicate vote, already completed/vetoed, and similar collisions.
    #[error("{0}")]
    Conflict(&'static str),

    /// Points balance too low for a purchase.
    #[error("insufficient points")]
    InsufficientPoints,

    /// Powerup inventory empty.
    #[error("no available {0}")]
    InsufficientPowerup(&'static str),

    /// Storage failure. The whole operation rolled back; callers may retry.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
