pub mod auth;
pub mod challenges;
pub mod friends;
pub mod middleware;
pub mod shame;
pub mod store;
pub mod users;
pub mod votes;

use axum::http::StatusCode;
use gritwall_engine::error::EngineError;
use tracing::error;

/// Runs a blocking engine call off the async runtime and maps both join and
/// engine errors onto status codes.
macro_rules! blocking {
    ($e:expr) => {
        tokio::task::spawn_blocking(move || $e)
            .await
            .map_err(|e| {
                tracing::error!("spawn_blocking join error: {}", e);
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            })?
            .map_err(crate::error_status)?
    };
}
pub(crate) use blocking;

/// Maps engine errors onto HTTP status codes. Storage failures are logged
/// here, once, at the boundary.
pub(crate) fn error_status(e: EngineError) -> StatusCode {
    match e {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidState(_) => StatusCode::BAD_REQUEST,
        EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::InsufficientPoints => StatusCode::BAD_REQUEST,
        EngineError::InsufficientPowerup(_) => StatusCode::BAD_REQUEST,
        EngineError::Storage(err) => {
            error!("Storage error: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
