//! Domain errors and their mapping onto the HTTP control surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Errors produced by the relay hub's internal components.
///
/// These never panic the process; they are returned to the caller that
/// triggered the failing operation (typically a control-request handler)
/// and logged at the call site.
#[derive(Debug, thiserror::Error)]
pub enum QuasarError {
    #[error("slot {0} is out of range (0..256)")]
    SlotOutOfRange(u16),

    #[error("slot {0} is already allocated")]
    SlotAlreadyAllocated(u16),

    #[error("slot {0} is not allocated")]
    SlotNotAllocated(u16),

    #[error("unknown game type {0:?}")]
    UnknownGameType(String),

    #[error("pulsar channel unavailable: {0}")]
    PulsarUnavailable(String),

    #[error("failed to spawn pulsar: {0}")]
    PulsarSpawnFailed(#[from] std::io::Error),
}

/// JSON body used for every HTTP-facing error response.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl QuasarError {
    fn status(&self) -> StatusCode {
        match self {
            QuasarError::SlotOutOfRange(_) | QuasarError::UnknownGameType(_) => {
                StatusCode::BAD_REQUEST
            }
            QuasarError::SlotAlreadyAllocated(_) | QuasarError::SlotNotAllocated(_) => {
                StatusCode::CONFLICT
            }
            QuasarError::PulsarUnavailable(_) | QuasarError::PulsarSpawnFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for QuasarError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
