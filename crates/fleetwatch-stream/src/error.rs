//! Error types for the stream hub and its HTTP surface.
//!
//! [`StreamError`] unifies the failures a connection request can hit and
//! converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.
//! [`StoreError`] covers upstream Probe/Alert Store failures; those never
//! reach a client as an HTTP error, they are folded into frames instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failures talking to the Probe Store or Alert Store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The request could not be sent or the connection failed.
    #[error("store request failed: {0}")]
    Http(String),

    /// The store answered with a non-success status.
    #[error("store returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("store response decode failed: {0}")]
    Decode(String),
}

/// Errors surfaced by the stream gateway and hub.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The connection's declared origin is not allowed.
    #[error("origin rejected: {}", .0.as_deref().unwrap_or("<none>"))]
    OriginRejected(Option<String>),

    /// The connection request did not carry a usable subscription.
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    /// Grid construction failed.
    #[error("partition error: {0}")]
    Geo(#[from] fleetwatch_geo::GeoError),
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::OriginRejected(_) => StatusCode::FORBIDDEN,
            Self::InvalidSubscription(_) => StatusCode::BAD_REQUEST,
            Self::Geo(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
