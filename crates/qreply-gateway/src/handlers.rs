// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP request handlers.

use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use qreply::loan::{GetLoanOptionsRequest, GetLoanOptionsResponse};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<qreply::Error> for ApiError {
    fn from(err: qreply::Error) -> Self {
        let code = if err.is_timeout() {
            504
        } else if err.is_transport() {
            502
        } else {
            500
        };
        Self {
            error: err.to_string(),
            code,
        }
    }
}

/// POST /api/v1/loan-options and POST /api/values
pub async fn loan_options(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GetLoanOptionsRequest>,
) -> Result<Json<GetLoanOptionsResponse>, ApiError> {
    match state.sender().send_request(&request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            warn!("exchange for request {} failed: {}", request.id, e);
            Err(e.into())
        }
    }
}

/// GET /api/v1/health
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let sender = state.sender();
    let body = serde_json::json!({
        "status": "ok",
        "name": "qreply-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "request_queue": sender.request_queue(),
        "response_queue": sender.response_queue(),
        "reply_timeout_ms": u64::try_from(sender.timeout().as_millis()).unwrap_or(u64::MAX),
        "uptime_secs": state.started.elapsed().as_secs(),
    });

    (StatusCode::OK, Json(body)).into_response()
}

/// GET /api/v1/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Response {
    (StatusCode::OK, Json(state.sender().statistics())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qreply::{BrokerError, SessionId};
    use std::time::Duration;

    #[test]
    fn error_codes_follow_fault_family() {
        let timeout = qreply::Error::Timeout {
            session_id: SessionId::generate(),
            waited: Duration::from_millis(200),
        };
        assert_eq!(ApiError::from(timeout).code, 504);

        let transport = qreply::Error::Broker(BrokerError::QueueNotFound("thequeue".into()));
        assert_eq!(ApiError::from(transport).code, 502);

        let missing = qreply::Error::MissingReplyTo {
            message_id: "m".into(),
        };
        assert_eq!(ApiError::from(missing).code, 500);
    }
}
