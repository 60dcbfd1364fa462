// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! qreply gateway - HTTP front for loan-options exchanges
//!
//! Every `POST` becomes one `send_request` on a shared [`Sender`]; the HTTP
//! call returns when the responder's reply arrives or the reply timeout
//! elapses.
//!
//! # Endpoints
//!
//! - `POST /api/values` - loan-options exchange
//! - `POST /api/v1/loan-options` - same exchange, versioned path
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/stats` - Round-trip statistics of the shared sender

mod handlers;
mod routes;

use axum::Router;
use qreply::loan::{GetLoanOptionsRequest, GetLoanOptionsResponse};
use qreply::Sender;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use handlers::ApiError;

/// Sender type the gateway drives.
pub type LoanSender = Sender<GetLoanOptionsRequest, GetLoanOptionsResponse>;

/// Shared application state
pub struct AppState {
    sender: LoanSender,
    started: Instant,
}

impl AppState {
    pub fn new(sender: LoanSender) -> Self {
        Self {
            sender,
            started: Instant::now(),
        }
    }

    pub fn sender(&self) -> &LoanSender {
        &self.sender
    }
}

/// Router with every endpoint, CORS and HTTP tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::api_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
