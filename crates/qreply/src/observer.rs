// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Instrumentation hooks fired at fixed protocol steps.
//!
//! Hooks are called synchronously, in protocol order, on the task running
//! the exchange. They receive borrowed data and cannot influence the exchange.

use crate::envelope::Envelope;
use crate::error::Error;

/// Hook fired by a sender right before a request is transmitted.
pub trait SenderObserver<Req>: Send + Sync {
    fn request_sending(&self, request: &Req, envelope: &Envelope);
}

impl<Req, F> SenderObserver<Req> for F
where
    F: Fn(&Req, &Envelope) + Send + Sync,
{
    fn request_sending(&self, request: &Req, envelope: &Envelope) {
        self(request, envelope)
    }
}

/// Hooks fired by a responder while it processes requests.
pub trait ResponderObserver: Send + Sync {
    /// A request was received, before it is decoded.
    fn request_received(&self, _envelope: &Envelope) {}

    /// A reply is about to be sent.
    fn response_sending(&self, _envelope: &Envelope) {}

    /// Processing of one delivery failed; the loop keeps running.
    fn exception_occurred(&self, _error: &Error) {}
}

/// Observer that ignores every hook.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl<Req> SenderObserver<Req> for NoopObserver {
    fn request_sending(&self, _request: &Req, _envelope: &Envelope) {}
}

impl ResponderObserver for NoopObserver {}

/// Observer that logs every hook through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl<Req: std::fmt::Debug> SenderObserver<Req> for TracingObserver {
    fn request_sending(&self, request: &Req, envelope: &Envelope) {
        tracing::debug!(
            "request sending: {:?} (reply_to={:?}, session={:?})",
            request,
            envelope.reply_to,
            envelope.reply_to_session_id
        );
    }
}

impl ResponderObserver for TracingObserver {
    fn request_received(&self, envelope: &Envelope) {
        tracing::debug!(
            "request received: message={} session={:?}",
            envelope.message_id_or_dash(),
            envelope.reply_to_session_id
        );
    }

    fn response_sending(&self, envelope: &Envelope) {
        tracing::debug!("response sending: session={:?}", envelope.session_id);
    }

    fn exception_occurred(&self, error: &Error) {
        tracing::warn!("request processing failed: {}", error);
    }
}
