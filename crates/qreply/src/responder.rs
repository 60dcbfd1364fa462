// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Replying side of an exchange.
//!
//! A [`Responder`] holds one request-queue handle and processes one
//! delivery at a time:
//!
//! ```text
//! receive -> request_received -> decode -> complete -> handler
//!         -> encode + stamp SessionId -> response_sending -> send to ReplyTo
//! ```
//!
//! The delivery is completed before the handler runs, so a crash between
//! completion and reply delivery loses that reply. Callers rely on their
//! own timeout for this case.
//!
//! Run more responders to scale out; each one has its own handle and its own
//! serial loop.

use crate::broker::{Broker, QueueClient};
use crate::codec;
use crate::envelope::{Envelope, LockToken, ReceivedEnvelope};
use crate::error::{Error, Result};
use crate::observer::{NoopObserver, ResponderObserver};
use crate::shutdown::ShutdownSignal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long one receive call parks before the loop checks in again
pub const DEFAULT_RECEIVE_WAIT: Duration = Duration::from_secs(1);

/// Pause after a failed receive
pub const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Transform from a decoded request to its response.
///
/// Business failures belong in the response type; the handler is not
/// expected to fail or to block.
pub trait RequestHandler<Req, Resp>: Send + Sync {
    fn handle(&self, request: Req) -> Resp;
}

impl<Req, Resp, F> RequestHandler<Req, Resp> for F
where
    F: Fn(Req) -> Resp + Send + Sync,
{
    fn handle(&self, request: Req) -> Resp {
        self(request)
    }
}

/// Consumes requests and sends each handler result to the request's `ReplyTo`.
pub struct Responder<Req, Resp> {
    broker: Arc<dyn Broker>,
    request_queue: String,
    handler: Arc<dyn RequestHandler<Req, Resp>>,
    observer: Arc<dyn ResponderObserver>,
    receive_wait: Duration,
    listening: AtomicBool,
    processed: AtomicU64,
}

impl<Req, Resp> Responder<Req, Resp>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    pub(crate) fn new(
        broker: Arc<dyn Broker>,
        request_queue: impl Into<String>,
        handler: impl RequestHandler<Req, Resp> + 'static,
    ) -> Self {
        Self {
            broker,
            request_queue: request_queue.into(),
            handler: Arc::new(handler),
            observer: Arc::new(NoopObserver),
            receive_wait: DEFAULT_RECEIVE_WAIT,
            listening: AtomicBool::new(false),
            processed: AtomicU64::new(0),
        }
    }

    /// Install the observer notified at each processing step.
    pub fn with_observer(mut self, observer: impl ResponderObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn with_receive_wait(mut self, wait: Duration) -> Self {
        self.receive_wait = wait;
        self
    }

    pub fn request_queue(&self) -> &str {
        &self.request_queue
    }

    /// True while [`Self::respond_to_requests`] holds its request handle.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Replies sent so far.
    pub fn requests_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Process requests until `shutdown` fires.
    ///
    /// Failures while processing a delivery go to the observer's
    /// `exception_occurred` hook and never end the loop. Only failing to open
    /// the request queue in the first place is returned.
    pub async fn respond_to_requests(&self, mut shutdown: ShutdownSignal) -> Result<()> {
        let client = self.broker.open_queue(&self.request_queue).await?;
        self.listening.store(true, Ordering::Release);
        tracing::info!("responder listening on {}", self.request_queue);

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                received = client.receive(self.receive_wait) => received,
            };

            match received {
                Ok(Some(delivery)) => self.process(client.as_ref(), delivery).await,
                Ok(None) => {}
                Err(e) => {
                    self.observer.exception_occurred(&Error::Broker(e));
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        self.listening.store(false, Ordering::Release);
        if let Err(e) = client.close().await {
            tracing::debug!("closing {} handle failed: {}", self.request_queue, e);
        }
        tracing::info!(
            "responder on {} stopped after {} replies",
            self.request_queue,
            self.requests_processed()
        );
        Ok(())
    }

    async fn process(&self, client: &dyn QueueClient, delivery: ReceivedEnvelope) {
        let ReceivedEnvelope {
            envelope,
            lock_token,
            delivery_count,
            ..
        } = delivery;

        self.observer.request_received(&envelope);
        tracing::debug!(
            "request {} received (delivery {})",
            envelope.message_id_or_dash(),
            delivery_count
        );

        let request = match self.accept(&envelope) {
            Ok(request) => request,
            Err(e) => {
                self.observer.exception_occurred(&e);
                self.abandon(client, &lock_token).await;
                return;
            }
        };

        if let Err(e) = client.complete(&lock_token).await {
            self.observer.exception_occurred(&e.into());
            return;
        }

        match self.reply(&envelope, request).await {
            Ok(()) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.observer.exception_occurred(&e),
        }
    }

    /// Checks done before the delivery is completed.
    fn accept(&self, envelope: &Envelope) -> Result<Req> {
        let message_id = || envelope.message_id_or_dash().to_string();
        if envelope.reply_to.as_deref().map_or(true, str::is_empty) {
            return Err(Error::MissingReplyTo {
                message_id: message_id(),
            });
        }
        // replies go to a session-enabled queue
        if envelope
            .reply_to_session_id
            .as_deref()
            .map_or(true, str::is_empty)
        {
            return Err(Error::MissingReplySession {
                message_id: message_id(),
            });
        }
        Ok(codec::decode(envelope)?)
    }

    async fn abandon(&self, client: &dyn QueueClient, lock_token: &LockToken) {
        if let Err(e) = client.abandon(lock_token).await {
            tracing::debug!("abandon on {} failed: {}", self.request_queue, e);
        }
    }

    async fn reply(&self, request_envelope: &Envelope, request: Req) -> Result<()> {
        let response = self.handler.handle(request);

        let mut envelope = codec::encode(&response).map_err(Error::Encode)?;
        envelope.session_id = request_envelope.reply_to_session_id.clone();
        self.observer.response_sending(&envelope);

        let reply_to = request_envelope.reply_to.as_deref().unwrap_or_default();
        let reply_client = self.broker.open_queue(reply_to).await?;
        let sent = reply_client.send(envelope).await;
        if let Err(e) = reply_client.close().await {
            tracing::debug!("closing reply handle on {} failed: {}", reply_to, e);
        }
        sent?;

        tracing::debug!(
            "reply sent to {} for session {}",
            reply_to,
            request_envelope.reply_to_session_id.as_deref().unwrap_or("-")
        );
        Ok(())
    }
}
