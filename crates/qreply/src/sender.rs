// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Requesting side of an exchange.
//!
//! Each call runs through:
//!
//! ```text
//! Idle -> SessionClaimed -> Sent -> AwaitingReply -> Completed | TimedOut | Failed
//! ```
//!
//! The reply session is claimed before the request leaves, so a fast
//! responder can never answer into a session nobody is listening on.

use crate::broker::{Broker, QueueClient, SessionReceiver};
use crate::codec;
use crate::envelope::{Envelope, ReceivedEnvelope, SessionId};
use crate::error::{Error, Result};
use crate::observer::SenderObserver;
use crate::stats::RoundTripStats;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// Default time a sender waits for its reply
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(20);

/// Issues requests and waits for their correlated replies.
///
/// A sender may be shared between tasks; every call uses its own session
/// id and its own session receiver, so concurrent calls do not interfere.
///
/// # Example
///
/// ```rust,no_run
/// use qreply::loan::{GetLoanOptionsRequest, GetLoanOptionsResponse};
/// use qreply::{FactoryConfig, RequestResponseFactory};
///
/// # async fn example() -> qreply::Result<()> {
/// let factory = RequestResponseFactory::connect(&FactoryConfig::default())?;
/// factory.ensure_entities_exist().await?;
///
/// let sender = factory.sender::<GetLoanOptionsRequest, GetLoanOptionsResponse>();
/// let reply = sender.send_request(&GetLoanOptionsRequest::new(1, 700)).await?;
/// println!("{} offers {}", reply.provider, reply.loan_amount);
/// # Ok(())
/// # }
/// ```
pub struct Sender<Req, Resp> {
    broker: Arc<dyn Broker>,
    request_queue: String,
    response_queue: String,
    timeout: Duration,

    /// Request-queue handle, opened on first use and kept for the sender's lifetime
    request_client: OnceCell<Box<dyn QueueClient>>,

    stats: Mutex<RoundTripStats>,
    observers: Vec<Arc<dyn SenderObserver<Req>>>,
    _marker: PhantomData<fn(&Req) -> Resp>,
}

impl<Req, Resp> Sender<Req, Resp>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    pub(crate) fn new(
        broker: Arc<dyn Broker>,
        request_queue: impl Into<String>,
        response_queue: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            broker,
            request_queue: request_queue.into(),
            response_queue: response_queue.into(),
            timeout,
            request_client: OnceCell::new(),
            stats: Mutex::new(RoundTripStats::new()),
            observers: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Register a hook fired right before each request is sent.
    pub fn with_observer(mut self, observer: impl SenderObserver<Req> + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Override the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn request_queue(&self) -> &str {
        &self.request_queue
    }

    pub fn response_queue(&self) -> &str {
        &self.response_queue
    }

    /// Snapshot of the round-trip statistics.
    pub fn statistics(&self) -> RoundTripStats {
        *self.stats.lock()
    }

    pub fn reset_statistics(&self) {
        self.stats.lock().reset();
    }

    async fn request_client(&self) -> Result<&dyn QueueClient> {
        let client = self
            .request_client
            .get_or_try_init(|| self.broker.open_queue(&self.request_queue))
            .await?;
        Ok(client.as_ref())
    }

    /// Send `request` and wait for its reply.
    ///
    /// Fails with [`Error::Timeout`] when no reply arrives within the
    /// configured timeout, with [`Error::Decode`] when the reply cannot be
    /// decoded, and with [`Error::Broker`] on any transport fault. Nothing
    /// is retried.
    pub async fn send_request(&self, request: &Req) -> Result<Resp> {
        let started = Instant::now();
        let session_id = SessionId::generate();

        let mut envelope = codec::encode(request).map_err(Error::Encode)?;
        envelope.reply_to = Some(self.response_queue.clone());
        envelope.reply_to_session_id = Some(session_id.to_string());

        let client = self.request_client().await?;

        let receiver = self
            .broker
            .accept_session(&self.response_queue, &session_id)
            .await?;
        tracing::debug!("session {} claimed on {}", session_id, self.response_queue);

        for observer in &self.observers {
            observer.request_sending(request, &envelope);
        }

        let outcome = self
            .exchange(client, receiver.as_ref(), envelope, &session_id)
            .await;

        if let Err(e) = receiver.close().await {
            tracing::debug!("closing session {} failed: {}", session_id, e);
        }

        let received = outcome?;
        let response = codec::decode(&received.envelope)?;

        let elapsed = started.elapsed();
        self.stats.lock().record(elapsed);
        tracing::debug!("session {} answered in {:?}", session_id, elapsed);

        Ok(response)
    }

    /// Send and receive concurrently, then acknowledge the reply.
    async fn exchange(
        &self,
        client: &dyn QueueClient,
        receiver: &dyn SessionReceiver,
        envelope: Envelope,
        session_id: &SessionId,
    ) -> Result<ReceivedEnvelope> {
        let receive = async {
            let received = receiver.receive(self.timeout).await?;
            Ok::<_, Error>(received)
        };
        let send = async {
            client.send(envelope).await?;
            tracing::debug!("request sent on {} for session {}", client.queue(), session_id);
            Ok::<_, Error>(())
        };

        let timed_out = || Error::Timeout {
            session_id: session_id.clone(),
            waited: self.timeout,
        };

        let received = match tokio::time::timeout(self.timeout, async {
            tokio::try_join!(send, receive)
        })
        .await
        {
            Ok(Ok(((), Some(received)))) => received,
            Ok(Ok(((), None))) | Err(_) => return Err(timed_out()),
            Ok(Err(e)) => return Err(e),
        };

        // ack the reply so it leaves the response queue
        if let Err(e) = receiver.complete(&received.lock_token).await {
            tracing::debug!("completing reply on session {} failed: {}", session_id, e);
        }

        Ok(received)
    }

    /// Release the request-queue handle.
    pub async fn close(&self) -> Result<()> {
        if let Some(client) = self.request_client.get() {
            client.close().await?;
        }
        Ok(())
    }
}
