// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Construction point for senders, responders and reconciliation.

use crate::broker::{self, Broker};
use crate::config::FactoryConfig;
use crate::descriptor::{DriftPolicy, QueueDescriptor};
use crate::error::Result;
use crate::reconcile::{ReconcileReport, TopologyReconciler};
use crate::responder::{RequestHandler, Responder};
use crate::sender::{Sender, DEFAULT_REPLY_TIMEOUT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Binds one broker and the two queues of an exchange.
///
/// Holds no state beyond these bindings; build it once per process and
/// derive as many senders and responders from it as needed.
#[derive(Clone)]
pub struct RequestResponseFactory {
    broker: Arc<dyn Broker>,
    request: QueueDescriptor,
    response: QueueDescriptor,
    reply_timeout: Duration,
    drift_policy: DriftPolicy,
}

impl RequestResponseFactory {
    /// Factory over `broker` with default queue attributes.
    pub fn new(
        broker: Arc<dyn Broker>,
        request_queue: impl Into<String>,
        response_queue: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            request: QueueDescriptor::request(request_queue),
            response: QueueDescriptor::response(response_queue),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            drift_policy: DriftPolicy::default(),
        }
    }

    /// Validate `config`, resolve its connection string and bind its queues.
    pub fn connect(config: &FactoryConfig) -> Result<Self> {
        config.validate()?;
        let broker = broker::connect(&config.connection_string)?;
        tracing::debug!(
            "factory bound to {} ({} -> {})",
            config.connection_string,
            config.request_queue,
            config.response_queue
        );
        Ok(Self::from_config(broker, config))
    }

    /// Bind an existing broker using the queue settings of `config`.
    pub fn from_config(broker: Arc<dyn Broker>, config: &FactoryConfig) -> Self {
        Self {
            broker,
            request: config.request_descriptor(),
            response: config.response_descriptor(),
            reply_timeout: config.reply_timeout(),
            drift_policy: config.drift_policy,
        }
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_drift_policy(mut self, policy: DriftPolicy) -> Self {
        self.drift_policy = policy;
        self
    }

    /// Replace both target descriptors. Their roles are not checked.
    pub fn with_descriptors(mut self, request: QueueDescriptor, response: QueueDescriptor) -> Self {
        self.request = request;
        self.response = response;
        self
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn request_descriptor(&self) -> &QueueDescriptor {
        &self.request
    }

    pub fn response_descriptor(&self) -> &QueueDescriptor {
        &self.response
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    pub fn drift_policy(&self) -> DriftPolicy {
        self.drift_policy
    }

    /// A sender for `Req -> Resp` exchanges.
    pub fn sender<Req, Resp>(&self) -> Sender<Req, Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        Sender::new(
            self.broker.clone(),
            self.request.name.clone(),
            self.response.name.clone(),
            self.reply_timeout,
        )
    }

    /// A responder answering with `handler`.
    pub fn responder<Req, Resp>(
        &self,
        handler: impl RequestHandler<Req, Resp> + 'static,
    ) -> Responder<Req, Resp>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
    {
        Responder::new(self.broker.clone(), self.request.name.clone(), handler)
    }

    /// Make both queues exist with their target configuration.
    ///
    /// Idempotent; drifted queues are recreated and lose their messages.
    pub async fn ensure_entities_exist(&self) -> Result<ReconcileReport> {
        TopologyReconciler::new(self.broker.as_ref(), self.drift_policy)
            .ensure(&self.request, &self.response)
            .await
    }
}

impl std::fmt::Debug for RequestResponseFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestResponseFactory")
            .field("request", &self.request.name)
            .field("response", &self.response.name)
            .field("reply_timeout", &self.reply_timeout)
            .field("drift_policy", &self.drift_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn connect_rejects_bad_config() {
        let config = FactoryConfig {
            connection_string: "sb://nowhere".into(),
            ..Default::default()
        };
        assert!(matches!(
            RequestResponseFactory::connect(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn config_flows_into_descriptors() {
        let config = FactoryConfig {
            reply_timeout_ms: 1500,
            lock_duration_secs: 90,
            drift_policy: DriftPolicy::SessionOnly,
            ..Default::default()
        };
        let factory = RequestResponseFactory::connect(&config).unwrap();
        assert_eq!(factory.reply_timeout(), Duration::from_millis(1500));
        assert_eq!(factory.drift_policy(), DriftPolicy::SessionOnly);
        assert_eq!(
            factory.request_descriptor().lock_duration,
            Duration::from_secs(90)
        );
        assert!(factory.response_descriptor().requires_session);

        let sender = factory.sender::<u32, u32>();
        assert_eq!(sender.request_queue(), "thequeue");
        assert_eq!(sender.response_queue(), "theotherqueue");
        assert_eq!(sender.timeout(), Duration::from_millis(1500));
    }
}
