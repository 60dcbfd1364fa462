// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client for the `qreply-broker` daemon.
//!
//! Management calls use a short-lived connection each. Queue and session
//! handles own one connection for their whole lifetime; the daemon releases
//! outstanding locks and session claims when that connection drops.
//!
//! A queue handle whose request was cut short (cancelled mid-call or failed
//! on I/O) reconnects and rebinds before its next operation. Locks taken on
//! the old connection are released by the daemon and report `LockLost`.

use super::connection::FramedConnection;
use super::wire::{error_from_reply, BrokerReply, BrokerRequest, DEFAULT_MAX_FRAME_SIZE};
use super::{Broker, BrokerError, BrokerResult, Management, QueueClient, SessionReceiver};
use crate::descriptor::QueueDescriptor;
use crate::envelope::{Envelope, LockToken, ReceivedEnvelope, SessionId};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Broker reached over TCP.
#[derive(Debug, Clone)]
pub struct TcpBroker {
    addr: String,
    max_frame_size: usize,
}

impl TcpBroker {
    /// Target a daemon at `addr` (`host:port`). Nothing is dialled yet.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn dial(&self) -> BrokerResult<Channel> {
        let conn = FramedConnection::connect(&self.addr, self.max_frame_size).await?;
        Ok(Channel {
            conn: Some(conn),
            in_flight: false,
        })
    }

    /// Dial and bind the connection to `queue`.
    async fn bind_queue(&self, queue: &str) -> BrokerResult<Channel> {
        let mut channel = self.dial().await?;
        let bound = channel
            .call(&BrokerRequest::OpenQueue {
                queue: queue.to_string(),
            })
            .await
            .and_then(expect_ok);
        if let Err(e) = bound {
            channel.shutdown().await;
            return Err(e);
        }
        Ok(channel)
    }

    async fn oneshot(&self, request: BrokerRequest) -> BrokerResult<BrokerReply> {
        let mut channel = self.dial().await?;
        let reply = channel.call(&request).await;
        channel.shutdown().await;
        reply
    }
}

/// A connection plus the bookkeeping needed to detect a torn request.
struct Channel {
    conn: Option<FramedConnection>,
    in_flight: bool,
}

impl Channel {
    /// A request was started but its reply never read.
    fn is_torn(&self) -> bool {
        self.in_flight && self.conn.is_some()
    }

    async fn call(&mut self, request: &BrokerRequest) -> BrokerResult<BrokerReply> {
        let conn = self.conn.as_mut().ok_or(BrokerError::Closed)?;
        // A cancelled call leaves its reply unread on the socket.
        if self.in_flight {
            return Err(BrokerError::Connection(format!(
                "previous request was interrupted, cannot send {}",
                request.op()
            )));
        }

        self.in_flight = true;
        let reply = conn.call(request).await?;
        self.in_flight = false;

        match reply {
            BrokerReply::Error {
                code,
                message,
                subject,
                session,
            } => Err(error_from_reply(code, message, subject, session)),
            other => Ok(other),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let _ = conn.shutdown().await;
        }
    }
}

fn expect_ok(reply: BrokerReply) -> BrokerResult<()> {
    match reply {
        BrokerReply::Ok => Ok(()),
        other => Err(unexpected(other)),
    }
}

fn expect_message(reply: BrokerReply) -> BrokerResult<Option<ReceivedEnvelope>> {
    match reply {
        BrokerReply::Message { message } => Ok(message),
        other => Err(unexpected(other)),
    }
}

fn unexpected(reply: BrokerReply) -> BrokerError {
    BrokerError::Protocol(format!("unexpected reply: {:?}", reply))
}

fn wait_ms(wait: Duration) -> u64 {
    u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl Management for TcpBroker {
    async fn queue_exists(&self, name: &str) -> BrokerResult<bool> {
        match self
            .oneshot(BrokerRequest::QueueExists {
                queue: name.to_string(),
            })
            .await?
        {
            BrokerReply::Exists { exists } => Ok(exists),
            other => Err(unexpected(other)),
        }
    }

    async fn get_queue(&self, name: &str) -> BrokerResult<QueueDescriptor> {
        match self
            .oneshot(BrokerRequest::GetQueue {
                queue: name.to_string(),
            })
            .await?
        {
            BrokerReply::Queue { descriptor } => Ok(descriptor),
            other => Err(unexpected(other)),
        }
    }

    async fn create_queue(&self, descriptor: &QueueDescriptor) -> BrokerResult<()> {
        expect_ok(
            self.oneshot(BrokerRequest::CreateQueue {
                descriptor: descriptor.clone(),
            })
            .await?,
        )
    }

    async fn delete_queue(&self, name: &str) -> BrokerResult<()> {
        expect_ok(
            self.oneshot(BrokerRequest::DeleteQueue {
                queue: name.to_string(),
            })
            .await?,
        )
    }
}

#[async_trait]
impl Broker for TcpBroker {
    async fn open_queue(&self, name: &str) -> BrokerResult<Box<dyn QueueClient>> {
        let channel = self.bind_queue(name).await?;
        Ok(Box::new(TcpQueueClient {
            broker: self.clone(),
            queue: name.to_string(),
            channel: Mutex::new(channel),
        }))
    }

    async fn accept_session(
        &self,
        queue: &str,
        session_id: &SessionId,
    ) -> BrokerResult<Box<dyn SessionReceiver>> {
        let mut channel = self.dial().await?;
        expect_ok(
            channel
                .call(&BrokerRequest::AcceptSession {
                    queue: queue.to_string(),
                    session_id: session_id.to_string(),
                })
                .await?,
        )?;

        Ok(Box::new(TcpSessionReceiver {
            session_id: session_id.clone(),
            channel: Mutex::new(channel),
        }))
    }
}

/// Queue handle bound to its own daemon connection.
pub struct TcpQueueClient {
    broker: TcpBroker,
    queue: String,
    channel: Mutex<Channel>,
}

impl TcpQueueClient {
    /// Lock the channel, replacing it first if its last request was torn.
    async fn channel(&self) -> BrokerResult<MutexGuard<'_, Channel>> {
        let mut channel = self.channel.lock().await;
        if channel.is_torn() {
            tracing::debug!(
                "connection for {} was interrupted, reconnecting to {}",
                self.queue,
                self.broker.addr
            );
            let fresh = self.broker.bind_queue(&self.queue).await?;
            let mut torn = std::mem::replace(&mut *channel, fresh);
            torn.shutdown().await;
        }
        Ok(channel)
    }
}

#[async_trait]
impl QueueClient for TcpQueueClient {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn send(&self, envelope: Envelope) -> BrokerResult<()> {
        let mut channel = self.channel().await?;
        expect_ok(channel.call(&BrokerRequest::Send { envelope }).await?)
    }

    async fn receive(&self, wait: Duration) -> BrokerResult<Option<ReceivedEnvelope>> {
        let mut channel = self.channel().await?;
        expect_message(
            channel
                .call(&BrokerRequest::Receive {
                    wait_ms: wait_ms(wait),
                })
                .await?,
        )
    }

    async fn complete(&self, lock: &LockToken) -> BrokerResult<()> {
        let mut channel = self.channel().await?;
        expect_ok(channel.call(&BrokerRequest::Complete { lock_token: *lock }).await?)
    }

    async fn abandon(&self, lock: &LockToken) -> BrokerResult<()> {
        let mut channel = self.channel().await?;
        expect_ok(channel.call(&BrokerRequest::Abandon { lock_token: *lock }).await?)
    }

    async fn close(&self) -> BrokerResult<()> {
        close_channel(&self.channel).await
    }
}

/// Session claim bound to its own daemon connection.
pub struct TcpSessionReceiver {
    session_id: SessionId,
    channel: Mutex<Channel>,
}

#[async_trait]
impl SessionReceiver for TcpSessionReceiver {
    fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    async fn receive(&self, wait: Duration) -> BrokerResult<Option<ReceivedEnvelope>> {
        let mut channel = self.channel.lock().await;
        expect_message(
            channel
                .call(&BrokerRequest::Receive {
                    wait_ms: wait_ms(wait),
                })
                .await?,
        )
    }

    async fn complete(&self, lock: &LockToken) -> BrokerResult<()> {
        let mut channel = self.channel.lock().await;
        expect_ok(channel.call(&BrokerRequest::Complete { lock_token: *lock }).await?)
    }

    async fn close(&self) -> BrokerResult<()> {
        close_channel(&self.channel).await
    }
}

async fn close_channel(channel: &Mutex<Channel>) -> BrokerResult<()> {
    let mut channel = channel.lock().await;
    if channel.conn.is_none() {
        return Ok(());
    }
    // The daemon releases everything on disconnect too; the explicit close
    // only matters for a clean log on its side.
    let result = if channel.in_flight {
        Ok(())
    } else {
        channel.call(&BrokerRequest::Close).await.and_then(expect_ok)
    };
    channel.shutdown().await;
    result
}
