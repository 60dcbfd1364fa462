// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker daemon core.
//!
//! One task per client connection. A connection starts unbound and serves
//! management requests; `open_queue` or `accept_session` binds it. When the
//! connection goes away, locks it still holds are abandoned and its session
//! claim is released.

use crate::config::BrokerConfig;
use qreply::broker::connection::{ConnectionError, FramedConnection};
use qreply::broker::wire::{BrokerReply, BrokerRequest};
use qreply::broker::{
    Broker, BrokerResult, Management, MemoryBroker, QueueClient, SessionReceiver,
};
use qreply::{LockToken, SessionId, Shutdown, ShutdownSignal};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// What a connection is currently bound to.
enum Binding {
    Unbound,
    Queue {
        client: Box<dyn QueueClient>,
        /// Locks handed out on this connection and not yet settled
        outstanding: Vec<LockToken>,
    },
    Session(Box<dyn SessionReceiver>),
}

impl Binding {
    async fn release(self) {
        match self {
            Binding::Unbound => {}
            Binding::Queue {
                client,
                outstanding,
            } => {
                for lock in &outstanding {
                    // already expired locks are fine to skip
                    let _ = client.abandon(lock).await;
                }
                if !outstanding.is_empty() {
                    debug!(
                        "abandoned {} unsettled lock(s) on {}",
                        outstanding.len(),
                        client.queue()
                    );
                }
                let _ = client.close().await;
            }
            Binding::Session(receiver) => {
                let _ = receiver.close().await;
            }
        }
    }
}

/// Broker daemon serving one [`MemoryBroker`].
#[derive(Clone)]
pub struct BrokerServer {
    config: Arc<BrokerConfig>,
    broker: MemoryBroker,
    shutdown: Arc<Shutdown>,
    signal: ShutdownSignal,
    running: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
}

impl BrokerServer {
    /// Create a server and provision the configured queues.
    pub async fn new(config: BrokerConfig) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let broker = MemoryBroker::new();
        for spec in &config.queues {
            broker
                .create_queue(&spec.to_descriptor())
                .await
                .map_err(|e| ServerError::Config(format!("queue {}: {}", spec.name, e)))?;
            info!(
                "Provisioned queue {} (session={})",
                spec.name, spec.requires_session
            );
        }

        let (shutdown, signal) = Shutdown::new();
        Ok(Self {
            config: Arc::new(config),
            broker,
            shutdown: Arc::new(shutdown),
            signal,
            running: Arc::new(AtomicBool::new(false)),
            connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let local = listener.local_addr()?;
        info!("Broker listening on {}", local);

        if let Some(interval) = self.config.stats_interval() {
            tokio::spawn(Self::report_stats(
                self.broker.clone(),
                interval,
                self.signal.clone(),
            ));
        }

        let mut signal = self.signal.clone();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!("New connection from {}", peer_addr);
                            let _ = stream.set_nodelay(true);

                            let broker = self.broker.clone();
                            let max_size = self.config.max_message_size;
                            let signal = self.signal.clone();
                            let connections = self.connections.clone();

                            connections.fetch_add(1, Ordering::Relaxed);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(
                                    stream, peer_addr, broker, max_size, signal,
                                ).await {
                                    warn!("Connection error from {}: {}", peer_addr, e);
                                }
                                connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = signal.wait() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn report_stats(broker: MemoryBroker, interval: Duration, mut signal: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let s = broker.stats();
                    info!(
                        "queues={} sent={} completed={} dead-lettered={} expired={}",
                        broker.queue_names().len(),
                        s.messages_sent,
                        s.messages_completed,
                        s.messages_dead_lettered,
                        s.messages_expired
                    );
                }
                _ = signal.wait() => break,
            }
        }
    }

    /// Handle a client connection.
    async fn handle_connection(
        stream: TcpStream,
        peer_addr: SocketAddr,
        broker: MemoryBroker,
        max_message_size: usize,
        mut signal: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let mut conn = FramedConnection::new(stream, max_message_size);
        let mut binding = Binding::Unbound;

        let result = loop {
            let request = tokio::select! {
                read = conn.read_frame::<BrokerRequest>() => read,
                _ = signal.wait() => break Ok(()),
            };

            let request = match request {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!("Connection closed: {}", peer_addr);
                    break Ok(());
                }
                Err(ConnectionError::Protocol(e)) => {
                    // tell the client why before hanging up
                    let _ = conn.write_frame(&BrokerReply::bad_request(e.clone())).await;
                    break Err(ServerError::Protocol(e));
                }
                Err(e) => break Err(e.into()),
            };

            let op = request.op();
            // a blocked receive must not outlive its peer
            let reply = tokio::select! {
                biased;
                reply = Self::dispatch(&broker, &mut binding, request) => reply,
                _ = conn.closed() => {
                    debug!("Connection closed during {}: {}", op, peer_addr);
                    break Ok(());
                }
                _ = signal.wait() => break Ok(()),
            };

            if let BrokerReply::Error { code, message, .. } = &reply {
                debug!("{} from {} failed ({}): {}", op, peer_addr, code, message);
            }

            if let Err(e) = conn.write_frame(&reply).await {
                break Err(e.into());
            }
        };

        binding.release().await;
        result
    }

    async fn dispatch(
        broker: &MemoryBroker,
        binding: &mut Binding,
        request: BrokerRequest,
    ) -> BrokerReply {
        let result: BrokerResult<BrokerReply> = match request {
            BrokerRequest::QueueExists { queue } => broker
                .queue_exists(&queue)
                .await
                .map(|exists| BrokerReply::Exists { exists }),

            BrokerRequest::GetQueue { queue } => broker
                .get_queue(&queue)
                .await
                .map(|descriptor| BrokerReply::Queue { descriptor }),

            BrokerRequest::CreateQueue { descriptor } => broker
                .create_queue(&descriptor)
                .await
                .map(|()| BrokerReply::Ok),

            BrokerRequest::DeleteQueue { queue } => {
                broker.delete_queue(&queue).await.map(|()| BrokerReply::Ok)
            }

            BrokerRequest::OpenQueue { queue } => {
                if !matches!(binding, Binding::Unbound) {
                    return BrokerReply::bad_request("connection is already bound");
                }
                broker.open_queue(&queue).await.map(|client| {
                    *binding = Binding::Queue {
                        client,
                        outstanding: Vec::new(),
                    };
                    BrokerReply::Ok
                })
            }

            BrokerRequest::AcceptSession { queue, session_id } => {
                if !matches!(binding, Binding::Unbound) {
                    return BrokerReply::bad_request("connection is already bound");
                }
                broker
                    .accept_session(&queue, &SessionId::from_wire(session_id))
                    .await
                    .map(|receiver| {
                        *binding = Binding::Session(receiver);
                        BrokerReply::Ok
                    })
            }

            BrokerRequest::Send { envelope } => match binding {
                Binding::Queue { client, .. } => client.send(envelope).await.map(|()| BrokerReply::Ok),
                Binding::Session(_) => {
                    return BrokerReply::bad_request("session connections cannot send")
                }
                Binding::Unbound => return BrokerReply::bad_request("connection is not bound"),
            },

            BrokerRequest::Receive { wait_ms } => {
                let wait = Duration::from_millis(wait_ms);
                match binding {
                    Binding::Queue {
                        client,
                        outstanding,
                    } => client.receive(wait).await.map(|message| {
                        if let Some(m) = &message {
                            outstanding.push(m.lock_token);
                        }
                        BrokerReply::Message { message }
                    }),
                    Binding::Session(receiver) => receiver
                        .receive(wait)
                        .await
                        .map(|message| BrokerReply::Message { message }),
                    Binding::Unbound => return BrokerReply::bad_request("connection is not bound"),
                }
            }

            BrokerRequest::Complete { lock_token } => match binding {
                Binding::Queue {
                    client,
                    outstanding,
                } => {
                    outstanding.retain(|t| *t != lock_token);
                    client.complete(&lock_token).await.map(|()| BrokerReply::Ok)
                }
                Binding::Session(receiver) => receiver
                    .complete(&lock_token)
                    .await
                    .map(|()| BrokerReply::Ok),
                Binding::Unbound => return BrokerReply::bad_request("connection is not bound"),
            },

            BrokerRequest::Abandon { lock_token } => match binding {
                Binding::Queue {
                    client,
                    outstanding,
                } => {
                    outstanding.retain(|t| *t != lock_token);
                    client.abandon(&lock_token).await.map(|()| BrokerReply::Ok)
                }
                Binding::Session(_) => {
                    return BrokerReply::bad_request("session connections cannot abandon")
                }
                Binding::Unbound => return BrokerReply::bad_request("connection is not bound"),
            },

            BrokerRequest::Close => {
                std::mem::replace(binding, Binding::Unbound).release().await;
                Ok(BrokerReply::Ok)
            }
        };

        result.unwrap_or_else(|e| BrokerReply::from_error(&e))
    }

    /// Signal the server to shutdown.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// The broker this server serves.
    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    /// Currently open client connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Check if server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Server error types.
#[derive(Debug)]
pub enum ServerError {
    Config(String),
    Bind(String),
    AlreadyRunning,
    Io(String),
    Protocol(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(s) => write!(f, "Configuration error: {}", s),
            Self::Bind(s) => write!(f, "Bind error: {}", s),
            Self::AlreadyRunning => write!(f, "Server already running"),
            Self::Io(s) => write!(f, "I/O error: {}", s),
            Self::Protocol(s) => write!(f, "Protocol error: {}", s),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<ConnectionError> for ServerError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::Io(s) => Self::Io(s),
            ConnectionError::Protocol(s) => Self::Protocol(s),
        }
    }
}
