// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Framed JSON connection shared by the TCP client and the daemon.

use super::BrokerError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Connection error types.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for ConnectionError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<ConnectionError> for BrokerError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::Io(s) => BrokerError::Connection(s),
            ConnectionError::Protocol(s) => BrokerError::Protocol(s),
        }
    }
}

/// One length-prefixed JSON stream.
pub struct FramedConnection {
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    max_frame_size: usize,
    read_buffer: Vec<u8>,
}

impl FramedConnection {
    pub fn new(stream: TcpStream, max_frame_size: usize) -> Self {
        let peer_addr = stream.peer_addr().ok();
        Self {
            stream,
            peer_addr,
            max_frame_size,
            read_buffer: Vec::with_capacity(4096),
        }
    }

    /// Connect to `addr` and wrap the stream.
    pub async fn connect(addr: &str, max_frame_size: usize) -> Result<Self, ConnectionError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, max_frame_size))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Read one frame.
    ///
    /// Returns `Ok(None)` if the peer closed the connection between frames.
    pub async fn read_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, ConnectionError> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 {
            return Err(ConnectionError::Protocol("Empty frame".into()));
        }
        if len > self.max_frame_size {
            return Err(ConnectionError::Protocol(format!(
                "Frame too large: {} > {}",
                len, self.max_frame_size
            )));
        }

        self.read_buffer.clear();
        self.read_buffer.resize(len, 0);
        self.stream.read_exact(&mut self.read_buffer).await?;

        let value = serde_json::from_slice(&self.read_buffer)
            .map_err(|e| ConnectionError::Protocol(format!("Invalid JSON: {}", e)))?;
        Ok(Some(value))
    }

    /// Write one frame.
    pub async fn write_frame<T: Serialize>(&mut self, value: &T) -> Result<(), ConnectionError> {
        let json = serde_json::to_vec(value)
            .map_err(|e| ConnectionError::Protocol(format!("Serialize error: {}", e)))?;

        if json.len() > self.max_frame_size {
            return Err(ConnectionError::Protocol(format!(
                "Frame too large: {} > {}",
                json.len(),
                self.max_frame_size
            )));
        }

        self.stream.write_all(&(json.len() as u32).to_be_bytes()).await?;
        self.stream.write_all(&json).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Write `request`, then wait for the single reply.
    pub async fn call<Req, Rep>(&mut self, request: &Req) -> Result<Rep, ConnectionError>
    where
        Req: Serialize,
        Rep: DeserializeOwned,
    {
        self.write_frame(request).await?;
        self.read_frame()
            .await?
            .ok_or_else(|| ConnectionError::Io("connection closed by peer".into()))
    }

    /// Resolve once the peer hangs up.
    ///
    /// Stays pending while the peer is connected, including when it has
    /// unread bytes queued. Nothing is consumed from the stream.
    pub async fn closed(&self) {
        let mut byte = [0u8; 1];
        match self.stream.peek(&mut byte).await {
            Ok(0) | Err(_) => {}
            Ok(_) => std::future::pending().await,
        }
    }

    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.stream.shutdown().await.map_err(Into::into)
    }
}
