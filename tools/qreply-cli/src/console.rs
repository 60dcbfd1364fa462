// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timestamped console output fed from any task.
//!
//! Lines go through a channel to one writer task so concurrent exchanges
//! never interleave mid-line.

use chrono::Local;
use colored::*;
use qreply::loan::GetLoanOptionsRequest;
use qreply::{Envelope, Error, ResponderObserver, SenderObserver};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

enum Line {
    Text(String),
    Stop,
}

/// Cloneable handle that queues lines for the writer task.
#[derive(Clone)]
pub struct Console {
    tx: mpsc::UnboundedSender<Line>,
}

/// The writer task. Stop it to flush everything queued so far.
pub struct ConsoleWriter {
    tx: mpsc::UnboundedSender<Line>,
    handle: JoinHandle<()>,
}

impl Console {
    pub fn start() -> (Console, ConsoleWriter) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                match line {
                    Line::Text(text) => {
                        println!("[{}] {}", Local::now().format("%H:%M:%S%.3f"), text);
                    }
                    Line::Stop => break,
                }
            }
        });
        (
            Console { tx: tx.clone() },
            ConsoleWriter { tx, handle },
        )
    }

    pub fn line(&self, text: impl Into<String>) {
        // writer already stopped: the line is dropped
        let _ = self.tx.send(Line::Text(text.into()));
    }
}

impl ConsoleWriter {
    pub async fn stop(self) {
        let _ = self.tx.send(Line::Stop);
        let _ = self.handle.await;
    }
}

/// Application message, printed immediately in yellow.
pub fn app_message(text: impl std::fmt::Display) {
    println!("{}", text.to_string().yellow());
}

/// Prints the sender and responder hooks of loan exchanges.
#[derive(Clone)]
pub struct ConsoleObserver {
    console: Console,
}

impl ConsoleObserver {
    pub fn new(console: Console) -> Self {
        Self { console }
    }
}

impl SenderObserver<GetLoanOptionsRequest> for ConsoleObserver {
    fn request_sending(&self, request: &GetLoanOptionsRequest, envelope: &Envelope) {
        self.console.line(format!(
            "{:03} REQUEST: CreditScore = {}, SessionId = {}",
            request.id,
            request.credit_score,
            envelope.reply_to_session_id.as_deref().unwrap_or("-")
        ));
    }
}

impl ResponderObserver for ConsoleObserver {
    fn request_received(&self, envelope: &Envelope) {
        self.console.line(format!(
            "Incoming: SessionId = {}",
            envelope.reply_to_session_id.as_deref().unwrap_or("-")
        ));
    }

    fn response_sending(&self, envelope: &Envelope) {
        self.console.line(format!(
            "Outgoing: SessionId = {}",
            envelope.session_id.as_deref().unwrap_or("-")
        ));
    }

    fn exception_occurred(&self, error: &Error) {
        self.console.line(format!("Fatal: {}", error).red().to_string());
    }
}
