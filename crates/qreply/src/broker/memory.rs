// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process broker.
//!
//! Implements the queue semantics the exchange protocol depends on:
//! peek-lock delivery with lock expiry, time-to-live, sessions with
//! exclusive claims, duplicate detection and dead-lettering after too many
//! deliveries. It also backs the `qreply-broker` daemon.
//!
//! All state sits behind one mutex that is never held across an await.
//! Receivers park on a per-queue [`Notify`] and re-scan at least every
//! [`LOCK_SCAN_INTERVAL`] so that expired locks are picked up without a
//! dedicated timer task.

use super::{Broker, BrokerError, BrokerResult, Management, QueueClient, SessionReceiver};
use crate::descriptor::QueueDescriptor;
use crate::envelope::{Envelope, LockToken, ReceivedEnvelope, SessionId};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Deliveries after which a message is dead-lettered
pub const MAX_DELIVERY_COUNT: u32 = 10;

/// How long message ids are remembered for duplicate detection
pub const DUPLICATE_DETECTION_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Upper bound on how long a waiting receiver sleeps between scans
pub const LOCK_SCAN_INTERVAL: Duration = Duration::from_millis(50);

/// Longest single receive wait; longer requests are clamped
pub const MAX_RECEIVE_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Counters exposed for instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    pub queues_created: u64,
    pub queues_deleted: u64,
    pub messages_sent: u64,
    pub messages_completed: u64,
    pub messages_dead_lettered: u64,
    pub messages_expired: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    queues_created: AtomicU64,
    queues_deleted: AtomicU64,
    messages_sent: AtomicU64,
    messages_completed: AtomicU64,
    messages_dead_lettered: AtomicU64,
    messages_expired: AtomicU64,
}

#[derive(Debug)]
struct StoredMessage {
    envelope: Envelope,
    sequence_number: u64,
    enqueued_at: Instant,
    delivery_count: u32,
    lock: Option<(LockToken, Instant)>,
}

impl StoredMessage {
    fn is_locked(&self, now: Instant) -> bool {
        matches!(self.lock, Some((_, until)) if until > now)
    }
}

#[derive(Debug)]
struct QueueState {
    descriptor: QueueDescriptor,
    messages: VecDeque<StoredMessage>,
    dead_letters: Vec<Envelope>,
    locked_sessions: HashSet<String>,
    seen_ids: HashMap<String, Instant>,
    next_sequence: u64,
    notify: Arc<Notify>,
}

impl QueueState {
    fn new(descriptor: QueueDescriptor) -> Self {
        Self {
            descriptor,
            messages: VecDeque::new(),
            dead_letters: Vec::new(),
            locked_sessions: HashSet::new(),
            seen_ids: HashMap::new(),
            next_sequence: 1,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Drop unlocked messages past their time-to-live. Returns how many.
    fn purge_expired(&mut self, now: Instant) -> u64 {
        let ttl = self.descriptor.default_message_time_to_live;
        let before = self.messages.len();
        self.messages
            .retain(|m| m.is_locked(now) || now.duration_since(m.enqueued_at) < ttl);
        (before - self.messages.len()) as u64
    }

    /// Lock the first deliverable message, dead-lettering exhausted ones.
    fn lock_next(
        &mut self,
        session: Option<&str>,
        now: Instant,
        stats: &StatsCounters,
    ) -> Option<ReceivedEnvelope> {
        let requires_session = self.descriptor.requires_session;
        let lock_duration = self.descriptor.lock_duration;

        let mut idx = 0;
        while idx < self.messages.len() {
            let msg = &mut self.messages[idx];

            if msg.is_locked(now) {
                idx += 1;
                continue;
            }
            msg.lock = None;

            if requires_session && msg.envelope.session_id.as_deref() != session {
                idx += 1;
                continue;
            }

            if msg.delivery_count >= MAX_DELIVERY_COUNT {
                if let Some(dead) = self.messages.remove(idx) {
                    tracing::warn!(
                        "dead-lettering message {} on {} after {} deliveries",
                        dead.envelope.message_id_or_dash(),
                        self.descriptor.name,
                        dead.delivery_count
                    );
                    self.dead_letters.push(dead.envelope);
                    stats.messages_dead_lettered.fetch_add(1, Ordering::Relaxed);
                }
                continue;
            }

            msg.delivery_count += 1;
            let token = LockToken::new();
            msg.lock = Some((token, now + lock_duration));

            return Some(ReceivedEnvelope {
                envelope: msg.envelope.clone(),
                lock_token: token,
                sequence_number: msg.sequence_number,
                delivery_count: msg.delivery_count,
            });
        }

        None
    }

    fn position_of_live_lock(&self, lock: &LockToken, now: Instant) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| matches!(m.lock, Some((token, until)) if token == *lock && until > now))
    }
}

#[derive(Debug, Default)]
struct Inner {
    queues: Mutex<HashMap<String, QueueState>>,
    stats: StatsCounters,
}

/// Process-local broker. Cloning yields another handle on the same queues.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the broker counters.
    pub fn stats(&self) -> BrokerStats {
        let s = &self.inner.stats;
        BrokerStats {
            queues_created: s.queues_created.load(Ordering::Relaxed),
            queues_deleted: s.queues_deleted.load(Ordering::Relaxed),
            messages_sent: s.messages_sent.load(Ordering::Relaxed),
            messages_completed: s.messages_completed.load(Ordering::Relaxed),
            messages_dead_lettered: s.messages_dead_lettered.load(Ordering::Relaxed),
            messages_expired: s.messages_expired.load(Ordering::Relaxed),
        }
    }

    /// Messages currently held by a queue (locked ones included).
    pub fn message_count(&self, queue: &str) -> Option<usize> {
        self.inner.queues.lock().get(queue).map(|q| q.messages.len())
    }

    /// Envelopes moved to a queue's dead-letter list.
    pub fn dead_letters(&self, queue: &str) -> Vec<Envelope> {
        self.inner
            .queues
            .lock()
            .get(queue)
            .map(|q| q.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Names of all queues.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.queues.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn with_queue<T>(
        &self,
        queue: &str,
        f: impl FnOnce(&mut QueueState, &StatsCounters) -> BrokerResult<T>,
    ) -> BrokerResult<T> {
        let mut queues = self.inner.queues.lock();
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        f(state, &self.inner.stats)
    }

    pub(crate) fn enqueue(&self, queue: &str, mut envelope: Envelope) -> BrokerResult<()> {
        let notify = self.with_queue(queue, |state, stats| {
            if state.descriptor.requires_session && envelope.session_id.is_none() {
                return Err(BrokerError::SessionRequired(queue.to_string()));
            }

            let now = Instant::now();
            let message_id = envelope
                .message_id
                .get_or_insert_with(|| uuid::Uuid::new_v4().simple().to_string())
                .clone();

            if state.descriptor.requires_duplicate_detection {
                state
                    .seen_ids
                    .retain(|_, seen| now.duration_since(*seen) < DUPLICATE_DETECTION_WINDOW);
                if state.seen_ids.contains_key(&message_id) {
                    tracing::debug!("duplicate message {} dropped on {}", message_id, queue);
                    return Ok(None);
                }
                state.seen_ids.insert(message_id, now);
            }

            let sequence_number = state.next_sequence;
            state.next_sequence += 1;
            state.messages.push_back(StoredMessage {
                envelope,
                sequence_number,
                enqueued_at: now,
                delivery_count: 0,
                lock: None,
            });
            stats.messages_sent.fetch_add(1, Ordering::Relaxed);
            Ok(Some(state.notify.clone()))
        })?;

        if let Some(notify) = notify {
            notify.notify_waiters();
        }
        Ok(())
    }

    fn try_lock_next(
        &self,
        queue: &str,
        session: Option<&str>,
    ) -> BrokerResult<Option<ReceivedEnvelope>> {
        self.with_queue(queue, |state, stats| {
            if state.descriptor.requires_session && session.is_none() {
                return Err(BrokerError::SessionRequired(queue.to_string()));
            }
            let now = Instant::now();
            let expired = state.purge_expired(now);
            if expired > 0 {
                stats.messages_expired.fetch_add(expired, Ordering::Relaxed);
            }
            Ok(state.lock_next(session, now, stats))
        })
    }

    pub(crate) async fn receive_from(
        &self,
        queue: &str,
        session: Option<&str>,
        wait: Duration,
    ) -> BrokerResult<Option<ReceivedEnvelope>> {
        let deadline = Instant::now() + wait.min(MAX_RECEIVE_WAIT);

        loop {
            let notify = self.with_queue(queue, |state, _| Ok(state.notify.clone()))?;
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register before scanning so a send between scan and sleep still wakes us.
            notified.as_mut().enable();

            if let Some(received) = self.try_lock_next(queue, session)? {
                return Ok(Some(received));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let slice = (deadline - now).min(LOCK_SCAN_INTERVAL);
            let _ = tokio::time::timeout(slice, notified).await;
        }
    }

    pub(crate) fn complete_lock(&self, queue: &str, lock: &LockToken) -> BrokerResult<()> {
        self.with_queue(queue, |state, stats| {
            let idx = state
                .position_of_live_lock(lock, Instant::now())
                .ok_or_else(|| BrokerError::LockLost(lock.to_string()))?;
            state.messages.remove(idx);
            stats.messages_completed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }

    pub(crate) fn abandon_lock(&self, queue: &str, lock: &LockToken) -> BrokerResult<()> {
        let notify = self.with_queue(queue, |state, _| {
            let idx = state
                .position_of_live_lock(lock, Instant::now())
                .ok_or_else(|| BrokerError::LockLost(lock.to_string()))?;
            state.messages[idx].lock = None;
            Ok(state.notify.clone())
        })?;
        notify.notify_waiters();
        Ok(())
    }

    pub(crate) fn claim_session(&self, queue: &str, session_id: &SessionId) -> BrokerResult<()> {
        self.with_queue(queue, |state, _| {
            if !state.descriptor.requires_session {
                return Err(BrokerError::SessionsNotSupported(queue.to_string()));
            }
            if !state.locked_sessions.insert(session_id.as_str().to_string()) {
                return Err(BrokerError::SessionLocked {
                    queue: queue.to_string(),
                    session: session_id.to_string(),
                });
            }
            Ok(())
        })
    }

    pub(crate) fn release_session(&self, queue: &str, session_id: &SessionId) {
        if let Some(state) = self.inner.queues.lock().get_mut(queue) {
            state.locked_sessions.remove(session_id.as_str());
        }
    }
}

#[async_trait]
impl Management for MemoryBroker {
    async fn queue_exists(&self, name: &str) -> BrokerResult<bool> {
        Ok(self.inner.queues.lock().contains_key(name))
    }

    async fn get_queue(&self, name: &str) -> BrokerResult<QueueDescriptor> {
        self.with_queue(name, |state, _| Ok(state.descriptor.clone()))
    }

    async fn create_queue(&self, descriptor: &QueueDescriptor) -> BrokerResult<()> {
        if descriptor.name.is_empty() {
            return Err(BrokerError::Protocol("queue name must not be empty".into()));
        }
        let mut queues = self.inner.queues.lock();
        if queues.contains_key(&descriptor.name) {
            return Err(BrokerError::QueueAlreadyExists(descriptor.name.clone()));
        }
        queues.insert(descriptor.name.clone(), QueueState::new(descriptor.clone()));
        self.inner
            .stats
            .queues_created
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!("created queue {} ({:?})", descriptor.name, descriptor);
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> BrokerResult<()> {
        let removed = self
            .inner
            .queues
            .lock()
            .remove(name)
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))?;
        self.inner
            .stats
            .queues_deleted
            .fetch_add(1, Ordering::Relaxed);
        // wake parked receivers so they observe the deletion
        removed.notify.notify_waiters();
        tracing::debug!(
            "deleted queue {} ({} messages discarded)",
            name,
            removed.messages.len()
        );
        Ok(())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn open_queue(&self, name: &str) -> BrokerResult<Box<dyn QueueClient>> {
        if !self.queue_exists(name).await? {
            return Err(BrokerError::QueueNotFound(name.to_string()));
        }
        Ok(Box::new(MemoryQueueClient {
            broker: self.clone(),
            queue: name.to_string(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn accept_session(
        &self,
        queue: &str,
        session_id: &SessionId,
    ) -> BrokerResult<Box<dyn SessionReceiver>> {
        self.claim_session(queue, session_id)?;
        Ok(Box::new(MemorySessionReceiver {
            broker: self.clone(),
            queue: queue.to_string(),
            session_id: session_id.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Queue handle on a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryQueueClient {
    broker: MemoryBroker,
    queue: String,
    closed: AtomicBool,
}

impl MemoryQueueClient {
    fn ensure_open(&self) -> BrokerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl QueueClient for MemoryQueueClient {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn send(&self, envelope: Envelope) -> BrokerResult<()> {
        self.ensure_open()?;
        self.broker.enqueue(&self.queue, envelope)
    }

    async fn receive(&self, wait: Duration) -> BrokerResult<Option<ReceivedEnvelope>> {
        self.ensure_open()?;
        self.broker.receive_from(&self.queue, None, wait).await
    }

    async fn complete(&self, lock: &LockToken) -> BrokerResult<()> {
        self.ensure_open()?;
        self.broker.complete_lock(&self.queue, lock)
    }

    async fn abandon(&self, lock: &LockToken) -> BrokerResult<()> {
        self.ensure_open()?;
        self.broker.abandon_lock(&self.queue, lock)
    }

    async fn close(&self) -> BrokerResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Session claim on a [`MemoryBroker`]. Dropping it releases the claim.
#[derive(Debug)]
pub struct MemorySessionReceiver {
    broker: MemoryBroker,
    queue: String,
    session_id: SessionId,
    closed: AtomicBool,
}

#[async_trait]
impl SessionReceiver for MemorySessionReceiver {
    fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    async fn receive(&self, wait: Duration) -> BrokerResult<Option<ReceivedEnvelope>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        self.broker
            .receive_from(&self.queue, Some(self.session_id.as_str()), wait)
            .await
    }

    async fn complete(&self, lock: &LockToken) -> BrokerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        self.broker.complete_lock(&self.queue, lock)
    }

    async fn close(&self) -> BrokerResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.broker.release_session(&self.queue, &self.session_id);
        }
        Ok(())
    }
}

impl Drop for MemorySessionReceiver {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.broker.release_session(&self.queue, &self.session_id);
        }
    }
}
