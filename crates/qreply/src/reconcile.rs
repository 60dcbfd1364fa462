// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Queue topology reconciliation.
//!
//! For each queue: create it when missing, otherwise compare the live
//! configuration with the target under a [`DriftPolicy`] and delete and
//! recreate it on drift. Recreating drops whatever the queue held.
//!
//! Broker failures propagate immediately and nothing is retried; rerun the
//! whole reconciliation to recover.

use crate::broker::Management;
use crate::descriptor::{DriftPolicy, QueueDescriptor};
use crate::error::Result;
use serde::Serialize;
use std::fmt;

/// What reconciliation did to one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// Present and matching the target
    Unchanged,
    /// Absent, created from the target
    Created,
    /// Drifted, deleted and created again
    Recreated,
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::Created => write!(f, "created"),
            Self::Recreated => write!(f, "recreated"),
        }
    }
}

/// Outcome for the request and the response queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub request: ReconcileAction,
    pub response: ReconcileAction,
}

impl ReconcileReport {
    /// True when neither queue was touched.
    pub fn is_noop(&self) -> bool {
        self.request == ReconcileAction::Unchanged && self.response == ReconcileAction::Unchanged
    }
}

/// Brings queues in line with their target descriptors.
pub struct TopologyReconciler<'a, M: Management + ?Sized> {
    management: &'a M,
    policy: DriftPolicy,
}

impl<'a, M: Management + ?Sized> TopologyReconciler<'a, M> {
    pub fn new(management: &'a M, policy: DriftPolicy) -> Self {
        Self { management, policy }
    }

    pub fn policy(&self) -> DriftPolicy {
        self.policy
    }

    /// Reconcile both queues, request queue first.
    pub async fn ensure(
        &self,
        request: &QueueDescriptor,
        response: &QueueDescriptor,
    ) -> Result<ReconcileReport> {
        let request = self.ensure_queue(request).await?;
        let response = self.ensure_queue(response).await?;
        Ok(ReconcileReport { request, response })
    }

    /// Reconcile a single queue.
    pub async fn ensure_queue(&self, target: &QueueDescriptor) -> Result<ReconcileAction> {
        if !self.management.queue_exists(&target.name).await? {
            self.management.create_queue(target).await?;
            tracing::info!("queue {} created", target.name);
            return Ok(ReconcileAction::Created);
        }

        let live = self.management.get_queue(&target.name).await?;
        if !self.policy.needs_recreation(&live, target) {
            tracing::debug!("queue {} matches target", target.name);
            return Ok(ReconcileAction::Unchanged);
        }

        tracing::warn!(
            "queue {} drifted (session {} -> {}, lock {:?} -> {:?}, ttl {:?} -> {:?}), recreating",
            target.name,
            live.requires_session,
            target.requires_session,
            live.lock_duration,
            target.lock_duration,
            live.default_message_time_to_live,
            target.default_message_time_to_live
        );
        self.management.delete_queue(&target.name).await?;
        self.management.create_queue(target).await?;
        tracing::info!("queue {} recreated", target.name);
        Ok(ReconcileAction::Recreated)
    }
}
