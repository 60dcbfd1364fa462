// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Queue descriptors and the drift policy used to compare them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default message time-to-live for both queues (20 minutes)
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(20 * 60);

/// Default peek-lock duration for both queues (1 minute)
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(60);

/// Named queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDescriptor {
    pub name: String,
    pub default_message_time_to_live: Duration,
    pub lock_duration: Duration,
    pub enable_partitioning: bool,
    pub requires_duplicate_detection: bool,
    /// Receivers must claim a session to read messages
    pub requires_session: bool,
}

impl QueueDescriptor {
    /// Request queue: competing receivers, no sessions.
    pub fn request(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_message_time_to_live: DEFAULT_MESSAGE_TTL,
            lock_duration: DEFAULT_LOCK_DURATION,
            enable_partitioning: true,
            requires_duplicate_detection: false,
            requires_session: false,
        }
    }

    /// Response queue: receivers claim the session they expect.
    pub fn response(name: impl Into<String>) -> Self {
        Self {
            requires_session: true,
            ..Self::request(name)
        }
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.default_message_time_to_live = ttl;
        self
    }

    pub fn with_lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration = lock_duration;
        self
    }

    pub fn with_partitioning(mut self, enabled: bool) -> Self {
        self.enable_partitioning = enabled;
        self
    }

    pub fn with_duplicate_detection(mut self, enabled: bool) -> Self {
        self.requires_duplicate_detection = enabled;
        self
    }

    pub fn with_session(mut self, requires_session: bool) -> Self {
        self.requires_session = requires_session;
        self
    }
}

/// Rule deciding whether a live queue must be deleted and recreated.
///
/// Two rules have been in use for the same topology: the earlier one only
/// looked at the session flag, the later one also treats a shorter lock
/// duration or time-to-live as drift. Both are kept and selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftPolicy {
    /// Recreate only when the session flag differs
    SessionOnly,
    /// Session flag differs, or lock duration / TTL is below target
    #[default]
    Strict,
}

impl DriftPolicy {
    /// True if `live` has drifted from `target` under this policy.
    pub fn needs_recreation(self, live: &QueueDescriptor, target: &QueueDescriptor) -> bool {
        let session_drift = live.requires_session != target.requires_session;

        match self {
            Self::SessionOnly => session_drift,
            Self::Strict => {
                session_drift
                    || live.lock_duration < target.lock_duration
                    || live.default_message_time_to_live < target.default_message_time_to_live
            }
        }
    }
}

impl std::str::FromStr for DriftPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "session-only" | "session_only" | "session" => Ok(Self::SessionOnly),
            "strict" => Ok(Self::Strict),
            _ => Err(format!("Unknown drift policy: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_descriptors() {
        let rq = QueueDescriptor::request("thequeue");
        assert!(!rq.requires_session);
        assert!(rq.enable_partitioning);
        assert!(!rq.requires_duplicate_detection);
        assert_eq!(rq.default_message_time_to_live, Duration::from_secs(1200));
        assert_eq!(rq.lock_duration, Duration::from_secs(60));

        let rs = QueueDescriptor::response("theotherqueue");
        assert!(rs.requires_session);
        assert_eq!(rs.lock_duration, rq.lock_duration);
    }

    #[test]
    fn session_flag_is_drift_under_both_policies() {
        let target = QueueDescriptor::request("q");
        let live = target.clone().with_session(true);
        assert!(DriftPolicy::SessionOnly.needs_recreation(&live, &target));
        assert!(DriftPolicy::Strict.needs_recreation(&live, &target));
    }

    #[test]
    fn short_lock_is_drift_only_when_strict() {
        let target = QueueDescriptor::request("q");
        let live = target.clone().with_lock_duration(Duration::from_secs(30));
        assert!(!DriftPolicy::SessionOnly.needs_recreation(&live, &target));
        assert!(DriftPolicy::Strict.needs_recreation(&live, &target));
    }

    #[test]
    fn longer_settings_are_not_drift() {
        let target = QueueDescriptor::response("q");
        let live = target
            .clone()
            .with_lock_duration(Duration::from_secs(300))
            .with_time_to_live(Duration::from_secs(3600))
            .with_partitioning(false);
        assert!(!DriftPolicy::Strict.needs_recreation(&live, &target));
    }

    #[test]
    fn short_ttl_is_drift_when_strict() {
        let target = QueueDescriptor::response("q");
        let live = target.clone().with_time_to_live(Duration::from_secs(60));
        assert!(DriftPolicy::Strict.needs_recreation(&live, &target));
        assert!(!DriftPolicy::SessionOnly.needs_recreation(&live, &target));
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("strict".parse::<DriftPolicy>(), Ok(DriftPolicy::Strict));
        assert_eq!(
            "session-only".parse::<DriftPolicy>(),
            Ok(DriftPolicy::SessionOnly)
        );
        assert!("lenient".parse::<DriftPolicy>().is_err());
    }
}
