//! Health snapshots of a proxy repository's remote.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection state of a remote, as reported by its HTTP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteConnectionStatusType {
    Uninitialised,
    Ready,
    Available,
    Unavailable,
    Blocked,
    AutoBlockedUnavailable,
    Offline,
}

impl RemoteConnectionStatusType {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Uninitialised => "Uninitialised",
            Self::Ready => "Ready to Connect",
            Self::Available => "Remote Available",
            Self::Unavailable => "Remote Unavailable",
            Self::Blocked => "Remote Manually Blocked",
            Self::AutoBlockedUnavailable => "Remote Auto Blocked and Unavailable",
            Self::Offline => "Repository Offline",
        }
    }
}

impl fmt::Display for RemoteConnectionStatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialised => "UNINITIALISED",
            Self::Ready => "READY",
            Self::Available => "AVAILABLE",
            Self::Unavailable => "UNAVAILABLE",
            Self::Blocked => "BLOCKED",
            Self::AutoBlockedUnavailable => "AUTO_BLOCKED_UNAVAILABLE",
            Self::Offline => "OFFLINE",
        };
        f.write_str(name)
    }
}

/// Immutable snapshot of a remote's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConnectionStatus {
    #[serde(rename = "type")]
    pub status_type: RemoteConnectionStatusType,
    pub reason: Option<String>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub request_url: Option<String>,
}

impl RemoteConnectionStatus {
    pub fn new(status_type: RemoteConnectionStatusType) -> Self {
        Self { status_type, reason: None, blocked_until: None, request_url: None }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_blocked_until(mut self, blocked_until: DateTime<Utc>) -> Self {
        self.blocked_until = Some(blocked_until);
        self
    }

    pub fn with_request_url(mut self, request_url: impl Into<String>) -> Self {
        self.request_url = Some(request_url.into());
        self
    }

    pub fn description(&self) -> &'static str {
        self.status_type.description()
    }

    /// Whether replacing `self` with `next` is worth notifying about: the type
    /// changed, or the block now lasts strictly longer.
    pub fn is_material_change(&self, next: &RemoteConnectionStatus) -> bool {
        if self.status_type != next.status_type {
            return true;
        }
        match (self.blocked_until, next.blocked_until) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(current), Some(proposed)) => proposed > current,
        }
    }
}

impl Default for RemoteConnectionStatus {
    fn default() -> Self {
        Self::new(RemoteConnectionStatusType::Uninitialised)
    }
}

/// Receives material status transitions of a remote.
pub trait RemoteConnectionStatusObserver: Send + Sync {
    fn on_status_changed(&self, old: &RemoteConnectionStatus, new: &RemoteConnectionStatus);
}

#[cfg(test)]
mod tests {
    use super::*;
    use RemoteConnectionStatusType::*;

    #[test]
    fn test_type_change_is_material() {
        let ready = RemoteConnectionStatus::new(Ready);
        assert!(ready.is_material_change(&RemoteConnectionStatus::new(Available)));
        assert!(!ready.is_material_change(&RemoteConnectionStatus::new(Ready).with_reason("other")));
    }

    #[test]
    fn test_later_block_is_material() {
        let now = Utc::now();
        let blocked = RemoteConnectionStatus::new(AutoBlockedUnavailable).with_blocked_until(now);

        let later = RemoteConnectionStatus::new(AutoBlockedUnavailable).with_blocked_until(now + chrono::Duration::seconds(40));
        let same = RemoteConnectionStatus::new(AutoBlockedUnavailable).with_blocked_until(now);
        let earlier = RemoteConnectionStatus::new(AutoBlockedUnavailable).with_blocked_until(now - chrono::Duration::seconds(1));

        assert!(blocked.is_material_change(&later));
        assert!(!blocked.is_material_change(&same));
        assert!(!blocked.is_material_change(&earlier));
        assert!(!blocked.is_material_change(&RemoteConnectionStatus::new(AutoBlockedUnavailable)));
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(RemoteConnectionStatus::default().description(), "Uninitialised");
        assert_eq!(AutoBlockedUnavailable.description(), "Remote Auto Blocked and Unavailable");
        assert_eq!(AutoBlockedUnavailable.to_string(), "AUTO_BLOCKED_UNAVAILABLE");
    }

    #[test]
    fn test_serialized_type_name() {
        let json = serde_json::to_value(RemoteConnectionStatus::new(AutoBlockedUnavailable)).unwrap();
        assert_eq!(json["type"], "AUTO_BLOCKED_UNAVAILABLE");
    }
}
