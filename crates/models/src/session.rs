use crate::context::{DeviceDescriptor, Location};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of a session.
///
/// `Expired` and `Revoked` are terminal: a session never returns to
/// `Active` from either. `Suspended` is the one recoverable non-active
/// state (admin hold pending review).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
    Suspended,
}

impl SessionStatus {
    /// Whether this state can never transition back to `Active`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Expired | SessionStatus::Revoked)
    }
}

/// An authenticated session: identity, validity window, activity
/// counters, and the device/location snapshot captured at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque random token, unique and unguessable. Immutable.
    pub id: String,
    /// Owning principal. Immutable.
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    /// Absolute expiry; advances only via explicit renewal.
    pub expires_at: DateTime<Utc>,
    /// Updated on every successful validation.
    pub last_activity_at: DateTime<Utc>,
    pub status: SessionStatus,
    /// Opaque hash of the device/browser/network signature at creation.
    /// Empty when device tracking is disabled.
    pub device_fingerprint: String,
    pub ip_address: String,
    pub platform: String,
    pub browser: String,
    pub os: String,
    /// Geo snapshot from creation time, if the resolver produced one.
    pub location: Option<Location>,
    pub activity_count: u64,
    pub suspicious_activity_count: u64,
    /// Free-form bag for revoke reasons, platform hints, etc.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Session {
    pub fn new(id: String, user_id: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id,
            user_id,
            created_at: now,
            expires_at: now + ttl,
            last_activity_at: now,
            status: SessionStatus::Active,
            device_fingerprint: String::new(),
            ip_address: String::new(),
            platform: String::new(),
            browser: String::new(),
            os: String::new(),
            location: None,
            activity_count: 0,
            suspicious_activity_count: 0,
            metadata: HashMap::new(),
        }
    }

    /// Apply a device descriptor as the anomaly-comparison baseline.
    pub fn set_device(&mut self, device: &DeviceDescriptor) {
        self.device_fingerprint = device.fingerprint.clone();
        self.platform = device.platform.to_string();
        self.browser = device.browser.to_string();
        self.os = device.os.to_string();
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether the session has seen no activity for longer than `idle_timeout`.
    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        now - self.last_activity_at > idle_timeout
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && !self.is_expired(now)
    }

    /// Bump the activity clock and counter. Callers must hold exclusive
    /// access to the session while mutating it.
    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
        self.activity_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now: DateTime<Utc>) -> Session {
        Session::new("sid-1".into(), "u1".into(), now, Duration::hours(24))
    }

    #[test]
    fn test_active_within_window() {
        let now = Utc::now();
        let s = session(now);
        assert!(s.is_active(now));
        assert!(!s.is_expired(now));
    }

    #[test]
    fn test_expired_after_ttl() {
        let now = Utc::now();
        let s = session(now);
        let later = now + Duration::hours(25);
        assert!(s.is_expired(later));
        assert!(!s.is_active(later));
    }

    #[test]
    fn test_terminal_status_never_active() {
        let now = Utc::now();
        let mut s = session(now);
        s.status = SessionStatus::Revoked;
        assert!(!s.is_active(now));
        assert!(s.status.is_terminal());
        assert!(!SessionStatus::Suspended.is_terminal());
    }

    #[test]
    fn test_record_activity_bumps_counter_and_clock() {
        let now = Utc::now();
        let mut s = session(now);
        let later = now + Duration::minutes(5);
        s.record_activity(later);
        assert_eq!(s.activity_count, 1);
        assert_eq!(s.last_activity_at, later);
        assert!(s.last_activity_at >= s.created_at);
    }

    #[test]
    fn test_idle_timeout_independent_of_ttl() {
        let now = Utc::now();
        let s = session(now);
        let later = now + Duration::minutes(31);
        assert!(s.is_idle(later, Duration::minutes(30)));
        assert!(!s.is_expired(later));
    }
}
