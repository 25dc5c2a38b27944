use chrono::Duration;
use serde::Deserialize;

/// Engine configuration. Every field has a sane default; embedders only
/// override what they need.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Absolute session lifetime from creation (or last renewal).
    #[serde(with = "duration_seconds")]
    pub session_ttl: Duration,
    /// Maximum gap between activities before a session is treated as
    /// expired, independent of the absolute TTL.
    #[serde(with = "duration_seconds")]
    pub idle_timeout: Duration,
    /// Active-session cap per user; enforced by evicting the
    /// least-recently-active sessions, never by rejecting creation.
    pub max_sessions_per_user: usize,
    pub enable_device_tracking: bool,
    pub enable_anomaly_detection: bool,
    /// Implied travel speed above which a location change is flagged.
    pub impossible_travel_speed_kmh: f64,
    /// Interval of the background cleanup sweep.
    pub cleanup_interval: std::time::Duration,
    /// Upper bound on a single geo resolution; on timeout the location
    /// is simply unknown.
    pub geo_timeout: std::time::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(24),
            idle_timeout: Duration::minutes(30),
            max_sessions_per_user: 10,
            enable_device_tracking: true,
            enable_anomaly_detection: true,
            impossible_travel_speed_kmh: 1000.0,
            cleanup_interval: std::time::Duration::from_secs(60),
            geo_timeout: std::time::Duration::from_secs(2),
        }
    }
}

mod duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.session_ttl, Duration::hours(24));
        assert_eq!(config.idle_timeout, Duration::minutes(30));
        assert_eq!(config.max_sessions_per_user, 10);
        assert!(config.enable_device_tracking);
        assert!(config.enable_anomaly_detection);
    }

    #[test]
    fn test_deserialize_overrides() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"session_ttl": 3600, "max_sessions_per_user": 3, "enable_device_tracking": false}"#,
        )
        .unwrap();
        assert_eq!(config.session_ttl, Duration::hours(1));
        assert_eq!(config.max_sessions_per_user, 3);
        assert!(!config.enable_device_tracking);
        // untouched fields keep their defaults
        assert_eq!(config.idle_timeout, Duration::minutes(30));
    }
}
