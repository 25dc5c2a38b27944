use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    IpChange,
    DeviceChange,
    ImpossibleTravel,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::IpChange => write!(f, "ip_change"),
            SignalKind::DeviceChange => write!(f, "device_change"),
            SignalKind::ImpossibleTravel => write!(f, "impossible_travel"),
        }
    }
}

/// One independent anomaly finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySignal {
    pub kind: SignalKind,
    pub severity: Severity,
    pub details: String,
}

/// Outcome of comparing a request's context against a session's baseline.
///
/// Ephemeral: computed per validation call, reflected only into the
/// session's suspicious-activity counter and the emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub signals: Vec<AnomalySignal>,
    pub severity: Severity,
}

impl AnomalyResult {
    /// Fold individual signals into an overall result. Overall severity
    /// is `High` if any signal is, else `Medium`.
    pub fn from_signals(signals: Vec<AnomalySignal>) -> Option<Self> {
        if signals.is_empty() {
            return None;
        }
        let severity = signals
            .iter()
            .map(|s| s.severity)
            .max()
            .unwrap_or(Severity::Medium);
        Some(Self { signals, severity })
    }

    pub fn detected(&self) -> bool {
        !self.signals.is_empty()
    }

    pub fn has_signal(&self, kind: SignalKind) -> bool {
        self.signals.iter().any(|s| s.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_signals_is_no_result() {
        assert!(AnomalyResult::from_signals(vec![]).is_none());
    }

    #[test]
    fn test_overall_severity_is_max() {
        let result = AnomalyResult::from_signals(vec![
            AnomalySignal {
                kind: SignalKind::IpChange,
                severity: Severity::Medium,
                details: "ip changed".into(),
            },
            AnomalySignal {
                kind: SignalKind::DeviceChange,
                severity: Severity::High,
                details: "fingerprint changed".into(),
            },
        ])
        .unwrap();
        assert!(result.detected());
        assert_eq!(result.severity, Severity::High);
        assert!(result.has_signal(SignalKind::DeviceChange));
    }

    #[test]
    fn test_medium_only_stays_medium() {
        let result = AnomalyResult::from_signals(vec![AnomalySignal {
            kind: SignalKind::IpChange,
            severity: Severity::Medium,
            details: "ip changed".into(),
        }])
        .unwrap();
        assert_eq!(result.severity, Severity::Medium);
    }
}
