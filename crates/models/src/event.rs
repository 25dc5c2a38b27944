use crate::anomaly::AnomalyResult;
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    Created,
    Renewed,
    Expired,
    Revoked,
    Activity,
    Suspicious,
    Suspended,
    Resumed,
}

impl fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEventKind::Created => write!(f, "session.created"),
            SessionEventKind::Renewed => write!(f, "session.renewed"),
            SessionEventKind::Expired => write!(f, "session.expired"),
            SessionEventKind::Revoked => write!(f, "session.revoked"),
            SessionEventKind::Activity => write!(f, "session.activity"),
            SessionEventKind::Suspicious => write!(f, "session.suspicious"),
            SessionEventKind::Suspended => write!(f, "session.suspended"),
            SessionEventKind::Resumed => write!(f, "session.resumed"),
        }
    }
}

/// Lifecycle event published to subscribers (audit log, notification
/// service). Carries a full session snapshot taken at emission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: Uuid,
    pub kind: SessionEventKind,
    pub session: Session,
    /// Revoke/suspend reason, where relevant.
    pub reason: Option<String>,
    /// Anomaly findings, for `session.suspicious` and
    /// anomaly-triggered revocations.
    pub anomaly: Option<AnomalyResult>,
    pub occurred_at: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind, session: Session, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            session,
            reason: None,
            anomaly: None,
            occurred_at,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_anomaly(mut self, anomaly: AnomalyResult) -> Self {
        self.anomaly = Some(anomaly);
        self
    }
}
