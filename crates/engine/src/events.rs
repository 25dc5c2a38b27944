use sessionguard_models::SessionEvent;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast fan-out for session lifecycle events.
///
/// Publishing is fire-and-forget: with no subscribers the event is
/// dropped, and a lagging subscriber loses old events instead of ever
/// back-pressuring the manager's hot path.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        tracing::debug!(kind = %event.kind, session_id = %event.session.id, "session event");
        // send only fails when there are no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sessionguard_models::{Session, SessionEventKind};

    fn event(kind: SessionEventKind) -> SessionEvent {
        let now = Utc::now();
        let session = Session::new("s1".into(), "u1".into(), now, Duration::hours(24));
        SessionEvent::new(kind, session, now)
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(event(SessionEventKind::Created).with_reason("login"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, SessionEventKind::Created);
        assert_eq!(received.reason.as_deref(), Some("login"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::default();
        bus.publish(event(SessionEventKind::Revoked));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block_publisher() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        for _ in 0..20 {
            bus.publish(event(SessionEventKind::Activity));
        }
        // the slow reader sees a lag error, then catches up
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(missed)) => assert!(missed > 0),
            other => panic!("expected lag, got {:?}", other.map(|e| e.kind)),
        }
        assert!(rx.recv().await.is_ok());
    }
}
