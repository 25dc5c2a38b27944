use crate::fingerprint;
use chrono::{DateTime, Utc};
use sessionguard_models::{
    AnomalyResult, AnomalySignal, Location, RequestContext, Session, Severity, SignalKind,
};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance below which two observations with no elapsed time between
/// them are attributed to geo-database resolution noise rather than two
/// genuinely distinct places.
const ZERO_ELAPSED_SLACK_KM: f64 = 100.0;

/// Compares an incoming request's context against a session's recorded
/// baseline. Pure: no mutation, no I/O, safe to call speculatively. The
/// accept/reject decision belongs to the manager.
pub struct AnomalyDetector {
    device_tracking: bool,
    speed_threshold_kmh: f64,
}

impl AnomalyDetector {
    pub fn new(device_tracking: bool, speed_threshold_kmh: f64) -> Self {
        Self {
            device_tracking,
            speed_threshold_kmh,
        }
    }

    /// Evaluate all checks against the session state as it was before
    /// this request's activity was recorded; `session.last_activity_at`
    /// anchors the travel-speed window.
    pub fn evaluate(
        &self,
        session: &Session,
        ctx: &RequestContext,
        current_location: Option<&Location>,
        now: DateTime<Utc>,
    ) -> Option<AnomalyResult> {
        let mut signals = Vec::new();

        if !session.ip_address.is_empty() && ctx.remote_address != session.ip_address {
            signals.push(AnomalySignal {
                kind: SignalKind::IpChange,
                severity: Severity::Medium,
                details: format!(
                    "address changed from {} to {}",
                    session.ip_address, ctx.remote_address
                ),
            });
        }

        if self.device_tracking && !session.device_fingerprint.is_empty() {
            let current = fingerprint::derive(ctx);
            if current.fingerprint != session.device_fingerprint {
                signals.push(AnomalySignal {
                    kind: SignalKind::DeviceChange,
                    severity: Severity::High,
                    details: format!(
                        "fingerprint changed from {} to {}",
                        session.device_fingerprint, current.fingerprint
                    ),
                });
            }
        }

        if let (Some(baseline), Some(current)) = (session.location.as_ref(), current_location) {
            if let Some(signal) = self.check_travel(baseline, current, session.last_activity_at, now)
            {
                signals.push(signal);
            }
        }

        AnomalyResult::from_signals(signals)
    }

    fn check_travel(
        &self,
        baseline: &Location,
        current: &Location,
        last_activity_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<AnomalySignal> {
        let distance_km = haversine_km(baseline, current);
        let elapsed = now - last_activity_at;
        let elapsed_hours = elapsed.num_milliseconds() as f64 / 3_600_000.0;

        // Simultaneous requests from two distant locations are flagged
        // rather than skipped; only sub-slack distances are forgiven.
        if elapsed_hours <= 0.0 {
            if distance_km > ZERO_ELAPSED_SLACK_KM {
                return Some(AnomalySignal {
                    kind: SignalKind::ImpossibleTravel,
                    severity: Severity::High,
                    details: format!(
                        "{:.0} km apart with no elapsed time ({} -> {})",
                        distance_km, baseline.city, current.city
                    ),
                });
            }
            return None;
        }

        let implied_speed = distance_km / elapsed_hours;
        if implied_speed > self.speed_threshold_kmh {
            return Some(AnomalySignal {
                kind: SignalKind::ImpossibleTravel,
                severity: Severity::High,
                details: format!(
                    "implied speed {:.0} km/h over {:.0} km ({} -> {})",
                    implied_speed, distance_km, baseline.city, current.city
                ),
            });
        }
        None
    }
}

/// Great-circle distance between two coordinates, in kilometers.
pub fn haversine_km(a: &Location, b: &Location) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint;
    use chrono::Duration;

    const CHROME_WIN: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str =
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    fn berlin() -> Location {
        Location::new("DE", "Berlin", 52.52, 13.405)
    }

    fn madrid() -> Location {
        Location::new("ES", "Madrid", 40.4168, -3.7038)
    }

    fn baseline_session(now: DateTime<Utc>) -> Session {
        let ctx = RequestContext::new(CHROME_WIN, "203.0.113.10");
        let mut session = Session::new("s1".into(), "u1".into(), now, Duration::hours(24));
        session.set_device(&fingerprint::derive(&ctx));
        session.ip_address = ctx.remote_address.clone();
        session
    }

    fn detector() -> AnomalyDetector {
        AnomalyDetector::new(true, 1000.0)
    }

    #[test]
    fn test_same_context_is_clean() {
        let now = Utc::now();
        let session = baseline_session(now);
        let ctx = RequestContext::new(CHROME_WIN, "203.0.113.10");
        assert!(detector().evaluate(&session, &ctx, None, now).is_none());
    }

    #[test]
    fn test_ip_change_is_medium() {
        let now = Utc::now();
        let session = baseline_session(now);
        // A new address also shifts the fingerprint, so device_change
        // fires alongside; the ip signal itself must still be Medium.
        let ctx = RequestContext::new(CHROME_WIN, "198.51.100.7");
        let result = detector().evaluate(&session, &ctx, None, now).unwrap();
        assert!(result.has_signal(SignalKind::IpChange));
        let ip_signal = result
            .signals
            .iter()
            .find(|s| s.kind == SignalKind::IpChange)
            .unwrap();
        assert_eq!(ip_signal.severity, Severity::Medium);
    }

    #[test]
    fn test_device_change_is_high() {
        let now = Utc::now();
        let session = baseline_session(now);
        let ctx = RequestContext::new(SAFARI_IPHONE, "203.0.113.10");
        let result = detector().evaluate(&session, &ctx, None, now).unwrap();
        assert!(result.has_signal(SignalKind::DeviceChange));
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn test_device_check_skipped_when_tracking_disabled() {
        let now = Utc::now();
        let session = baseline_session(now);
        let detector = AnomalyDetector::new(false, 1000.0);
        // Same address, different user agent: only the device check
        // could fire, and it is disabled.
        let ctx = RequestContext::new(SAFARI_IPHONE, "203.0.113.10");
        assert!(detector.evaluate(&session, &ctx, None, now).is_none());
    }

    #[test]
    fn test_impossible_travel_within_an_hour() {
        let now = Utc::now();
        let mut session = baseline_session(now);
        session.location = Some(berlin());
        session.last_activity_at = now - Duration::minutes(54);

        let ctx = RequestContext::new(CHROME_WIN, "203.0.113.10");
        let result = detector()
            .evaluate(&session, &ctx, Some(&madrid()), now)
            .unwrap();
        assert!(result.has_signal(SignalKind::ImpossibleTravel));
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn test_plausible_travel_over_a_day() {
        let now = Utc::now();
        let mut session = baseline_session(now);
        session.location = Some(berlin());
        session.last_activity_at = now - Duration::hours(24);

        let ctx = RequestContext::new(CHROME_WIN, "203.0.113.10");
        let result = detector().evaluate(&session, &ctx, Some(&madrid()), now);
        assert!(result.is_none());
    }

    #[test]
    fn test_zero_elapsed_distant_locations_flagged() {
        let now = Utc::now();
        let mut session = baseline_session(now);
        session.location = Some(berlin());
        session.last_activity_at = now;

        let ctx = RequestContext::new(CHROME_WIN, "203.0.113.10");
        let result = detector()
            .evaluate(&session, &ctx, Some(&madrid()), now)
            .unwrap();
        assert!(result.has_signal(SignalKind::ImpossibleTravel));
    }

    #[test]
    fn test_zero_elapsed_nearby_locations_skipped() {
        let now = Utc::now();
        let mut session = baseline_session(now);
        session.location = Some(berlin());
        session.last_activity_at = now;

        let nearby = Location::new("DE", "Potsdam", 52.3906, 13.0645);
        let ctx = RequestContext::new(CHROME_WIN, "203.0.113.10");
        assert!(detector()
            .evaluate(&session, &ctx, Some(&nearby), now)
            .is_none());
    }

    #[test]
    fn test_travel_check_skipped_without_locations() {
        let now = Utc::now();
        let mut session = baseline_session(now);
        session.location = None;
        session.last_activity_at = now - Duration::seconds(1);

        let ctx = RequestContext::new(CHROME_WIN, "203.0.113.10");
        assert!(detector()
            .evaluate(&session, &ctx, Some(&madrid()), now)
            .is_none());
    }

    #[test]
    fn test_haversine_known_distance() {
        // Berlin -> Madrid is roughly 1870 km
        let d = haversine_km(&berlin(), &madrid());
        assert!((d - 1870.0).abs() < 30.0, "got {}", d);
        assert!(haversine_km(&berlin(), &berlin()) < f64::EPSILON);
    }
}
