//! Session lifecycle and anomaly detection engine.
//!
//! Embeds behind an authentication gateway: the gateway creates a
//! session after a completed login, validates it on every request, and
//! wires device-management UIs to the list/revoke operations. Lifecycle
//! events fan out over a broadcast bus to audit/notification consumers.

pub mod anomaly;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod geo;
pub mod manager;
pub mod token;

pub use anomaly::{haversine_km, AnomalyDetector};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use events::EventBus;
pub use geo::{GeoResolver, NullGeoResolver, StaticGeoResolver};
pub use manager::{RejectionReason, SessionManager, ValidationOutcome};
pub use token::{OsRngTokenGenerator, TokenGenerator};

// Re-export the data model and store seam for embedders.
pub use sessionguard_models as models;
pub use sessionguard_store as store;
