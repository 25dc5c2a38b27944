// Core modules
pub mod anomaly;
pub mod context;
pub mod event;
pub mod session;

// Re-export commonly used types
pub use anomaly::{AnomalyResult, AnomalySignal, Severity, SignalKind};
pub use context::{Browser, DeviceDescriptor, Location, Os, Platform, RequestContext};
pub use event::{SessionEvent, SessionEventKind};
pub use session::{Session, SessionStatus};
