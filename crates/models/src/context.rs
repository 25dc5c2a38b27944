use serde::{Deserialize, Serialize};
use std::fmt;

/// Request metadata captured by the caller (middleware or login flow).
/// All fields are absent-tolerant; missing headers become empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub user_agent: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub remote_address: String,
}

impl RequestContext {
    pub fn new(user_agent: impl Into<String>, remote_address: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            remote_address: remote_address.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mobile,
    Tablet,
    Desktop,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Mobile => write!(f, "mobile"),
            Platform::Tablet => write!(f, "tablet"),
            Platform::Desktop => write!(f, "desktop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Browser {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Unknown,
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Browser::Chrome => write!(f, "Chrome"),
            Browser::Firefox => write!(f, "Firefox"),
            Browser::Safari => write!(f, "Safari"),
            Browser::Edge => write!(f, "Edge"),
            Browser::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Os {
    Windows,
    MacOs,
    Linux,
    Android,
    Ios,
    Unknown,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Os::Windows => write!(f, "Windows"),
            Os::MacOs => write!(f, "macOS"),
            Os::Linux => write!(f, "Linux"),
            Os::Android => write!(f, "Android"),
            Os::Ios => write!(f, "iOS"),
            Os::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Compact device descriptor derived from request metadata.
///
/// The fingerprint is a best-effort heuristic identifier, not a security
/// boundary; collisions are expected and tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub fingerprint: String,
    pub platform: Platform,
    pub browser: Browser,
    pub os: Os,
}

/// Approximate geo location for a network address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub country: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(
        country: impl Into<String>,
        city: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            country: country.into(),
            city: city.into(),
            latitude,
            longitude,
        }
    }
}
