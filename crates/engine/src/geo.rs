use async_trait::async_trait;
use sessionguard_models::Location;
use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;

/// Boundary to an external geo-IP collaborator.
///
/// Resolution is strictly best-effort: unknown, private, loopback, and
/// unparseable addresses yield `None`, never an error. The manager bounds
/// every call with a timeout so a slow resolver can only ever degrade to
/// "location unknown".
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> Option<Location>;
}

/// Resolver for deployments without geo data: everything is unknown.
#[derive(Debug, Default)]
pub struct NullGeoResolver;

#[async_trait]
impl GeoResolver for NullGeoResolver {
    async fn resolve(&self, _address: &str) -> Option<Location> {
        None
    }
}

/// Exact-match table resolver for tests and demos.
pub struct StaticGeoResolver {
    entries: HashMap<String, Location>,
}

impl StaticGeoResolver {
    pub fn new(entries: impl IntoIterator<Item = (String, Location)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

#[async_trait]
impl GeoResolver for StaticGeoResolver {
    async fn resolve(&self, address: &str) -> Option<Location> {
        if is_private_or_loopback(address) {
            return None;
        }
        self.entries.get(address).cloned()
    }
}

/// Whether an address is loopback or RFC 1918 / ULA space, for which no
/// public geo data can exist.
pub fn is_private_or_loopback(address: &str) -> bool {
    match IpAddr::from_str(address) {
        Ok(IpAddr::V4(v4)) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        Ok(IpAddr::V6(v6)) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
        // Not an IP literal; nothing to resolve.
        Err(_) => true,
    }
}
