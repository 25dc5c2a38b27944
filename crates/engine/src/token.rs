use crate::error::{EngineError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Entropy seam for session-id generation. Injected explicitly so the
/// random source is testable and swappable instead of assumed from the
/// global environment.
pub trait TokenGenerator: Send + Sync {
    /// Produce an opaque, unguessable session id. Implementations must
    /// fail loudly when entropy is unavailable; a weak id is never an
    /// acceptable fallback.
    fn generate(&self) -> Result<String>;
}

/// OS-backed CSPRNG generator: 32 random bytes, URL-safe base64.
#[derive(Debug, Default)]
pub struct OsRngTokenGenerator;

impl TokenGenerator for OsRngTokenGenerator {
    fn generate(&self) -> Result<String> {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| EngineError::EntropyUnavailable(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}
