pub mod error;
pub mod memory;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;

use async_trait::async_trait;
use sessionguard_models::Session;

/// Storage boundary for the session engine.
///
/// The manager's state machine is written against this interface so the
/// same logic runs over the in-memory store in tests and a networked
/// store in production. Implementations must make each call atomic;
/// cross-call read-modify-write discipline is the manager's job.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<Session>>;

    /// Insert or overwrite a session, keeping the per-user index in step.
    async fn put(&self, session: Session) -> Result<()>;

    /// Remove a session from both indices, returning it if present.
    async fn delete(&self, session_id: &str) -> Result<Option<Session>>;

    /// All sessions currently indexed for a user, regardless of status.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Session>>;

    /// Ids of every stored session; used by the cleanup sweep.
    async fn ids(&self) -> Result<Vec<String>>;

    async fn count(&self) -> Result<usize>;
}
