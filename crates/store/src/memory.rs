use crate::error::Result;
use crate::SessionStore;
use async_trait::async_trait;
use sessionguard_models::Session;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use tokio::sync::RwLock;

const SHARD_COUNT: usize = 16;

fn shard_index(key: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}

/// Sharded in-memory session store.
///
/// The primary id index and the per-user id index are each split across
/// a fixed set of `RwLock`ed shards so concurrent traffic on unrelated
/// sessions does not contend on one lock. Every trait method is atomic
/// per shard; no lock is held across calls.
pub struct MemoryStore {
    shards: Vec<RwLock<HashMap<String, Session>>>,
    user_shards: Vec<RwLock<HashMap<String, HashSet<String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            user_shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let shard = self.shards[shard_index(session_id)].read().await;
        Ok(shard.get(session_id).cloned())
    }

    async fn put(&self, session: Session) -> Result<()> {
        {
            let mut users = self.user_shards[shard_index(&session.user_id)].write().await;
            users
                .entry(session.user_id.clone())
                .or_default()
                .insert(session.id.clone());
        }
        let mut shard = self.shards[shard_index(&session.id)].write().await;
        shard.insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<Option<Session>> {
        let removed = {
            let mut shard = self.shards[shard_index(session_id)].write().await;
            shard.remove(session_id)
        };
        if let Some(session) = &removed {
            let mut users = self.user_shards[shard_index(&session.user_id)].write().await;
            if let Some(ids) = users.get_mut(&session.user_id) {
                ids.remove(session_id);
                if ids.is_empty() {
                    users.remove(&session.user_id);
                }
            }
        }
        Ok(removed)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let ids: Vec<String> = {
            let users = self.user_shards[shard_index(user_id)].read().await;
            users
                .get(user_id)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default()
        };
        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            let shard = self.shards[shard_index(&id)].read().await;
            if let Some(session) = shard.get(&id) {
                sessions.push(session.clone());
            }
        }
        Ok(sessions)
    }

    async fn ids(&self) -> Result<Vec<String>> {
        let mut all = Vec::new();
        for shard in &self.shards {
            let shard = shard.read().await;
            all.extend(shard.keys().cloned());
        }
        Ok(all)
    }

    async fn count(&self) -> Result<usize> {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn session(id: &str, user_id: &str) -> Session {
        Session::new(id.into(), user_id.into(), Utc::now(), Duration::hours(24))
    }

    #[tokio::test]
    async fn test_put_get_delete_roundtrip() {
        let store = MemoryStore::new();
        store.put(session("s1", "u1")).await.unwrap();

        let found = store.get("s1").await.unwrap().unwrap();
        assert_eq!(found.user_id, "u1");

        let removed = store.delete("s1").await.unwrap();
        assert!(removed.is_some());
        assert!(store.get("s1").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_none() {
        let store = MemoryStore::new();
        assert!(store.delete("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_user_tracks_index() {
        let store = MemoryStore::new();
        store.put(session("s1", "u1")).await.unwrap();
        store.put(session("s2", "u1")).await.unwrap();
        store.put(session("s3", "u2")).await.unwrap();

        let mut ids: Vec<String> = store
            .list_by_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["s1".to_string(), "s2".to_string()]);

        store.delete("s1").await.unwrap();
        let remaining = store.list_by_user("u1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "s2");
    }

    #[tokio::test]
    async fn test_put_overwrites_in_place() {
        let store = MemoryStore::new();
        store.put(session("s1", "u1")).await.unwrap();

        let mut updated = store.get("s1").await.unwrap().unwrap();
        updated.activity_count = 7;
        store.put(updated).await.unwrap();

        assert_eq!(store.get("s1").await.unwrap().unwrap().activity_count, 7);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ids_spans_all_shards() {
        let store = MemoryStore::new();
        for i in 0..50 {
            store.put(session(&format!("s{}", i), "u1")).await.unwrap();
        }
        assert_eq!(store.ids().await.unwrap().len(), 50);
        assert_eq!(store.count().await.unwrap(), 50);
    }
}
