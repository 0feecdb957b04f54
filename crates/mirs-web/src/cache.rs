//! 响应级TTL内存缓存
//!
//! 缓存序列化后的JSON响应体，按键过期。写操作删除受影响的键
//! 保持读路径与数据库的一致性。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// 患者列表/详情缓存时长
pub const PATIENT_TTL: Duration = Duration::from_secs(1800);
/// 患者影像列表缓存时长
pub const IMAGE_LIST_TTL: Duration = Duration::from_secs(600);
/// 影像元数据缓存时长
pub const IMAGE_META_TTL: Duration = Duration::from_secs(3600);
/// 已验证token对应用户的缓存时长
pub const TOKEN_USER_TTL: Duration = Duration::from_secs(900);

const SWEEP_THRESHOLD: usize = 1024;

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// 进程内TTL缓存
#[derive(Clone)]
pub struct TtlCache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 读取未过期的缓存值
    pub async fn get(&self, key: &str) -> Option<String> {
        let map = self.inner.read().await;
        match map.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            _ => None,
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: String, ttl: Duration) {
        let mut map = self.inner.write().await;
        if map.len() >= SWEEP_THRESHOLD {
            let now = Instant::now();
            map.retain(|_, entry| entry.expires_at > now);
        }
        map.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub async fn remove(&self, key: &str) {
        self.inner.write().await.remove(key);
    }

    /// 当前缓存条目数（含未清扫的过期条目）
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = TtlCache::new();
        cache
            .set("patients:all", "[]".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("patients:all").await.as_deref(), Some("[]"));
        assert!(cache.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_not_returned() {
        let cache = TtlCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_millis(0))
            .await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_drops_single_key() {
        let cache = TtlCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("images:patient:1", "a".to_string(), ttl).await;
        cache.set("patient:1", "c".to_string(), ttl).await;

        cache.remove("images:patient:1").await;

        assert!(cache.get("images:patient:1").await.is_none());
        assert_eq!(cache.get("patient:1").await.as_deref(), Some("c"));
    }
}
