//! 锁存储后端

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use seckill_shared::cache::Cache;

use crate::error::Result;

/// 锁存储
///
/// 两个操作都必须是原子的：设置只在 key 不存在（或已过期）时成功，
/// 删除只在当前值等于给定持有者时执行
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockStore: Send + Sync {
    /// 不存在时写入持有者并设置租约，返回是否写入成功
    async fn set_if_absent(&self, key: &str, owner: &str, lease: Duration) -> Result<bool>;

    /// 持有者匹配时删除，返回是否删除
    async fn compare_and_delete(&self, key: &str, owner: &str) -> Result<bool>;
}

/// 比较并删除脚本
static RELEASE_SCRIPT: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r#"
        if redis.call("get", KEYS[1]) == ARGV[1] then
            return redis.call("del", KEYS[1])
        else
            return 0
        end
        "#,
    )
});

/// Redis 锁存储
#[derive(Clone)]
pub struct RedisLockStore {
    cache: Cache,
}

impl RedisLockStore {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, owner: &str, lease: Duration) -> Result<bool> {
        let mut conn = self.cache.connection();

        // SET key owner NX PX lease_ms，成功返回 "OK"，已存在返回 nil
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    async fn compare_and_delete(&self, key: &str, owner: &str) -> Result<bool> {
        let mut conn = self.cache.connection();

        let deleted: i64 = RELEASE_SCRIPT
            .key(key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;

        Ok(deleted > 0)
    }
}

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    expires_at: Instant,
}

/// 进程内锁存储
///
/// 过期的租约在下一次 `set_if_absent` 时被覆盖，与 Redis 的 PX 过期行为一致
#[derive(Default)]
pub struct MemoryLockStore {
    leases: DashMap<String, Lease>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前未过期的持有者
    pub fn owner_of(&self, key: &str) -> Option<String> {
        self.leases
            .get(key)
            .filter(|lease| lease.expires_at > Instant::now())
            .map(|lease| lease.owner.clone())
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_if_absent(&self, key: &str, owner: &str, lease: Duration) -> Result<bool> {
        let now = Instant::now();
        let fresh = Lease {
            owner: owner.to_string(),
            expires_at: now + lease,
        };

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at <= now {
                    occupied.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, owner: &str) -> Result<bool> {
        let now = Instant::now();
        let removed = self
            .leases
            .remove_if(key, |_, lease| lease.owner == owner && lease.expires_at > now);
        Ok(removed.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_if_absent() {
        let store = MemoryLockStore::new();
        let lease = Duration::from_secs(30);

        assert!(store.set_if_absent("lock:order:1", "a", lease).await.unwrap());
        assert!(!store.set_if_absent("lock:order:1", "b", lease).await.unwrap());
        assert_eq!(store.owner_of("lock:order:1").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_memory_store_only_owner_can_delete() {
        let store = MemoryLockStore::new();
        store
            .set_if_absent("lock:order:1", "a", Duration::from_secs(30))
            .await
            .unwrap();

        assert!(!store.compare_and_delete("lock:order:1", "b").await.unwrap());
        assert!(store.compare_and_delete("lock:order:1", "a").await.unwrap());
        assert!(store.owner_of("lock:order:1").is_none());
    }

    #[tokio::test]
    async fn test_memory_store_expired_lease_is_replaced() {
        let store = MemoryLockStore::new();
        store
            .set_if_absent("lock:order:1", "a", Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.owner_of("lock:order:1").is_none());
        assert!(
            store
                .set_if_absent("lock:order:1", "b", Duration::from_secs(30))
                .await
                .unwrap()
        );
        // 过期持有者不能删除新持有者的锁
        assert!(!store.compare_and_delete("lock:order:1", "a").await.unwrap());
        assert_eq!(store.owner_of("lock:order:1").as_deref(), Some("b"));
    }
}
