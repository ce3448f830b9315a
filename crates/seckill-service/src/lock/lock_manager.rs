//! 分布式锁管理器
//!
//! 在锁存储之上实现持有者 token、有限重试与显式释放。

use std::sync::Arc;
use std::time::Duration;

use seckill_shared::config::SeckillConfig;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::store::LockStore;
use crate::error::{Result, SeckillError};

/// 锁配置
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// 默认租约时长
    pub default_ttl: Duration,
    /// 获取锁的尝试次数
    pub retry_count: u32,
    /// 重试间隔
    pub retry_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(30),
            retry_count: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl From<&SeckillConfig> for LockConfig {
    fn from(config: &SeckillConfig) -> Self {
        Self {
            default_ttl: config.lock_lease(),
            retry_count: config.lock_retry_count,
            retry_delay: config.lock_retry_delay(),
        }
    }
}

/// 分布式锁管理器
pub struct LockManager {
    store: Arc<dyn LockStore>,
    config: LockConfig,
    /// 实例唯一标识，用于区分不同进程持有的锁
    instance_id: String,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>, config: LockConfig) -> Self {
        Self {
            store,
            config,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// 使用默认配置创建锁管理器
    pub fn with_defaults(store: Arc<dyn LockStore>) -> Self {
        Self::new(store, LockConfig::default())
    }

    fn lock_key(key: &str) -> String {
        format!("lock:{}", key)
    }

    /// 租约按毫秒下发（PX），不足 1ms 的租约会被 Redis 拒绝
    fn lease(&self, ttl: Option<Duration>) -> Result<Duration> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        if ttl.as_millis() == 0 {
            return Err(SeckillError::Validation(format!(
                "锁租约必须至少 1ms: {:?}",
                ttl
            )));
        }
        Ok(ttl)
    }

    fn new_owner(&self) -> String {
        // owner 格式: instance_id:uuid，同一进程内的不同持有者也互不相同
        format!("{}:{}", self.instance_id, Uuid::new_v4())
    }

    /// 获取锁
    ///
    /// 在 `retry_count` 次尝试内无法获取时返回 `LockConflict`
    ///
    /// # Arguments
    /// - `key`: 锁的资源名
    /// - `ttl`: 租约时长（可选，默认使用配置中的 default_ttl）
    #[instrument(skip(self), fields(instance_id = %self.instance_id))]
    pub async fn acquire(&self, key: &str, ttl: Option<Duration>) -> Result<LockGuard> {
        let ttl = self.lease(ttl)?;
        let lock_key = Self::lock_key(key);
        let owner = self.new_owner();
        let attempts = self.config.retry_count.max(1);

        for attempt in 0..attempts {
            if self.store.set_if_absent(&lock_key, &owner, ttl).await? {
                debug!(key = %key, owner = %owner, attempt, "Lock acquired");
                return Ok(LockGuard::new(key.to_string(), owner, self.store.clone()));
            }

            if attempt + 1 < attempts {
                debug!(
                    key = %key,
                    attempt,
                    retry_delay_ms = self.config.retry_delay.as_millis() as u64,
                    "Lock not acquired, retrying"
                );
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(SeckillError::LockConflict {
            resource: key.to_string(),
        })
    }

    /// 尝试获取锁，不重试
    ///
    /// 锁被占用时立即返回 None
    #[instrument(skip(self), fields(instance_id = %self.instance_id))]
    pub async fn try_acquire(&self, key: &str, ttl: Option<Duration>) -> Result<Option<LockGuard>> {
        let ttl = self.lease(ttl)?;
        let owner = self.new_owner();

        if self.store.set_if_absent(&Self::lock_key(key), &owner, ttl).await? {
            Ok(Some(LockGuard::new(key.to_string(), owner, self.store.clone())))
        } else {
            Ok(None)
        }
    }

    /// 按持有者 token 释放锁
    ///
    /// 当前持有者不是 `owner`（包括租约已过期后被他人获取）时不做任何修改并返回 false
    pub async fn release(&self, key: &str, owner: &str) -> Result<bool> {
        self.store
            .compare_and_delete(&Self::lock_key(key), owner)
            .await
    }
}

/// 锁守卫
///
/// 持有锁的 RAII 包装器。Drop 无法执行异步操作，
/// 未显式调用 `release()` 的锁只能等待租约过期。
pub struct LockGuard {
    key: String,
    owner: String,
    store: Arc<dyn LockStore>,
    /// 标记锁是否已被释放，避免重复释放
    released: bool,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl LockGuard {
    fn new(key: String, owner: String, store: Arc<dyn LockStore>) -> Self {
        Self {
            key,
            owner,
            store,
            released: false,
        }
    }

    /// 获取锁的资源名
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 获取持有者 token
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 显式释放锁
    ///
    /// 返回 false 表示锁已过期或被其他持有者获取
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn release(mut self) -> Result<bool> {
        self.released = true;

        let deleted = self
            .store
            .compare_and_delete(&LockManager::lock_key(&self.key), &self.owner)
            .await?;

        if deleted {
            debug!(key = %self.key, "Lock released");
        } else {
            warn!(
                key = %self.key,
                owner = %self.owner,
                "Lock was already released or owned by another client"
            );
        }

        Ok(deleted)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                lock_key = %self.key,
                owner = %self.owner,
                "LockGuard dropped without explicit release - lock will expire via TTL"
            );
        }
    }
}
