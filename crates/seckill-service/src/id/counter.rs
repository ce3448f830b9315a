//! 原子序列计数器

use async_trait::async_trait;
use dashmap::DashMap;
use seckill_shared::cache::Cache;

use crate::error::Result;

/// 原子自增计数器
///
/// key 不存在时从 0 开始，返回自增后的值
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SequenceCounter: Send + Sync {
    async fn increment(&self, key: &str) -> Result<i64>;
}

/// 基于 Redis INCR 的计数器，多实例共享
#[derive(Clone)]
pub struct RedisSequenceCounter {
    cache: Cache,
}

impl RedisSequenceCounter {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl SequenceCounter for RedisSequenceCounter {
    async fn increment(&self, key: &str) -> Result<i64> {
        Ok(self.cache.incr(key, 1).await?)
    }
}

/// 进程内计数器，用于测试和单机演示
#[derive(Default)]
pub struct MemorySequenceCounter {
    counters: DashMap<String, i64>,
}

impl MemorySequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接设置计数器当前值
    pub fn set(&self, key: &str, value: i64) {
        self.counters.insert(key.to_string(), value);
    }
}

#[async_trait]
impl SequenceCounter for MemorySequenceCounter {
    async fn increment(&self, key: &str) -> Result<i64> {
        // entry 持有分片写锁，读改写在锁内完成
        let mut entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }
}
