//! 订单 ID 生成器

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::error;

use super::counter::SequenceCounter;
use crate::error::{Result, SeckillError};
use crate::keys::SeckillKeys;

/// 时间戳起点: 2024-01-01T00:00:00Z
pub const BEGIN_TIMESTAMP: i64 = 1_704_067_200;

/// 序列号位数
pub const COUNT_BITS: u32 = 32;

const MAX_COUNT: i64 = (1 << COUNT_BITS) - 1;

/// 订单 ID 生成器
///
/// 计数器 key 按 UTC 日期切分，单个前缀每天最多 2^32 - 1 个 ID
pub struct IdGenerator {
    counter: Arc<dyn SequenceCounter>,
}

impl IdGenerator {
    pub fn new(counter: Arc<dyn SequenceCounter>) -> Self {
        Self { counter }
    }

    /// 使用当前时间生成 ID
    pub async fn next_id(&self, prefix: &str) -> Result<i64> {
        self.next_id_at(prefix, Utc::now()).await
    }

    /// 使用指定时间生成 ID
    pub async fn next_id_at(&self, prefix: &str, now: DateTime<Utc>) -> Result<i64> {
        let timestamp = now.timestamp() - BEGIN_TIMESTAMP;
        if timestamp < 0 {
            return Err(SeckillError::Internal(format!(
                "系统时间早于 ID 时间起点: {}",
                now
            )));
        }

        let day = now.format("%Y:%m:%d").to_string();
        let key = SeckillKeys::id_counter(prefix, &day);
        let count = self.counter.increment(&key).await?;

        // 计数器越界时拒绝生成，否则会与下一秒的 ID 冲突
        if !(1..=MAX_COUNT).contains(&count) {
            error!(key = %key, count, "订单 ID 计数器越界");
            return Err(SeckillError::IdCounterOverflow { key, count });
        }

        Ok((timestamp << COUNT_BITS) | count)
    }

    /// 取出 ID 中的相对时间戳（秒）
    pub fn timestamp_of(id: i64) -> i64 {
        id >> COUNT_BITS
    }

    /// 取出 ID 中的当日序列号
    pub fn sequence_of(id: i64) -> i64 {
        id & MAX_COUNT
    }
}
