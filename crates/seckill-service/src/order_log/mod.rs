//! 订单流
//!
//! 准入成功的下单意图按追加顺序写入订单流，Worker 以消费组方式读取。
//! 消息被读取后进入该消费者的 pending list，直到被 ACK 才移除；
//! 进程崩溃后以相同的消费者名重启即可从 pending list 恢复未完成的消息。

pub mod entry;
pub mod memory;
pub mod redis_stream;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::Result;

pub use entry::OrderLogEntry;
pub use memory::MemoryOrderLog;
pub use redis_stream::RedisStreamLog;

/// 单次读取的等待上限，超出的 `max_wait` 按此截断
pub const MAX_READ_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// 计算阻塞读取的截止时间
///
/// `max_wait` 过大导致时间溢出时退回到 `MAX_READ_WAIT`
pub(crate) fn read_deadline(max_wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(max_wait.min(MAX_READ_WAIT))
        .unwrap_or(now)
}

/// 从订单流读出的一条原始消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub entry_id: String,
    pub fields: HashMap<String, String>,
}

impl LogRecord {
    /// 解析为下单意图
    pub fn parse(&self) -> Result<OrderLogEntry> {
        OrderLogEntry::from_fields(&self.entry_id, &self.fields)
    }
}

/// 订单流存储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderLog: Send + Sync {
    /// 创建消费组（流不存在时一并创建），消费组已存在时视为成功
    async fn ensure_group(&self, group: &str) -> Result<()>;

    /// 追加一条消息，返回消息 ID
    async fn append(&self, entry: &OrderLogEntry) -> Result<String>;

    /// 读取一条从未投递给本消费组的消息，最多等待 `max_wait`
    async fn read_next(
        &self,
        group: &str,
        consumer: &str,
        max_wait: Duration,
    ) -> Result<Option<LogRecord>>;

    /// 读取本消费者 pending list 中最早的一条消息，不阻塞
    async fn read_pending(&self, group: &str, consumer: &str) -> Result<Option<LogRecord>>;

    /// 确认消息已处理，从 pending list 中移除
    async fn ack(&self, group: &str, entry_id: &str) -> Result<()>;

    /// 消费组中已投递未确认的消息数
    async fn pending_count(&self, group: &str) -> Result<u64>;
}
