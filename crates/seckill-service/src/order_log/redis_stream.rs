//! 基于 Redis Streams 的订单流

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamPendingReply, StreamReadReply};
use seckill_shared::cache::Cache;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info};

use super::entry::{FIELD_ORDER_ID, FIELD_USER_ID, FIELD_VOUCHER_ID, OrderLogEntry};
use super::{LogRecord, OrderLog, read_deadline};
use crate::error::Result;

/// 单次 BLOCK 的最长时间
///
/// 多路复用连接带有响应超时，较长的等待拆成多次 BLOCK 完成
const MAX_BLOCK_SLICE: Duration = Duration::from_millis(400);

/// Redis Streams 订单流
///
/// 非阻塞命令走共享连接；`read_next` 的 BLOCK 读取使用首次调用时建立的独立连接
#[derive(Clone)]
pub struct RedisStreamLog {
    cache: Cache,
    blocking: Arc<OnceCell<ConnectionManager>>,
    stream_key: String,
}

impl RedisStreamLog {
    pub fn new(cache: Cache, stream_key: impl Into<String>) -> Self {
        Self {
            cache,
            blocking: Arc::new(OnceCell::new()),
            stream_key: stream_key.into(),
        }
    }

    async fn blocking_connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .blocking
            .get_or_try_init(|| self.cache.dedicated_connection())
            .await?;
        Ok(conn.clone())
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    /// XREADGROUP GROUP <group> <consumer> COUNT 1 [BLOCK ms] STREAMS <key> <id>
    ///
    /// id 为 `>` 时读取新消息，为 `0` 时读取本消费者的 pending list
    async fn read_group(
        &self,
        conn: &mut ConnectionManager,
        group: &str,
        consumer: &str,
        id: &str,
        block: Option<Duration>,
    ) -> Result<Option<LogRecord>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer).arg("COUNT").arg(1);
        if let Some(block) = block {
            cmd.arg("BLOCK").arg(block.as_millis() as u64);
        }
        cmd.arg("STREAMS").arg(&self.stream_key).arg(id);

        let reply: Option<StreamReadReply> = cmd.query_async(conn).await?;
        Ok(reply.and_then(first_record))
    }
}

fn first_record(reply: StreamReadReply) -> Option<LogRecord> {
    let stream_id = reply.keys.into_iter().flat_map(|key| key.ids).next()?;

    let mut fields = HashMap::new();
    for name in [FIELD_ORDER_ID, FIELD_USER_ID, FIELD_VOUCHER_ID] {
        if let Some(value) = stream_id.get::<String>(name) {
            fields.insert(name.to_string(), value);
        }
    }

    Some(LogRecord {
        entry_id: stream_id.id,
        fields,
    })
}

#[async_trait]
impl OrderLog for RedisStreamLog {
    async fn ensure_group(&self, group: &str) -> Result<()> {
        let mut conn = self.cache.connection();

        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                info!(stream = %self.stream_key, group = %group, "Consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream = %self.stream_key, group = %group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, entry: &OrderLogEntry) -> Result<String> {
        let mut conn = self.cache.connection();

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream_key).arg("*");
        for (name, value) in entry.to_fields() {
            cmd.arg(name).arg(value);
        }

        let entry_id: String = cmd.query_async(&mut conn).await?;
        Ok(entry_id)
    }

    async fn read_next(
        &self,
        group: &str,
        consumer: &str,
        max_wait: Duration,
    ) -> Result<Option<LogRecord>> {
        let deadline = read_deadline(max_wait);
        let mut conn = self.blocking_connection().await?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            // BLOCK 0 表示无限等待，剩余时间不足 1ms 时改为非阻塞读取
            let block = Some(remaining.min(MAX_BLOCK_SLICE)).filter(|d| d.as_millis() > 0);

            if let Some(record) = self
                .read_group(&mut conn, group, consumer, ">", block)
                .await?
            {
                return Ok(Some(record));
            }

            if block.is_none() {
                return Ok(None);
            }
        }
    }

    async fn read_pending(&self, group: &str, consumer: &str) -> Result<Option<LogRecord>> {
        let mut conn = self.cache.connection();
        self.read_group(&mut conn, group, consumer, "0", None).await
    }

    async fn ack(&self, group: &str, entry_id: &str) -> Result<()> {
        let mut conn = self.cache.connection();

        let acked: i64 = redis::cmd("XACK")
            .arg(&self.stream_key)
            .arg(group)
            .arg(entry_id)
            .query_async(&mut conn)
            .await?;

        if acked == 0 {
            debug!(entry_id = %entry_id, "Entry was not pending, ack ignored");
        }
        Ok(())
    }

    async fn pending_count(&self, group: &str) -> Result<u64> {
        let mut conn = self.cache.connection();

        let reply: StreamPendingReply = redis::cmd("XPENDING")
            .arg(&self.stream_key)
            .arg(group)
            .query_async(&mut conn)
            .await?;

        Ok(reply.count() as u64)
    }
}
