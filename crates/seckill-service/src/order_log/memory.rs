//! 进程内订单流
//!
//! 复刻消费组语义：每个消费组独立的投递游标、按消费者记录的 pending list。
//! 用于测试与单机演示，进程退出后数据丢失。

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::entry::OrderLogEntry;
use super::{LogRecord, OrderLog, read_deadline};
use crate::error::{Result, SeckillError};

#[derive(Debug, Default)]
struct GroupState {
    /// 下一条待投递消息的序号（从 1 开始）
    next_seq: u64,
    /// 已投递未确认的消息：序号 → 消费者
    pending: BTreeMap<u64, String>,
}

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<HashMap<String, String>>,
    groups: HashMap<String, GroupState>,
}

impl LogState {
    fn record(&self, seq: u64) -> Option<LogRecord> {
        let index = usize::try_from(seq.checked_sub(1)?).ok()?;
        self.entries.get(index).map(|fields| LogRecord {
            entry_id: entry_id(seq),
            fields: fields.clone(),
        })
    }

    fn group_mut(&mut self, group: &str) -> Result<&mut GroupState> {
        self.groups
            .get_mut(group)
            .ok_or_else(|| SeckillError::Internal(format!("NOGROUP 消费组不存在: {}", group)))
    }
}

fn entry_id(seq: u64) -> String {
    format!("{}-0", seq)
}

fn parse_seq(entry_id: &str) -> Option<u64> {
    entry_id.split('-').next()?.parse().ok()
}

/// 进程内订单流
pub struct MemoryOrderLog {
    state: Mutex<LogState>,
    /// 每次追加后递增，唤醒阻塞中的读取
    appended: watch::Sender<u64>,
}

impl Default for MemoryOrderLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOrderLog {
    pub fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            state: Mutex::new(LogState::default()),
            appended,
        }
    }

    /// 同步追加原始字段，返回消息 ID
    ///
    /// 准入后端在自己的临界区内调用，保证扣减与追加一起生效
    pub fn push(&self, fields: HashMap<String, String>) -> String {
        let seq = {
            let mut state = self.state.lock();
            state.entries.push(fields);
            state.entries.len() as u64
        };
        self.appended.send_modify(|count| *count += 1);
        entry_id(seq)
    }

    /// 消息总数
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 全部消息（按追加顺序）
    pub fn records(&self) -> Vec<LogRecord> {
        let state = self.state.lock();
        (1..=state.entries.len() as u64)
            .filter_map(|seq| state.record(seq))
            .collect()
    }

    fn deliver_next(&self, group: &str, consumer: &str) -> Result<Option<LogRecord>> {
        let mut state = self.state.lock();
        let total = state.entries.len() as u64;

        let group_state = state.group_mut(group)?;
        if group_state.next_seq > total {
            return Ok(None);
        }

        let seq = group_state.next_seq;
        group_state.next_seq += 1;
        group_state.pending.insert(seq, consumer.to_string());

        Ok(state.record(seq))
    }
}

#[async_trait]
impl OrderLog for MemoryOrderLog {
    async fn ensure_group(&self, group: &str) -> Result<()> {
        self.state
            .lock()
            .groups
            .entry(group.to_string())
            .or_insert_with(|| GroupState {
                next_seq: 1,
                pending: BTreeMap::new(),
            });
        Ok(())
    }

    async fn append(&self, entry: &OrderLogEntry) -> Result<String> {
        Ok(self.push(entry.to_field_map()))
    }

    async fn read_next(
        &self,
        group: &str,
        consumer: &str,
        max_wait: Duration,
    ) -> Result<Option<LogRecord>> {
        // 先订阅再检查，检查之后的追加一定会唤醒 changed()
        let mut appended = self.appended.subscribe();
        let deadline = read_deadline(max_wait);

        loop {
            if let Some(record) = self.deliver_next(group, consumer)? {
                return Ok(Some(record));
            }

            match tokio::time::timeout_at(deadline, appended.changed()).await {
                Ok(Ok(())) => continue,
                _ => return Ok(None),
            }
        }
    }

    async fn read_pending(&self, group: &str, consumer: &str) -> Result<Option<LogRecord>> {
        let mut state = self.state.lock();
        let seq = state
            .group_mut(group)?
            .pending
            .iter()
            .find(|(_, owner)| owner.as_str() == consumer)
            .map(|(seq, _)| *seq);

        Ok(seq.and_then(|seq| state.record(seq)))
    }

    async fn ack(&self, group: &str, entry_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let group_state = state.group_mut(group)?;
        if let Some(seq) = parse_seq(entry_id) {
            group_state.pending.remove(&seq);
        }
        Ok(())
    }

    async fn pending_count(&self, group: &str) -> Result<u64> {
        let mut state = self.state.lock();
        Ok(state.group_mut(group)?.pending.len() as u64)
    }
}
