//! 订单履约 Worker
//!
//! 以固定的消费者名消费订单流。每轮先处理本消费者 pending list 中的遗留消息，
//! 为空时再阻塞读取新消息；只有落库成功（或确定无需落库）后才 ACK。
//! 处理失败的消息留在 pending list 中，下一轮按退避间隔重试，不会跳过。

use std::sync::Arc;
use std::time::{Duration, Instant};

use seckill_shared::config::SeckillConfig;
use seckill_shared::observability::metrics;
use seckill_shared::retry::RetryPolicy;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, SeckillError};
use crate::keys::SeckillKeys;
use crate::lock::LockManager;
use crate::models::{FulfillOutcome, VoucherOrder};
use crate::order_log::{LogRecord, OrderLog};
use crate::store::OrderStore;

/// Worker 配置
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub group: String,
    pub consumer: String,
    /// 阻塞读取新消息的最长等待
    pub read_block: Duration,
    /// 用户锁租约
    pub lock_lease: Duration,
    /// 失败退避（无上限次数）
    pub backoff: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&SeckillConfig::default())
    }
}

impl From<&SeckillConfig> for WorkerConfig {
    fn from(config: &SeckillConfig) -> Self {
        Self {
            group: config.consumer_group.clone(),
            consumer: config.consumer_name.clone(),
            read_block: config.read_block(),
            lock_lease: config.lock_lease(),
            backoff: RetryPolicy::unbounded(
                Duration::from_millis(config.backoff_initial_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
        }
    }
}

/// 单条消息的最终处理结果，返回后消息即被 ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Created,
    AlreadyExists,
    StockExhausted,
    /// 消息无法解析，记录日志后丢弃
    Malformed,
}

impl EntryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AlreadyExists => "already_exists",
            Self::StockExhausted => "stock_exhausted",
            Self::Malformed => "malformed",
        }
    }
}

impl From<FulfillOutcome> for EntryOutcome {
    fn from(outcome: FulfillOutcome) -> Self {
        match outcome {
            FulfillOutcome::Created => Self::Created,
            FulfillOutcome::AlreadyExists => Self::AlreadyExists,
            FulfillOutcome::StockExhausted => Self::StockExhausted,
        }
    }
}

/// 发送端已发出 true 或已被丢弃时停止
fn stop_requested(shutdown: &watch::Receiver<bool>) -> bool {
    let requested = *shutdown.borrow();
    requested || shutdown.has_changed().is_err()
}

/// 订单履约 Worker
pub struct OrderWorker {
    log: Arc<dyn OrderLog>,
    store: Arc<dyn OrderStore>,
    locks: Arc<LockManager>,
    config: WorkerConfig,
}

impl OrderWorker {
    pub fn new(
        log: Arc<dyn OrderLog>,
        store: Arc<dyn OrderStore>,
        locks: Arc<LockManager>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            log,
            store,
            locks,
            config,
        }
    }

    /// 启动消费循环，直到收到 shutdown 信号或发送端被丢弃
    ///
    /// 正在处理的消息会先完成，再检查 shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            group = %self.config.group,
            consumer = %self.config.consumer,
            "订单处理 Worker 已启动"
        );

        match self.log.pending_count(&self.config.group).await {
            Ok(0) => {}
            Ok(pending) => info!(pending, "发现未确认的订单消息，将优先处理"),
            Err(e) => warn!(error = %e, "查询 pending list 失败"),
        }

        let mut failures: u32 = 0;

        while !stop_requested(&shutdown) {
            let started = Instant::now();

            match self.poll_once().await {
                Ok(Some(outcome)) => {
                    failures = 0;
                    metrics::record_fulfillment(
                        outcome.as_str(),
                        started.elapsed().as_secs_f64(),
                    );
                }
                Ok(None) => {
                    failures = 0;
                }
                Err(e) => {
                    let delay = self.config.backoff.delay_for_attempt(failures);
                    failures = failures.saturating_add(1);
                    metrics::record_worker_error(e.error_code());
                    error!(
                        error = %e,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "处理订单异常，消息保留在 pending list 中等待重试"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!("订单处理 Worker 已停止");
    }

    /// 处理至多一条消息
    ///
    /// 返回 `Ok(None)` 表示等待超时且没有消息；返回错误时消息仍在 pending list 中
    pub async fn poll_once(&self) -> Result<Option<EntryOutcome>> {
        let group = &self.config.group;
        let consumer = &self.config.consumer;

        let record = match self.log.read_pending(group, consumer).await? {
            Some(record) => {
                debug!(entry_id = %record.entry_id, "Retrying pending entry");
                record
            }
            None => match self
                .log
                .read_next(group, consumer, self.config.read_block)
                .await?
            {
                Some(record) => record,
                None => return Ok(None),
            },
        };

        let outcome = self.process_record(&record).await?;
        self.log.ack(group, &record.entry_id).await?;

        Ok(Some(outcome))
    }

    /// 处理一条消息，不负责 ACK
    #[instrument(skip(self, record), fields(entry_id = %record.entry_id))]
    pub async fn process_record(&self, record: &LogRecord) -> Result<EntryOutcome> {
        let entry = match record.parse() {
            Ok(entry) => entry,
            Err(e) => {
                // 格式错误的消息重试也不会成功，直接丢弃
                error!(error = %e, fields = ?record.fields, "丢弃无法解析的订单消息");
                return Ok(EntryOutcome::Malformed);
            }
        };

        let order = VoucherOrder::new(entry.order_id, entry.user_id, entry.voucher_id);
        let outcome = self.fulfill(&order).await?;

        match outcome {
            FulfillOutcome::Created => {
                info!(
                    order_id = order.id,
                    user_id = order.user_id,
                    voucher_id = order.voucher_id,
                    "订单创建成功"
                );
            }
            FulfillOutcome::AlreadyExists => {
                info!(order_id = order.id, "订单已存在，跳过重复消息");
            }
            FulfillOutcome::StockExhausted => {
                warn!(
                    order_id = order.id,
                    user_id = order.user_id,
                    voucher_id = order.voucher_id,
                    "数据库库存不足，放弃已准入的订单"
                );
            }
        }

        Ok(outcome.into())
    }

    /// 在用户锁内落库
    async fn fulfill(&self, order: &VoucherOrder) -> Result<FulfillOutcome> {
        let lock_key = SeckillKeys::user_order_lock(order.user_id);

        let guard = match self
            .locks
            .acquire(&lock_key, Some(self.config.lock_lease))
            .await
        {
            Ok(guard) => guard,
            Err(e @ SeckillError::LockConflict { .. }) => {
                warn!(user_id = order.user_id, "用户下单锁被占用，稍后重试");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let result = self.store.create_order(order).await;

        // 无论落库成功与否都释放锁；释放失败只会让锁按租约过期
        if let Err(e) = guard.release().await {
            warn!(error = %e, key = %lock_key, "释放用户下单锁失败");
        }

        result
    }
}
