//! 秒杀管道端到端测试
//!
//! 使用进程内后端组装完整管道：准入网关 → 订单流 → Worker → 存储

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use seckill::admission::{AdmissionBackend, AdmissionGate, AdmissionStatus, MemoryAdmissionBackend};
use seckill::id::{IdGenerator, MemorySequenceCounter};
use seckill::lock::{LockConfig, LockManager, MemoryLockStore};
use seckill::order_log::{MemoryOrderLog, OrderLog, OrderLogEntry};
use seckill::store::{MemoryOrderStore, OrderStore};
use seckill::worker::{EntryOutcome, OrderWorker, WorkerConfig};
use seckill::{SeckillError, SeckillVoucher, UserContext, VoucherOrder, VoucherOrderService};
use seckill_shared::retry::RetryPolicy;
use tokio::sync::watch;

const GROUP: &str = "g1";
const CONSUMER: &str = "c1";
const VOUCHER_ID: i64 = 7;

struct Pipeline {
    service: Arc<VoucherOrderService>,
    backend: Arc<MemoryAdmissionBackend>,
    log: Arc<MemoryOrderLog>,
    store: Arc<MemoryOrderStore>,
    lock_store: Arc<MemoryLockStore>,
    ids: Arc<IdGenerator>,
}

impl Pipeline {
    async fn new() -> Self {
        let log = Arc::new(MemoryOrderLog::new());
        log.ensure_group(GROUP).await.unwrap();

        let backend = Arc::new(MemoryAdmissionBackend::new(log.clone()));
        let store = Arc::new(MemoryOrderStore::new());
        let ids = Arc::new(IdGenerator::new(Arc::new(MemorySequenceCounter::new())));
        let gate = Arc::new(AdmissionGate::new(ids.clone(), backend.clone(), "order"));
        let service = Arc::new(VoucherOrderService::new(store.clone(), gate));

        Self {
            service,
            backend,
            log,
            store,
            lock_store: Arc::new(MemoryLockStore::new()),
            ids,
        }
    }

    async fn publish(&self, stock: i32) {
        let now = Utc::now();
        let voucher = SeckillVoucher::new(
            VOUCHER_ID,
            stock,
            now - chrono::Duration::minutes(5),
            now + chrono::Duration::minutes(5),
        );
        self.service.publish_voucher(&voucher).await.unwrap();
    }

    fn worker(&self) -> OrderWorker {
        self.worker_as(CONSUMER)
    }

    /// 每个 Worker 使用独立的锁管理器，模拟不同进程共享同一个锁存储
    fn worker_as(&self, consumer: &str) -> OrderWorker {
        let locks = Arc::new(LockManager::new(
            self.lock_store.clone(),
            LockConfig {
                default_ttl: Duration::from_secs(30),
                retry_count: 3,
                retry_delay: Duration::from_millis(2),
            },
        ));
        OrderWorker::new(
            self.log.clone(),
            self.store.clone(),
            locks,
            WorkerConfig {
                group: GROUP.to_string(),
                consumer: consumer.to_string(),
                read_block: Duration::from_millis(10),
                lock_lease: Duration::from_secs(30),
                backoff: RetryPolicy::unbounded(
                    Duration::from_millis(1),
                    Duration::from_millis(10),
                ),
            },
        )
    }

    /// 处理完所有消息，返回每条消息的结果
    async fn drain(&self, worker: &OrderWorker) -> Vec<EntryOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = worker.poll_once().await.unwrap() {
            outcomes.push(outcome);
        }
        outcomes
    }
}

/// 持续消费直到本消费者没有 pending 消息且没有新消息，失败的消息留待下一轮重试
async fn drain_with_retries(worker: Arc<OrderWorker>) -> Vec<EntryOutcome> {
    let mut outcomes = Vec::new();
    for _ in 0..1000 {
        match worker.poll_once().await {
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => return outcomes,
            Err(_) => tokio::time::sleep(Duration::from_millis(1)).await,
        }
    }
    panic!("worker did not become idle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_unit_is_sold_once() {
    let pipeline = Pipeline::new().await;
    pipeline.publish(1).await;

    let results = join_all([1001, 1002].map(|user_id| {
        let service = pipeline.service.clone();
        async move {
            service
                .seckill_voucher(&UserContext::new(user_id), VOUCHER_ID)
                .await
        }
    }))
    .await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let sold_out = results
        .iter()
        .filter(|r| matches!(r, Err(SeckillError::OutOfStock(VOUCHER_ID))))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(sold_out, 1);
    assert_eq!(pipeline.log.len(), 1);

    let worker = pipeline.worker();
    assert_eq!(pipeline.drain(&worker).await, vec![EntryOutcome::Created]);
    assert_eq!(pipeline.store.stock_of(VOUCHER_ID), Some(0));
    assert_eq!(pipeline.store.order_count(VOUCHER_ID), 1);
}

#[tokio::test]
async fn test_same_user_admitted_once() {
    let pipeline = Pipeline::new().await;
    pipeline.publish(10).await;
    let ctx = UserContext::new(1010);

    let order_id = pipeline
        .service
        .seckill_voucher(&ctx, VOUCHER_ID)
        .await
        .unwrap();
    let second = pipeline.service.seckill_voucher(&ctx, VOUCHER_ID).await;

    assert!(matches!(
        second,
        Err(SeckillError::DuplicateOrder {
            user_id: 1010,
            voucher_id: VOUCHER_ID
        })
    ));
    assert_eq!(pipeline.log.len(), 1);
    assert_eq!(pipeline.backend.cached_stock(VOUCHER_ID).await.unwrap(), Some(9));

    let worker = pipeline.worker();
    pipeline.drain(&worker).await;

    let order = pipeline.service.find_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.user_id, 1010);
    assert_eq!(
        pipeline
            .service
            .find_user_order(&ctx, VOUCHER_ID)
            .await
            .unwrap()
            .map(|o| o.id),
        Some(order_id)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_admission_never_oversells() {
    const STOCK: i32 = 10;
    const USERS: i64 = 200;

    let pipeline = Pipeline::new().await;
    pipeline.publish(STOCK).await;

    let handles: Vec<_> = (0..USERS)
        .map(|i| {
            let service = pipeline.service.clone();
            tokio::spawn(async move {
                // 每个用户重复抢两次
                let ctx = UserContext::new(10_000 + i);
                let first = service.seckill_voucher(&ctx, VOUCHER_ID).await;
                let second = service.seckill_voucher(&ctx, VOUCHER_ID).await;
                (first, second)
            })
        })
        .collect();

    let mut order_ids = HashSet::new();
    for handle in handles {
        let (first, second) = handle.await.unwrap();
        if let Ok(order_id) = first {
            assert!(order_ids.insert(order_id));
            assert!(matches!(second, Err(SeckillError::DuplicateOrder { .. })));
        }
    }

    assert_eq!(order_ids.len(), STOCK as usize);
    assert_eq!(pipeline.backend.buyer_count(VOUCHER_ID), STOCK as usize);
    assert_eq!(pipeline.backend.cached_stock(VOUCHER_ID).await.unwrap(), Some(0));

    let worker = pipeline.worker();
    let outcomes = pipeline.drain(&worker).await;
    assert_eq!(outcomes.len(), STOCK as usize);
    assert!(outcomes.iter().all(|o| *o == EntryOutcome::Created));
    assert_eq!(pipeline.store.stock_of(VOUCHER_ID), Some(0));

    for order_id in order_ids {
        assert!(pipeline.store.get_order(order_id).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_crash_before_ack_is_recovered_without_double_decrement() {
    let pipeline = Pipeline::new().await;
    pipeline.publish(5).await;

    let order_id = pipeline
        .service
        .seckill_voucher(&UserContext::new(1010), VOUCHER_ID)
        .await
        .unwrap();

    // 第一个 Worker 读取并落库，但在 ACK 之前崩溃
    let record = pipeline
        .log
        .read_next(GROUP, CONSUMER, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();
    let entry = record.parse().unwrap();
    pipeline
        .store
        .create_order(&VoucherOrder::new(entry.order_id, entry.user_id, entry.voucher_id))
        .await
        .unwrap();
    assert_eq!(pipeline.log.pending_count(GROUP).await.unwrap(), 1);

    // 以相同的消费者名重启
    let restarted = pipeline.worker();
    assert_eq!(
        restarted.poll_once().await.unwrap(),
        Some(EntryOutcome::AlreadyExists)
    );

    assert_eq!(pipeline.log.pending_count(GROUP).await.unwrap(), 0);
    assert_eq!(pipeline.store.order_count(VOUCHER_ID), 1);
    assert_eq!(pipeline.store.stock_of(VOUCHER_ID), Some(4));
    assert!(pipeline.store.get_order(order_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_transient_storage_failure_is_retried() {
    let pipeline = Pipeline::new().await;
    pipeline.publish(5).await;
    pipeline
        .service
        .seckill_voucher(&UserContext::new(1010), VOUCHER_ID)
        .await
        .unwrap();

    pipeline.store.fail_next_writes(3);
    let worker = pipeline.worker();

    for _ in 0..3 {
        assert!(worker.poll_once().await.is_err());
        assert_eq!(pipeline.log.pending_count(GROUP).await.unwrap(), 1);
    }
    assert_eq!(worker.poll_once().await.unwrap(), Some(EntryOutcome::Created));
    assert_eq!(pipeline.log.pending_count(GROUP).await.unwrap(), 0);
    assert_eq!(pipeline.store.stock_of(VOUCHER_ID), Some(4));
}

#[tokio::test]
async fn test_true_stock_exhaustion_drops_order_and_acks() {
    let pipeline = Pipeline::new().await;
    pipeline.publish(1).await;
    // 缓存库存与数据库库存不一致：缓存多出一件
    pipeline.backend.preload_stock(VOUCHER_ID, 2).await.unwrap();

    for user_id in [1001, 1002] {
        pipeline
            .service
            .seckill_voucher(&UserContext::new(user_id), VOUCHER_ID)
            .await
            .unwrap();
    }

    let worker = pipeline.worker();
    let outcomes = pipeline.drain(&worker).await;

    assert_eq!(
        outcomes,
        vec![EntryOutcome::Created, EntryOutcome::StockExhausted]
    );
    assert_eq!(pipeline.log.pending_count(GROUP).await.unwrap(), 0);
    assert_eq!(pipeline.store.order_count(VOUCHER_ID), 1);
    assert_eq!(pipeline.store.stock_of(VOUCHER_ID), Some(0));
}

#[tokio::test]
async fn test_seckill_outside_window() {
    let pipeline = Pipeline::new().await;
    let now = Utc::now();

    let upcoming = SeckillVoucher::new(
        8,
        10,
        now + chrono::Duration::hours(1),
        now + chrono::Duration::hours(2),
    );
    let finished = SeckillVoucher::new(
        9,
        10,
        now - chrono::Duration::hours(2),
        now - chrono::Duration::hours(1),
    );
    pipeline.service.publish_voucher(&upcoming).await.unwrap();
    pipeline.service.publish_voucher(&finished).await.unwrap();

    let ctx = UserContext::new(1010);
    assert!(matches!(
        pipeline.service.seckill_voucher(&ctx, 8).await,
        Err(SeckillError::SeckillNotStarted(8))
    ));
    assert!(matches!(
        pipeline.service.seckill_voucher(&ctx, 9).await,
        Err(SeckillError::SeckillEnded(9))
    ));
    assert!(matches!(
        pipeline.service.seckill_voucher(&ctx, 404).await,
        Err(SeckillError::VoucherNotFound(404))
    ));
    assert!(pipeline.log.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_ids_are_unique_across_concurrent_callers() {
    let pipeline = Pipeline::new().await;

    let handles: Vec<_> = (0..300)
        .map(|_| {
            let ids = pipeline.ids.clone();
            tokio::spawn(async move {
                let mut batch = Vec::with_capacity(100);
                for _ in 0..100 {
                    batch.push(ids.next_id("order").await.unwrap());
                }
                batch
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(id > 0);
            assert!(all.insert(id), "duplicate id {}", id);
        }
    }
    assert_eq!(all.len(), 30_000);
}

#[tokio::test]
async fn test_stale_lock_holder_cannot_release_new_lease() {
    let pipeline = Pipeline::new().await;
    let locks = LockManager::with_defaults(pipeline.lock_store.clone());

    let stale = locks
        .acquire("order:1010", Some(Duration::from_millis(20)))
        .await
        .unwrap();
    let stale_token = stale.owner().to_string();
    tokio::time::sleep(Duration::from_millis(40)).await;

    let fresh = locks.acquire("order:1010", None).await.unwrap();

    assert!(!locks.release("order:1010", &stale_token).await.unwrap());
    assert_eq!(
        pipeline.lock_store.owner_of("lock:order:1010").as_deref(),
        Some(fresh.owner())
    );

    assert!(fresh.release().await.unwrap());
    // 过期的 guard 释放时同样不会影响任何人
    assert!(!stale.release().await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_running_worker_fulfills_orders_until_shutdown() {
    let pipeline = Pipeline::new().await;
    pipeline.publish(3).await;

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(pipeline.worker().run(rx));

    let mut order_ids = Vec::new();
    for user_id in [1, 2, 3] {
        order_ids.push(
            pipeline
                .service
                .seckill_voucher(&UserContext::new(user_id), VOUCHER_ID)
                .await
                .unwrap(),
        );
    }

    // 等待异步落库完成
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while pipeline.store.order_count(VOUCHER_ID) < 3 {
        assert!(tokio::time::Instant::now() < deadline, "orders were not fulfilled in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();

    for order_id in order_ids {
        assert!(pipeline.service.find_order(order_id).await.unwrap().is_some());
    }
    assert_eq!(pipeline.store.stock_of(VOUCHER_ID), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_consumers_fulfill_same_user_once() {
    let pipeline = Pipeline::new().await;
    pipeline.publish(5).await;

    // 同一用户的多条下单消息（重复投递或重放），分散给两个消费者
    for order_id in 101..=108 {
        pipeline
            .log
            .append(&OrderLogEntry::new(order_id, 1010, VOUCHER_ID))
            .await
            .unwrap();
    }

    let c1 = Arc::new(pipeline.worker_as("c1"));
    let c2 = Arc::new(pipeline.worker_as("c2"));
    let (first, second) = tokio::join!(
        tokio::spawn(drain_with_retries(c1)),
        tokio::spawn(drain_with_retries(c2)),
    );
    let outcomes: Vec<EntryOutcome> = first.unwrap().into_iter().chain(second.unwrap()).collect();

    assert_eq!(outcomes.len(), 8);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == EntryOutcome::Created)
            .count(),
        1
    );
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, EntryOutcome::Created | EntryOutcome::AlreadyExists))
    );

    assert_eq!(pipeline.store.order_count(VOUCHER_ID), 1);
    assert_eq!(pipeline.store.stock_of(VOUCHER_ID), Some(4));
    assert_eq!(pipeline.log.pending_count(GROUP).await.unwrap(), 0);
    assert!(pipeline.lock_store.owner_of("lock:order:1010").is_none());
}
