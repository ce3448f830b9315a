//! 秒杀下单服务
//!
//! 处理限量秒杀券的并发抢购：请求线程只做一次原子准入判定并立即返回订单号，
//! 订单的持久化由后台 Worker 从订单流异步完成。
//!
//! ## 核心流程
//!
//! 1. `AdmissionGate` 生成订单 ID，在 Redis 中原子执行「一人一单 + 库存」检查，
//!    通过后扣减缓存库存并把下单意图追加到订单流
//! 2. `OrderWorker` 以固定消费者身份消费订单流，优先处理 pending list 中的遗留消息
//! 3. 每条消息在用户级分布式锁内完成「查重 → 条件扣减库存 → 写订单」事务，成功后 ACK
//!
//! ## 模块结构
//!
//! - `admission`: 准入网关与内嵌的原子脚本
//! - `context`: 请求级用户上下文
//! - `error`: 错误类型定义
//! - `id`: 全局唯一订单 ID 生成
//! - `keys`: Redis key 命名空间
//! - `lock`: 用户下单分布式锁
//! - `models`: 领域模型
//! - `order_log`: 订单流（消费组、ACK、pending list）
//! - `service`: 面向调用方的下单服务
//! - `store`: 券库存与订单的持久化
//! - `worker`: 订单履约 Worker

pub mod admission;
pub mod context;
pub mod error;
pub mod id;
pub mod keys;
pub mod lock;
pub mod models;
pub mod order_log;
pub mod service;
pub mod store;
pub mod worker;

pub use admission::{Admission, AdmissionGate, AdmissionStatus};
pub use context::UserContext;
pub use error::{Result, SeckillError};
pub use id::IdGenerator;
pub use lock::{LockConfig, LockGuard, LockManager};
pub use models::{FulfillOutcome, SeckillVoucher, VoucherOrder};
pub use order_log::{LogRecord, OrderLog, OrderLogEntry};
pub use service::VoucherOrderService;
pub use store::OrderStore;
pub use worker::{EntryOutcome, OrderWorker, WorkerConfig};
