//! 持久化存储
//!
//! 定义券与订单的存储接口，服务层与 Worker 依赖抽象而非具体实现

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FulfillOutcome, SeckillVoucher, VoucherOrder};

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

/// 券与订单存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    // 秒杀券
    async fn save_voucher(&self, voucher: &SeckillVoucher) -> Result<()>;
    async fn get_voucher(&self, voucher_id: i64) -> Result<Option<SeckillVoucher>>;

    // 订单
    async fn find_order(&self, user_id: i64, voucher_id: i64) -> Result<Option<VoucherOrder>>;
    async fn get_order(&self, order_id: i64) -> Result<Option<VoucherOrder>>;

    /// 在单个事务内完成：一人一单检查 → 条件扣减库存（stock > 0）→ 写入订单
    ///
    /// 任何一步未通过都不会留下部分修改
    async fn create_order(&self, order: &VoucherOrder) -> Result<FulfillOutcome>;
}
