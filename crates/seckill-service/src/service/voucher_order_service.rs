//! 秒杀下单服务
//!
//! 面向调用方的入口：发布秒杀券、抢购、查询订单。
//! 抢购只做时间窗口校验与一次原子准入，订单由 Worker 异步落库，
//! 因此返回订单号之后短时间内 `find_order` 可能还查不到该订单。

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::admission::{AdmissionGate, AdmissionStatus};
use crate::context::UserContext;
use crate::error::{Result, SeckillError};
use crate::models::{SeckillVoucher, VoucherOrder};
use crate::store::OrderStore;

/// 秒杀下单服务
pub struct VoucherOrderService {
    store: Arc<dyn OrderStore>,
    gate: Arc<AdmissionGate>,
}

impl VoucherOrderService {
    pub fn new(store: Arc<dyn OrderStore>, gate: Arc<AdmissionGate>) -> Self {
        Self { store, gate }
    }

    /// 发布秒杀券
    ///
    /// 先持久化券信息，再用数据库库存预热缓存库存并清空已下单用户集合。
    /// 活动进行中重复发布会重置去重集合，只应在活动开始前调用。
    #[instrument(skip(self, voucher), fields(voucher_id = voucher.voucher_id, stock = voucher.stock))]
    pub async fn publish_voucher(&self, voucher: &SeckillVoucher) -> Result<()> {
        voucher.validate()?;

        self.store.save_voucher(voucher).await?;
        self.gate
            .preload_stock(voucher.voucher_id, voucher.stock)
            .await?;

        info!("秒杀券已发布");
        Ok(())
    }

    /// 抢购秒杀券，成功时返回订单号
    ///
    /// # 错误
    ///
    /// - `VoucherNotFound`: 券不存在
    /// - `SeckillNotStarted` / `SeckillEnded`: 不在秒杀时间窗口内
    /// - `OutOfStock`: 缓存库存不足
    /// - `DuplicateOrder`: 该用户已抢购过
    #[instrument(skip(self, ctx), fields(user_id = ctx.user_id()))]
    pub async fn seckill_voucher(&self, ctx: &UserContext, voucher_id: i64) -> Result<i64> {
        let voucher = self
            .store
            .get_voucher(voucher_id)
            .await?
            .ok_or(SeckillError::VoucherNotFound(voucher_id))?;

        voucher.check_window(Utc::now())?;

        let admission = self.gate.admit(voucher_id, ctx.user_id()).await?;

        match admission.status {
            AdmissionStatus::Ok => {
                info!(order_id = admission.order_id, "秒杀准入成功");
                Ok(admission.order_id)
            }
            AdmissionStatus::OutOfStock => Err(SeckillError::OutOfStock(voucher_id)),
            AdmissionStatus::Duplicate => {
                warn!("用户重复抢购");
                Err(SeckillError::DuplicateOrder {
                    user_id: ctx.user_id(),
                    voucher_id,
                })
            }
        }
    }

    /// 按订单号查询已落库的订单
    pub async fn find_order(&self, order_id: i64) -> Result<Option<VoucherOrder>> {
        self.store.get_order(order_id).await
    }

    /// 查询用户在某张券下的订单
    pub async fn find_user_order(
        &self,
        ctx: &UserContext,
        voucher_id: i64,
    ) -> Result<Option<VoucherOrder>> {
        self.store.find_order(ctx.user_id(), voucher_id).await
    }
}
