//! 秒杀券实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeckillError};

/// 秒杀券
///
/// `stock` 是数据库中的真实库存；缓存库存由准入网关在发布时预热
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SeckillVoucher {
    pub voucher_id: i64,
    pub stock: i32,
    /// 秒杀开始时间（包含）
    pub begin_time: DateTime<Utc>,
    /// 秒杀结束时间（不包含）
    pub end_time: DateTime<Utc>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl SeckillVoucher {
    pub fn new(
        voucher_id: i64,
        stock: i32,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            voucher_id,
            stock,
            begin_time,
            end_time,
            create_time: now,
            update_time: now,
        }
    }

    /// 发布前的参数校验
    pub fn validate(&self) -> Result<()> {
        if self.stock < 0 {
            return Err(SeckillError::Validation(format!(
                "库存不能为负数: voucher_id={}, stock={}",
                self.voucher_id, self.stock
            )));
        }
        if self.end_time <= self.begin_time {
            return Err(SeckillError::Validation(format!(
                "结束时间必须晚于开始时间: voucher_id={}",
                self.voucher_id
            )));
        }
        Ok(())
    }

    /// 检查 `now` 是否处于秒杀时间窗口 [begin_time, end_time) 内
    pub fn check_window(&self, now: DateTime<Utc>) -> Result<()> {
        if now < self.begin_time {
            return Err(SeckillError::SeckillNotStarted(self.voucher_id));
        }
        if now >= self.end_time {
            return Err(SeckillError::SeckillEnded(self.voucher_id));
        }
        Ok(())
    }
}
