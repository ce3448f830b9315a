//! 秒杀订单实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 秒杀订单
///
/// `id` 在准入阶段生成并写入订单流，Worker 落库时原样使用，
/// 因此同一条消息无论投递几次都对应同一个订单号
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VoucherOrder {
    pub id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
    pub create_time: DateTime<Utc>,
}

impl VoucherOrder {
    pub fn new(id: i64, user_id: i64, voucher_id: i64) -> Self {
        Self {
            id,
            user_id,
            voucher_id,
            create_time: Utc::now(),
        }
    }
}

/// 单条订单落库的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillOutcome {
    /// 扣减库存并写入订单
    Created,
    /// 该用户已有此券的订单（重复投递），未做任何修改
    AlreadyExists,
    /// 数据库真实库存已耗尽，订单被放弃
    StockExhausted,
}

impl FulfillOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AlreadyExists => "already_exists",
            Self::StockExhausted => "stock_exhausted",
        }
    }
}
