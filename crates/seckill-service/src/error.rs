//! 秒杀服务错误类型
//!
//! 业务错误直接返回给调用方；系统错误在 Worker 中保留消息等待重试

use seckill_shared::error::SharedError;
use thiserror::Error;

/// 秒杀服务错误类型
#[derive(Debug, Error)]
pub enum SeckillError {
    // === 秒杀券相关错误 ===
    #[error("秒杀券不存在: {0}")]
    VoucherNotFound(i64),

    #[error("秒杀尚未开始: voucher_id={0}")]
    SeckillNotStarted(i64),

    #[error("秒杀已经结束: voucher_id={0}")]
    SeckillEnded(i64),

    #[error("库存不足: voucher_id={0}")]
    OutOfStock(i64),

    #[error("不能重复下单: user_id={user_id}, voucher_id={voucher_id}")]
    DuplicateOrder { user_id: i64, voucher_id: i64 },

    // === 管道相关错误 ===
    #[error("获取锁失败: {resource}")]
    LockConflict { resource: String },

    #[error("订单 ID 计数器溢出: key={key}, count={count}")]
    IdCounterOverflow { key: String, count: i64 },

    #[error("未知的准入结果码: {0}")]
    UnknownAdmissionStatus(i64),

    #[error("订单流消息格式错误: entry_id={entry_id}, 原因={reason}")]
    MalformedEntry { entry_id: String, reason: String },

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error(transparent)]
    Shared(#[from] SharedError),
}

/// 秒杀服务 Result 类型别名
pub type Result<T> = std::result::Result<T, SeckillError>;

impl SeckillError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(_) | Self::Redis(_) | Self::LockConflict { .. } => true,
            Self::Shared(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            Self::VoucherNotFound(_)
                | Self::SeckillNotStarted(_)
                | Self::SeckillEnded(_)
                | Self::OutOfStock(_)
                | Self::DuplicateOrder { .. }
                | Self::Validation(_)
        )
    }

    /// 获取错误码（用于 API 响应与指标标签）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::VoucherNotFound(_) => "VOUCHER_NOT_FOUND",
            Self::SeckillNotStarted(_) => "SECKILL_NOT_STARTED",
            Self::SeckillEnded(_) => "SECKILL_ENDED",
            Self::OutOfStock(_) => "OUT_OF_STOCK",
            Self::DuplicateOrder { .. } => "DUPLICATE_ORDER",
            Self::LockConflict { .. } => "LOCK_CONFLICT",
            Self::IdCounterOverflow { .. } => "ID_COUNTER_OVERFLOW",
            Self::UnknownAdmissionStatus(_) => "UNKNOWN_ADMISSION_STATUS",
            Self::MalformedEntry { .. } => "MALFORMED_ENTRY",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Shared(e) => e.code(),
        }
    }
}
