//! 秒杀准入
//!
//! 一次原子判定完成「一人一单 + 库存」检查；通过时同时扣减缓存库存、
//! 记录下单用户并把下单意图追加到订单流，三者要么全部生效要么全部不生效。

pub mod backend;
pub mod gate;
pub mod memory;
pub mod script;

use crate::error::{Result, SeckillError};

pub use backend::{AdmissionBackend, RedisAdmissionBackend};
pub use gate::{Admission, AdmissionGate};
pub use memory::MemoryAdmissionBackend;
pub use script::AdmissionScript;

/// 准入判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionStatus {
    /// 准入成功，下单意图已写入订单流
    Ok,
    /// 缓存库存不足
    OutOfStock,
    /// 该用户已抢购过此券
    Duplicate,
}

impl AdmissionStatus {
    /// 脚本返回码: 0 成功, 1 库存不足, 2 重复下单
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Ok),
            1 => Ok(Self::OutOfStock),
            2 => Ok(Self::Duplicate),
            other => Err(SeckillError::UnknownAdmissionStatus(other)),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Ok => 0,
            Self::OutOfStock => 1,
            Self::Duplicate => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::OutOfStock => "out_of_stock",
            Self::Duplicate => "duplicate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        for status in [
            AdmissionStatus::Ok,
            AdmissionStatus::OutOfStock,
            AdmissionStatus::Duplicate,
        ] {
            assert_eq!(AdmissionStatus::from_code(status.code()).unwrap(), status);
        }
        assert!(matches!(
            AdmissionStatus::from_code(3),
            Err(SeckillError::UnknownAdmissionStatus(3))
        ));
    }
}
