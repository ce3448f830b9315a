//! 下单意图消息格式
//!
//! 订单流中的每条消息是扁平的字符串字段表：
//!
//! | 字段        | 含义     |
//! |-------------|----------|
//! | `id`        | 订单 ID  |
//! | `userId`    | 用户 ID  |
//! | `voucherId` | 秒杀券 ID |

use std::collections::HashMap;

use crate::error::{Result, SeckillError};

pub const FIELD_ORDER_ID: &str = "id";
pub const FIELD_USER_ID: &str = "userId";
pub const FIELD_VOUCHER_ID: &str = "voucherId";

/// 下单意图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLogEntry {
    pub order_id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
}

impl OrderLogEntry {
    pub fn new(order_id: i64, user_id: i64, voucher_id: i64) -> Self {
        Self {
            order_id,
            user_id,
            voucher_id,
        }
    }

    /// 按写入顺序展开为字段对
    pub fn to_fields(&self) -> [(&'static str, String); 3] {
        [
            (FIELD_USER_ID, self.user_id.to_string()),
            (FIELD_VOUCHER_ID, self.voucher_id.to_string()),
            (FIELD_ORDER_ID, self.order_id.to_string()),
        ]
    }

    pub fn to_field_map(&self) -> HashMap<String, String> {
        self.to_fields()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    /// 从字段表解析，缺少字段或字段不是整数时返回 `MalformedEntry`
    pub fn from_fields(entry_id: &str, fields: &HashMap<String, String>) -> Result<Self> {
        let read = |name: &str| -> Result<i64> {
            let raw = fields.get(name).ok_or_else(|| SeckillError::MalformedEntry {
                entry_id: entry_id.to_string(),
                reason: format!("缺少字段 {}", name),
            })?;
            raw.trim()
                .parse::<i64>()
                .map_err(|e| SeckillError::MalformedEntry {
                    entry_id: entry_id.to_string(),
                    reason: format!("字段 {} 不是整数: {:?} ({})", name, raw, e),
                })
        };

        Ok(Self {
            order_id: read(FIELD_ORDER_ID)?,
            user_id: read(FIELD_USER_ID)?,
            voucher_id: read(FIELD_VOUCHER_ID)?,
        })
    }
}
