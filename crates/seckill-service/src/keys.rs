//! Redis key 命名空间
//!
//! 准入脚本、Worker 与管理接口必须使用完全一致的 key，统一在这里拼接

/// 秒杀相关 key 构造器
pub struct SeckillKeys;

impl SeckillKeys {
    /// 缓存库存: `seckill:stock:<voucherId>`
    pub fn stock(voucher_id: i64) -> String {
        format!("seckill:stock:{}", voucher_id)
    }

    /// 已下单用户集合: `seckill:order:<voucherId>`
    pub fn order_set(voucher_id: i64) -> String {
        format!("seckill:order:{}", voucher_id)
    }

    /// 用户下单锁的资源名，锁管理器会再加上 `lock:` 前缀
    pub fn user_order_lock(user_id: i64) -> String {
        format!("order:{}", user_id)
    }

    /// 订单 ID 日计数器: `icr:<prefix>:<yyyy:MM:dd>`
    pub fn id_counter(prefix: &str, day: &str) -> String {
        format!("icr:{}:{}", prefix, day)
    }
}
