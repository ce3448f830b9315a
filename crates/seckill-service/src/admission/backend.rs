//! 准入后端

use async_trait::async_trait;
use seckill_shared::cache::Cache;
use tracing::info;

use super::AdmissionStatus;
use super::script::AdmissionScript;
use crate::error::Result;
use crate::keys::SeckillKeys;

/// 准入后端
///
/// `try_admit` 必须原子执行，并发调用之间不能观察到中间状态
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdmissionBackend: Send + Sync {
    /// 去重检查 → 库存检查 → 扣减缓存库存 + 记录用户 + 追加订单流
    async fn try_admit(
        &self,
        voucher_id: i64,
        user_id: i64,
        order_id: i64,
    ) -> Result<AdmissionStatus>;

    /// 写入缓存库存并清空已下单用户集合
    async fn preload_stock(&self, voucher_id: i64, stock: i32) -> Result<()>;

    /// 当前缓存库存，未预热时返回 None
    async fn cached_stock(&self, voucher_id: i64) -> Result<Option<i64>>;
}

/// Redis 准入后端
pub struct RedisAdmissionBackend {
    cache: Cache,
    script: AdmissionScript,
    stream_key: String,
}

impl RedisAdmissionBackend {
    pub fn new(cache: Cache, stream_key: impl Into<String>) -> Self {
        Self {
            cache,
            script: AdmissionScript::new(),
            stream_key: stream_key.into(),
        }
    }

    /// 启动时预加载准入脚本
    pub async fn load_script(&self) -> Result<()> {
        let mut conn = self.cache.connection();
        self.script.load(&mut conn).await
    }
}

#[async_trait]
impl AdmissionBackend for RedisAdmissionBackend {
    async fn try_admit(
        &self,
        voucher_id: i64,
        user_id: i64,
        order_id: i64,
    ) -> Result<AdmissionStatus> {
        let mut conn = self.cache.connection();
        let code = self
            .script
            .invoke(&mut conn, &self.stream_key, voucher_id, user_id, order_id)
            .await?;
        AdmissionStatus::from_code(code)
    }

    async fn preload_stock(&self, voucher_id: i64, stock: i32) -> Result<()> {
        let mut conn = self.cache.connection();

        redis::pipe()
            .atomic()
            .set(SeckillKeys::stock(voucher_id), stock)
            .ignore()
            .del(SeckillKeys::order_set(voucher_id))
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        info!(voucher_id, stock, "Seckill stock preloaded");
        Ok(())
    }

    async fn cached_stock(&self, voucher_id: i64) -> Result<Option<i64>> {
        let mut conn = self.cache.connection();
        let stock: Option<i64> = redis::cmd("GET")
            .arg(SeckillKeys::stock(voucher_id))
            .query_async(&mut conn)
            .await?;
        Ok(stock)
    }
}
