//! 准入脚本
//!
//! 脚本随二进制一起发布并带版本号，启动时通过 SCRIPT LOAD 预加载，
//! 运行时以 EVALSHA 调用（脚本缓存被清空时自动回退为 EVAL）。

use redis::aio::ConnectionManager;
use tracing::info;

use crate::error::{Result, SeckillError};
use crate::keys::SeckillKeys;

/// 脚本版本，修改脚本内容时递增
pub const ADMISSION_SCRIPT_VERSION: u32 = 1;

/// KEYS[1] 缓存库存, KEYS[2] 已下单用户集合, KEYS[3] 订单流
/// ARGV[1] voucherId, ARGV[2] userId, ARGV[3] orderId
const ADMISSION_LUA: &str = r#"
-- seckill admission v1
if redis.call('sismember', KEYS[2], ARGV[2]) == 1 then
    return 2
end

local stock = tonumber(redis.call('get', KEYS[1]))
if stock == nil or stock <= 0 then
    return 1
end

redis.call('incrby', KEYS[1], -1)
redis.call('sadd', KEYS[2], ARGV[2])
redis.call('xadd', KEYS[3], '*', 'userId', ARGV[2], 'voucherId', ARGV[1], 'id', ARGV[3])
return 0
"#;

/// 准入脚本句柄
pub struct AdmissionScript {
    script: redis::Script,
}

impl Default for AdmissionScript {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionScript {
    pub fn new() -> Self {
        Self {
            script: redis::Script::new(ADMISSION_LUA),
        }
    }

    /// 脚本 SHA1
    pub fn sha(&self) -> &str {
        self.script.get_hash()
    }

    /// 预加载脚本到 Redis 脚本缓存
    pub async fn load(&self, conn: &mut ConnectionManager) -> Result<()> {
        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(ADMISSION_LUA)
            .query_async(conn)
            .await?;

        if sha != self.sha() {
            return Err(SeckillError::Internal(format!(
                "准入脚本 SHA 不一致: expected={}, loaded={}",
                self.sha(),
                sha
            )));
        }

        info!(
            sha = %sha,
            version = ADMISSION_SCRIPT_VERSION,
            "Admission script loaded"
        );
        Ok(())
    }

    /// 执行准入脚本，返回原始结果码
    pub async fn invoke(
        &self,
        conn: &mut ConnectionManager,
        stream_key: &str,
        voucher_id: i64,
        user_id: i64,
        order_id: i64,
    ) -> Result<i64> {
        let code: i64 = self
            .script
            .key(SeckillKeys::stock(voucher_id))
            .key(SeckillKeys::order_set(voucher_id))
            .key(stream_key)
            .arg(voucher_id)
            .arg(user_id)
            .arg(order_id)
            .invoke_async(conn)
            .await?;
        Ok(code)
    }
}
