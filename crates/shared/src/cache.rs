//! Redis 客户端管理模块
//!
//! 提供 Redis 连接管理和常用原子操作封装。秒杀管道中的计数器、分布式锁、
//! 准入脚本与订单流共享同一个 `ConnectionManager`，断线时自动重连。

use crate::config::RedisConfig;
use crate::error::{Result, SharedError};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{info, instrument};

/// Redis 客户端
///
/// 克隆只复制连接句柄，所有克隆共享同一条多路复用连接
#[derive(Clone)]
pub struct Cache {
    client: Client,
    manager: ConnectionManager,
}

impl Cache {
    /// 创建 Redis 客户端并建立共享连接
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        let manager = ConnectionManager::new(client.clone()).await?;
        info!("Redis connection manager created");
        Ok(Self { client, manager })
    }

    /// 获取共享连接
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// 建立一条独立连接
    ///
    /// 阻塞命令（XREADGROUP BLOCK）会占住所在连接，不能与其他命令共享
    pub async fn dedicated_connection(&self) -> Result<ConnectionManager> {
        ConnectionManager::new(self.client.clone())
            .await
            .map_err(SharedError::from)
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(SharedError::from)
    }

    /// 增量操作
    ///
    /// key 不存在时从 0 开始计数，返回自增后的值
    #[instrument(skip(self))]
    pub async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.connection();
        let result: i64 = conn.incr(key, delta).await?;
        Ok(result)
    }
}
