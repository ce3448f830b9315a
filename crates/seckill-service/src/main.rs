//! 秒杀订单履约 Worker
//!
//! 消费订单流并把已准入的订单落库。准入接口以库的形式由 HTTP 层调用，
//! 本进程只负责启动时的资源准备和后台履约。

use std::sync::Arc;

use anyhow::Result;
use seckill::{
    admission::RedisAdmissionBackend,
    error::SeckillError,
    lock::{LockConfig, LockManager, RedisLockStore},
    order_log::{OrderLog, RedisStreamLog},
    store::PgOrderStore,
    worker::{OrderWorker, WorkerConfig},
};
use seckill_shared::{
    cache::Cache,
    config::AppConfig,
    database::Database,
    observability,
    retry::{RetryPolicy, retry_with_policy},
};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

const SERVICE_NAME: &str = "seckill-service";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // 1. 加载配置，非法取值（如零租约）直接拒绝启动
    let config = AppConfig::load(SERVICE_NAME)?;

    // 2. 初始化可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting seckill-worker...");
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 数据库连接与迁移
    let db = Database::connect(&config.database).await?;
    db.health_check().await?;
    db.run_migrations().await?;
    info!("Database connection established");

    // 4. Redis 连接
    let cache = Cache::new(&config.redis).await?;
    cache.health_check().await?;
    info!("Redis connection established");

    // 5. 预加载准入脚本，创建消费组
    let admission = RedisAdmissionBackend::new(cache.clone(), &config.seckill.stream_key);
    admission.load_script().await?;

    let order_log = Arc::new(RedisStreamLog::new(
        cache.clone(),
        &config.seckill.stream_key,
    ));
    {
        let order_log = order_log.clone();
        let group = config.seckill.consumer_group.clone();
        retry_with_policy(
            &RetryPolicy::default(),
            "ensure_consumer_group",
            SeckillError::is_retryable,
            move || {
                let order_log = order_log.clone();
                let group = group.clone();
                async move { order_log.ensure_group(&group).await }
            },
        )
        .await?;
    }

    // 6. 组装 Worker
    let store = Arc::new(PgOrderStore::new(db.pool().clone()));
    let locks = Arc::new(LockManager::new(
        Arc::new(RedisLockStore::new(cache.clone())),
        LockConfig::from(&config.seckill),
    ));
    let worker = OrderWorker::new(
        order_log,
        store,
        locks,
        WorkerConfig::from(&config.seckill),
    );

    // 7. 启动并等待关闭信号
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    shutdown_signal().await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        error!(error = %e, "Order worker task failed");
    }

    db.close().await;
    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
