//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册秒杀管道指标描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "seckill_admissions_total",
        "Total number of seckill admission attempts by status"
    );
    metrics::describe_counter!(
        "seckill_fulfillments_total",
        "Total number of processed order log entries by outcome"
    );
    metrics::describe_histogram!(
        "seckill_fulfillment_duration_seconds",
        "Order fulfillment duration in seconds"
    );
    metrics::describe_counter!(
        "seckill_worker_errors_total",
        "Total number of order worker failures by kind"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 秒杀管道指标记录
// ============================================================================

/// 记录一次准入结果
#[inline]
pub fn record_admission(status: &str) {
    metrics::counter!("seckill_admissions_total", "status" => status.to_string()).increment(1);
}

/// 记录一次订单流消息的最终处理结果
#[inline]
pub fn record_fulfillment(outcome: &str, duration_secs: f64) {
    metrics::counter!("seckill_fulfillments_total", "outcome" => outcome.to_string())
        .increment(1);
    metrics::histogram!("seckill_fulfillment_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

/// 记录 Worker 处理失败（消息保留在 pending list 中等待重试）
#[inline]
pub fn record_worker_error(kind: &str) {
    metrics::counter!("seckill_worker_errors_total", "kind" => kind.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_recorder_is_noop() {
        // 未安装 recorder 时记录指标不应 panic
        record_admission("ok");
        record_fulfillment("created", 0.01);
        record_worker_error("lock_conflict");
    }
}
