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

/// 注册指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!("gacha_pulls_total", "Total number of pull requests");
    metrics::describe_histogram!(
        "gacha_pull_duration_seconds",
        "Pull request duration in seconds"
    );
    metrics::describe_counter!(
        "gacha_top_tier_drops_total",
        "Total number of top-tier results"
    );
    metrics::describe_counter!(
        "gacha_commit_conflicts_total",
        "Total number of optimistic commit conflicts"
    );

    metrics::describe_counter!(
        "enhancements_total",
        "Total number of enhancement attempts"
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
// 便捷的指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录一次抽卡请求
///
/// `status` 为 success、replayed 或失败时的错误码。
#[inline]
pub fn record_pull(banner_id: &str, batch_size: u32, status: &str, duration_secs: f64) {
    metrics::counter!(
        "gacha_pulls_total",
        "banner_id" => banner_id.to_string(),
        "batch_size" => batch_size.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "gacha_pull_duration_seconds",
        "banner_id" => banner_id.to_string(),
        "status" => status.to_string()
    )
    .record(duration_secs);
}

/// 记录最高稀有度出货
#[inline]
pub fn record_top_tier_drop(banner_id: &str, featured: bool, guaranteed: bool) {
    metrics::counter!(
        "gacha_top_tier_drops_total",
        "banner_id" => banner_id.to_string(),
        "featured" => featured.to_string(),
        "guaranteed" => guaranteed.to_string()
    )
    .increment(1);
}

/// 记录乐观提交冲突
#[inline]
pub fn record_commit_conflict(operation: &str) {
    metrics::counter!(
        "gacha_commit_conflicts_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// 记录强化结果，`outcome` 为 success、failure 或提交失败时的错误码
#[inline]
pub fn record_enhancement(outcome: &str) {
    metrics::counter!(
        "enhancements_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
