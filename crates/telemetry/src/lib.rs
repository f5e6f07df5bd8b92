//! backoffice-telemetry - 日志与指标初始化

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use metrics_exporter_prometheus::PrometheusHandle as MetricsHandle;

/// 以 `_duration_ms` 结尾的直方图使用的桶
const DURATION_BUCKETS_MS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0,
];

/// 初始化 tracing
///
/// `RUST_LOG` 优先于 `log_level`；`json` 为 true 时输出单行 JSON，供日志采集使用。
pub fn init(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
    tracing::debug!(log_level, json, "Tracing initialized");
}

/// 安装全局 Prometheus recorder，返回用于渲染 `/metrics` 的句柄
pub fn init_metrics() -> Result<MetricsHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("_duration_ms".to_string()), DURATION_BUCKETS_MS)?
        .install_recorder()
}
