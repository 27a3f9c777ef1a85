//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)
//! - Prometheus 指标导出 (可选)
//! - 扫描指标记录与结果摘要
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{init_with_config, metrics, ObservabilityConfig};
//!
//! init_with_config(ObservabilityConfig::default())?;
//! metrics::record_target("rendered");
//! ```

pub mod metrics;

use std::str::FromStr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-exports
pub use crate::metrics::{RunningStats, ScanMetricsAggregator, ScanSummary, StatsSummary};

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
    /// 默认日志级别 (RUST_LOG 优先)
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Compact,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// 使用自定义配置初始化
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    // 1. Initialize Tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    // Logs go to stderr; stdout is reserved for results
    match config.log_format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer().pretty().with_writer(std::io::stderr);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer().compact().with_writer(std::io::stderr);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
    }

    // 2. Initialize Prometheus Exporter (if enabled)
    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
