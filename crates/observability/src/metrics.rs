//! 扫描指标收集模块
//!
//! Prometheus 指标 (`snir_*`) 记录函数，以及运行结束时打印的内存聚合摘要。

use std::collections::BTreeMap;

use contracts::ScanResult;
use metrics::{counter, gauge, histogram};
use serde::Serialize;

/// 记录目标处理结果
///
/// `outcome`: rendered / render_failed / blocked / skipped
pub fn record_target(outcome: &'static str) {
    counter!("snir_targets_total", "outcome" => outcome).increment(1);
}

/// 记录黑名单拦截
pub fn record_blacklist_blocked(rule_kind: &'static str) {
    counter!("snir_blacklist_blocked_total", "rule_kind" => rule_kind).increment(1);
}

/// 记录 sink 写入
pub fn record_sink_write(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "snir_sink_writes_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录准入决策
pub fn record_admission(outcome: &'static str) {
    counter!("snir_admission_total", "outcome" => outcome).increment(1);
}

/// 记录准入控制当前计数
pub fn record_admission_gauges(active: usize, waiting: usize) {
    gauge!("snir_admission_active").set(active as f64);
    gauge!("snir_admission_waiting").set(waiting as f64);
}

/// 记录单次渲染耗时
pub fn record_render_duration_ms(duration_ms: f64) {
    histogram!("snir_render_duration_ms").record(duration_ms);
}

/// 扫描结果聚合器
///
/// 在内存中聚合结果，便于运行结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct ScanMetricsAggregator {
    /// 结果总数
    pub total_results: u64,

    /// 失败结果数 (含黑名单)
    pub failed: u64,

    /// 被黑名单拦截数
    pub blacklisted: u64,

    /// 各状态码计数
    pub status_codes: BTreeMap<u16, u64>,

    /// 响应体大小统计
    pub content_length: RunningStats,
}

impl ScanMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, result: &ScanResult) {
        self.total_results += 1;

        if result.failed {
            self.failed += 1;
            if result.failed_reason.starts_with("blacklisted") {
                self.blacklisted += 1;
            }
            return;
        }

        *self.status_codes.entry(result.response_code).or_insert(0) += 1;
        self.content_length.push(result.content_length as f64);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            total_results: self.total_results,
            succeeded: self.total_results - self.failed,
            failed: self.failed,
            blacklisted: self.blacklisted,
            failure_rate: if self.total_results > 0 {
                self.failed as f64 / self.total_results as f64 * 100.0
            } else {
                0.0
            },
            status_codes: self.status_codes.clone(),
            content_length: StatsSummary::from(&self.content_length),
        }
    }
}

/// 扫描摘要
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub total_results: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub blacklisted: u64,
    pub failure_rate: f64,
    pub status_codes: BTreeMap<u16, u64>,
    pub content_length: StatsSummary,
}

impl std::fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Scan Summary ===")?;
        writeln!(f, "Total results: {}", self.total_results)?;
        writeln!(f, "Succeeded: {}", self.succeeded)?;
        writeln!(
            f,
            "Failed: {} ({:.2}%), blacklisted: {}",
            self.failed, self.failure_rate, self.blacklisted
        )?;
        writeln!(f, "Content length (bytes): {}", self.content_length)?;

        if !self.status_codes.is_empty() {
            writeln!(f, "Status codes:")?;
            for (code, count) in &self.status_codes {
                writeln!(f, "  {}: {}", code, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.0}, max={:.0}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
