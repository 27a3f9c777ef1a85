//! ScanBlueprint - Config Loader 输出
//!
//! 描述一次扫描会话的完整配置：工作池、黑名单、渲染器、输出路由、服务端准入控制。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::Scheme;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的扫描配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 工作池配置
    #[serde(default)]
    pub scan: DispatcherConfig,

    /// URL 黑名单 (SSRF 防护)
    #[serde(default)]
    pub blacklist: BlacklistConfig,

    /// HTTP 探测渲染器配置
    #[serde(default)]
    pub probe: ProbeConfig,

    /// 输出路由配置
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,

    /// API 服务配置
    #[serde(default)]
    pub server: ServerConfig,
}

/// 工作池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// 并发 worker 数量，必须 >= 1
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// 输入队列容量 (背压)
    #[serde(default = "default_queue_capacity")]
    pub input_queue_capacity: usize,

    /// 结果队列容量
    #[serde(default = "default_queue_capacity")]
    pub result_queue_capacity: usize,

    /// 目标缺少协议时使用的默认协议
    #[serde(default)]
    pub default_scheme: Scheme,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            input_queue_capacity: default_queue_capacity(),
            result_queue_capacity: default_queue_capacity(),
            default_scheme: Scheme::default(),
        }
    }
}

fn default_concurrency() -> usize {
    6
}

fn default_queue_capacity() -> usize {
    1000
}

/// URL 黑名单配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistConfig {
    /// 是否启用黑名单
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 是否加载内置默认规则
    #[serde(default = "default_true")]
    pub use_defaults: bool,

    /// 自定义规则 (CIDR / IP / 通配符 / 正则 / 域名)
    #[serde(default)]
    pub patterns: Vec<String>,

    /// 规则文件路径 (每行一条，# 开头为注释)
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// 主机名解析失败时的处理策略
    #[serde(default)]
    pub dns_failure: DnsFailurePolicy,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_defaults: true,
            patterns: Vec::new(),
            file: None,
            dns_failure: DnsFailurePolicy::default(),
        }
    }
}

impl BlacklistConfig {
    /// 关闭黑名单
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// 仅使用给定规则 (不加载默认规则)
    pub fn with_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            use_defaults: false,
            patterns: patterns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// 主机名无法解析时的策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnsFailurePolicy {
    /// 视为命中黑名单 (fail closed)
    #[default]
    Block,
    /// 放行
    Allow,
}

/// HTTP 探测渲染器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// 单个目标超时 (秒)
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,

    /// 自定义 User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// 保存页面内容的目录 (None = 不保存)
    #[serde(default)]
    pub body_dir: Option<PathBuf>,

    /// 忽略证书错误
    #[serde(default)]
    pub ignore_cert_errors: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout(),
            user_agent: default_user_agent(),
            body_dir: None,
            ignore_cert_errors: false,
        }
    }
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("snir/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量
    #[serde(default = "default_sink_queue_capacity")]
    pub queue_capacity: usize,

    /// 类型特定参数 (如 `path`)
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl SinkConfig {
    /// 创建 sink 配置
    pub fn new(name: impl Into<String>, sink_type: SinkType) -> Self {
        Self {
            name: name.into(),
            sink_type,
            queue_capacity: default_sink_queue_capacity(),
            params: HashMap::new(),
        }
    }

    /// 设置参数
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

fn default_sink_queue_capacity() -> usize {
    100
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// JSON Lines 文件
    Jsonl,
    /// CSV 文件
    Csv,
    /// 控制台 (tracing)
    Console,
    /// 内存收集
    Memory,
}

impl SinkType {
    /// 是否需要 `path` 参数
    pub fn requires_path(&self) -> bool {
        matches!(self, Self::Jsonl | Self::Csv)
    }
}

/// API 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// API 密钥 (None = 不鉴权)
    #[serde(default)]
    pub api_key: Option<String>,

    /// 准入控制
    #[serde(default)]
    pub admission: AdmissionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
            admission: AdmissionConfig::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// 准入控制配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// 同时处理的最大请求数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// 等待队列上限
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,

    /// 排队等待超时 (毫秒)
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_queue: default_max_queue(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

fn default_max_concurrent() -> usize {
    10
}

fn default_max_queue() -> usize {
    100
}

fn default_acquire_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let bp: ScanBlueprint = toml::from_str("").unwrap();
        assert_eq!(bp.scan.concurrency, 6);
        assert_eq!(bp.scan.input_queue_capacity, 1000);
        assert!(bp.blacklist.enabled);
        assert!(bp.blacklist.use_defaults);
        assert_eq!(bp.blacklist.dns_failure, DnsFailurePolicy::Block);
        assert_eq!(bp.server.admission.max_concurrent, 10);
        assert_eq!(bp.server.admission.max_queue, 100);
        assert!(bp.sinks.is_empty());
    }

    #[test]
    fn test_sink_config_parsing() {
        let content = r#"
[[sinks]]
name = "results"
sink_type = "jsonl"
[sinks.params]
path = "out/results.jsonl"
"#;
        let bp: ScanBlueprint = toml::from_str(content).unwrap();
        assert_eq!(bp.sinks.len(), 1);
        assert_eq!(bp.sinks[0].sink_type, SinkType::Jsonl);
        assert_eq!(bp.sinks[0].queue_capacity, 100);
        assert_eq!(
            bp.sinks[0].params.get("path").map(String::as_str),
            Some("out/results.jsonl")
        );
    }

    #[test]
    fn test_blacklist_with_patterns() {
        let config = BlacklistConfig::with_patterns(["10.0.0.0/8", "evil.com"]);
        assert!(config.enabled);
        assert!(!config.use_defaults);
        assert_eq!(config.patterns.len(), 2);
        assert!(!BlacklistConfig::disabled().enabled);
    }
}
