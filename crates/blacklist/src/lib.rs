//! # Blacklist
//!
//! SSRF 防护：在任何出站网络动作之前判定 URL 是否允许访问。
//!
//! 负责：
//! - 合并默认规则、自定义规则、规则文件
//! - 按 CIDR / IP / 通配符 / 域名后缀分类
//! - 对 URL 求值并给出命中原因
//!
//! 构建后只读，可在多个 worker 间通过 `Arc` 共享。
//!
//! # Example
//!
//! ```no_run
//! use blacklist::Blacklist;
//! use contracts::BlacklistConfig;
//!
//! # async fn demo() -> Result<(), blacklist::BlacklistError> {
//! let blacklist = Blacklist::from_config(&BlacklistConfig::default())?;
//! let verdict = blacklist.evaluate("http://169.254.169.254/latest/meta-data/").await;
//! assert!(verdict.is_blocked());
//! # Ok(())
//! # }
//! ```

mod defaults;
mod error;
mod resolver;
mod rule;

pub use defaults::DEFAULT_RULES;
pub use error::BlacklistError;
pub use resolver::HostResolver;
pub use rule::{BlacklistRule, RuleKind};

use std::fmt;
use std::net::IpAddr;
use std::path::Path;

use contracts::{BlacklistConfig, DnsFailurePolicy};
use tracing::{debug, info, warn};
use url::{Host, Url};

/// 求值结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Blocked(BlockReason),
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }

    /// 命中原因 (允许时为 None)
    pub fn reason(&self) -> Option<&BlockReason> {
        match self {
            Self::Allowed => None,
            Self::Blocked(reason) => Some(reason),
        }
    }
}

/// 拦截原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// URL 无法解析
    InvalidUrl(String),
    /// URL 没有主机部分
    MissingHost,
    /// 主机名无法解析 (DnsFailurePolicy::Block)
    Unresolvable { host: String },
    /// 命中某条规则
    Rule {
        kind: RuleKind,
        rule: String,
        matched: String,
    },
}

impl BlockReason {
    /// 指标标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid_url",
            Self::MissingHost => "missing_host",
            Self::Unresolvable { .. } => "unresolvable",
            Self::Rule { kind, .. } => kind.as_str(),
        }
    }

    fn rule(rule: &BlacklistRule, matched: impl Into<String>) -> Self {
        Self::Rule {
            kind: rule.kind(),
            rule: rule.to_string(),
            matched: matched.into(),
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl(message) => write!(f, "invalid URL: {message}"),
            Self::MissingHost => f.write_str("URL has no host"),
            Self::Unresolvable { host } => write!(f, "unresolvable host: {host}"),
            Self::Rule {
                kind,
                rule,
                matched,
            } => write!(f, "{matched} matched {kind} rule '{rule}'"),
        }
    }
}

/// URL 黑名单
#[derive(Debug, Clone)]
pub struct Blacklist {
    enabled: bool,
    rules: Vec<BlacklistRule>,
    dns_failure: DnsFailurePolicy,
    resolver: HostResolver,
}

impl Blacklist {
    /// 从配置构建，使用系统 DNS
    ///
    /// # Errors
    /// - 规则无法编译
    /// - 规则文件无法读取
    pub fn from_config(config: &BlacklistConfig) -> Result<Self, BlacklistError> {
        Self::with_resolver(config, HostResolver::System)
    }

    /// 从配置构建，指定解析器
    pub fn with_resolver(
        config: &BlacklistConfig,
        resolver: HostResolver,
    ) -> Result<Self, BlacklistError> {
        if !config.enabled {
            info!("URL blacklist disabled");
            return Ok(Self {
                enabled: false,
                rules: Vec::new(),
                dns_failure: config.dns_failure,
                resolver,
            });
        }

        let mut raw: Vec<String> = Vec::new();
        if config.use_defaults {
            raw.extend(DEFAULT_RULES.iter().map(|s| s.to_string()));
        }
        raw.extend(
            config
                .patterns
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(String::from),
        );
        if let Some(path) = &config.file {
            raw.extend(load_rule_file(path)?);
        }

        let rules = raw
            .iter()
            .map(|p| BlacklistRule::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        if config.dns_failure == DnsFailurePolicy::Allow {
            warn!("unresolvable hosts will be allowed through the blacklist");
        }
        info!(rules = rules.len(), "URL blacklist built");

        Ok(Self {
            enabled: true,
            rules,
            dns_failure: config.dns_failure,
            resolver,
        })
    }

    /// 是否启用
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 规则数量
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 只读规则视图
    pub fn rules(&self) -> &[BlacklistRule] {
        &self.rules
    }

    /// 对 URL 求值
    ///
    /// 检查顺序：
    /// 1. 正则 vs 完整 URL
    /// 2. 域名后缀 vs host / host:port
    /// 3. 网段 vs IP (字面量或解析结果)
    /// 4. 正则 vs host:port / host
    pub async fn evaluate(&self, url: &str) -> Verdict {
        if !self.enabled {
            return Verdict::Allowed;
        }

        let verdict = self.evaluate_enabled(url).await;
        if let Verdict::Blocked(reason) = &verdict {
            debug!(url, reason = %reason, "URL blocked");
            observability::metrics::record_blacklist_blocked(reason.label());
        }
        verdict
    }

    async fn evaluate_enabled(&self, raw: &str) -> Verdict {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(e) => return Verdict::Blocked(BlockReason::InvalidUrl(e.to_string())),
        };

        // 1
        if let Some(reason) = self.match_patterns(&[url.as_str(), raw]) {
            return Verdict::Blocked(reason);
        }

        let Some(host) = url.host() else {
            return Verdict::Blocked(BlockReason::MissingHost);
        };
        let host_str = match &host {
            Host::Domain(d) => d.to_string(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };
        // 显式默认端口 (`:80` / `:443`) 会被 `Url::port` 丢弃
        let host_port = url
            .port_or_known_default()
            .map(|port| format!("{host_str}:{port}"));

        // 2
        for rule in self.of_kind(RuleKind::DomainSuffix) {
            if rule.matches_domain(&host_str) {
                return Verdict::Blocked(BlockReason::rule(rule, &host_str));
            }
            if let Some(hp) = &host_port {
                if rule.matches_domain(hp) {
                    return Verdict::Blocked(BlockReason::rule(rule, hp));
                }
            }
        }

        // 3
        let addrs = match host {
            Host::Ipv4(ip) => vec![IpAddr::V4(ip)],
            Host::Ipv6(ip) => vec![IpAddr::V6(ip)],
            Host::Domain(name) => match self.resolver.resolve(name).await {
                Ok(addrs) => addrs,
                Err(e) => match self.dns_failure {
                    DnsFailurePolicy::Block => {
                        return Verdict::Blocked(BlockReason::Unresolvable {
                            host: name.to_string(),
                        });
                    }
                    DnsFailurePolicy::Allow => {
                        warn!(host = name, error = %e, "host did not resolve, allowing");
                        Vec::new()
                    }
                },
            },
        };
        for ip in addrs {
            if let Some(rule) = self
                .of_kind(RuleKind::NetworkRange)
                .find(|rule| rule.contains_ip(ip))
            {
                return Verdict::Blocked(BlockReason::rule(rule, ip.to_string()));
            }
        }

        // 4
        let mut candidates: Vec<&str> = Vec::with_capacity(2);
        if let Some(hp) = &host_port {
            candidates.push(hp);
        }
        candidates.push(&host_str);
        if let Some(reason) = self.match_patterns(&candidates) {
            return Verdict::Blocked(reason);
        }

        Verdict::Allowed
    }

    fn of_kind(&self, kind: RuleKind) -> impl Iterator<Item = &BlacklistRule> {
        self.rules.iter().filter(move |rule| rule.kind() == kind)
    }

    fn match_patterns(&self, candidates: &[&str]) -> Option<BlockReason> {
        self.of_kind(RuleKind::PatternMatch).find_map(|rule| {
            candidates
                .iter()
                .find(|c| rule.matches_pattern(c))
                .map(|c| BlockReason::rule(rule, *c))
        })
    }
}

/// 读取规则文件：每行一条，忽略空行与 `#` 注释
fn load_rule_file(path: &Path) -> Result<Vec<String>, BlacklistError> {
    let content = std::fs::read_to_string(path).map_err(|source| BlacklistError::File {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}
