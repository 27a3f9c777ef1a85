//! 黑名单规则
//!
//! 原始规则字符串按以下顺序分类：
//! 1. CIDR (`10.0.0.0/8`) → `NetworkRange`
//! 2. 单个 IP (`169.254.169.254`) → `NetworkRange` (/32 或 /128)
//! 3. 含 `*` `?` `[` 的通配符 → `PatternMatch` (锚定正则)
//! 4. 其它 → `DomainSuffix`

use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use regex::{Regex, RegexBuilder};

use crate::BlacklistError;

/// 规则类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    NetworkRange,
    DomainSuffix,
    PatternMatch,
}

impl RuleKind {
    /// 指标标签
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkRange => "network_range",
            Self::DomainSuffix => "domain_suffix",
            Self::PatternMatch => "pattern",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条已解析的黑名单规则
#[derive(Debug, Clone)]
pub enum BlacklistRule {
    /// IP 网段
    NetworkRange(IpNetwork),
    /// 域名后缀 (小写，无尾部点)
    DomainSuffix(String),
    /// 通配符翻译得到的正则
    PatternMatch { source: String, regex: Regex },
}

impl BlacklistRule {
    /// 解析一条原始规则
    ///
    /// # Errors
    /// 通配符无法编译为正则时返回 `BlacklistError::InvalidPattern`
    pub fn parse(raw: &str) -> Result<Self, BlacklistError> {
        let pattern = raw.trim();

        if pattern.contains('/') {
            if let Ok(network) = pattern.parse::<IpNetwork>() {
                return Ok(Self::NetworkRange(network));
            }
        }

        if let Ok(ip) = pattern.parse::<IpAddr>() {
            let prefix = if ip.is_ipv4() { 32 } else { 128 };
            let network = IpNetwork::new(ip, prefix)
                .map_err(|e| BlacklistError::invalid_pattern(pattern, e.to_string()))?;
            return Ok(Self::NetworkRange(network));
        }

        if is_wildcard(pattern) {
            let regex = RegexBuilder::new(&wildcard_to_regex(pattern))
                .case_insensitive(true)
                .build()
                .map_err(|e| BlacklistError::invalid_pattern(pattern, e.to_string()))?;
            return Ok(Self::PatternMatch {
                source: pattern.to_string(),
                regex,
            });
        }

        Ok(Self::DomainSuffix(normalize_host(pattern)))
    }

    /// 规则类别
    pub fn kind(&self) -> RuleKind {
        match self {
            Self::NetworkRange(_) => RuleKind::NetworkRange,
            Self::DomainSuffix(_) => RuleKind::DomainSuffix,
            Self::PatternMatch { .. } => RuleKind::PatternMatch,
        }
    }

    /// IP 是否落在网段内
    ///
    /// IPv4-mapped IPv6 地址同时按其 IPv4 形式比较。
    pub fn contains_ip(&self, ip: IpAddr) -> bool {
        let Self::NetworkRange(network) = self else {
            return false;
        };
        if network.contains(ip) {
            return true;
        }
        match ip {
            IpAddr::V6(v6) => v6
                .to_ipv4_mapped()
                .is_some_and(|v4| network.contains(IpAddr::V4(v4))),
            IpAddr::V4(_) => false,
        }
    }

    /// 主机名 (或 `host:port`) 是否等于后缀或以 `.后缀` 结尾
    pub fn matches_domain(&self, candidate: &str) -> bool {
        let Self::DomainSuffix(suffix) = self else {
            return false;
        };
        let candidate = normalize_host(candidate);
        candidate == *suffix
            || candidate
                .strip_suffix(suffix.as_str())
                .is_some_and(|head| head.ends_with('.'))
    }

    /// 正则是否匹配
    pub fn matches_pattern(&self, text: &str) -> bool {
        match self {
            Self::PatternMatch { regex, .. } => regex.is_match(text),
            _ => false,
        }
    }
}

impl fmt::Display for BlacklistRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkRange(network) => write!(f, "{network}"),
            Self::DomainSuffix(suffix) => f.write_str(suffix),
            Self::PatternMatch { source, .. } => f.write_str(source),
        }
    }
}

fn is_wildcard(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?') || pattern.contains('[')
}

/// 通配符 → 锚定正则
///
/// `.*` 保持 "任意"，单独的 `.` 转义，`*` → `.*`，`?` → `.`，
/// 其余字符原样保留 (显式字符类可用)。
fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 6);
    out.push_str("^(?:");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '.' => out.push_str("\\."),
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push(other),
        }
    }
    out.push_str(")$");
    out
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}
