//! Built-in rules loaded when `use_defaults` is set

/// Default SSRF rules
pub const DEFAULT_RULES: &[&str] = &[
    // Loopback
    "localhost",
    "127.0.0.0/8",
    "::1/128",
    "0.0.0.0/8",
    // RFC1918
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    // Link-local
    "169.254.0.0/16",
    "fe80::/10",
    // Cloud metadata
    "169.254.169.254",
    "metadata.google.internal",
    "metadata.internal",
    "metadata.service",
    // Unique local
    "fc00::/7",
    // Internal services
    "consul.service.consul",
    "vault.service.consul",
    // Database and cache ports
    ".*:1433",
    ".*:3306",
    ".*:5432",
    ".*:6379",
    ".*:27017",
    ".*:9200",
    ".*:11211",
    // Non-HTTP schemes
    "file://.*",
    "ftp://.*",
];
