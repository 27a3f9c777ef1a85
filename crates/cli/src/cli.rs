//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use contracts::{BlacklistConfig, DnsFailurePolicy};
use observability::LogFormat;

/// snir - SSRF-safe web target scanner
#[derive(Parser, Debug)]
#[command(
    name = "snir",
    author,
    version,
    about = "SSRF-safe web target scanner",
    long_about = "Probes web targets through a bounded worker pool.\n\n\
                  Every target is checked against a URL blacklist before any \n\
                  network access; results are fanned out to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SNIR_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (json, pretty, compact)
    #[arg(long, default_value = "compact", global = true, env = "SNIR_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Expose Prometheus metrics on this port
    #[arg(long, global = true, env = "SNIR_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log level derived from -v / -q
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan targets and write results to the configured sinks
    Scan(ScanArgs),

    /// Validate configuration file without scanning
    Validate(ValidateArgs),

    /// Run the HTTP API
    Serve(ServeArgs),
}

/// Blacklist flags shared by `scan` and `serve`
#[derive(Args, Debug, Clone, Default)]
pub struct BlacklistArgs {
    /// Disable the URL blacklist entirely
    #[arg(long)]
    pub no_blacklist: bool,

    /// Do not load the built-in blacklist rules
    #[arg(long)]
    pub no_default_blacklist: bool,

    /// Extra blacklist rule (CIDR, IP, wildcard, regex or domain); repeatable
    #[arg(long = "blacklist-pattern", value_name = "RULE")]
    pub patterns: Vec<String>,

    /// File with one blacklist rule per line
    #[arg(long, value_name = "PATH", env = "SNIR_BLACKLIST_FILE")]
    pub blacklist_file: Option<PathBuf>,

    /// Let hosts that fail DNS resolution through
    #[arg(long)]
    pub allow_unresolvable: bool,
}

impl BlacklistArgs {
    /// Apply flags on top of the file configuration
    pub fn apply(&self, config: &mut BlacklistConfig) {
        if self.no_blacklist {
            config.enabled = false;
        }
        if self.no_default_blacklist {
            config.use_defaults = false;
        }
        config.patterns.extend(self.patterns.iter().cloned());
        if let Some(path) = &self.blacklist_file {
            config.file = Some(path.clone());
        }
        if self.allow_unresolvable {
            config.dns_failure = DnsFailurePolicy::Allow;
        }
    }
}

/// Arguments for the `scan` command
#[derive(Parser, Debug, Clone)]
pub struct ScanArgs {
    /// Optional configuration file (TOML or JSON)
    #[arg(short, long, env = "SNIR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Target URL or host; repeatable
    #[arg(short, long = "target", value_name = "URL")]
    pub targets: Vec<String>,

    /// File with one target per line
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// IPv4 network to expand into host targets; repeatable
    #[arg(long, value_name = "CIDR")]
    pub cidr: Vec<String>,

    /// Ports probed for every CIDR host
    #[arg(long, value_delimiter = ',', default_value = "80,443")]
    pub ports: Vec<u16>,

    /// Number of concurrent workers
    #[arg(long, env = "SNIR_THREADS")]
    pub threads: Option<usize>,

    /// Use http:// for targets without a scheme
    #[arg(long)]
    pub http: bool,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Custom User-Agent header
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Save response bodies into this directory
    #[arg(long, value_name = "DIR")]
    pub body_dir: Option<PathBuf>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Append results as JSON lines to this file
    #[arg(long, value_name = "PATH")]
    pub jsonl: Option<PathBuf>,

    /// Append results as CSV rows to this file
    #[arg(long, value_name = "PATH")]
    pub csv: Option<PathBuf>,

    /// Log every result to the console
    #[arg(long)]
    pub stdout: bool,

    #[command(flatten)]
    pub blacklist: BlacklistArgs,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "snir.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `serve` command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Optional configuration file (TOML or JSON)
    #[arg(short, long, env = "SNIR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address
    #[arg(long, env = "SNIR_HOST")]
    pub host: Option<String>,

    /// Listen port
    #[arg(long, env = "SNIR_PORT")]
    pub port: Option<u16>,

    /// Require this key in `X-API-Key` or `?api_key=`
    #[arg(long, env = "SNIR_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Maximum requests processed at once
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Maximum requests waiting for a slot
    #[arg(long)]
    pub queue_size: Option<usize>,

    /// How long a request may wait for a slot, in milliseconds
    #[arg(long)]
    pub acquire_timeout_ms: Option<u64>,

    /// Workers per scan request
    #[arg(long)]
    pub threads: Option<usize>,

    /// Save response bodies here and serve them under `/captures`
    #[arg(long, value_name = "DIR")]
    pub body_dir: Option<PathBuf>,

    #[command(flatten)]
    pub blacklist: BlacklistArgs,
}
