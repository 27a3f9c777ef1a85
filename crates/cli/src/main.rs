//! # snir CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - `scan`: 批量扫描 (目标 / 文件 / CIDR)
//! - `validate`: 配置验证
//! - `serve`: HTTP API (准入控制 + 黑名单预检)

mod cli;
mod commands;
mod error;
mod server;
mod targets;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_scan, run_serve, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format,
        metrics_port: cli.metrics_port,
        default_log_level: cli.log_level().to_string(),
    })?;

    info!(version = env!("CARGO_PKG_VERSION"), "snir starting");

    let result = match &cli.command {
        Commands::Scan(args) => run_scan(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Serve(args) => run_serve(args).await,
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
