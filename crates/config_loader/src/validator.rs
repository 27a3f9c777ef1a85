//! 配置校验模块
//!
//! 校验规则：
//! - concurrency >= 1
//! - 队列容量 >= 1
//! - sink 名称唯一且非空
//! - 文件类 sink 必须提供 path
//! - 准入控制 max_concurrent / max_queue >= 1
//! - 黑名单规则非空白
//!
//! 黑名单正则的编译错误在构建 `Blacklist` 时报告。

use std::collections::HashSet;

use contracts::{ContractError, ScanBlueprint};

/// 校验 ScanBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &ScanBlueprint) -> Result<(), ContractError> {
    validate_scan(blueprint)?;
    validate_blacklist(blueprint)?;
    validate_probe(blueprint)?;
    validate_sinks(blueprint)?;
    validate_server(blueprint)?;
    Ok(())
}

/// 校验工作池配置
fn validate_scan(blueprint: &ScanBlueprint) -> Result<(), ContractError> {
    let scan = &blueprint.scan;

    if scan.concurrency == 0 {
        return Err(ContractError::config_validation(
            "scan.concurrency",
            "concurrency must be >= 1",
        ));
    }
    if scan.input_queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "scan.input_queue_capacity",
            "queue capacity must be >= 1",
        ));
    }
    if scan.result_queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "scan.result_queue_capacity",
            "queue capacity must be >= 1",
        ));
    }
    Ok(())
}

/// 校验黑名单规则
fn validate_blacklist(blueprint: &ScanBlueprint) -> Result<(), ContractError> {
    for (idx, pattern) in blueprint.blacklist.patterns.iter().enumerate() {
        if pattern.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("blacklist.patterns[{}]", idx),
                "pattern cannot be empty",
            ));
        }
    }
    Ok(())
}

/// 校验渲染器配置
fn validate_probe(blueprint: &ScanBlueprint) -> Result<(), ContractError> {
    if blueprint.probe.timeout_secs == 0 {
        return Err(ContractError::config_validation(
            "probe.timeout_secs",
            "timeout_secs must be > 0",
        ));
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &ScanBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue capacity must be >= 1",
            ));
        }
        if sink.sink_type.requires_path() && !sink.params.contains_key("path") {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.path", sink.name),
                format!("{:?} sink requires a 'path' parameter", sink.sink_type),
            ));
        }
    }
    Ok(())
}

/// 校验准入控制配置
fn validate_server(blueprint: &ScanBlueprint) -> Result<(), ContractError> {
    let admission = &blueprint.server.admission;

    if admission.max_concurrent == 0 {
        return Err(ContractError::config_validation(
            "server.admission.max_concurrent",
            "max_concurrent must be >= 1",
        ));
    }
    if admission.max_queue == 0 {
        return Err(ContractError::config_validation(
            "server.admission.max_queue",
            "max_queue must be >= 1",
        ));
    }
    if matches!(&blueprint.server.api_key, Some(key) if key.is_empty()) {
        return Err(ContractError::config_validation(
            "server.api_key",
            "api_key cannot be empty when set",
        ));
    }
    Ok(())
}
