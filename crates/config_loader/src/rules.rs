//! 配置校验模块
//!
//! 校验规则：
//! - 字段规则由 `validator` derive 声明（长度、范围）
//! - file sink 必须配置 path
//! - broker URL scheme 只能是 tcp 或 mqtt

use contracts::{ContractError, ServiceConfig, SinkType};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 校验 ServiceConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &ServiceConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_broker_scheme(config)?;
    validate_storage(config)?;
    Ok(())
}

/// 执行 derive 声明的字段规则
fn validate_fields(config: &ServiceConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let (field, message) = first_violation(&errors, "")
            .unwrap_or_else(|| ("<config>".to_string(), errors.to_string()));
        ContractError::config_validation(field, message)
    })
}

/// 找到第一个违规字段（按字段名排序，结果稳定）
fn first_violation(errors: &ValidationErrors, prefix: &str) -> Option<(String, String)> {
    let mut entries: Vec<_> = errors.errors().iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in entries {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        let found = match kind {
            ValidationErrorsKind::Field(list) => list.first().map(|e| (path, e.to_string())),
            ValidationErrorsKind::Struct(inner) => first_violation(inner, &path),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(i, inner)| first_violation(inner, &format!("{path}[{i}]"))),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

/// 校验 broker URL scheme
fn validate_broker_scheme(config: &ServiceConfig) -> Result<(), ContractError> {
    let broker = &config.bus.broker;
    if let Some((scheme, _)) = broker.split_once("://") {
        if scheme != "tcp" && scheme != "mqtt" {
            return Err(ContractError::config_validation(
                "bus.broker",
                format!("unsupported scheme '{scheme}', expected tcp:// or mqtt://"),
            ));
        }
    }
    Ok(())
}

/// 校验存储配置
fn validate_storage(config: &ServiceConfig) -> Result<(), ContractError> {
    let storage = &config.storage;
    if storage.sink_type == SinkType::File {
        match &storage.path {
            None => {
                return Err(ContractError::config_validation(
                    "storage.path",
                    "file sink requires 'path'",
                ));
            }
            Some(path) if path.as_os_str().is_empty() => {
                return Err(ContractError::config_validation(
                    "storage.path",
                    "path cannot be empty",
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}
