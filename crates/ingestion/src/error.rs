//! Ingestion 错误类型

use contracts::ContractError;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 启动失败 (总线连接 / 存储就绪检查 / 订阅)
    #[error("startup failed during {step}: {source}")]
    Startup {
        /// 启动步骤
        step: &'static str,
        #[source]
        source: ContractError,
    },

    /// 流水线已启动过
    #[error("pipeline already started (state: {state})")]
    AlreadyStarted {
        /// 当前状态
        state: crate::PipelineState,
    },

    /// 阶段任务异常退出
    #[error("{stage} stage terminated abnormally: {message}")]
    StageFailed {
        /// 阶段名称
        stage: &'static str,
        /// 错误消息
        message: String,
    },
}

impl IngestionError {
    pub(crate) fn startup(step: &'static str, source: ContractError) -> Self {
        Self::Startup { step, source }
    }

    pub(crate) fn stage_failed(stage: &'static str, message: impl Into<String>) -> Self {
        Self::StageFailed {
            stage,
            message: message.into(),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
