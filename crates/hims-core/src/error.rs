//! 错误定义模块

use thiserror::Error;
use uuid::Uuid;

/// HIMS系统统一错误类型
#[derive(Error, Debug)]
pub enum HimsError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 登记处/台账内部的条件更新失败，必须在分配服务边界翻译为具体错误
    #[error("状态冲突: {0}")]
    Conflict(String),

    #[error("床位 {bed_id} 不可用: {reason}")]
    BedUnavailable { bed_id: Uuid, reason: String },

    #[error("患者 {patient_id} 已有在院记录 {admission_id}")]
    AlreadyAdmitted {
        patient_id: Uuid,
        admission_id: Uuid,
    },

    #[error("住院记录 {admission_id} 已出院")]
    AlreadyDischarged { admission_id: Uuid },

    #[error("住院记录 {admission_id} 已关闭，不接受写入")]
    AdmissionClosed { admission_id: Uuid },

    /// 锁等待超时，调用方可退避后重试
    #[error("资源繁忙: {0}")]
    ResourceBusy(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("系统内部错误: {0}")]
    Internal(String),

    /// 补偿回滚失败，床位与住院记录可能不一致，需要人工对账
    #[error("内部状态不一致: {0}")]
    InternalInconsistency(String),

    #[error("网络错误: {0}")]
    Network(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// HIMS系统统一结果类型
pub type Result<T> = std::result::Result<T, HimsError>;
