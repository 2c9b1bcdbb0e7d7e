// ==========================================
// 发运导入与对账引擎 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 记录级错误（可局部恢复） / 基础设施错误（中断整个导入）
// ==========================================

use rusqlite::ErrorCode;
use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 数据库错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("数据库结构不完整: {0}")]
    SchemaError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    #[error("约束违反: {0}")]
    ConstraintViolation(String),

    // ===== 数据格式错误 =====
    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepositoryError {
    /// 是否为记录级错误
    ///
    /// 记录级错误只影响当前这一条 PO/箱单行，导入继续；
    /// 只有约束违反与字段值错误（含类型转换）属于记录级，
    /// 其余错误（库不可达、缺表等）中断整个导入。
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            RepositoryError::UniqueConstraintViolation(_)
                | RepositoryError::ForeignKeyViolation(_)
                | RepositoryError::ConstraintViolation(_)
                | RepositoryError::FieldValueError { .. }
        )
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ffi_err, msg) => {
                let msg = msg.unwrap_or_else(|| ffi_err.to_string());
                match ffi_err.code {
                    ErrorCode::ConstraintViolation => {
                        if msg.contains("UNIQUE") {
                            RepositoryError::UniqueConstraintViolation(msg)
                        } else if msg.contains("FOREIGN KEY") {
                            RepositoryError::ForeignKeyViolation(msg)
                        } else {
                            RepositoryError::ConstraintViolation(msg)
                        }
                    }
                    ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::DiskFull
                    | ErrorCode::ReadOnly
                    | ErrorCode::OutOfMemory
                    | ErrorCode::PermissionDenied => RepositoryError::DatabaseConnectionError(msg),
                    ErrorCode::TypeMismatch => RepositoryError::FieldValueError {
                        field: "Unknown".to_string(),
                        message: msg,
                    },
                    _ if msg.contains("no such table") || msg.contains("no such column") => {
                        RepositoryError::SchemaError(msg)
                    }
                    _ => RepositoryError::DatabaseQueryError(msg),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            rusqlite::Error::FromSqlConversionFailure(idx, _, _)
            | rusqlite::Error::InvalidColumnType(idx, _, _)
            | rusqlite::Error::IntegralValueOutOfRange(idx, _) => RepositoryError::FieldValueError {
                field: format!("column {}", idx),
                message: err.to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;
