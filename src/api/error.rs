// ==========================================
// 发运导入与对账引擎 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，把导入/仓储错误转换为带结构化明细的错误
// 中断类错误（缺表、无有效记录、不一致、不平）保留完整明细
// ==========================================

use crate::domain::import::{ConsistencyError, ReconciliationReport, RowError};
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use serde_json::{json, Value};
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 导入中断错误（不落库）
    // ==========================================
    #[error("缺少工作表: {sheet}")]
    MissingSheet { sheet: String },

    #[error("工作表 {sheet} 无有效记录")]
    NoValidRecords {
        sheet: String,
        row_errors: Vec<RowError>,
    },

    #[error("箱单数据不一致（{} 处冲突）", .errors.len())]
    InconsistentCartons { errors: Vec<ConsistencyError> },

    #[error("PO 与箱单总量不平（{} 处差异）", .report.discrepancies.len())]
    Unbalanced { report: ReconciliationReport },

    #[error("文件导入失败: {0}")]
    ImportError(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 稳定的错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingSheet { .. } => "MISSING_SHEET",
            ApiError::NoValidRecords { .. } => "NO_VALID_RECORDS",
            ApiError::InconsistentCartons { .. } => "INCONSISTENT_CARTONS",
            ApiError::Unbalanced { .. } => "UNBALANCED",
            ApiError::ImportError(_) => "IMPORT_FAILED",
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::DatabaseConnectionError(_) => "DATABASE_CONNECTION_ERROR",
            ApiError::ConfigError(_) => "CONFIG_ERROR",
            ApiError::InternalError(_) | ApiError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// 结构化输出: { code, message, details }
    pub fn to_payload(&self) -> Value {
        let details = match self {
            ApiError::MissingSheet { sheet } => json!({ "sheet": sheet }),
            ApiError::NoValidRecords { sheet, row_errors } => {
                json!({ "sheet": sheet, "row_errors": row_errors })
            }
            ApiError::InconsistentCartons { errors } => json!({ "errors": errors }),
            ApiError::Unbalanced { report } => json!(report),
            _ => Value::Null,
        };

        json!({
            "code": self.code(),
            "message": self.to_string(),
            "details": details,
        })
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::MissingSheet { sheet } => ApiError::MissingSheet { sheet },
            ImportError::NoValidRecords { sheet, row_errors } => {
                ApiError::NoValidRecords { sheet, row_errors }
            }
            ImportError::Inconsistent { errors } => ApiError::InconsistentCartons { errors },
            ImportError::Unbalanced { report } => ApiError::Unbalanced { report },
            ImportError::Repository(e) => ApiError::from(e),
            ImportError::ConfigReadError(msg) => ApiError::ConfigError(msg),
            ImportError::InternalError(msg) => ApiError::InternalError(msg),
            ImportError::Other(e) => ApiError::Other(e),
            e @ (ImportError::FileNotFound(_)
            | ImportError::UnsupportedFormat(_)
            | ImportError::FileReadError(_)
            | ImportError::ExcelParseError(_)
            | ImportError::CsvParseError(_)) => ApiError::ImportError(e.to_string()),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::SchemaError(msg) => {
                ApiError::DatabaseError(format!("数据库结构不完整: {}", msg))
            }
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::ConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::Serialization(e) => ApiError::InternalError(e.to_string()),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import::{Discrepancy, PoSummary};

    #[test]
    fn test_unbalanced_payload_keeps_report() {
        let report = ReconciliationReport {
            balanced: false,
            discrepancies: vec![Discrepancy::UnitsMismatch {
                po_number: "PO-1".to_string(),
                expected: 24,
                found: 22,
                difference: -2,
            }],
            per_po_summary: vec![PoSummary {
                po_number: "PO-1".to_string(),
                expected_units: 24,
                found_units: 22,
                expected_cartons: 2,
                found_cartons: 2,
            }],
        };

        let err = ApiError::from(ImportError::Unbalanced { report });
        assert_eq!(err.code(), "UNBALANCED");

        let payload = err.to_payload();
        assert_eq!(payload["code"], "UNBALANCED");
        assert_eq!(payload["details"]["balanced"], false);
        assert_eq!(payload["details"]["discrepancies"][0]["difference"], -2);
        assert_eq!(payload["details"]["per_po_summary"][0]["found_units"], 22);
    }

    #[test]
    fn test_missing_sheet_conversion() {
        let err = ApiError::from(ImportError::MissingSheet {
            sheet: "Cartons".to_string(),
        });
        assert!(matches!(&err, ApiError::MissingSheet { sheet } if sheet == "Cartons"));
        assert_eq!(err.to_payload()["details"]["sheet"], "Cartons");
    }

    #[test]
    fn test_repository_error_through_import_error() {
        let err = ApiError::from(ImportError::Repository(RepositoryError::LockError(
            "poisoned".to_string(),
        )));
        assert_eq!(err.code(), "DATABASE_CONNECTION_ERROR");
    }

    #[test]
    fn test_not_found_message() {
        let err = ApiError::from(RepositoryError::NotFound {
            entity: "PurchaseOrder".to_string(),
            id: "7".to_string(),
        });
        assert_eq!(err.to_string(), "资源未找到: PurchaseOrder(id=7)不存在");
        assert_eq!(err.to_payload()["details"], Value::Null);
    }
}
