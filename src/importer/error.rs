// ==========================================
// 发运导入与对账引擎 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 结构错误 / 一致性错误 / 对账错误 / 基础设施错误（均中断导入）
// 行级错误与记录级落库错误不走这里，记入 ImportRecord.errors
// ==========================================

use crate::domain::import::{ConsistencyError, ReconciliationReport, RowError};
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xlsm/.xls/.ods 或 CSV 目录）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 结构错误 =====
    #[error("缺少工作表: {sheet}")]
    MissingSheet { sheet: String },

    #[error("工作表 {sheet} 无有效记录（行级错误 {} 条）", .row_errors.len())]
    NoValidRecords {
        sheet: String,
        row_errors: Vec<RowError>,
    },

    // ===== 一致性错误 =====
    #[error("箱单数据不一致（{} 处冲突）", .errors.len())]
    Inconsistent { errors: Vec<ConsistencyError> },

    // ===== 对账错误 =====
    #[error("PO 与箱单总量不平（{} 处差异）", .report.discrepancies.len())]
    Unbalanced { report: ReconciliationReport },

    // ===== 基础设施错误 =====
    #[error("仓储操作失败: {0}")]
    Repository(#[from] RepositoryError),

    // ===== 配置错误 =====
    #[error("配置读取失败: {0}")]
    ConfigReadError(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 稳定的错误代码（供 API 层输出）
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::FileNotFound(_) => "FILE_NOT_FOUND",
            ImportError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ImportError::FileReadError(_) => "FILE_READ_ERROR",
            ImportError::ExcelParseError(_) => "EXCEL_PARSE_ERROR",
            ImportError::CsvParseError(_) => "CSV_PARSE_ERROR",
            ImportError::MissingSheet { .. } => "MISSING_SHEET",
            ImportError::NoValidRecords { .. } => "NO_VALID_RECORDS",
            ImportError::Inconsistent { .. } => "INCONSISTENT_CARTONS",
            ImportError::Unbalanced { .. } => "UNBALANCED",
            ImportError::Repository(_) => "STORAGE_FAILURE",
            ImportError::ConfigReadError(_) => "CONFIG_ERROR",
            ImportError::InternalError(_) | ImportError::Other(_) => "INTERNAL_ERROR",
        }
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
