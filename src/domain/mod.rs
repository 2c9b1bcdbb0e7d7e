// ==========================================
// 发运导入与对账引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、导入过程模型
// 红线: 不含数据访问逻辑,不含解析逻辑
// ==========================================

pub mod import;
pub mod shipping;
pub mod types;

// 重导出核心类型
pub use import::{
    CartonCandidate, CartonComposition, ConsistencyError, ConsistencyReport, Discrepancy,
    ExtractionResult, ImportErrorEntry, ImportErrorKind, ImportRecord, ImportStatistics,
    PoCandidate, PoSummary, ReconciliationReport, RowError, ShippingImportResult,
};
pub use shipping::{CartonInfo, CartonLine, PoFilter, PoStatistics, PoStatusCount, PurchaseOrder};
pub use types::{CartonKind, CartonStatus, PoStatus};
