// ==========================================
// 发运导入与对账引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 范围: PO/箱单表格导入 → 一致性校验 → 箱型分类 → 总量对账 → 落库
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 表格抽取、校验、对账、落库
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::types::{CartonKind, CartonStatus, PoStatus};

pub use domain::{
    CartonCandidate, CartonLine, ConsistencyError, Discrepancy, ImportErrorEntry, ImportRecord,
    PoCandidate, PurchaseOrder, ReconciliationReport, RowError, ShippingImportResult,
};

pub use importer::{ImportError, ImportResult, ShippingImporter, ShippingImporterImpl};

pub use api::{ApiError, ShippingApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "发运导入与对账引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
