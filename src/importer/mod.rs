// ==========================================
// 发运导入与对账引擎 - 导入层
// ==========================================
// 职责: PO/箱单表格导入 → 一致性校验 → 箱型分类 → 总量对账 → 落库
// 支持: Excel, CSV 目录, 内存工作簿
// ==========================================

// 模块声明
pub mod classifier;
pub mod consistency;
pub mod error;
pub mod extractor;
pub mod field_mapper;
pub mod persister;
pub mod reconciler;
pub mod shipping_importer;
pub mod shipping_importer_trait;
pub mod workbook;

// 重导出核心类型
pub use classifier::CartonClassifier as CartonClassifierImpl;
pub use consistency::ConsistencyValidator as ConsistencyValidatorImpl;
pub use error::{ImportError, ImportResult};
pub use extractor::ShippingExtractor;
pub use persister::{BalancedImport, ImportPersister, PersistContext};
pub use reconciler::TotalsReconciler as TotalsReconcilerImpl;
pub use shipping_importer::ShippingImporterImpl;
pub use workbook::{
    CellValue, CsvWorkbook, ExcelWorkbook, MemoryWorkbook, SheetData, SheetRow,
    UniversalWorkbookOpener, WorkbookSource,
};

// 重导出 Trait 接口
pub use shipping_importer_trait::{
    CartonClassifier, ConsistencyValidator, RecordExtractor, ShippingImporter, TotalsReconciler,
};
