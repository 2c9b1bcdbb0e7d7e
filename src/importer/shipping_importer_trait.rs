// ==========================================
// 发运导入与对账引擎 - 导入 Trait
// ==========================================
// 职责: 定义发运导入主接口与各阶段组件接口（不包含实现）
// 流程: 抽取 → 一致性校验 → 箱型分类 → 总量对账（闸门）→ 落库
// ==========================================

use crate::domain::import::{
    CartonCandidate, CartonComposition, ConsistencyReport, ExtractionResult, PoCandidate,
    ReconciliationReport, ShippingImportResult,
};
use crate::importer::error::ImportResult;
use crate::importer::workbook::WorkbookSource;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

// ==========================================
// ShippingImporter Trait
// ==========================================
// 用途: 发运导入主接口
// 实现者: ShippingImporterImpl
#[async_trait]
pub trait ShippingImporter: Send + Sync {
    /// 从文件导入（Excel 文件或含 PO.csv / Cartons.csv 的目录）
    ///
    /// # 参数
    /// - file_path: 文件或目录路径
    /// - imported_by: 导入人（None 时使用配置默认值）
    ///
    /// # 返回
    /// - Ok(ShippingImportResult): 已落库（可能含行级/记录级错误）
    /// - Err(MissingSheet / NoValidRecords / Inconsistent / Unbalanced): 未落库
    /// - Err(Repository): 基础设施故障，导入中断，不写导入记录
    async fn import_file(
        &self,
        file_path: &Path,
        imported_by: Option<&str>,
    ) -> ImportResult<ShippingImportResult>;

    /// 从已打开的工作簿导入
    async fn import_workbook(
        &self,
        source: &mut (dyn WorkbookSource + Send),
        imported_by: Option<&str>,
    ) -> ImportResult<ShippingImportResult>;

    /// 批量导入多个文件（并发执行）
    ///
    /// # 返回
    /// - 与 file_paths 一一对应的导入结果
    ///
    /// # 说明
    /// - 每个文件的导入是独立的，互不影响
    /// - 如果某个文件导入失败，不影响其他文件
    async fn batch_import(
        &self,
        file_paths: Vec<PathBuf>,
        imported_by: Option<&str>,
    ) -> Vec<ImportResult<ShippingImportResult>>;
}

// ==========================================
// RecordExtractor Trait
// ==========================================
// 用途: 表格抽取（阶段 1）
// 实现者: ShippingExtractor
pub trait RecordExtractor: Send + Sync {
    /// 抽取 PO 与箱单候选记录
    ///
    /// # 返回
    /// - Ok(ExtractionResult): 候选记录 + 行级错误
    /// - Err(MissingSheet): 任一工作表缺失（行解析前检查）
    fn extract(
        &self,
        source: &mut dyn WorkbookSource,
        po_sheet: &str,
        carton_sheet: &str,
    ) -> ImportResult<ExtractionResult>;
}

// ==========================================
// ConsistencyValidator Trait
// ==========================================
// 用途: 箱单一致性校验（阶段 2）
// 实现者: ConsistencyValidatorImpl
pub trait ConsistencyValidator: Send + Sync {
    fn validate(&self, cartons: &[CartonCandidate]) -> ConsistencyReport;
}

// ==========================================
// CartonClassifier Trait
// ==========================================
// 用途: 箱型分类（阶段 3），纯函数
// 实现者: CartonClassifierImpl
pub trait CartonClassifier: Send + Sync {
    /// 为每个箱单行填充 carton_kind（保持输入顺序）
    fn classify(&self, cartons: Vec<CartonCandidate>) -> Vec<CartonCandidate>;

    /// 按箱号汇总组成（箱型、排序后的 SKU、数量合计）
    fn summarize(&self, cartons: &[CartonCandidate]) -> Vec<CartonComposition>;
}

// ==========================================
// TotalsReconciler Trait
// ==========================================
// 用途: PO 声明总量与箱单合计对账（阶段 4），纯函数、幂等
// 实现者: TotalsReconcilerImpl
pub trait TotalsReconciler: Send + Sync {
    fn reconcile(&self, pos: &[PoCandidate], cartons: &[CartonCandidate]) -> ReconciliationReport;
}
