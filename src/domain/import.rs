// ==========================================
// 发运导入与对账引擎 - 导入过程模型
// ==========================================
// 职责: 候选记录、行级错误、一致性/对账报告、导入记录
// 红线: 纯数据结构，不含解析与数据访问逻辑
// ==========================================

use crate::domain::types::CartonKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// 候选记录（抽取结果，尚未落库）
// ==========================================

/// PO 候选记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoCandidate {
    pub po_number: String,
    pub declared_unit_count: i64,
    pub declared_carton_count: i64,
    pub committed_ship_date: NaiveDate,
    pub row_number: usize, // 源表行号（表头 = 1）
}

/// 箱单行候选记录
///
/// `carton_kind` 在抽取时为 None，由分类器填充。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartonCandidate {
    pub carton_id: String,
    pub product_sku: String,
    pub expected_units_per_carton: i64,
    pub parent_po_number: String,
    pub carton_kind: Option<CartonKind>,
    pub row_number: usize,
}

// ==========================================
// RowError - 行级抽取错误（局部恢复，不中断导入）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub sheet: String,
    pub row_number: usize,
    pub po_number: Option<String>,
    pub carton_id: Option<String>,
    pub message: String,
}

impl RowError {
    pub fn new(sheet: impl Into<String>, row_number: usize, message: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            row_number,
            po_number: None,
            carton_id: None,
            message: message.into(),
        }
    }
}

/// 抽取结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub pos: Vec<PoCandidate>,
    pub cartons: Vec<CartonCandidate>,
    pub errors: Vec<RowError>,
}

// ==========================================
// ConsistencyError - 箱单一致性错误
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyError {
    /// 同一 (箱号, SKU) 的数量不一致
    QuantityMismatch {
        carton_id: String,
        product_sku: String,
        first_value: i64,
        conflicting_value: i64,
        row_number: usize,
    },
    /// 同一 (箱号, SKU) 的所属 PO 不一致
    PoMismatch {
        carton_id: String,
        product_sku: String,
        first_po: String,
        conflicting_po: String,
        row_number: usize,
    },
    /// 同一箱号的不同 SKU 指向不同 PO
    CartonPoMismatch {
        carton_id: String,
        first_po: String,
        conflicting_po: String,
    },
}

impl std::fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyError::QuantityMismatch {
                carton_id,
                product_sku,
                first_value,
                conflicting_value,
                ..
            } => write!(
                f,
                "箱号 {} SKU {} 数量不一致: {} vs {}",
                carton_id, product_sku, first_value, conflicting_value
            ),
            ConsistencyError::PoMismatch {
                carton_id,
                product_sku,
                first_po,
                conflicting_po,
                ..
            } => write!(
                f,
                "箱号 {} SKU {} 所属 PO 不一致: {} vs {}",
                carton_id, product_sku, first_po, conflicting_po
            ),
            ConsistencyError::CartonPoMismatch {
                carton_id,
                first_po,
                conflicting_po,
            } => write!(
                f,
                "箱号 {} 跨 PO: {} vs {}",
                carton_id, first_po, conflicting_po
            ),
        }
    }
}

/// 一致性校验报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub valid: bool,
    pub errors: Vec<ConsistencyError>,
}

// ==========================================
// 对账报告
// ==========================================

/// 对账差异（difference = found - expected）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Discrepancy {
    PoNotFound {
        carton_id: String,
        po_number: String,
        row_number: usize,
    },
    UnitsMismatch {
        po_number: String,
        expected: i64,
        found: i64,
        difference: i64,
    },
    CartonsMismatch {
        po_number: String,
        expected: i64,
        found: i64,
        difference: i64,
    },
}

impl Discrepancy {
    pub fn po_number(&self) -> &str {
        match self {
            Discrepancy::PoNotFound { po_number, .. }
            | Discrepancy::UnitsMismatch { po_number, .. }
            | Discrepancy::CartonsMismatch { po_number, .. } => po_number,
        }
    }
}

impl std::fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Discrepancy::PoNotFound {
                carton_id,
                po_number,
                ..
            } => write!(f, "箱号 {} 引用的 PO {} 不存在", carton_id, po_number),
            Discrepancy::UnitsMismatch {
                po_number,
                expected,
                found,
                difference,
            } => write!(
                f,
                "PO {} 数量不平: 声明 {} 实际 {} (差 {:+})",
                po_number, expected, found, difference
            ),
            Discrepancy::CartonsMismatch {
                po_number,
                expected,
                found,
                difference,
            } => write!(
                f,
                "PO {} 箱数不平: 声明 {} 实际 {} (差 {:+})",
                po_number, expected, found, difference
            ),
        }
    }
}

/// 单个 PO 的对账汇总
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoSummary {
    pub po_number: String,
    pub expected_units: i64,
    pub found_units: i64,
    pub expected_cartons: i64,
    pub found_cartons: i64,
}

/// 对账报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub balanced: bool,
    pub discrepancies: Vec<Discrepancy>,
    pub per_po_summary: Vec<PoSummary>,
}

// ==========================================
// CartonComposition - 箱组成（诊断用）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartonComposition {
    pub carton_id: String,
    pub carton_kind: CartonKind,
    pub skus: Vec<String>, // 已排序
    pub total_units: i64,
}

// ==========================================
// 导入记录（不可变，仅追加）
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportErrorKind {
    RowExtraction, // 行抽取失败
    PoInsert,      // PO 落库失败
    CartonInsert,  // 箱单行落库失败
}

/// 导入错误条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportErrorEntry {
    pub kind: ImportErrorKind,
    pub sheet: Option<String>,
    pub row_number: Option<usize>,
    pub po_number: Option<String>,
    pub carton_id: Option<String>,
    pub message: String,
}

impl From<RowError> for ImportErrorEntry {
    fn from(err: RowError) -> Self {
        Self {
            kind: ImportErrorKind::RowExtraction,
            sheet: Some(err.sheet),
            row_number: Some(err.row_number),
            po_number: err.po_number,
            carton_id: err.carton_id,
            message: err.message,
        }
    }
}

/// 导入记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub id: String, // UUID
    pub file_name: String,
    pub pos_declared: i64,
    pub pos_persisted: i64,
    pub cartons_declared: i64,
    pub cartons_persisted: i64,
    pub errors: Vec<ImportErrorEntry>,
    pub imported_by: String,
    pub imported_at: DateTime<Utc>,
    pub elapsed_ms: i64,
}

impl ImportRecord {
    /// 无任何行级/记录级错误且全部落库
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
            && self.pos_persisted == self.pos_declared
            && self.cartons_persisted == self.cartons_declared
    }
}

/// 导入历史统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportStatistics {
    pub total_imports: i64,
    pub total_pos_persisted: i64,
    pub total_cartons_persisted: i64,
    pub imports_with_errors: i64,
}

/// 导入成功返回值（可能仍含行级/记录级错误）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingImportResult {
    pub record: ImportRecord,
    pub per_po_summary: Vec<PoSummary>,
    pub carton_compositions: Vec<CartonComposition>,
    pub elapsed_ms: i64,
}
