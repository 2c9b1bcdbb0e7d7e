// ==========================================
// 发运导入与对账引擎 - 发运领域模型
// ==========================================
// 实体: PurchaseOrder / CartonLine
// 关系: PurchaseOrder 1 : N CartonLine（按 po_id）
// ==========================================

use crate::domain::types::{CartonKind, CartonStatus, PoStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// PurchaseOrder - 采购订单（PO）
// ==========================================
// 业务主键: po_number（唯一）
// 导入期间由落库器拥有，之后由生产/发运流程推进状态与计数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: i64,                      // 生成 ID
    pub po_number: String,            // PO 编号（业务主键）
    pub declared_unit_count: i64,     // 声明总数量
    pub declared_carton_count: i64,   // 声明箱数
    pub committed_ship_date: NaiveDate, // 承诺出货日期
    pub status: PoStatus,             // 生命周期状态
    pub units_completed: i64,         // 已完成数量
    pub cartons_completed: i64,       // 已完成箱数
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// CartonLine - 箱单行
// ==========================================
// 同一 carton_id 可出现多行（每个 SKU 一行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartonLine {
    pub id: i64,
    pub po_id: i64,
    pub po_number: String,                    // 关联 PO 编号（查询时联表得到）
    pub carton_id: String,                    // 箱号
    pub product_sku: String,                  // SKU
    pub expected_units_per_carton: i64,       // 该行期望数量
    pub carton_kind: CartonKind,              // 派生箱型
    pub status: CartonStatus,
    pub linked_container_id: Option<String>,  // 关联容器（扫码流程写入）
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// PoFilter - PO 列表查询条件
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoFilter {
    pub status: Option<PoStatus>,
    pub po_number: Option<String>,        // 模糊匹配
    pub ship_date_from: Option<NaiveDate>,
    pub ship_date_to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ==========================================
// PoStatistics - 单个 PO 的进度统计
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoStatistics {
    pub po_number: String,
    pub status: PoStatus,
    pub declared_unit_count: i64,
    pub declared_carton_count: i64,
    pub units_completed: i64,
    pub cartons_completed: i64,
    pub imported_cartons: i64,      // 已导入的不同箱号数
    pub completed_cartons: i64,     // 状态为 COMPLETED 的不同箱号数
    pub musical_cartons: i64,       // 混装箱数
    pub carton_lines: i64,          // 箱单行数
    pub expected_units: i64,        // 箱单行期望数量合计
}

// ==========================================
// CartonInfo - 按箱号聚合的箱信息
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartonInfo {
    pub carton_id: String,
    pub po_number: String,
    pub carton_kind: CartonKind,    // 由已落库行重新派生
    pub lines: Vec<CartonLine>,
}

// ==========================================
// PoStatusCount - 按状态计数
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoStatusCount {
    pub status: PoStatus,
    pub count: i64,
}
