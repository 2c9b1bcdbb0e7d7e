// ==========================================
// 发运导入与对账引擎 - 发运 Repository Trait
// ==========================================
// 职责: 定义 PO / 箱单行 / 导入记录的数据访问接口
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::import::{CartonCandidate, ImportRecord, ImportStatistics, PoCandidate};
use crate::domain::shipping::{CartonLine, PoFilter, PoStatistics, PoStatusCount, PurchaseOrder};
use crate::domain::types::{CartonKind, CartonStatus};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ShippingRepository Trait
// ==========================================
// 实现者: ShippingRepositoryImpl（使用 rusqlite）
// 约束: 每个写方法是独立的工作单元，不存在跨方法事务
#[async_trait]
pub trait ShippingRepository: Send + Sync {
    // ===== 导入写入 =====

    /// 按 po_number 插入或更新 PO
    ///
    /// 已存在时覆盖声明数量/箱数/出货日期，保留状态与完成计数。
    ///
    /// # 返回
    /// - Ok(i64): PO 的生成 ID
    async fn upsert_purchase_order(&self, po: &PoCandidate) -> RepositoryResult<i64>;

    /// 按 (carton_id, product_sku) 插入或更新箱单行
    ///
    /// 已存在时覆盖所属 PO、数量、箱型，保留状态与容器关联。
    /// 调用方负责拒绝把箱号改挂到其他 PO。
    async fn upsert_carton_line(
        &self,
        po_id: i64,
        carton: &CartonCandidate,
    ) -> RepositoryResult<i64>;

    /// 改写某箱号全部已存 SKU 行的箱型
    ///
    /// # 返回
    /// - Ok(usize): 更新的行数
    async fn update_carton_kind(&self, carton_id: &str, kind: CartonKind)
        -> RepositoryResult<usize>;

    /// 追加一条导入记录（不可更新、不可删除）
    async fn insert_import_record(&self, record: &ImportRecord) -> RepositoryResult<()>;

    // ===== 导入记录查询 =====

    async fn list_recent_imports(&self, limit: i64) -> RepositoryResult<Vec<ImportRecord>>;

    async fn find_import_by_id(&self, import_id: &str) -> RepositoryResult<Option<ImportRecord>>;

    /// 最近一次无错误且全部落库的导入
    async fn last_complete_import(&self) -> RepositoryResult<Option<ImportRecord>>;

    async fn import_statistics(&self) -> RepositoryResult<ImportStatistics>;

    // ===== PO 查询 =====

    async fn find_po_by_number(&self, po_number: &str) -> RepositoryResult<Option<PurchaseOrder>>;

    async fn find_po_by_id(&self, po_id: i64) -> RepositoryResult<Option<PurchaseOrder>>;

    /// 按条件分页查询 PO（按出货日期、PO 编号升序）
    async fn list_purchase_orders(&self, filter: &PoFilter) -> RepositoryResult<Vec<PurchaseOrder>>;

    /// 按条件统计 PO 总数（忽略 limit/offset）
    async fn count_purchase_orders(&self, filter: &PoFilter) -> RepositoryResult<i64>;

    async fn count_pos_by_status(&self) -> RepositoryResult<Vec<PoStatusCount>>;

    async fn po_statistics(&self, po_id: i64) -> RepositoryResult<Option<PoStatistics>>;

    // ===== 箱单行查询 =====

    async fn find_cartons_by_po(
        &self,
        po_id: i64,
        kind: Option<CartonKind>,
        status: Option<CartonStatus>,
    ) -> RepositoryResult<Vec<CartonLine>>;

    /// 查询某箱号的全部 SKU 行
    async fn find_carton_lines(&self, carton_id: &str) -> RepositoryResult<Vec<CartonLine>>;
}
