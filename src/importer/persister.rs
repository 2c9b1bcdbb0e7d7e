// ==========================================
// 发运导入与对账引擎 - 对账后落库器
// ==========================================
// 前置: 只接受 BalancedImport（对账通过后才能构造）
// 流程:
// 1. 逐个 upsert PO（各自独立，无外层事务），记录级失败 → PO_INSERT
// 2. 成功的 PO 建立 po_number → id 映射
// 3. 所属 PO 未落库的箱单行 → CARTON_INSERT（计数，不静默丢弃）
// 4. 逐行 upsert 箱单行，记录级失败 → CARTON_INSERT
//    箱号已有行挂在其他 PO 下 → CARTON_INSERT，不改挂
// 5. 按库中 SKU 全集重算本次写入箱号的箱型
// 6. 写入一条 ImportRecord
// 基础设施错误（锁中毒、库不可达、I/O）中断整个导入，不写 ImportRecord
// ==========================================

use crate::domain::import::{
    CartonCandidate, ImportErrorEntry, ImportErrorKind, ImportRecord, PoCandidate,
    ReconciliationReport, RowError,
};
use crate::domain::types::CartonKind;
use crate::importer::classifier::kind_for_sku_count;
use crate::importer::error::ImportResult;
use crate::repository::{RepositoryResult, ShippingRepository};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ==========================================
// BalancedImport - 已通过对账的导入批次
// ==========================================
#[derive(Debug, Clone)]
pub struct BalancedImport {
    pos: Vec<PoCandidate>,
    cartons: Vec<CartonCandidate>,
    row_errors: Vec<RowError>,
}

impl BalancedImport {
    /// 对账未通过时返回原报告
    pub fn new(
        pos: Vec<PoCandidate>,
        cartons: Vec<CartonCandidate>,
        row_errors: Vec<RowError>,
        report: &ReconciliationReport,
    ) -> Result<Self, ReconciliationReport> {
        if !report.balanced {
            return Err(report.clone());
        }
        Ok(Self {
            pos,
            cartons,
            row_errors,
        })
    }

    pub fn pos(&self) -> &[PoCandidate] {
        &self.pos
    }

    pub fn cartons(&self) -> &[CartonCandidate] {
        &self.cartons
    }
}

/// 落库上下文
#[derive(Debug, Clone)]
pub struct PersistContext {
    pub file_name: String,
    pub imported_by: String,
    pub started_at: Instant,
}

// ==========================================
// ImportPersister
// ==========================================
pub struct ImportPersister<R>
where
    R: ShippingRepository,
{
    repo: Arc<R>,
}

impl<R> ImportPersister<R>
where
    R: ShippingRepository,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub async fn persist(
        &self,
        batch: BalancedImport,
        ctx: PersistContext,
    ) -> ImportResult<ImportRecord> {
        let BalancedImport {
            pos,
            cartons,
            row_errors,
        } = batch;

        let mut errors: Vec<ImportErrorEntry> =
            row_errors.into_iter().map(ImportErrorEntry::from).collect();

        // === 步骤 1-2: PO ===
        let mut po_ids: HashMap<String, i64> = HashMap::new();
        for po in &pos {
            match self.repo.upsert_purchase_order(po).await {
                Ok(id) => {
                    po_ids.insert(po.po_number.clone(), id);
                }
                Err(e) if e.is_record_level() => {
                    warn!(po_number = %po.po_number, error = %e, "PO 落库失败");
                    errors.push(ImportErrorEntry {
                        kind: ImportErrorKind::PoInsert,
                        sheet: None,
                        row_number: Some(po.row_number),
                        po_number: Some(po.po_number.clone()),
                        carton_id: None,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(po_number = %po.po_number, error = %e, "PO 落库遇到基础设施故障，导入中断");
                    return Err(e.into());
                }
            }
        }

        // === 步骤 3-4: 箱单行 ===
        let mut cartons_persisted = 0i64;
        // carton_id → 占用该箱号的其他 PO
        let mut foreign_owners: HashMap<&str, Option<String>> = HashMap::new();
        let mut touched: Vec<&str> = Vec::new();
        for carton in &cartons {
            let po_id = match po_ids.get(&carton.parent_po_number) {
                Some(id) => *id,
                None => {
                    errors.push(carton_error(
                        carton,
                        format!(
                            "箱号 {} 的所属 PO {} 未落库",
                            carton.carton_id, carton.parent_po_number
                        ),
                    ));
                    continue;
                }
            };

            let cached = foreign_owners.get(carton.carton_id.as_str()).cloned();
            let owner = match cached {
                Some(owner) => owner,
                None => match self.foreign_owner(&carton.carton_id, po_id).await {
                    Ok(owner) => {
                        foreign_owners.insert(carton.carton_id.as_str(), owner.clone());
                        owner
                    }
                    Err(e) if e.is_record_level() => {
                        warn!(carton_id = %carton.carton_id, error = %e, "箱号归属查询失败");
                        errors.push(carton_error(carton, e.to_string()));
                        continue;
                    }
                    Err(e) => {
                        error!(carton_id = %carton.carton_id, error = %e, "箱号归属查询遇到基础设施故障，导入中断");
                        return Err(e.into());
                    }
                },
            };
            if let Some(owner) = owner {
                warn!(
                    carton_id = %carton.carton_id,
                    owner = %owner,
                    po_number = %carton.parent_po_number,
                    "箱号已归属其他 PO，拒绝改挂"
                );
                errors.push(carton_error(
                    carton,
                    format!(
                        "箱号 {} 已归属 PO {}，不能改挂到 PO {}",
                        carton.carton_id, owner, carton.parent_po_number
                    ),
                ));
                continue;
            }

            match self.repo.upsert_carton_line(po_id, carton).await {
                Ok(_) => {
                    cartons_persisted += 1;
                    if !touched.contains(&carton.carton_id.as_str()) {
                        touched.push(carton.carton_id.as_str());
                    }
                }
                Err(e) if e.is_record_level() => {
                    warn!(
                        carton_id = %carton.carton_id,
                        sku = %carton.product_sku,
                        error = %e,
                        "箱单行落库失败"
                    );
                    errors.push(carton_error(carton, e.to_string()));
                }
                Err(e) => {
                    error!(carton_id = %carton.carton_id, error = %e, "箱单行落库遇到基础设施故障，导入中断");
                    return Err(e.into());
                }
            }
        }

        // === 步骤 5: 箱型重算 ===
        for carton_id in touched {
            match self.refresh_carton_kind(carton_id).await {
                Ok(Some(kind)) => debug!(carton_id, kind = kind.as_str(), "已存箱型已更新"),
                Ok(None) => {}
                Err(e) if e.is_record_level() => {
                    warn!(carton_id, error = %e, "箱型重算失败");
                    errors.push(ImportErrorEntry {
                        kind: ImportErrorKind::CartonInsert,
                        sheet: None,
                        row_number: None,
                        po_number: None,
                        carton_id: Some(carton_id.to_string()),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(carton_id, error = %e, "箱型重算遇到基础设施故障，导入中断");
                    return Err(e.into());
                }
            }
        }

        // === 步骤 6: 导入记录 ===
        let record = ImportRecord {
            id: Uuid::new_v4().to_string(),
            file_name: ctx.file_name,
            pos_declared: pos.len() as i64,
            pos_persisted: po_ids.len() as i64,
            cartons_declared: cartons.len() as i64,
            cartons_persisted,
            errors,
            imported_by: ctx.imported_by,
            imported_at: Utc::now(),
            elapsed_ms: ctx.started_at.elapsed().as_millis() as i64,
        };
        self.repo.insert_import_record(&record).await?;

        info!(
            import_id = %record.id,
            pos_persisted = record.pos_persisted,
            cartons_persisted = record.cartons_persisted,
            errors = record.errors.len(),
            "落库完成"
        );
        Ok(record)
    }

    /// 箱号已存行中挂在其他 PO 下的那个 PO 编号
    async fn foreign_owner(&self, carton_id: &str, po_id: i64) -> RepositoryResult<Option<String>> {
        let stored = self.repo.find_carton_lines(carton_id).await?;
        Ok(stored
            .into_iter()
            .find(|line| line.po_id != po_id)
            .map(|line| line.po_number))
    }

    /// 按库中 SKU 全集重算箱型，有变化时改写并返回新箱型
    async fn refresh_carton_kind(&self, carton_id: &str) -> RepositoryResult<Option<CartonKind>> {
        let stored = self.repo.find_carton_lines(carton_id).await?;
        let distinct: HashSet<&str> = stored.iter().map(|l| l.product_sku.as_str()).collect();
        let kind = kind_for_sku_count(distinct.len());
        if stored.iter().all(|l| l.carton_kind == kind) {
            return Ok(None);
        }
        self.repo.update_carton_kind(carton_id, kind).await?;
        Ok(Some(kind))
    }
}

fn carton_error(carton: &CartonCandidate, message: String) -> ImportErrorEntry {
    ImportErrorEntry {
        kind: ImportErrorKind::CartonInsert,
        sheet: None,
        row_number: Some(carton.row_number),
        po_number: Some(carton.parent_po_number.clone()),
        carton_id: Some(carton.carton_id.clone()),
        message,
    }
}
