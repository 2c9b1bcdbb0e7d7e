// ==========================================
// 发运导入与对账引擎 - 发运 API
// ==========================================
// 职责: 对外门面，执行导入、查询导入记录、PO、箱单与驾驶舱汇总
// 连接: 仓储、配置共享同一 Arc<Mutex<Connection>>
// ==========================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{config_keys, ConfigManager, ShippingConfigReader};
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::import::{ImportRecord, ImportStatistics, ShippingImportResult};
use crate::domain::shipping::{
    CartonInfo, CartonLine, PoFilter, PoStatistics, PoStatusCount, PurchaseOrder,
};
use crate::domain::types::{CartonKind, CartonStatus};
use crate::importer::classifier::kind_for_sku_count;
use crate::importer::workbook::WorkbookSource;
use crate::importer::{ShippingImporter, ShippingImporterImpl};
use crate::repository::{ShippingRepository, ShippingRepositoryImpl};

/// PO 列表默认每页条数
pub const DEFAULT_PAGE_LIMIT: i64 = 50;
/// PO 列表 / 导入历史每页上限
pub const MAX_PAGE_LIMIT: i64 = 500;

// ==========================================
// 响应 DTO
// ==========================================

/// PO 列表响应（带分页信息）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoListResponse {
    pub purchase_orders: Vec<PurchaseOrder>,
    /// 满足条件的总记录数（忽略分页）
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// PO 详情（含箱单行）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoDetailResponse {
    pub purchase_order: PurchaseOrder,
    pub cartons: Vec<CartonLine>,
}

/// 驾驶舱汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub total_pos: i64,
    pub status_counts: Vec<PoStatusCount>,
    /// 最近一次无错误的完整导入
    pub last_complete_import: Option<ImportRecord>,
    pub import_statistics: ImportStatistics,
}

/// 批量导入中单个文件的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchImportItem {
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ShippingImportResult>,
    /// 失败时的结构化错误 { code, message, details }
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// 批量导入响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchImportResponse {
    pub success_count: usize,
    pub fail_count: usize,
    pub items: Vec<BatchImportItem>,
}

// ==========================================
// ShippingApi
// ==========================================
pub struct ShippingApi {
    repo: Arc<ShippingRepositoryImpl>,
    config: Arc<ConfigManager>,
    importer: ShippingImporterImpl<ShippingRepositoryImpl, ConfigManager>,
}

impl ShippingApi {
    /// 打开数据库文件并初始化表结构
    pub fn new(db_path: &str) -> ApiResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// 从已有连接创建（幂等初始化表结构）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ApiResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| ApiError::DatabaseConnectionError(format!("锁获取失败: {}", e)))?;
            init_schema(&guard).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        }

        let config = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| ApiError::ConfigError(e.to_string()))?,
        );
        let repo = Arc::new(ShippingRepositoryImpl::from_connection(conn));
        let importer = ShippingImporterImpl::new(repo.clone(), config.clone());

        Ok(Self {
            repo,
            config,
            importer,
        })
    }

    // ==========================================
    // 导入
    // ==========================================

    /// 导入单个文件（Excel 或 CSV 目录）
    ///
    /// # 返回
    /// - Ok: 已落库，记录中可能含行级/记录级错误
    /// - Err(MissingSheet / NoValidRecords / InconsistentCartons / Unbalanced): 未落库
    #[instrument(skip(self))]
    pub async fn import_file(
        &self,
        file_path: &str,
        imported_by: Option<&str>,
    ) -> ApiResult<ShippingImportResult> {
        if file_path.trim().is_empty() {
            return Err(ApiError::InvalidInput("文件路径不能为空".to_string()));
        }

        let path = PathBuf::from(file_path.trim());
        Ok(self.importer.import_file(&path, imported_by).await?)
    }

    /// 导入已打开的工作簿
    pub async fn import_workbook(
        &self,
        source: &mut (dyn WorkbookSource + Send),
        imported_by: Option<&str>,
    ) -> ApiResult<ShippingImportResult> {
        Ok(self.importer.import_workbook(source, imported_by).await?)
    }

    /// 批量导入，各文件互不影响
    pub async fn batch_import(
        &self,
        file_paths: Vec<String>,
        imported_by: Option<&str>,
    ) -> ApiResult<BatchImportResponse> {
        if file_paths.is_empty() {
            return Err(ApiError::InvalidInput("文件列表不能为空".to_string()));
        }

        let paths = file_paths.iter().map(PathBuf::from).collect();
        let results = self.importer.batch_import(paths, imported_by).await;

        let items: Vec<BatchImportItem> = file_paths
            .into_iter()
            .zip(results)
            .map(|(file_path, result)| match result {
                Ok(result) => BatchImportItem {
                    file_path,
                    result: Some(result),
                    error: None,
                },
                Err(e) => BatchImportItem {
                    file_path,
                    result: None,
                    error: Some(ApiError::from(e).to_payload()),
                },
            })
            .collect();

        let success_count = items.iter().filter(|i| i.result.is_some()).count();
        Ok(BatchImportResponse {
            success_count,
            fail_count: items.len() - success_count,
            items,
        })
    }

    // ==========================================
    // 导入记录
    // ==========================================

    /// 最近的导入记录（None 时按配置 history_limit）
    pub async fn list_imports(&self, limit: Option<i64>) -> ApiResult<Vec<ImportRecord>> {
        let limit = match limit {
            Some(limit) => limit,
            None => self
                .config
                .get_history_limit()
                .await
                .map_err(|e| ApiError::ConfigError(e.to_string()))?,
        };
        validate_limit(limit)?;

        Ok(self.repo.list_recent_imports(limit).await?)
    }

    pub async fn get_import(&self, import_id: &str) -> ApiResult<ImportRecord> {
        if import_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("导入记录ID不能为空".to_string()));
        }

        self.repo
            .find_import_by_id(import_id.trim())
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("导入记录(id={})不存在", import_id)))
    }

    // ==========================================
    // PO
    // ==========================================

    /// 按条件分页查询 PO
    pub async fn list_purchase_orders(&self, filter: PoFilter) -> ApiResult<PoListResponse> {
        let limit = filter.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = filter.offset.unwrap_or(0);
        validate_limit(limit)?;
        if offset < 0 {
            return Err(ApiError::InvalidInput(format!("offset 不能为负数: {}", offset)));
        }
        if let (Some(from), Some(to)) = (filter.ship_date_from, filter.ship_date_to) {
            if from > to {
                return Err(ApiError::InvalidInput(format!(
                    "出货日期范围无效: {} > {}",
                    from, to
                )));
            }
        }

        let filter = PoFilter {
            po_number: filter
                .po_number
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            limit: Some(limit),
            offset: Some(offset),
            ..filter
        };

        let purchase_orders = self.repo.list_purchase_orders(&filter).await?;
        let total = self.repo.count_purchase_orders(&filter).await?;
        debug!(total, returned = purchase_orders.len(), "PO 列表查询完成");

        Ok(PoListResponse {
            purchase_orders,
            total,
            limit,
            offset,
        })
    }

    pub async fn get_purchase_order(&self, po_id: i64) -> ApiResult<PoDetailResponse> {
        let purchase_order = self.require_po(po_id).await?;
        let cartons = self.repo.find_cartons_by_po(po_id, None, None).await?;
        Ok(PoDetailResponse {
            purchase_order,
            cartons,
        })
    }

    pub async fn get_purchase_order_by_number(&self, po_number: &str) -> ApiResult<PurchaseOrder> {
        if po_number.trim().is_empty() {
            return Err(ApiError::InvalidInput("PO 编号不能为空".to_string()));
        }

        self.repo
            .find_po_by_number(po_number.trim())
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("PO(po_number={})不存在", po_number)))
    }

    pub async fn get_po_statistics(&self, po_id: i64) -> ApiResult<PoStatistics> {
        self.repo
            .po_statistics(po_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("PO(id={})不存在", po_id)))
    }

    // ==========================================
    // 箱单
    // ==========================================

    /// 按箱号查询，箱型由已落库行的不同 SKU 数重新派生
    pub async fn get_carton_info(&self, carton_id: &str) -> ApiResult<CartonInfo> {
        if carton_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("箱号不能为空".to_string()));
        }

        let lines = self.repo.find_carton_lines(carton_id.trim()).await?;
        let first = lines
            .first()
            .ok_or_else(|| ApiError::NotFound(format!("箱号(carton_id={})不存在", carton_id)))?;

        let mut skus: Vec<&str> = lines.iter().map(|l| l.product_sku.as_str()).collect();
        skus.sort_unstable();
        skus.dedup();
        let carton_kind = kind_for_sku_count(skus.len());

        if lines.iter().any(|l| l.carton_kind != carton_kind) {
            warn!(carton_id, derived = %carton_kind, "已落库箱型与 SKU 组成不符");
        }

        Ok(CartonInfo {
            carton_id: first.carton_id.clone(),
            po_number: first.po_number.clone(),
            carton_kind,
            lines,
        })
    }

    pub async fn list_cartons_by_po(
        &self,
        po_id: i64,
        kind: Option<CartonKind>,
        status: Option<CartonStatus>,
    ) -> ApiResult<Vec<CartonLine>> {
        self.require_po(po_id).await?;
        Ok(self.repo.find_cartons_by_po(po_id, kind, status).await?)
    }

    // ==========================================
    // 驾驶舱
    // ==========================================

    pub async fn dashboard(&self) -> ApiResult<DashboardResponse> {
        let status_counts = self.repo.count_pos_by_status().await?;
        let last_complete_import = self.repo.last_complete_import().await?;
        let import_statistics = self.repo.import_statistics().await?;

        Ok(DashboardResponse {
            total_pos: status_counts.iter().map(|c| c.count).sum(),
            status_counts,
            last_complete_import,
            import_statistics,
        })
    }

    // ==========================================
    // 配置
    // ==========================================

    /// 更新导入配置（仅限已知键）
    pub fn set_config_value(&self, key: &str, value: &str) -> ApiResult<()> {
        let value = value.trim();
        match key {
            config_keys::PO_SHEET_NAME
            | config_keys::CARTON_SHEET_NAME
            | config_keys::DEFAULT_ACTOR => {
                if value.is_empty() {
                    return Err(ApiError::InvalidInput(format!("配置 {} 不能为空", key)));
                }
            }
            config_keys::HISTORY_LIMIT => {
                let limit = value.parse::<i64>().map_err(|_| {
                    ApiError::InvalidInput(format!("配置 {} 必须为整数: {}", key, value))
                })?;
                validate_limit(limit)?;
            }
            _ => return Err(ApiError::InvalidInput(format!("未知配置项: {}", key))),
        }

        self.config
            .set_global_config_value(key, value)
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;
        info!(key, value, "导入配置已更新");
        Ok(())
    }

    /// 全部 global 配置（JSON）
    pub fn config_snapshot(&self) -> ApiResult<String> {
        self.config
            .get_config_snapshot()
            .map_err(|e| ApiError::ConfigError(e.to_string()))
    }

    async fn require_po(&self, po_id: i64) -> ApiResult<PurchaseOrder> {
        self.repo
            .find_po_by_id(po_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("PO(id={})不存在", po_id)))
    }
}

fn validate_limit(limit: i64) -> ApiResult<()> {
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(ApiError::InvalidInput(format!(
            "limit 必须在 1..={} 之间: {}",
            MAX_PAGE_LIMIT, limit
        )));
    }
    Ok(())
}
