// ==========================================
// 发运导入与对账引擎 - 发运 Repository 实现
// ==========================================
// 职责: 实现 ShippingRepository（使用 rusqlite）
// 表: purchase_order / po_carton / shipping_import
// 并发: 单连接 Arc<Mutex<Connection>>，锁只覆盖单条语句
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::import::{
    CartonCandidate, ImportErrorEntry, ImportRecord, ImportStatistics, PoCandidate,
};
use crate::domain::shipping::{CartonLine, PoFilter, PoStatistics, PoStatusCount, PurchaseOrder};
use crate::domain::types::{CartonKind, CartonStatus, PoStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::shipping_repo::ShippingRepository;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const PO_COLUMNS: &str = "id, po_number, declared_unit_count, declared_carton_count, \
     committed_ship_date, status, units_completed, cartons_completed, created_at, updated_at";

const CARTON_SELECT: &str = "SELECT c.id, c.po_id, p.po_number, c.carton_id, c.product_sku, \
     c.expected_units_per_carton, c.carton_kind, c.status, c.linked_container_id, \
     c.created_at, c.updated_at \
     FROM po_carton c JOIN purchase_order p ON p.id = c.po_id";

const IMPORT_COLUMNS: &str = "id, file_name, pos_declared, pos_persisted, cartons_declared, \
     cartons_persisted, errors_json, imported_by, imported_at, elapsed_ms";

/// 文本列 → 枚举
fn parse_enum_column<T: FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn map_purchase_order(row: &Row) -> rusqlite::Result<PurchaseOrder> {
    Ok(PurchaseOrder {
        id: row.get(0)?,
        po_number: row.get(1)?,
        declared_unit_count: row.get(2)?,
        declared_carton_count: row.get(3)?,
        committed_ship_date: row.get(4)?,
        status: parse_enum_column::<PoStatus>(row, 5)?,
        units_completed: row.get(6)?,
        cartons_completed: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn map_carton_line(row: &Row) -> rusqlite::Result<CartonLine> {
    Ok(CartonLine {
        id: row.get(0)?,
        po_id: row.get(1)?,
        po_number: row.get(2)?,
        carton_id: row.get(3)?,
        product_sku: row.get(4)?,
        expected_units_per_carton: row.get(5)?,
        carton_kind: parse_enum_column::<CartonKind>(row, 6)?,
        status: parse_enum_column::<CartonStatus>(row, 7)?,
        linked_container_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn map_import_record(row: &Row) -> rusqlite::Result<ImportRecord> {
    let errors_json: String = row.get(6)?;
    let errors: Vec<ImportErrorEntry> = serde_json::from_str(&errors_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(ImportRecord {
        id: row.get(0)?,
        file_name: row.get(1)?,
        pos_declared: row.get(2)?,
        pos_persisted: row.get(3)?,
        cartons_declared: row.get(4)?,
        cartons_persisted: row.get(5)?,
        errors,
        imported_by: row.get(7)?,
        imported_at: row.get(8)?,
        elapsed_ms: row.get(9)?,
    })
}

/// 根据 PoFilter 构造 WHERE 子句与参数
fn build_po_where(filter: &PoFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(Box::new(status.as_str()));
    }
    if let Some(po_number) = filter.po_number.as_deref().map(str::trim) {
        if !po_number.is_empty() {
            clauses.push("po_number LIKE ?");
            values.push(Box::new(format!("%{}%", po_number)));
        }
    }
    if let Some(from) = filter.ship_date_from {
        clauses.push("committed_ship_date >= ?");
        values.push(Box::new(from));
    }
    if let Some(to) = filter.ship_date_to {
        clauses.push("committed_ship_date <= ?");
        values.push(Box::new(to));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_sql, values)
}

// ==========================================
// ShippingRepositoryImpl
// ==========================================
#[derive(Clone)]
pub struct ShippingRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl ShippingRepositoryImpl {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（与 API 层、配置层共享同一连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn upsert_purchase_order_sync(&self, po: &PoCandidate) -> RepositoryResult<i64> {
        let conn = self.lock()?;
        let now = Utc::now();
        let id = conn.query_row(
            r#"
            INSERT INTO purchase_order (
                po_number, declared_unit_count, declared_carton_count, committed_ship_date,
                status, units_completed, cartons_completed, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 'IMPORTED', 0, 0, ?5, ?5)
            ON CONFLICT(po_number) DO UPDATE SET
                declared_unit_count = excluded.declared_unit_count,
                declared_carton_count = excluded.declared_carton_count,
                committed_ship_date = excluded.committed_ship_date,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
            params![
                po.po_number,
                po.declared_unit_count,
                po.declared_carton_count,
                po.committed_ship_date,
                now,
            ],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(id)
    }

    fn upsert_carton_line_sync(&self, po_id: i64, carton: &CartonCandidate) -> RepositoryResult<i64> {
        let kind = carton.carton_kind.ok_or_else(|| RepositoryError::FieldValueError {
            field: "carton_kind".to_string(),
            message: format!("箱号 {} 尚未分类", carton.carton_id),
        })?;

        let conn = self.lock()?;
        let now = Utc::now();
        let id = conn.query_row(
            r#"
            INSERT INTO po_carton (
                po_id, carton_id, product_sku, expected_units_per_carton,
                carton_kind, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING', ?6, ?6)
            ON CONFLICT(carton_id, product_sku) DO UPDATE SET
                po_id = excluded.po_id,
                expected_units_per_carton = excluded.expected_units_per_carton,
                carton_kind = excluded.carton_kind,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
            params![
                po_id,
                carton.carton_id,
                carton.product_sku,
                carton.expected_units_per_carton,
                kind.as_str(),
                now,
            ],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(id)
    }

    fn update_carton_kind_sync(&self, carton_id: &str, kind: CartonKind) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE po_carton SET carton_kind = ?1, updated_at = ?2 WHERE carton_id = ?3",
            params![kind.as_str(), Utc::now(), carton_id],
        )?;
        debug!(carton_id, kind = kind.as_str(), updated, "箱型已改写");
        Ok(updated)
    }

    fn insert_import_record_sync(&self, record: &ImportRecord) -> RepositoryResult<()> {
        let errors_json = serde_json::to_string(&record.errors)?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO shipping_import (
                id, file_name, pos_declared, pos_persisted, cartons_declared,
                cartons_persisted, errors_json, error_count, imported_by, imported_at, elapsed_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                record.id,
                record.file_name,
                record.pos_declared,
                record.pos_persisted,
                record.cartons_declared,
                record.cartons_persisted,
                errors_json,
                record.errors.len() as i64,
                record.imported_by,
                record.imported_at,
                record.elapsed_ms,
            ],
        )?;
        debug!(import_id = %record.id, errors = record.errors.len(), "导入记录已写入");
        Ok(())
    }

    fn list_recent_imports_sync(&self, limit: i64) -> RepositoryResult<Vec<ImportRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM shipping_import ORDER BY imported_at DESC, rowid DESC LIMIT ?1",
            IMPORT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![limit], map_import_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn find_import_by_id_sync(&self, import_id: &str) -> RepositoryResult<Option<ImportRecord>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM shipping_import WHERE id = ?1", IMPORT_COLUMNS);
        let record = conn
            .query_row(&sql, params![import_id], map_import_record)
            .optional()?;
        Ok(record)
    }

    fn last_complete_import_sync(&self) -> RepositoryResult<Option<ImportRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM shipping_import \
             WHERE error_count = 0 AND pos_persisted = pos_declared \
               AND cartons_persisted = cartons_declared \
             ORDER BY imported_at DESC, rowid DESC LIMIT 1",
            IMPORT_COLUMNS
        );
        let record = conn.query_row(&sql, [], map_import_record).optional()?;
        Ok(record)
    }

    fn import_statistics_sync(&self) -> RepositoryResult<ImportStatistics> {
        let conn = self.lock()?;
        let stats = conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(pos_persisted), 0),
                   COALESCE(SUM(cartons_persisted), 0),
                   COALESCE(SUM(CASE WHEN error_count > 0 THEN 1 ELSE 0 END), 0)
            FROM shipping_import
            "#,
            [],
            |row| {
                Ok(ImportStatistics {
                    total_imports: row.get(0)?,
                    total_pos_persisted: row.get(1)?,
                    total_cartons_persisted: row.get(2)?,
                    imports_with_errors: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }

    fn find_po_by_number_sync(&self, po_number: &str) -> RepositoryResult<Option<PurchaseOrder>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM purchase_order WHERE po_number = ?1", PO_COLUMNS);
        let po = conn
            .query_row(&sql, params![po_number], map_purchase_order)
            .optional()?;
        Ok(po)
    }

    fn find_po_by_id_sync(&self, po_id: i64) -> RepositoryResult<Option<PurchaseOrder>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM purchase_order WHERE id = ?1", PO_COLUMNS);
        let po = conn
            .query_row(&sql, params![po_id], map_purchase_order)
            .optional()?;
        Ok(po)
    }

    fn list_purchase_orders_sync(&self, filter: &PoFilter) -> RepositoryResult<Vec<PurchaseOrder>> {
        let (where_sql, mut values) = build_po_where(filter);
        let mut sql = format!(
            "SELECT {} FROM purchase_order{} ORDER BY committed_ship_date ASC, po_number ASC",
            PO_COLUMNS, where_sql
        );
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(Box::new(limit));
            values.push(Box::new(filter.offset.unwrap_or(0)));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let pos = stmt
            .query_map(params_from_iter(values.iter()), map_purchase_order)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pos)
    }

    fn count_purchase_orders_sync(&self, filter: &PoFilter) -> RepositoryResult<i64> {
        let (where_sql, values) = build_po_where(filter);
        let sql = format!("SELECT COUNT(*) FROM purchase_order{}", where_sql);
        let conn = self.lock()?;
        let count = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count)
    }

    fn count_pos_by_status_sync(&self) -> RepositoryResult<Vec<PoStatusCount>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM purchase_order GROUP BY status ORDER BY status",
        )?;
        let mut counts = stmt
            .query_map([], |row| {
                Ok(PoStatusCount {
                    status: parse_enum_column::<PoStatus>(row, 0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        counts.sort_by_key(|c| c.status);
        Ok(counts)
    }

    fn po_statistics_sync(&self, po_id: i64) -> RepositoryResult<Option<PoStatistics>> {
        let po = match self.find_po_by_id_sync(po_id)? {
            Some(po) => po,
            None => return Ok(None),
        };

        let conn = self.lock()?;
        let stats = conn.query_row(
            r#"
            SELECT COUNT(*),
                   COUNT(DISTINCT carton_id),
                   COUNT(DISTINCT CASE WHEN status = 'COMPLETED' THEN carton_id END),
                   COUNT(DISTINCT CASE WHEN carton_kind = 'MUSICAL' THEN carton_id END),
                   COALESCE(SUM(expected_units_per_carton), 0)
            FROM po_carton WHERE po_id = ?1
            "#,
            params![po_id],
            |row| {
                Ok(PoStatistics {
                    po_number: po.po_number.clone(),
                    status: po.status,
                    declared_unit_count: po.declared_unit_count,
                    declared_carton_count: po.declared_carton_count,
                    units_completed: po.units_completed,
                    cartons_completed: po.cartons_completed,
                    carton_lines: row.get(0)?,
                    imported_cartons: row.get(1)?,
                    completed_cartons: row.get(2)?,
                    musical_cartons: row.get(3)?,
                    expected_units: row.get(4)?,
                })
            },
        )?;
        Ok(Some(stats))
    }

    fn find_cartons_by_po_sync(
        &self,
        po_id: i64,
        kind: Option<CartonKind>,
        status: Option<CartonStatus>,
    ) -> RepositoryResult<Vec<CartonLine>> {
        let mut sql = format!("{} WHERE c.po_id = ?", CARTON_SELECT);
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(po_id)];
        if let Some(kind) = kind {
            sql.push_str(" AND c.carton_kind = ?");
            values.push(Box::new(kind.as_str()));
        }
        if let Some(status) = status {
            sql.push_str(" AND c.status = ?");
            values.push(Box::new(status.as_str()));
        }
        sql.push_str(" ORDER BY c.carton_id ASC, c.product_sku ASC");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let lines = stmt
            .query_map(params_from_iter(values.iter()), map_carton_line)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    fn find_carton_lines_sync(&self, carton_id: &str) -> RepositoryResult<Vec<CartonLine>> {
        let conn = self.lock()?;
        let sql = format!(
            "{} WHERE c.carton_id = ?1 ORDER BY c.product_sku ASC",
            CARTON_SELECT
        );
        let mut stmt = conn.prepare(&sql)?;
        let lines = stmt
            .query_map(params![carton_id], map_carton_line)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }
}

#[async_trait]
impl ShippingRepository for ShippingRepositoryImpl {
    async fn upsert_purchase_order(&self, po: &PoCandidate) -> RepositoryResult<i64> {
        self.upsert_purchase_order_sync(po)
    }

    async fn upsert_carton_line(
        &self,
        po_id: i64,
        carton: &CartonCandidate,
    ) -> RepositoryResult<i64> {
        self.upsert_carton_line_sync(po_id, carton)
    }

    async fn update_carton_kind(
        &self,
        carton_id: &str,
        kind: CartonKind,
    ) -> RepositoryResult<usize> {
        self.update_carton_kind_sync(carton_id, kind)
    }

    async fn insert_import_record(&self, record: &ImportRecord) -> RepositoryResult<()> {
        self.insert_import_record_sync(record)
    }

    async fn list_recent_imports(&self, limit: i64) -> RepositoryResult<Vec<ImportRecord>> {
        self.list_recent_imports_sync(limit)
    }

    async fn find_import_by_id(&self, import_id: &str) -> RepositoryResult<Option<ImportRecord>> {
        self.find_import_by_id_sync(import_id)
    }

    async fn last_complete_import(&self) -> RepositoryResult<Option<ImportRecord>> {
        self.last_complete_import_sync()
    }

    async fn import_statistics(&self) -> RepositoryResult<ImportStatistics> {
        self.import_statistics_sync()
    }

    async fn find_po_by_number(&self, po_number: &str) -> RepositoryResult<Option<PurchaseOrder>> {
        self.find_po_by_number_sync(po_number)
    }

    async fn find_po_by_id(&self, po_id: i64) -> RepositoryResult<Option<PurchaseOrder>> {
        self.find_po_by_id_sync(po_id)
    }

    async fn list_purchase_orders(&self, filter: &PoFilter) -> RepositoryResult<Vec<PurchaseOrder>> {
        self.list_purchase_orders_sync(filter)
    }

    async fn count_purchase_orders(&self, filter: &PoFilter) -> RepositoryResult<i64> {
        self.count_purchase_orders_sync(filter)
    }

    async fn count_pos_by_status(&self) -> RepositoryResult<Vec<PoStatusCount>> {
        self.count_pos_by_status_sync()
    }

    async fn po_statistics(&self, po_id: i64) -> RepositoryResult<Option<PoStatistics>> {
        self.po_statistics_sync(po_id)
    }

    async fn find_cartons_by_po(
        &self,
        po_id: i64,
        kind: Option<CartonKind>,
        status: Option<CartonStatus>,
    ) -> RepositoryResult<Vec<CartonLine>> {
        self.find_cartons_by_po_sync(po_id, kind, status)
    }

    async fn find_carton_lines(&self, carton_id: &str) -> RepositoryResult<Vec<CartonLine>> {
        self.find_carton_lines_sync(carton_id)
    }
}
