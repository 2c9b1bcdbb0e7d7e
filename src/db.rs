// ==========================================
// 发运导入与对账引擎 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 幂等建表（CREATE TABLE IF NOT EXISTS）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS purchase_order (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    po_number             TEXT    NOT NULL UNIQUE,
    declared_unit_count   INTEGER NOT NULL CHECK (declared_unit_count > 0),
    declared_carton_count INTEGER NOT NULL CHECK (declared_carton_count > 0),
    committed_ship_date   TEXT    NOT NULL,
    status                TEXT    NOT NULL DEFAULT 'IMPORTED',
    units_completed       INTEGER NOT NULL DEFAULT 0,
    cartons_completed     INTEGER NOT NULL DEFAULT 0,
    created_at            TEXT    NOT NULL,
    updated_at            TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS po_carton (
    id                        INTEGER PRIMARY KEY AUTOINCREMENT,
    po_id                     INTEGER NOT NULL REFERENCES purchase_order(id),
    carton_id                 TEXT    NOT NULL,
    product_sku               TEXT    NOT NULL,
    expected_units_per_carton INTEGER NOT NULL CHECK (expected_units_per_carton > 0),
    carton_kind               TEXT    NOT NULL,
    status                    TEXT    NOT NULL DEFAULT 'PENDING',
    linked_container_id       TEXT,
    created_at                TEXT    NOT NULL,
    updated_at                TEXT    NOT NULL,
    UNIQUE (carton_id, product_sku)
);

CREATE INDEX IF NOT EXISTS idx_po_carton_po_id ON po_carton(po_id);
CREATE INDEX IF NOT EXISTS idx_purchase_order_ship_date ON purchase_order(committed_ship_date);

CREATE TABLE IF NOT EXISTS shipping_import (
    id                TEXT    PRIMARY KEY,
    file_name         TEXT    NOT NULL,
    pos_declared      INTEGER NOT NULL,
    pos_persisted     INTEGER NOT NULL,
    cartons_declared  INTEGER NOT NULL,
    cartons_persisted INTEGER NOT NULL,
    errors_json       TEXT    NOT NULL DEFAULT '[]',
    error_count       INTEGER NOT NULL DEFAULT 0,
    imported_by       TEXT    NOT NULL,
    imported_at       TEXT    NOT NULL,
    elapsed_ms        INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_shipping_import_at ON shipping_import(imported_at);

CREATE TRIGGER IF NOT EXISTS shipping_import_no_update
BEFORE UPDATE ON shipping_import
BEGIN
    SELECT RAISE(ABORT, 'shipping_import 为只追加表');
END;

CREATE TRIGGER IF NOT EXISTS shipping_import_no_delete
BEFORE DELETE ON shipping_import
BEGIN
    SELECT RAISE(ABORT, 'shipping_import 为只追加表');
END;

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id   TEXT NOT NULL DEFAULT 'global',
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS schema_version (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）并记录 schema_version
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO po_carton (po_id, carton_id, product_sku, expected_units_per_carton,
                                    carton_kind, created_at, updated_at)
             VALUES (999, 'C-1', 'SKU', 1, 'MONO', 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
