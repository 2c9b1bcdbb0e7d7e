// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、共享连接、CSV 目录工作簿与内存工作簿构造
// ==========================================

#![allow(dead_code)]

use rusqlite::Connection;
use shipping_import::db::{init_schema, open_sqlite_connection};
use shipping_import::importer::{CellValue, MemoryWorkbook};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::{NamedTempFile, TempDir};

pub const PO_HEADERS: [&str; 4] = ["PO Number", "Unit Count", "Carton Count", "Ship Date"];
pub const CARTON_HEADERS: [&str; 4] = ["Carton ID", "SKU", "Units Per Carton", "PO Number"];

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接（与 API / 仓储 / 配置共用）
pub fn shared_connection(db_path: &str) -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(open_sqlite_connection(db_path).unwrap()))
}

/// PO 行: (po_number, unit_count, carton_count, ship_date)
pub fn po_row(po_number: &str, units: i64, cartons: i64, ship_date: &str) -> Vec<CellValue> {
    vec![
        po_number.into(),
        units.into(),
        cartons.into(),
        ship_date.into(),
    ]
}

/// 箱单行: (carton_id, sku, units_per_carton, po_number)
pub fn carton_row(carton_id: &str, sku: &str, units: i64, po_number: &str) -> Vec<CellValue> {
    vec![carton_id.into(), sku.into(), units.into(), po_number.into()]
}

/// 构造内存工作簿（PO + Cartons 两个工作表）
pub fn memory_workbook(
    name: &str,
    pos: Vec<Vec<CellValue>>,
    cartons: Vec<Vec<CellValue>>,
) -> MemoryWorkbook {
    MemoryWorkbook::new(name)
        .with_sheet("PO", &PO_HEADERS, pos)
        .with_sheet("Cartons", &CARTON_HEADERS, cartons)
}

/// 写入 CSV 目录工作簿（PO.csv + Cartons.csv）
pub fn write_csv_workbook(
    root: &Path,
    dir_name: &str,
    po_lines: &[&str],
    carton_lines: &[&str],
) -> PathBuf {
    let dir = root.join(dir_name);
    fs::create_dir_all(&dir).unwrap();

    let mut po_csv = PO_HEADERS.join(",");
    for line in po_lines {
        po_csv.push('\n');
        po_csv.push_str(line);
    }
    fs::write(dir.join("PO.csv"), po_csv).unwrap();

    let mut carton_csv = CARTON_HEADERS.join(",");
    for line in carton_lines {
        carton_csv.push('\n');
        carton_csv.push_str(line);
    }
    fs::write(dir.join("Cartons.csv"), carton_csv).unwrap();

    dir
}

/// 只含 PO 工作表的 CSV 目录
pub fn write_po_only_workbook(root: &Path, dir_name: &str, po_lines: &[&str]) -> PathBuf {
    let dir = root.join(dir_name);
    fs::create_dir_all(&dir).unwrap();

    let mut po_csv = PO_HEADERS.join(",");
    for line in po_lines {
        po_csv.push('\n');
        po_csv.push_str(line);
    }
    fs::write(dir.join("PO.csv"), po_csv).unwrap();
    dir
}

pub fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

/// 统计表行数
pub fn count_rows(db_path: &str, table: &str) -> i64 {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .unwrap()
}
