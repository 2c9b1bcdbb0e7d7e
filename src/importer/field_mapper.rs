// ==========================================
// 发运导入与对账引擎 - 字段映射器
// ==========================================
// 职责: 表头 → 逻辑字段映射（别名表，每个工作表解析一次）+ 单元格类型转换
// 规则: 表头比较忽略大小写与首尾空白；同一字段多个表头匹配时取最左侧
// ==========================================

use crate::importer::workbook::{CellValue, SheetRow};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use std::collections::HashMap;

// ==========================================
// LogicalField - 逻辑字段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalField {
    PoNumber,
    UnitCount,
    CartonCount,
    ShipDate,
    CartonId,
    ProductSku,
    UnitsPerCarton,
}

/// PO 工作表必需字段
pub const PO_FIELDS: [LogicalField; 4] = [
    LogicalField::PoNumber,
    LogicalField::UnitCount,
    LogicalField::CartonCount,
    LogicalField::ShipDate,
];

/// 箱单工作表必需字段
pub const CARTON_FIELDS: [LogicalField; 4] = [
    LogicalField::CartonId,
    LogicalField::ProductSku,
    LogicalField::UnitsPerCarton,
    LogicalField::PoNumber,
];

impl LogicalField {
    /// 可接受的表头别名（小写）
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            LogicalField::PoNumber => &["ponumber", "po_number", "po number", "po"],
            LogicalField::UnitCount => &[
                "unitcount",
                "unit_count",
                "unit count",
                "units",
                "cantidadpares",
                "cantidad_pares",
                "cantidad pares",
                "pares",
            ],
            LogicalField::CartonCount => &[
                "cartoncount",
                "carton_count",
                "carton count",
                "cartons",
                "cantidadcartones",
                "cantidad_cartones",
                "cantidad cartones",
                "cartones",
            ],
            LogicalField::ShipDate => &[
                "shipdate",
                "ship_date",
                "ship date",
                "cfmxfdate",
                "cfmxf_date",
                "cfmxf date",
                "fecha",
                "date",
            ],
            LogicalField::CartonId => &["cartonid", "carton_id", "carton id", "carton"],
            LogicalField::ProductSku => &["sku", "style", "product_sku"],
            LogicalField::UnitsPerCarton => &[
                "unitspercarton",
                "units_per_carton",
                "units per carton",
                "cantidadporcarton",
                "cantidad_por_carton",
                "cantidad por carton",
                "cantidad",
                "qty",
                "quantity",
            ],
        }
    }

    /// 错误信息中使用的字段名
    pub fn label(&self) -> &'static str {
        match self {
            LogicalField::PoNumber => "PO 编号",
            LogicalField::UnitCount => "总数量",
            LogicalField::CartonCount => "箱数",
            LogicalField::ShipDate => "出货日期",
            LogicalField::CartonId => "箱号",
            LogicalField::ProductSku => "SKU",
            LogicalField::UnitsPerCarton => "每箱数量",
        }
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

// ==========================================
// ColumnMap - 工作表列解析结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    columns: HashMap<LogicalField, usize>,
    missing: Vec<LogicalField>,
}

impl ColumnMap {
    /// 按别名表解析表头
    pub fn resolve(headers: &[String], fields: &[LogicalField]) -> Self {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut columns = HashMap::new();
        let mut missing = Vec::new();

        for field in fields {
            let aliases = field.aliases();
            match normalized.iter().position(|h| aliases.contains(&h.as_str())) {
                Some(idx) => {
                    columns.insert(*field, idx);
                }
                None => missing.push(*field),
            }
        }

        Self { columns, missing }
    }

    pub fn column(&self, field: LogicalField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn missing(&self) -> &[LogicalField] {
        &self.missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// 取行中某字段对应的单元格（列未解析或行过短时为空）
    pub fn cell<'a>(&self, row: &'a SheetRow, field: LogicalField) -> &'a CellValue {
        row.cell(self.column(field).unwrap_or(usize::MAX))
    }
}

// ==========================================
// 单元格类型转换
// ==========================================

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// 单元格 → 去空白文本（空值返回 None）
pub fn cell_text(cell: &CellValue) -> Option<String> {
    let text = match cell {
        CellValue::Empty => return None,
        CellValue::Text(s) => s.trim().to_string(),
        CellValue::Int(i) => i.to_string(),
        CellValue::Float(f) | CellValue::DateTime(f) => format_float(*f),
        CellValue::Bool(b) => b.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// 单元格 → 正整数
///
/// 接受整数单元格、小数部分为 0 的数值单元格、整数文本（允许 `.0` 结尾）
pub fn parse_positive_int(cell: &CellValue) -> Result<i64, String> {
    let value = match cell {
        CellValue::Int(i) => *i,
        CellValue::Float(f) => {
            if !f.is_finite() || f.fract() != 0.0 || f.abs() > i64::MAX as f64 {
                return Err(format!("{} 不是整数", f));
            }
            *f as i64
        }
        CellValue::Text(s) => {
            let trimmed = s.trim();
            let digits = match trimmed.split_once('.') {
                Some((int_part, frac)) if !frac.is_empty() && frac.chars().all(|c| c == '0') => {
                    int_part
                }
                _ => trimmed,
            };
            digits
                .parse::<i64>()
                .map_err(|_| format!("{} 不是整数", trimmed))?
        }
        CellValue::Empty => return Err("值为空".to_string()),
        CellValue::Bool(b) => return Err(format!("{} 不是整数", b)),
        CellValue::DateTime(_) => return Err("日期单元格不是整数".to_string()),
    };

    if value <= 0 {
        return Err(format!("{} 必须为正整数", value));
    }
    Ok(value)
}

/// 1900 日期系统的序列值起点
///
/// 该系统把 1900 年当作闰年，序列值 60 对应不存在的 1900-02-29；
/// 60 之前按 1899-12-31 起算，61 起按 1899-12-30 起算。
fn serial_epoch(day: u64) -> Option<NaiveDate> {
    if day < 60 {
        NaiveDate::from_ymd_opt(1899, 12, 31)
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)
    }
}

/// 日期序列值 → 日期（忽略小数部分的时刻；序列值 60 无对应日期）
pub fn date_from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial >= 2_958_466.0 {
        return None;
    }
    let day = serial.floor() as u64;
    if day == 60 {
        return None;
    }
    serial_epoch(day)?.checked_add_days(Days::new(day))
}

const TEXT_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];
const TEXT_DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

fn parse_text_date(text: &str) -> Option<NaiveDate> {
    // 8 位纯数字按 YYYYMMDD，其余纯数字按序列值
    if text.len() == 8 && text.chars().all(|c| c.is_ascii_digit()) {
        return NaiveDate::parse_from_str(text, "%Y%m%d").ok();
    }
    if let Ok(serial) = text.parse::<f64>() {
        return date_from_serial(serial);
    }

    for fmt in TEXT_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(date);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    for fmt in TEXT_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// 单元格 → 日期
pub fn parse_date(cell: &CellValue) -> Result<NaiveDate, String> {
    let parsed = match cell {
        CellValue::Int(i) => date_from_serial(*i as f64),
        CellValue::Float(f) | CellValue::DateTime(f) => date_from_serial(*f),
        CellValue::Text(s) => parse_text_date(s.trim()),
        CellValue::Empty => return Err("值为空".to_string()),
        CellValue::Bool(b) => return Err(format!("{} 不是日期", b)),
    };
    parsed.ok_or_else(|| match cell_text(cell) {
        Some(text) => format!("无法解析日期: {}", text),
        None => "无法解析日期".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_aliases_case_insensitive() {
        let map = ColumnMap::resolve(
            &headers(&["  PO Number ", "Cantidad Pares", "CARTONES", "CFMXF Date"]),
            &PO_FIELDS,
        );
        assert!(map.is_complete());
        assert_eq!(map.column(LogicalField::PoNumber), Some(0));
        assert_eq!(map.column(LogicalField::UnitCount), Some(1));
        assert_eq!(map.column(LogicalField::CartonCount), Some(2));
        assert_eq!(map.column(LogicalField::ShipDate), Some(3));
    }

    #[test]
    fn test_resolve_first_matching_header_wins() {
        let map = ColumnMap::resolve(&headers(&["qty", "Style", "SKU", "Carton", "PO"]), &CARTON_FIELDS);
        assert_eq!(map.column(LogicalField::ProductSku), Some(1));
        assert_eq!(map.column(LogicalField::UnitsPerCarton), Some(0));
    }

    #[test]
    fn test_resolve_reports_missing_fields() {
        let map = ColumnMap::resolve(&headers(&["carton", "sku", "po"]), &CARTON_FIELDS);
        assert!(!map.is_complete());
        assert_eq!(map.missing(), &[LogicalField::UnitsPerCarton]);
    }

    #[test]
    fn test_parse_positive_int() {
        assert_eq!(parse_positive_int(&CellValue::Int(12)), Ok(12));
        assert_eq!(parse_positive_int(&CellValue::Float(12.0)), Ok(12));
        assert_eq!(parse_positive_int(&CellValue::from("12.0")), Ok(12));
        assert_eq!(parse_positive_int(&CellValue::from(" 7 ")), Ok(7));
        assert!(parse_positive_int(&CellValue::Float(12.5)).is_err());
        assert!(parse_positive_int(&CellValue::from("12.5")).is_err());
        assert!(parse_positive_int(&CellValue::from("abc")).is_err());
        assert!(parse_positive_int(&CellValue::Int(0)).is_err());
        assert!(parse_positive_int(&CellValue::Int(-3)).is_err());
        assert!(parse_positive_int(&CellValue::Empty).is_err());
    }

    #[test]
    fn test_parse_date_serial_and_text() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        // 45366 = 2024-03-15
        assert_eq!(parse_date(&CellValue::Int(45366)), Ok(expected));
        assert_eq!(parse_date(&CellValue::DateTime(45366.75)), Ok(expected));
        assert_eq!(parse_date(&CellValue::from("45366")), Ok(expected));
        assert_eq!(parse_date(&CellValue::from("2024-03-15")), Ok(expected));
        assert_eq!(parse_date(&CellValue::from("2024/03/15")), Ok(expected));
        assert_eq!(parse_date(&CellValue::from("15/03/2024")), Ok(expected));
        assert_eq!(parse_date(&CellValue::from("20240315")), Ok(expected));
        assert_eq!(parse_date(&CellValue::from("2024-03-15T08:30:00Z")), Ok(expected));
        assert_eq!(parse_date(&CellValue::from("2024-03-15 08:30:00")), Ok(expected));
        assert!(parse_date(&CellValue::from("next tuesday")).is_err());
        assert!(parse_date(&CellValue::Empty).is_err());
        assert!(parse_date(&CellValue::Int(0)).is_err());
    }

    #[test]
    fn test_early_1900_serials() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d);
        assert_eq!(date_from_serial(1.0), date(1900, 1, 1));
        assert_eq!(date_from_serial(59.0), date(1900, 2, 28));
        assert_eq!(date_from_serial(60.0), None);
        assert_eq!(date_from_serial(61.0), date(1900, 3, 1));
        assert!(parse_date(&CellValue::Int(60)).is_err());
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&CellValue::from("  PO-1 ")), Some("PO-1".to_string()));
        assert_eq!(cell_text(&CellValue::Float(4500123.0)), Some("4500123".to_string()));
        assert_eq!(cell_text(&CellValue::Int(77)), Some("77".to_string()));
        assert_eq!(cell_text(&CellValue::Empty), None);
    }
}
