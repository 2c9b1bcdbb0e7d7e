// ==========================================
// 发运导入与对账引擎 - 工作簿读取
// ==========================================
// 支持: Excel (.xlsx/.xlsm/.xls/.ods) / CSV 目录 (PO.csv + Cartons.csv) / 内存
// 职责: 把不同来源统一为 SheetData（表头 + 带行号的单元格行）
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Data, Reader, Sheets};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

// ==========================================
// CellValue - 单元格值
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// 表格原生日期（1900 日期系统序列值）
    DateTime(f64),
}

impl CellValue {
    /// 空值或纯空白文本
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::from(s.as_str())
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::from(s.as_str()),
            Data::Int(i) => CellValue::Int(*i),
            Data::Float(f) => CellValue::Float(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(e) => CellValue::Text(format!("{:?}", e)),
        }
    }
}

// ==========================================
// SheetData - 单个工作表内容
// ==========================================
static EMPTY_CELL: CellValue = CellValue::Empty;

#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub row_number: usize, // 1-based，表头所在行 = 1
    pub cells: Vec<CellValue>,
}

impl SheetRow {
    pub fn cell(&self, idx: usize) -> &CellValue {
        self.cells.get(idx).unwrap_or(&EMPTY_CELL)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(CellValue::is_blank)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

// ==========================================
// WorkbookSource Trait
// ==========================================
// 实现者: ExcelWorkbook, CsvWorkbook, MemoryWorkbook
pub trait WorkbookSource {
    /// 来源名称（文件名），写入 ImportRecord.file_name
    fn source_name(&self) -> &str;

    fn sheet_names(&self) -> Vec<String>;

    fn read_sheet(&mut self, name: &str) -> ImportResult<SheetData>;

    /// 按名称查找工作表（忽略大小写与首尾空白），返回实际名称
    fn find_sheet(&self, wanted: &str) -> Option<String> {
        let wanted = wanted.trim();
        self.sheet_names()
            .into_iter()
            .find(|name| name.trim().eq_ignore_ascii_case(wanted))
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

// ==========================================
// ExcelWorkbook - calamine 实现
// ==========================================
pub struct ExcelWorkbook {
    name: String,
    workbook: Sheets<BufReader<File>>,
}

impl ExcelWorkbook {
    pub fn open(path: &Path) -> ImportResult<Self> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let workbook = open_workbook_auto(path)?;
        Ok(Self {
            name: file_name_of(path),
            workbook,
        })
    }
}

impl WorkbookSource for ExcelWorkbook {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names()
    }

    fn read_sheet(&mut self, name: &str) -> ImportResult<SheetData> {
        let range = self.workbook.worksheet_range(name)?;

        // range 从第一个非空单元格开始，行号按工作表绝对位置换算
        let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
        let mut rows_iter = range.rows();

        let headers: Vec<String> = match rows_iter.next() {
            Some(header_row) => header_row
                .iter()
                .map(|cell| match CellValue::from(cell) {
                    CellValue::Text(s) => s.trim().to_string(),
                    CellValue::Empty => String::new(),
                    CellValue::Int(i) => i.to_string(),
                    CellValue::Float(f) | CellValue::DateTime(f) => f.to_string(),
                    CellValue::Bool(b) => b.to_string(),
                })
                .collect(),
            None => Vec::new(),
        };

        let rows: Vec<SheetRow> = rows_iter
            .enumerate()
            .map(|(idx, cells)| SheetRow {
                row_number: first_row + idx + 2,
                cells: cells.iter().map(CellValue::from).collect(),
            })
            .collect();

        debug!(sheet = name, rows = rows.len(), "Excel 工作表读取完成");
        Ok(SheetData {
            name: name.to_string(),
            headers,
            rows,
        })
    }
}

// ==========================================
// CsvWorkbook - CSV 目录实现
// ==========================================
// 目录下每个 .csv 文件视为一个工作表，表名 = 文件名（不含扩展名）
pub struct CsvWorkbook {
    name: String,
    sheets: Vec<(String, PathBuf)>,
}

impl CsvWorkbook {
    pub fn open(dir: &Path) -> ImportResult<Self> {
        if !dir.exists() {
            return Err(ImportError::FileNotFound(dir.display().to_string()));
        }
        if !dir.is_dir() {
            return Err(ImportError::UnsupportedFormat(dir.display().to_string()));
        }

        let mut sheets = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if !is_csv {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                sheets.push((stem.to_string(), path.clone()));
            }
        }
        sheets.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(Self {
            name: file_name_of(dir),
            sheets,
        })
    }
}

impl WorkbookSource for CsvWorkbook {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.clone()).collect()
    }

    fn read_sheet(&mut self, name: &str) -> ImportResult<SheetData> {
        let path = self
            .sheets
            .iter()
            .find(|(sheet, _)| sheet == name)
            .map(|(_, path)| path.clone())
            .ok_or_else(|| ImportError::MissingSheet {
                sheet: name.to_string(),
            })?;

        let file = File::open(&path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            let row_number = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(idx + 2);
            rows.push(SheetRow {
                row_number,
                cells: record.iter().map(CellValue::from).collect(),
            });
        }

        debug!(sheet = name, rows = rows.len(), "CSV 工作表读取完成");
        Ok(SheetData {
            name: name.to_string(),
            headers,
            rows,
        })
    }
}

// ==========================================
// MemoryWorkbook - 内存实现
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    name: String,
    sheets: Vec<SheetData>,
}

impl MemoryWorkbook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sheets: Vec::new(),
        }
    }

    /// 追加工作表；数据行从第 2 行开始编号
    pub fn with_sheet(mut self, name: &str, headers: &[&str], rows: Vec<Vec<CellValue>>) -> Self {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, cells)| SheetRow {
                row_number: idx + 2,
                cells,
            })
            .collect();
        self.sheets.push(SheetData {
            name: name.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        });
        self
    }
}

impl WorkbookSource for MemoryWorkbook {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn read_sheet(&mut self, name: &str) -> ImportResult<SheetData> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| ImportError::MissingSheet {
                sheet: name.to_string(),
            })
    }
}

// ==========================================
// UniversalWorkbookOpener - 按路径自动选择来源
// ==========================================
pub struct UniversalWorkbookOpener;

impl UniversalWorkbookOpener {
    pub fn open(path: &Path) -> ImportResult<Box<dyn WorkbookSource>> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        if path.is_dir() {
            return Ok(Box::new(CsvWorkbook::open(path)?));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Box::new(ExcelWorkbook::open(path)?)),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_csv_workbook_reads_sheets_with_row_numbers() {
        let dir = TempDir::new().unwrap();
        let mut po = File::create(dir.path().join("PO.csv")).unwrap();
        writeln!(po, "PO Number,Units,Cartons,Ship Date").unwrap();
        writeln!(po, "PO-1,24,2,2024-03-15").unwrap();
        writeln!(po, ",,,").unwrap();
        writeln!(po, "PO-2,12,1,2024-03-16").unwrap();
        File::create(dir.path().join("Cartons.csv")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();

        let mut wb = CsvWorkbook::open(dir.path()).unwrap();
        assert_eq!(wb.sheet_names(), vec!["Cartons".to_string(), "PO".to_string()]);
        assert_eq!(wb.find_sheet("po"), Some("PO".to_string()));

        let sheet = wb.read_sheet("PO").unwrap();
        assert_eq!(sheet.headers[0], "PO Number");
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rows[0].row_number, 2);
        assert!(sheet.rows[1].is_blank());
        assert_eq!(sheet.rows[2].row_number, 4);
        assert_eq!(sheet.rows[2].cell(0), &CellValue::Text("PO-2".to_string()));
        assert_eq!(sheet.rows[2].cell(9), &CellValue::Empty);
    }

    #[test]
    fn test_opener_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ship.txt");
        File::create(&path).unwrap();
        assert!(matches!(
            UniversalWorkbookOpener::open(&path),
            Err(ImportError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            UniversalWorkbookOpener::open(&dir.path().join("missing.xlsx")),
            Err(ImportError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_memory_workbook_missing_sheet() {
        let mut wb = MemoryWorkbook::new("mem").with_sheet("PO", &["po"], vec![]);
        assert!(matches!(
            wb.read_sheet("Cartons"),
            Err(ImportError::MissingSheet { .. })
        ));
    }
}
