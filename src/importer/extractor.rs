// ==========================================
// 发运导入与对账引擎 - 表格抽取器
// ==========================================
// 职责: 工作簿 → PO 候选 + 箱单候选 + 行级错误
// 顺序: 先检查两个工作表都存在，再逐行解析
// 红线: 行级错误只记录并跳过该行，不中断导入
// ==========================================

use crate::domain::import::{CartonCandidate, ExtractionResult, PoCandidate, RowError};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::{
    cell_text, parse_date, parse_positive_int, ColumnMap, LogicalField, CARTON_FIELDS, PO_FIELDS,
};
use crate::importer::shipping_importer_trait::RecordExtractor;
use crate::importer::workbook::{SheetData, SheetRow, WorkbookSource};
use std::collections::HashMap;
use tracing::{debug, warn};

pub struct ShippingExtractor;

impl RecordExtractor for ShippingExtractor {
    fn extract(
        &self,
        source: &mut dyn WorkbookSource,
        po_sheet: &str,
        carton_sheet: &str,
    ) -> ImportResult<ExtractionResult> {
        let po_name = source.find_sheet(po_sheet).ok_or_else(|| ImportError::MissingSheet {
            sheet: po_sheet.to_string(),
        })?;
        let carton_name = source
            .find_sheet(carton_sheet)
            .ok_or_else(|| ImportError::MissingSheet {
                sheet: carton_sheet.to_string(),
            })?;

        let mut result = ExtractionResult::default();

        let po_data = source.read_sheet(&po_name)?;
        let (pos, po_errors) = self.extract_pos(&po_data);
        result.pos = pos;
        result.errors.extend(po_errors);

        let carton_data = source.read_sheet(&carton_name)?;
        let (cartons, carton_errors) = self.extract_cartons(&carton_data);
        result.cartons = cartons;
        result.errors.extend(carton_errors);

        debug!(
            pos = result.pos.len(),
            cartons = result.cartons.len(),
            row_errors = result.errors.len(),
            "抽取完成"
        );
        Ok(result)
    }
}

impl ShippingExtractor {
    /// 缺列时每个非空数据行产生一条行级错误
    fn missing_column_errors(sheet: &SheetData, columns: &ColumnMap) -> Vec<RowError> {
        let labels: Vec<&str> = columns.missing().iter().map(|f| f.label()).collect();
        warn!(sheet = %sheet.name, missing = ?labels, "工作表缺少必需列");
        sheet
            .rows
            .iter()
            .filter(|row| !row.is_blank())
            .map(|row| {
                RowError::new(
                    &sheet.name,
                    row.row_number,
                    format!("缺少必需列: {}", labels.join(", ")),
                )
            })
            .collect()
    }

    fn extract_pos(&self, sheet: &SheetData) -> (Vec<PoCandidate>, Vec<RowError>) {
        let columns = ColumnMap::resolve(&sheet.headers, &PO_FIELDS);
        if !columns.is_complete() {
            return (Vec::new(), Self::missing_column_errors(sheet, &columns));
        }

        let mut pos = Vec::new();
        let mut errors = Vec::new();
        let mut first_seen: HashMap<String, usize> = HashMap::new();

        for row in sheet.rows.iter().filter(|r| !r.is_blank()) {
            match Self::parse_po_row(sheet, &columns, row) {
                Ok(po) => {
                    if let Some(first_row) = first_seen.get(&po.po_number) {
                        let mut err = RowError::new(
                            &sheet.name,
                            row.row_number,
                            format!("PO 编号重复，首次出现于第 {} 行", first_row),
                        );
                        err.po_number = Some(po.po_number.clone());
                        errors.push(err);
                        continue;
                    }
                    first_seen.insert(po.po_number.clone(), row.row_number);
                    pos.push(po);
                }
                Err(err) => errors.push(err),
            }
        }

        (pos, errors)
    }

    fn parse_po_row(
        sheet: &SheetData,
        columns: &ColumnMap,
        row: &SheetRow,
    ) -> Result<PoCandidate, RowError> {
        let field_error = |po_number: Option<&String>, field: LogicalField, message: String| {
            let mut err = RowError::new(
                &sheet.name,
                row.row_number,
                format!("{}: {}", field.label(), message),
            );
            err.po_number = po_number.cloned();
            err
        };

        let po_number = cell_text(columns.cell(row, LogicalField::PoNumber))
            .ok_or_else(|| field_error(None, LogicalField::PoNumber, "值为空".to_string()))?;

        let cell = |field| columns.cell(row, field);

        let declared_unit_count = parse_positive_int(cell(LogicalField::UnitCount))
            .map_err(|m| field_error(Some(&po_number), LogicalField::UnitCount, m))?;
        let declared_carton_count = parse_positive_int(cell(LogicalField::CartonCount))
            .map_err(|m| field_error(Some(&po_number), LogicalField::CartonCount, m))?;
        let committed_ship_date = parse_date(cell(LogicalField::ShipDate))
            .map_err(|m| field_error(Some(&po_number), LogicalField::ShipDate, m))?;

        Ok(PoCandidate {
            po_number,
            declared_unit_count,
            declared_carton_count,
            committed_ship_date,
            row_number: row.row_number,
        })
    }

    fn extract_cartons(&self, sheet: &SheetData) -> (Vec<CartonCandidate>, Vec<RowError>) {
        let columns = ColumnMap::resolve(&sheet.headers, &CARTON_FIELDS);
        if !columns.is_complete() {
            return (Vec::new(), Self::missing_column_errors(sheet, &columns));
        }

        let mut cartons = Vec::new();
        let mut errors = Vec::new();
        for row in sheet.rows.iter().filter(|r| !r.is_blank()) {
            match Self::parse_carton_row(sheet, &columns, row) {
                Ok(carton) => cartons.push(carton),
                Err(err) => errors.push(err),
            }
        }
        (cartons, errors)
    }

    fn parse_carton_row(
        sheet: &SheetData,
        columns: &ColumnMap,
        row: &SheetRow,
    ) -> Result<CartonCandidate, RowError> {
        let text = |field| cell_text(columns.cell(row, field));
        let carton_id_hint = text(LogicalField::CartonId);
        let po_hint = text(LogicalField::PoNumber);

        let field_error = |field: LogicalField, message: &str| {
            let mut err = RowError::new(
                &sheet.name,
                row.row_number,
                format!("{}: {}", field.label(), message),
            );
            err.carton_id = carton_id_hint.clone();
            err.po_number = po_hint.clone();
            err
        };

        let carton_id = carton_id_hint
            .clone()
            .ok_or_else(|| field_error(LogicalField::CartonId, "值为空"))?;
        let product_sku =
            text(LogicalField::ProductSku).ok_or_else(|| field_error(LogicalField::ProductSku, "值为空"))?;

        let expected_units_per_carton = parse_positive_int(columns.cell(row, LogicalField::UnitsPerCarton))
            .map_err(|m| field_error(LogicalField::UnitsPerCarton, &m))?;

        let parent_po_number = po_hint
            .clone()
            .ok_or_else(|| field_error(LogicalField::PoNumber, "值为空"))?;

        Ok(CartonCandidate {
            carton_id,
            product_sku,
            expected_units_per_carton,
            parent_po_number,
            carton_kind: None,
            row_number: row.row_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::workbook::{CellValue, MemoryWorkbook};

    fn t(s: &str) -> CellValue {
        CellValue::from(s)
    }

    fn workbook(po_rows: Vec<Vec<CellValue>>, carton_rows: Vec<Vec<CellValue>>) -> MemoryWorkbook {
        MemoryWorkbook::new("test.xlsx")
            .with_sheet("PO", &["PO Number", "Units", "Cartons", "Ship Date"], po_rows)
            .with_sheet("Cartons", &["Carton ID", "SKU", "Qty", "PO"], carton_rows)
    }

    #[test]
    fn test_extract_valid_rows() {
        let mut wb = workbook(
            vec![vec![t("PO-1"), CellValue::Int(24), CellValue::Float(2.0), CellValue::DateTime(45366.0)]],
            vec![
                vec![t("C-1"), t("SKU-A"), CellValue::Int(12), t("PO-1")],
                vec![t("C-2"), t("SKU-A"), t("12"), t("PO-1")],
            ],
        );
        let result = ShippingExtractor.extract(&mut wb, "PO", "Cartons").unwrap();
        assert!(result.errors.is_empty());
        assert_eq!(result.pos.len(), 1);
        assert_eq!(result.pos[0].declared_carton_count, 2);
        assert_eq!(result.cartons.len(), 2);
        assert!(result.cartons.iter().all(|c| c.carton_kind.is_none()));
    }

    #[test]
    fn test_row_errors_skip_row_and_continue() {
        let mut wb = workbook(
            vec![
                vec![t("PO-1"), t("abc"), CellValue::Int(2), t("2024-03-15")],
                vec![t("PO-2"), CellValue::Int(12), CellValue::Int(1), t("2024-03-15")],
                vec![CellValue::Empty, CellValue::Empty, CellValue::Empty, CellValue::Empty],
                vec![t("PO-3"), CellValue::Int(12), CellValue::Int(1), t("someday")],
            ],
            vec![vec![t("C-1"), CellValue::Empty, CellValue::Int(12), t("PO-2")]],
        );
        let result = ShippingExtractor.extract(&mut wb, "PO", "Cartons").unwrap();
        assert_eq!(result.pos.len(), 1);
        assert_eq!(result.pos[0].po_number, "PO-2");

        let rows: Vec<(String, usize)> = result
            .errors
            .iter()
            .map(|e| (e.sheet.clone(), e.row_number))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("PO".to_string(), 2),
                ("PO".to_string(), 5),
                ("Cartons".to_string(), 2)
            ]
        );
        assert!(result.errors[0].message.contains("总数量"));
        assert_eq!(result.errors[2].carton_id.as_deref(), Some("C-1"));
    }

    #[test]
    fn test_duplicate_po_keeps_first() {
        let mut wb = workbook(
            vec![
                vec![t("PO-1"), CellValue::Int(24), CellValue::Int(2), t("2024-03-15")],
                vec![t("PO-1"), CellValue::Int(99), CellValue::Int(9), t("2024-03-15")],
            ],
            vec![],
        );
        let result = ShippingExtractor.extract(&mut wb, "PO", "Cartons").unwrap();
        assert_eq!(result.pos.len(), 1);
        assert_eq!(result.pos[0].declared_unit_count, 24);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].row_number, 3);
    }

    #[test]
    fn test_missing_column_yields_row_error_per_row() {
        let mut wb = MemoryWorkbook::new("test.xlsx")
            .with_sheet(
                "PO",
                &["PO", "Units", "Cartons", "Date"],
                vec![vec![t("PO-1"), CellValue::Int(12), CellValue::Int(1), t("2024-03-15")]],
            )
            .with_sheet(
                "Cartons",
                &["Carton", "SKU", "PO"],
                vec![
                    vec![t("C-1"), t("A"), t("PO-1")],
                    vec![t("C-2"), t("A"), t("PO-1")],
                ],
            );
        let result = ShippingExtractor.extract(&mut wb, "PO", "Cartons").unwrap();
        assert_eq!(result.pos.len(), 1);
        assert!(result.cartons.is_empty());
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].message.contains("每箱数量"));
    }

    #[test]
    fn test_missing_sheet_is_structural_error() {
        let mut wb = MemoryWorkbook::new("test.xlsx").with_sheet("PO", &["PO"], vec![]);
        match ShippingExtractor.extract(&mut wb, "PO", "Cartons") {
            Err(ImportError::MissingSheet { sheet }) => assert_eq!(sheet, "Cartons"),
            other => panic!("unexpected: {:?}", other.map(|r| r.pos.len())),
        }
    }

    #[test]
    fn test_sheet_lookup_ignores_case() {
        let mut wb = MemoryWorkbook::new("test.xlsx")
            .with_sheet("po", &["PO Number", "Units", "Cartons", "Ship Date"], vec![])
            .with_sheet("CARTONS", &["Carton ID", "SKU", "Qty", "PO"], vec![]);
        let result = ShippingExtractor.extract(&mut wb, "PO", "Cartons").unwrap();
        assert!(result.pos.is_empty());
        assert!(result.errors.is_empty());
    }
}
