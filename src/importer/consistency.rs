// ==========================================
// 发运导入与对账引擎 - 箱单一致性校验器
// ==========================================
// 规则:
// 1. 同一 (箱号, SKU) 的后续行与首行数量不同 → QUANTITY_MISMATCH
// 2. 同一 (箱号, SKU) 的后续行与首行所属 PO 不同 → PO_MISMATCH
// 3. 同一箱号的不同 SKU 指向不同 PO → CARTON_PO_MISMATCH
// 任一错误即判定整批无效，在对账之前拦截
// ==========================================

use crate::domain::import::{CartonCandidate, ConsistencyError, ConsistencyReport};
use crate::importer::shipping_importer_trait::ConsistencyValidator as ConsistencyValidatorTrait;
use std::collections::HashMap;
use tracing::warn;

pub struct ConsistencyValidator;

impl ConsistencyValidatorTrait for ConsistencyValidator {
    fn validate(&self, cartons: &[CartonCandidate]) -> ConsistencyReport {
        let mut errors = Vec::new();

        // (箱号, SKU) → 首行
        let mut first_line: HashMap<(&str, &str), &CartonCandidate> = HashMap::new();
        // 按首次出现顺序保存每个 (箱号, SKU) 的首行
        let mut canonical: Vec<&CartonCandidate> = Vec::new();

        for carton in cartons {
            let key = (carton.carton_id.as_str(), carton.product_sku.as_str());
            match first_line.get(&key) {
                None => {
                    first_line.insert(key, carton);
                    canonical.push(carton);
                }
                Some(first) => {
                    if first.expected_units_per_carton != carton.expected_units_per_carton {
                        errors.push(ConsistencyError::QuantityMismatch {
                            carton_id: carton.carton_id.clone(),
                            product_sku: carton.product_sku.clone(),
                            first_value: first.expected_units_per_carton,
                            conflicting_value: carton.expected_units_per_carton,
                            row_number: carton.row_number,
                        });
                    }
                    if first.parent_po_number != carton.parent_po_number {
                        errors.push(ConsistencyError::PoMismatch {
                            carton_id: carton.carton_id.clone(),
                            product_sku: carton.product_sku.clone(),
                            first_po: first.parent_po_number.clone(),
                            conflicting_po: carton.parent_po_number.clone(),
                            row_number: carton.row_number,
                        });
                    }
                }
            }
        }

        // 箱号 → 首个 PO；每个箱号最多报告一次
        let mut carton_po: HashMap<&str, &str> = HashMap::new();
        let mut reported: Vec<&str> = Vec::new();
        for line in canonical {
            let carton_id = line.carton_id.as_str();
            let po = line.parent_po_number.as_str();
            match carton_po.get(carton_id) {
                None => {
                    carton_po.insert(carton_id, po);
                }
                Some(first_po) if *first_po != po && !reported.contains(&carton_id) => {
                    reported.push(carton_id);
                    errors.push(ConsistencyError::CartonPoMismatch {
                        carton_id: carton_id.to_string(),
                        first_po: first_po.to_string(),
                        conflicting_po: po.to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        if !errors.is_empty() {
            warn!(errors = errors.len(), "箱单一致性校验失败");
        }

        ConsistencyReport {
            valid: errors.is_empty(),
            errors,
        }
    }
}
