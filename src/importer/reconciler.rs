// ==========================================
// 发运导入与对账引擎 - 总量对账器
// ==========================================
// 规则:
// - 引用不存在 PO 的箱单行 → PO_NOT_FOUND，且不计入任何合计
// - 每个 PO: 箱单行数量合计 ≠ 声明总数量 → UNITS_MISMATCH
// - 每个 PO: 不同箱号数 ≠ 声明箱数 → CARTONS_MISMATCH
// - difference = found - expected，整数精确比较
// - 合计按 i128 累加；超出 i64 的合计按 i64::MAX 报告，必然不平
// 纯函数、确定性、幂等
// ==========================================

use crate::domain::import::{
    CartonCandidate, Discrepancy, PoCandidate, PoSummary, ReconciliationReport,
};
use crate::importer::shipping_importer_trait::TotalsReconciler as TotalsReconcilerTrait;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub struct TotalsReconciler;

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

impl TotalsReconcilerTrait for TotalsReconciler {
    fn reconcile(&self, pos: &[PoCandidate], cartons: &[CartonCandidate]) -> ReconciliationReport {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (idx, po) in pos.iter().enumerate() {
            index.entry(po.po_number.as_str()).or_insert(idx);
        }

        let mut found_units = vec![0i128; pos.len()];
        let mut found_cartons: Vec<HashSet<&str>> = vec![HashSet::new(); pos.len()];
        let mut discrepancies = Vec::new();

        for carton in cartons {
            match index.get(carton.parent_po_number.as_str()) {
                Some(&idx) => {
                    found_units[idx] += i128::from(carton.expected_units_per_carton);
                    found_cartons[idx].insert(carton.carton_id.as_str());
                }
                None => discrepancies.push(Discrepancy::PoNotFound {
                    carton_id: carton.carton_id.clone(),
                    po_number: carton.parent_po_number.clone(),
                    row_number: carton.row_number,
                }),
            }
        }

        let mut per_po_summary = Vec::with_capacity(pos.len());
        for (idx, po) in pos.iter().enumerate() {
            // 重复 PO 只按首次出现计
            if index.get(po.po_number.as_str()) != Some(&idx) {
                continue;
            }

            let exact_units = found_units[idx];
            let units = saturate(exact_units);
            let carton_count = found_cartons[idx].len() as i64;

            if exact_units != i128::from(po.declared_unit_count) {
                discrepancies.push(Discrepancy::UnitsMismatch {
                    po_number: po.po_number.clone(),
                    expected: po.declared_unit_count,
                    found: units,
                    difference: saturate(exact_units - i128::from(po.declared_unit_count)),
                });
            }
            if carton_count != po.declared_carton_count {
                discrepancies.push(Discrepancy::CartonsMismatch {
                    po_number: po.po_number.clone(),
                    expected: po.declared_carton_count,
                    found: carton_count,
                    difference: carton_count - po.declared_carton_count,
                });
            }

            per_po_summary.push(PoSummary {
                po_number: po.po_number.clone(),
                expected_units: po.declared_unit_count,
                found_units: units,
                expected_cartons: po.declared_carton_count,
                found_cartons: carton_count,
            });
        }

        debug!(
            pos = pos.len(),
            cartons = cartons.len(),
            discrepancies = discrepancies.len(),
            "对账完成"
        );

        ReconciliationReport {
            balanced: discrepancies.is_empty(),
            discrepancies,
            per_po_summary,
        }
    }
}
