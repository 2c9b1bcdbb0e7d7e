// ==========================================
// 发运导入与对账引擎 - 箱型分类器
// ==========================================
// 规则: 按箱号分组，不同 SKU 数 = 1 → MONO，> 1 → MUSICAL
// 红线: 不信任源文件中的任何箱型列；结果与行顺序无关
// ==========================================

use crate::domain::import::{CartonCandidate, CartonComposition};
use crate::domain::types::CartonKind;
use crate::importer::shipping_importer_trait::CartonClassifier as CartonClassifierTrait;
use std::collections::{BTreeSet, HashMap, HashSet};

/// 按不同 SKU 数量判定箱型
pub fn kind_for_sku_count(distinct_skus: usize) -> CartonKind {
    if distinct_skus > 1 {
        CartonKind::Musical
    } else {
        CartonKind::Mono
    }
}

pub struct CartonClassifier;

impl CartonClassifierTrait for CartonClassifier {
    fn classify(&self, cartons: Vec<CartonCandidate>) -> Vec<CartonCandidate> {
        let mut skus_by_carton: HashMap<String, HashSet<String>> = HashMap::new();
        for carton in &cartons {
            skus_by_carton
                .entry(carton.carton_id.clone())
                .or_default()
                .insert(carton.product_sku.clone());
        }

        cartons
            .into_iter()
            .map(|mut carton| {
                let distinct = skus_by_carton
                    .get(&carton.carton_id)
                    .map(HashSet::len)
                    .unwrap_or(1);
                carton.carton_kind = Some(kind_for_sku_count(distinct));
                carton
            })
            .collect()
    }

    fn summarize(&self, cartons: &[CartonCandidate]) -> Vec<CartonComposition> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, (BTreeSet<&str>, i64)> = HashMap::new();

        for carton in cartons {
            let entry = groups.entry(carton.carton_id.as_str()).or_insert_with(|| {
                order.push(carton.carton_id.as_str());
                (BTreeSet::new(), 0)
            });
            entry.0.insert(carton.product_sku.as_str());
            entry.1 = entry.1.saturating_add(carton.expected_units_per_carton);
        }

        order
            .into_iter()
            .filter_map(|carton_id| {
                groups.get(carton_id).map(|(skus, total_units)| CartonComposition {
                    carton_id: carton_id.to_string(),
                    carton_kind: kind_for_sku_count(skus.len()),
                    skus: skus.iter().map(|s| s.to_string()).collect(),
                    total_units: *total_units,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(carton: &str, sku: &str, units: i64) -> CartonCandidate {
        CartonCandidate {
            carton_id: carton.to_string(),
            product_sku: sku.to_string(),
            expected_units_per_carton: units,
            parent_po_number: "PO-1".to_string(),
            carton_kind: Some(CartonKind::Musical),
            row_number: 2,
        }
    }

    #[test]
    fn test_classify_mono_and_musical() {
        let classified = CartonClassifier.classify(vec![
            line("C-1", "A", 12),
            line("C-2", "A", 6),
            line("C-2", "B", 6),
            line("C-1", "A", 12),
        ]);
        let kinds: Vec<(String, CartonKind)> = classified
            .iter()
            .map(|c| (c.carton_id.clone(), c.carton_kind.unwrap()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("C-1".to_string(), CartonKind::Mono),
                ("C-2".to_string(), CartonKind::Musical),
                ("C-2".to_string(), CartonKind::Musical),
                ("C-1".to_string(), CartonKind::Mono),
            ]
        );
    }

    #[test]
    fn test_classification_is_order_independent() {
        let forward = vec![line("C-1", "A", 6), line("C-1", "B", 6), line("C-2", "A", 12)];
        let mut backward = forward.clone();
        backward.reverse();

        let kind_of = |lines: Vec<CartonCandidate>| {
            let mut kinds: Vec<(String, String, CartonKind)> = CartonClassifier
                .classify(lines)
                .into_iter()
                .map(|c| (c.carton_id, c.product_sku, c.carton_kind.unwrap()))
                .collect();
            kinds.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
            kinds
        };
        assert_eq!(kind_of(forward), kind_of(backward));
    }

    #[test]
    fn test_summarize_compositions() {
        let summary = CartonClassifier.summarize(&[
            line("C-2", "B", 6),
            line("C-1", "A", 12),
            line("C-2", "A", 6),
        ]);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].carton_id, "C-2");
        assert_eq!(summary[0].carton_kind, CartonKind::Musical);
        assert_eq!(summary[0].skus, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(summary[0].total_units, 12);
        assert_eq!(summary[1].carton_kind, CartonKind::Mono);
    }

    #[test]
    fn test_summarize_total_saturates() {
        let summary = CartonClassifier.summarize(&[
            line("C-1", "A", i64::MAX),
            line("C-1", "B", i64::MAX),
        ]);
        assert_eq!(summary[0].carton_kind, CartonKind::Musical);
        assert_eq!(summary[0].total_units, i64::MAX);
    }
}
