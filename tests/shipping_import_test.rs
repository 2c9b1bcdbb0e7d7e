// ==========================================
// 发运导入集成测试
// ==========================================
// 测试目标: 抽取 → 校验 → 分类 → 对账 → 落库 全流程
// ==========================================

mod test_helpers;

use shipping_import::config::ConfigManager;
use shipping_import::domain::import::{ConsistencyError, Discrepancy, ImportErrorKind};
use shipping_import::domain::types::{CartonKind, CartonStatus, PoStatus};
use shipping_import::importer::{ImportError, ShippingImporter, ShippingImporterImpl};
use shipping_import::logging;
use shipping_import::repository::{ShippingRepository, ShippingRepositoryImpl};
use std::sync::Arc;
use test_helpers::{
    carton_row, count_rows, create_test_db, memory_workbook, po_row, shared_connection,
    temp_dir, write_csv_workbook,
};

type Importer = ShippingImporterImpl<ShippingRepositoryImpl, ConfigManager>;

/// 创建测试用的导入器与仓储（共享连接）
fn create_test_importer(db_path: &str) -> (Importer, Arc<ShippingRepositoryImpl>) {
    let conn = shared_connection(db_path);
    let repo = Arc::new(ShippingRepositoryImpl::from_connection(conn.clone()));
    let config =
        Arc::new(ConfigManager::from_connection(conn).expect("Failed to create ConfigManager"));
    (ShippingImporterImpl::new(repo.clone(), config), repo)
}

// ==========================================
// 场景 A: 两个单品箱，总量平衡
// ==========================================
#[tokio::test]
async fn test_two_mono_cartons_balanced() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, repo) = create_test_importer(&db_path);

    let mut workbook = memory_workbook(
        "scenario_a.xlsx",
        vec![po_row("PO-1", 20, 2, "2024-03-15")],
        vec![
            carton_row("C1", "X", 10, "PO-1"),
            carton_row("C2", "X", 10, "PO-1"),
        ],
    );

    let result = importer
        .import_workbook(&mut workbook, Some("tester"))
        .await
        .expect("Import should succeed");

    assert!(result.record.is_complete());
    assert_eq!(result.record.file_name, "scenario_a.xlsx");
    assert_eq!(result.record.imported_by, "tester");
    assert_eq!(result.record.pos_persisted, 1);
    assert_eq!(result.record.cartons_persisted, 2);
    assert!(result
        .carton_compositions
        .iter()
        .all(|c| c.carton_kind == CartonKind::Mono));

    let po = repo.find_po_by_number("PO-1").await.unwrap().unwrap();
    assert_eq!(po.status, PoStatus::Imported);
    assert_eq!(po.declared_unit_count, 20);

    let lines = repo.find_cartons_by_po(po.id, None, None).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.carton_kind == CartonKind::Mono));
    assert!(lines.iter().all(|l| l.status == CartonStatus::Pending));

    assert_eq!(count_rows(&db_path, "shipping_import"), 1);
}

// ==========================================
// 场景 B: 同一箱号两个 SKU → 混装箱
// ==========================================
#[tokio::test]
async fn test_multi_sku_carton_is_musical() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, repo) = create_test_importer(&db_path);

    let mut workbook = memory_workbook(
        "scenario_b.xlsx",
        vec![po_row("PO-1", 15, 1, "2024-03-15")],
        vec![
            carton_row("C1", "X", 10, "PO-1"),
            carton_row("C1", "Y", 5, "PO-1"),
        ],
    );

    let result = importer
        .import_workbook(&mut workbook, None)
        .await
        .expect("Import should succeed");

    assert_eq!(result.record.imported_by, "system");
    assert_eq!(result.carton_compositions.len(), 1);
    let composition = &result.carton_compositions[0];
    assert_eq!(composition.carton_kind, CartonKind::Musical);
    assert_eq!(composition.skus, vec!["X".to_string(), "Y".to_string()]);
    assert_eq!(composition.total_units, 15);

    let lines = repo.find_carton_lines("C1").await.unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.carton_kind == CartonKind::Musical));
}

// ==========================================
// 场景 C: 声明 2 箱，实际 1 个箱号 → 不平，不落库
// ==========================================
#[tokio::test]
async fn test_carton_count_mismatch_rejects_import() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, _repo) = create_test_importer(&db_path);

    let mut workbook = memory_workbook(
        "scenario_c.xlsx",
        vec![po_row("PO-1", 15, 2, "2024-03-15")],
        vec![
            carton_row("C1", "X", 10, "PO-1"),
            carton_row("C1", "Y", 5, "PO-1"),
        ],
    );

    let err = importer
        .import_workbook(&mut workbook, None)
        .await
        .expect_err("Import should be rejected");

    match err {
        ImportError::Unbalanced { report } => {
            assert!(!report.balanced);
            assert_eq!(
                report.discrepancies,
                vec![Discrepancy::CartonsMismatch {
                    po_number: "PO-1".to_string(),
                    expected: 2,
                    found: 1,
                    difference: -1,
                }]
            );
            assert_eq!(report.per_po_summary[0].found_units, 15);
        }
        other => panic!("Expected Unbalanced, got {:?}", other),
    }

    assert_eq!(count_rows(&db_path, "purchase_order"), 0);
    assert_eq!(count_rows(&db_path, "po_carton"), 0);
    assert_eq!(count_rows(&db_path, "shipping_import"), 0);
}

// ==========================================
// 场景 D: PO-1 落库失败，PO-2 正常
// ==========================================
#[tokio::test]
async fn test_po_insert_failure_is_recorded_per_record() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");

    // 模拟 PO-1 的约束失败
    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_po_1 BEFORE INSERT ON purchase_order
             WHEN NEW.po_number = 'PO-1'
             BEGIN SELECT RAISE(ABORT, 'PO-1 rejected'); END;",
        )
        .unwrap();
    }

    let (importer, repo) = create_test_importer(&db_path);
    let mut workbook = memory_workbook(
        "scenario_d.xlsx",
        vec![
            po_row("PO-1", 20, 2, "2024-03-15"),
            po_row("PO-2", 6, 1, "2024-03-20"),
        ],
        vec![
            carton_row("C1", "X", 10, "PO-1"),
            carton_row("C2", "X", 10, "PO-1"),
            carton_row("C3", "Z", 6, "PO-2"),
        ],
    );

    let result = importer
        .import_workbook(&mut workbook, None)
        .await
        .expect("Import should complete with record-level errors");

    let record = &result.record;
    assert_eq!(record.pos_declared, 2);
    assert_eq!(record.pos_persisted, 1);
    assert_eq!(record.cartons_declared, 3);
    assert_eq!(record.cartons_persisted, 1);
    assert!(!record.is_complete());

    let po_errors: Vec<_> = record
        .errors
        .iter()
        .filter(|e| e.kind == ImportErrorKind::PoInsert)
        .collect();
    assert_eq!(po_errors.len(), 1);
    assert_eq!(po_errors[0].po_number.as_deref(), Some("PO-1"));
    assert!(po_errors[0].message.contains("PO-1 rejected"));

    let mut unresolved: Vec<&str> = record
        .errors
        .iter()
        .filter(|e| e.kind == ImportErrorKind::CartonInsert)
        .filter_map(|e| e.carton_id.as_deref())
        .collect();
    unresolved.sort_unstable();
    assert_eq!(unresolved, vec!["C1", "C2"]);

    assert!(repo.find_po_by_number("PO-1").await.unwrap().is_none());
    let po2 = repo.find_po_by_number("PO-2").await.unwrap().unwrap();
    let lines = repo.find_cartons_by_po(po2.id, None, None).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].carton_id, "C3");

    // 导入记录落库且错误列表完整
    let stored = repo.find_import_by_id(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.errors, record.errors);
    assert!(repo.last_complete_import().await.unwrap().is_none());
}

// ==========================================
// 一致性闸门: 同箱同 SKU 数量不同 → 不落库
// ==========================================
#[tokio::test]
async fn test_quantity_mismatch_never_reaches_persistence() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, _repo) = create_test_importer(&db_path);

    let mut workbook = memory_workbook(
        "qty_mismatch.xlsx",
        vec![po_row("PO-1", 22, 1, "2024-03-15")],
        vec![
            carton_row("C1", "X", 10, "PO-1"),
            carton_row("C1", "X", 12, "PO-1"),
        ],
    );

    let err = importer
        .import_workbook(&mut workbook, None)
        .await
        .expect_err("Import should be rejected");

    match err {
        ImportError::Inconsistent { errors } => {
            assert!(errors.iter().any(|e| matches!(
                e,
                ConsistencyError::QuantityMismatch { carton_id, first_value: 10, conflicting_value: 12, .. }
                    if carton_id == "C1"
            )));
        }
        other => panic!("Expected Inconsistent, got {:?}", other),
    }

    assert_eq!(count_rows(&db_path, "purchase_order"), 0);
    assert_eq!(count_rows(&db_path, "shipping_import"), 0);
}

// ==========================================
// 精确相等: 少 1 或多 1 都是 UNITS_MISMATCH
// ==========================================
#[tokio::test]
async fn test_units_off_by_one_is_mismatch() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, _repo) = create_test_importer(&db_path);

    for (found, difference) in [(99, -1), (101, 1)] {
        let mut workbook = memory_workbook(
            "units.xlsx",
            vec![po_row("PO-1", 100, 1, "2024-03-15")],
            vec![carton_row("C1", "X", found, "PO-1")],
        );

        let err = importer
            .import_workbook(&mut workbook, None)
            .await
            .expect_err("Import should be rejected");

        match err {
            ImportError::Unbalanced { report } => assert_eq!(
                report.discrepancies,
                vec![Discrepancy::UnitsMismatch {
                    po_number: "PO-1".to_string(),
                    expected: 100,
                    found,
                    difference,
                }]
            ),
            other => panic!("Expected Unbalanced, got {:?}", other),
        }
    }

    assert_eq!(count_rows(&db_path, "shipping_import"), 0);
}

// ==========================================
// 孤立箱单: 计入 PO_NOT_FOUND，不计入任何合计
// ==========================================
#[tokio::test]
async fn test_orphan_carton_reported_not_dropped() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, _repo) = create_test_importer(&db_path);

    let mut workbook = memory_workbook(
        "orphan.xlsx",
        vec![po_row("PO-1", 10, 1, "2024-03-15")],
        vec![
            carton_row("C1", "X", 10, "PO-1"),
            carton_row("C9", "X", 10, "PO-404"),
        ],
    );

    let err = importer
        .import_workbook(&mut workbook, None)
        .await
        .expect_err("Import should be rejected");

    match err {
        ImportError::Unbalanced { report } => {
            assert_eq!(report.discrepancies.len(), 1);
            assert_eq!(
                report.discrepancies[0],
                Discrepancy::PoNotFound {
                    carton_id: "C9".to_string(),
                    po_number: "PO-404".to_string(),
                    row_number: 3,
                }
            );
            assert_eq!(report.per_po_summary[0].found_units, 10);
            assert_eq!(report.per_po_summary[0].found_cartons, 1);
        }
        other => panic!("Expected Unbalanced, got {:?}", other),
    }
}

// ==========================================
// 行级错误: 坏行跳过，其余照常落库
// ==========================================
#[tokio::test]
async fn test_row_errors_are_kept_on_record() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, repo) = create_test_importer(&db_path);
    let dir = temp_dir();

    let workbook = write_csv_workbook(
        dir.path(),
        "row_errors",
        &["PO-1,20,2,2024-03-15", "PO-2,abc,1,2024-03-16"],
        &["C1,X,10,PO-1", "C2,X,10,PO-1", "C3,X,0,PO-1"],
    );

    let result = importer
        .import_file(&workbook, Some("csv-user"))
        .await
        .expect("Import should succeed");

    let record = &result.record;
    assert_eq!(record.file_name, "row_errors");
    assert_eq!(record.pos_declared, 1);
    assert_eq!(record.cartons_declared, 2);
    assert_eq!(record.errors.len(), 2);
    assert!(record
        .errors
        .iter()
        .all(|e| e.kind == ImportErrorKind::RowExtraction));

    let po_error = record
        .errors
        .iter()
        .find(|e| e.sheet.as_deref() == Some("PO"))
        .unwrap();
    assert_eq!(po_error.row_number, Some(3));

    let carton_error = record
        .errors
        .iter()
        .find(|e| e.sheet.as_deref() == Some("Cartons"))
        .unwrap();
    assert_eq!(carton_error.row_number, Some(4));

    assert!(repo.find_po_by_number("PO-2").await.unwrap().is_none());
}

// ==========================================
// 结构错误
// ==========================================
#[tokio::test]
async fn test_missing_carton_sheet_aborts_before_parsing() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, _repo) = create_test_importer(&db_path);
    let dir = temp_dir();

    let workbook =
        test_helpers::write_po_only_workbook(dir.path(), "po_only", &["PO-1,20,2,2024-03-15"]);

    let err = importer
        .import_file(&workbook, None)
        .await
        .expect_err("Import should fail");

    assert!(matches!(err, ImportError::MissingSheet { ref sheet } if sheet == "Cartons"));
    assert_eq!(count_rows(&db_path, "shipping_import"), 0);
}

#[tokio::test]
async fn test_no_valid_po_rows_aborts() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, _repo) = create_test_importer(&db_path);

    let mut workbook = memory_workbook(
        "bad_pos.xlsx",
        vec![po_row("PO-1", 0, 1, "2024-03-15")],
        vec![carton_row("C1", "X", 10, "PO-1")],
    );

    let err = importer
        .import_workbook(&mut workbook, None)
        .await
        .expect_err("Import should fail");

    match err {
        ImportError::NoValidRecords { sheet, row_errors } => {
            assert_eq!(sheet, "PO");
            assert_eq!(row_errors.len(), 1);
            assert_eq!(row_errors[0].row_number, 2);
        }
        other => panic!("Expected NoValidRecords, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_file_is_reported() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, _repo) = create_test_importer(&db_path);

    let err = importer
        .import_file(std::path::Path::new("/nonexistent/shipping.xlsx"), None)
        .await
        .expect_err("Import should fail");
    assert!(matches!(err, ImportError::FileNotFound(_)));
}

// ==========================================
// 重复导入: PO upsert 保留状态，导入记录逐次追加
// ==========================================
#[tokio::test]
async fn test_reimport_updates_in_place_and_appends_record() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, repo) = create_test_importer(&db_path);

    let mut first = memory_workbook(
        "week1.xlsx",
        vec![po_row("PO-1", 20, 2, "2024-03-15")],
        vec![
            carton_row("C1", "X", 10, "PO-1"),
            carton_row("C2", "X", 10, "PO-1"),
        ],
    );
    importer.import_workbook(&mut first, None).await.unwrap();

    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute(
            "UPDATE purchase_order SET status = 'IN_PRODUCTION' WHERE po_number = 'PO-1'",
            [],
        )
        .unwrap();
    }

    let mut second = memory_workbook(
        "week2.xlsx",
        vec![po_row("PO-1", 30, 2, "2024-03-22")],
        vec![
            carton_row("C1", "X", 10, "PO-1"),
            carton_row("C2", "X", 10, "PO-1"),
            carton_row("C2", "Y", 10, "PO-1"),
        ],
    );
    importer.import_workbook(&mut second, None).await.unwrap();

    let po = repo.find_po_by_number("PO-1").await.unwrap().unwrap();
    assert_eq!(po.declared_unit_count, 30);
    assert_eq!(po.status, PoStatus::InProduction);
    assert_eq!(po.committed_ship_date.to_string(), "2024-03-22");

    assert_eq!(count_rows(&db_path, "purchase_order"), 1);
    assert_eq!(count_rows(&db_path, "po_carton"), 3);
    assert_eq!(count_rows(&db_path, "shipping_import"), 2);

    let musical = repo
        .find_cartons_by_po(po.id, Some(CartonKind::Musical), None)
        .await
        .unwrap();
    assert_eq!(musical.len(), 2);
    assert!(musical.iter().all(|l| l.carton_id == "C2"));

    let history = repo.list_recent_imports(10).await.unwrap();
    assert_eq!(history[0].file_name, "week2.xlsx");
    assert_eq!(history[1].file_name, "week1.xlsx");
}

// ==========================================
// 跨批次: 已归属某 PO 的箱号不能改挂到其他 PO
// ==========================================
#[tokio::test]
async fn test_carton_owned_by_other_po_is_not_moved() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, repo) = create_test_importer(&db_path);

    let mut week1 = memory_workbook(
        "week1.xlsx",
        vec![po_row("PO-1", 20, 2, "2024-03-15")],
        vec![
            carton_row("C1", "X", 10, "PO-1"),
            carton_row("C2", "X", 10, "PO-1"),
        ],
    );
    let first = importer.import_workbook(&mut week1, None).await.unwrap();
    assert!(first.record.is_complete());

    // C1 整箱改挂到 PO-2: 两行均被拒绝
    let mut week2 = memory_workbook(
        "week2.xlsx",
        vec![po_row("PO-2", 15, 1, "2024-03-22")],
        vec![
            carton_row("C1", "X", 10, "PO-2"),
            carton_row("C1", "Y", 5, "PO-2"),
        ],
    );
    let second = importer
        .import_workbook(&mut week2, None)
        .await
        .expect("Import should complete with record-level errors");
    assert_eq!(second.record.pos_persisted, 1);
    assert_eq!(second.record.cartons_persisted, 0);
    assert_eq!(second.record.errors.len(), 2);
    assert!(second.record.errors.iter().all(|e| {
        e.kind == ImportErrorKind::CartonInsert
            && e.carton_id.as_deref() == Some("C1")
            && e.message.contains("PO-1")
    }));

    // C2 加一个新 SKU 挂到 PO-3: 同样被拒绝
    let mut week3 = memory_workbook(
        "week3.xlsx",
        vec![po_row("PO-3", 7, 1, "2024-03-29")],
        vec![carton_row("C2", "Z", 7, "PO-3")],
    );
    let third = importer.import_workbook(&mut week3, None).await.unwrap();
    assert_eq!(third.record.cartons_persisted, 0);
    assert_eq!(third.record.errors.len(), 1);
    assert_eq!(third.record.errors[0].kind, ImportErrorKind::CartonInsert);
    assert_eq!(third.record.errors[0].row_number, Some(2));

    // PO-1 的箱单保持不变
    let po1 = repo.find_po_by_number("PO-1").await.unwrap().unwrap();
    let lines: Vec<(String, String)> = repo
        .find_cartons_by_po(po1.id, None, None)
        .await
        .unwrap()
        .into_iter()
        .map(|l| (l.carton_id, l.product_sku))
        .collect();
    assert_eq!(
        lines,
        vec![
            ("C1".to_string(), "X".to_string()),
            ("C2".to_string(), "X".to_string()),
        ]
    );

    let c2 = repo.find_carton_lines("C2").await.unwrap();
    assert_eq!(c2.len(), 1);
    assert_eq!(c2[0].po_number, "PO-1");
    assert_eq!(c2[0].carton_kind, CartonKind::Mono);
    assert_eq!(count_rows(&db_path, "po_carton"), 2);
}

// ==========================================
// 跨批次: 同 PO 追加 SKU 后按库中 SKU 全集重算箱型
// ==========================================
#[tokio::test]
async fn test_reimport_refreshes_stored_carton_kind() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let (importer, repo) = create_test_importer(&db_path);

    let mut week1 = memory_workbook(
        "week1.xlsx",
        vec![po_row("PO-1", 10, 1, "2024-03-15")],
        vec![carton_row("C1", "X", 10, "PO-1")],
    );
    importer.import_workbook(&mut week1, None).await.unwrap();
    let before = repo.find_carton_lines("C1").await.unwrap();
    assert_eq!(before[0].carton_kind, CartonKind::Mono);

    // 本批次中 C1 只有 Y，但库中已有 X
    let mut week2 = memory_workbook(
        "week2.xlsx",
        vec![po_row("PO-1", 5, 1, "2024-03-15")],
        vec![carton_row("C1", "Y", 5, "PO-1")],
    );
    let result = importer.import_workbook(&mut week2, None).await.unwrap();
    assert!(result.record.is_complete());

    let after = repo.find_carton_lines("C1").await.unwrap();
    let skus: Vec<&str> = after.iter().map(|l| l.product_sku.as_str()).collect();
    assert_eq!(skus, vec!["X", "Y"]);
    assert!(after.iter().all(|l| l.carton_kind == CartonKind::Musical));
}

// ==========================================
// 配置: 自定义工作表名
// ==========================================
#[tokio::test]
async fn test_configured_sheet_names() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = shared_connection(&db_path);
    let config = ConfigManager::from_connection(conn.clone()).unwrap();
    config
        .set_global_config_value("shipping_import.po_sheet_name", "Ordenes")
        .unwrap();
    config
        .set_global_config_value("shipping_import.carton_sheet_name", "Cajas")
        .unwrap();

    let repo = Arc::new(ShippingRepositoryImpl::from_connection(conn));
    let importer = ShippingImporterImpl::new(repo, Arc::new(config));

    let mut workbook = shipping_import::importer::MemoryWorkbook::new("es.xlsx")
        .with_sheet(
            "ordenes",
            &["PO", "Cantidad Pares", "Cantidad Cartones", "Fecha"],
            vec![po_row("PO-1", 12, 1, "2024-03-15")],
        )
        .with_sheet(
            "CAJAS",
            &["Carton", "Style", "Cantidad", "PO"],
            vec![carton_row("C1", "X", 12, "PO-1")],
        );

    let result = importer
        .import_workbook(&mut workbook, None)
        .await
        .expect("Import should succeed");
    assert!(result.record.is_complete());
}
