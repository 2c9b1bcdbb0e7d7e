// ==========================================
// 发运导入与对账引擎 - 发运导入器实现
// ==========================================
// 职责: 整合导入流程，从工作簿到数据库
// 流程: 抽取 → 有效记录检查 → 一致性校验 → 箱型分类 → 总量对账（闸门）→ 落库
// 红线: 一致性/对账失败时不落库、不写导入记录
// ==========================================

use crate::config::{ImportSettings, ShippingConfigReader};
use crate::domain::import::{
    CartonComposition, ExtractionResult, ReconciliationReport, RowError, ShippingImportResult,
};
use crate::importer::classifier::CartonClassifier as CartonClassifierImpl;
use crate::importer::consistency::ConsistencyValidator as ConsistencyValidatorImpl;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::extractor::ShippingExtractor;
use crate::importer::persister::{BalancedImport, ImportPersister, PersistContext};
use crate::importer::reconciler::TotalsReconciler as TotalsReconcilerImpl;
use crate::importer::shipping_importer_trait::{
    CartonClassifier, ConsistencyValidator, RecordExtractor, ShippingImporter, TotalsReconciler,
};
use crate::importer::workbook::{UniversalWorkbookOpener, WorkbookSource};
use crate::repository::ShippingRepository;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// 通过对账、等待落库的批次
struct PreparedImport {
    file_name: String,
    batch: BalancedImport,
    report: ReconciliationReport,
    compositions: Vec<CartonComposition>,
}

// ==========================================
// ShippingImporterImpl - 发运导入器实现
// ==========================================
pub struct ShippingImporterImpl<R, C>
where
    R: ShippingRepository,
    C: ShippingConfigReader,
{
    // 配置读取器
    config: Arc<C>,

    // 导入组件
    extractor: Box<dyn RecordExtractor>,
    validator: Box<dyn ConsistencyValidator>,
    classifier: Box<dyn CartonClassifier>,
    reconciler: Box<dyn TotalsReconciler>,

    // 落库
    persister: ImportPersister<R>,
}

impl<R, C> ShippingImporterImpl<R, C>
where
    R: ShippingRepository,
    C: ShippingConfigReader,
{
    /// 使用默认组件创建导入器
    pub fn new(repo: Arc<R>, config: Arc<C>) -> Self {
        Self::with_components(
            repo,
            config,
            Box::new(ShippingExtractor),
            Box::new(ConsistencyValidatorImpl),
            Box::new(CartonClassifierImpl),
            Box::new(TotalsReconcilerImpl),
        )
    }

    /// 指定各阶段组件创建导入器
    pub fn with_components(
        repo: Arc<R>,
        config: Arc<C>,
        extractor: Box<dyn RecordExtractor>,
        validator: Box<dyn ConsistencyValidator>,
        classifier: Box<dyn CartonClassifier>,
        reconciler: Box<dyn TotalsReconciler>,
    ) -> Self {
        Self {
            config,
            extractor,
            validator,
            classifier,
            reconciler,
            persister: ImportPersister::new(repo),
        }
    }

    async fn load_settings(&self) -> ImportResult<ImportSettings> {
        self.config
            .load_import_settings()
            .await
            .map_err(|e| ImportError::ConfigReadError(e.to_string()))
    }

    fn resolve_actor(settings: &ImportSettings, imported_by: Option<&str>) -> String {
        imported_by
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| settings.default_actor.clone())
    }

    /// 某工作表的行级错误
    fn sheet_errors(errors: &[RowError], sheet: &str) -> Vec<RowError> {
        errors
            .iter()
            .filter(|e| e.sheet.eq_ignore_ascii_case(sheet))
            .cloned()
            .collect()
    }

    /// 同步阶段: 抽取 → 校验 → 分类 → 对账
    fn prepare(
        &self,
        source: &mut dyn WorkbookSource,
        settings: &ImportSettings,
    ) -> ImportResult<PreparedImport> {
        let file_name = source.source_name().to_string();

        // === 步骤 1: 抽取 ===
        debug!("步骤 1: 表格抽取");
        let ExtractionResult {
            pos,
            cartons,
            errors: row_errors,
        } = self
            .extractor
            .extract(source, &settings.po_sheet_name, &settings.carton_sheet_name)?;
        info!(
            file = %file_name,
            pos = pos.len(),
            cartons = cartons.len(),
            errors = row_errors.len(),
            "表格抽取完成"
        );

        if pos.is_empty() {
            return Err(ImportError::NoValidRecords {
                sheet: settings.po_sheet_name.clone(),
                row_errors: Self::sheet_errors(&row_errors, &settings.po_sheet_name),
            });
        }
        if cartons.is_empty() {
            return Err(ImportError::NoValidRecords {
                sheet: settings.carton_sheet_name.clone(),
                row_errors: Self::sheet_errors(&row_errors, &settings.carton_sheet_name),
            });
        }

        // === 步骤 2: 一致性校验 ===
        debug!("步骤 2: 一致性校验");
        let consistency = self.validator.validate(&cartons);
        if !consistency.valid {
            return Err(ImportError::Inconsistent {
                errors: consistency.errors,
            });
        }

        // === 步骤 3: 箱型分类 ===
        debug!("步骤 3: 箱型分类");
        let cartons = self.classifier.classify(cartons);
        let compositions = self.classifier.summarize(&cartons);

        // === 步骤 4: 总量对账 ===
        debug!("步骤 4: 总量对账");
        let report = self.reconciler.reconcile(&pos, &cartons);
        let batch = BalancedImport::new(pos, cartons, row_errors, &report)
            .map_err(|report| ImportError::Unbalanced { report })?;

        Ok(PreparedImport {
            file_name,
            batch,
            report,
            compositions,
        })
    }

    /// 异步阶段: 落库并组装结果
    async fn commit(
        &self,
        prepared: PreparedImport,
        imported_by: String,
        started_at: Instant,
    ) -> ImportResult<ShippingImportResult> {
        debug!("步骤 5: 落库");
        let PreparedImport {
            file_name,
            batch,
            report,
            compositions,
        } = prepared;

        let record = self
            .persister
            .persist(
                batch,
                PersistContext {
                    file_name,
                    imported_by,
                    started_at,
                },
            )
            .await?;

        Ok(ShippingImportResult {
            record,
            per_po_summary: report.per_po_summary,
            carton_compositions: compositions,
            elapsed_ms: started_at.elapsed().as_millis() as i64,
        })
    }

    fn log_outcome(result: &ImportResult<ShippingImportResult>) {
        match result {
            Ok(r) => info!(
                import_id = %r.record.id,
                pos = r.record.pos_persisted,
                cartons = r.record.cartons_persisted,
                errors = r.record.errors.len(),
                elapsed_ms = r.elapsed_ms,
                "发运导入完成"
            ),
            Err(e @ ImportError::Repository(_)) => error!(error = %e, "发运导入中断"),
            Err(e) => warn!(code = e.code(), error = %e, "发运导入被拒绝"),
        }
    }
}

#[async_trait]
impl<R, C> ShippingImporter for ShippingImporterImpl<R, C>
where
    R: ShippingRepository,
    C: ShippingConfigReader,
{
    #[instrument(skip(self, file_path, imported_by), fields(file = %file_path.display()))]
    async fn import_file(
        &self,
        file_path: &Path,
        imported_by: Option<&str>,
    ) -> ImportResult<ShippingImportResult> {
        let started_at = Instant::now();
        info!("开始导入发运文件");

        let settings = self.load_settings().await?;
        let actor = Self::resolve_actor(&settings, imported_by);

        // 工作簿只在同步阶段存活
        let prepared = match UniversalWorkbookOpener::open(file_path) {
            Ok(mut source) => self.prepare(source.as_mut(), &settings),
            Err(e) => Err(e),
        };

        let result = match prepared {
            Ok(prepared) => self.commit(prepared, actor, started_at).await,
            Err(e) => Err(e),
        };
        Self::log_outcome(&result);
        result
    }

    #[instrument(skip(self, source, imported_by), fields(file = %source.source_name()))]
    async fn import_workbook(
        &self,
        source: &mut (dyn WorkbookSource + Send),
        imported_by: Option<&str>,
    ) -> ImportResult<ShippingImportResult> {
        let started_at = Instant::now();
        info!("开始导入发运工作簿");

        let settings = self.load_settings().await?;
        let actor = Self::resolve_actor(&settings, imported_by);

        let result = match self.prepare(source, &settings) {
            Ok(prepared) => self.commit(prepared, actor, started_at).await,
            Err(e) => Err(e),
        };
        Self::log_outcome(&result);
        result
    }

    async fn batch_import(
        &self,
        file_paths: Vec<PathBuf>,
        imported_by: Option<&str>,
    ) -> Vec<ImportResult<ShippingImportResult>> {
        use futures::future::join_all;

        info!(count = file_paths.len(), "开始批量导入文件");

        let import_tasks = file_paths
            .iter()
            .map(|path| self.import_file(path.as_path(), imported_by));

        // 并发执行所有导入任务
        let results = join_all(import_tasks).await;

        info!(
            total = results.len(),
            success = results.iter().filter(|r| r.is_ok()).count(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "批量导入完成"
        );

        results
    }
}
