// ==========================================
// 批量导入管道 - 作业编排
// ==========================================
// 流程: 解码 → 表头检查 → 文件内去重 → 引用快照 → 逐行校验 → 分块落库 → 终态
// 检查点: 每个阶段/分块结束后同步写回 import_job，再进入下一阶段
// 取消/超时: 在阶段边界和块边界检查
// ==========================================

use crate::config::ImportSettings;
use crate::domain::job::{ImportJob, ImportRowError};
use crate::domain::types::{JobStatus, UserRole, ValidationMode};
use crate::importer::batch_persister::{
    BatchPersister, ChunkObserver, ChunkProgress, StagedRecord, StopReason,
};
use crate::importer::duplicate_detector::find_duplicates;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::error_collector::ErrorCollector;
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::job_state::{record_progress, transition};
use crate::importer::reference_resolver::ReferenceResolver;
use crate::importer::schema::RecordSchema;
use crate::importer::validator::{SchemaValidator, ValidationContext};
use crate::repository::import_job_repo::ImportJobRepository;
use crate::repository::record_store::RecordStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// 意外错误对外统一提示
const UNEXPECTED_ERROR_MESSAGE: &str = "Import failed due to an unexpected error";

// ==========================================
// ImportRequest - 待执行的导入
// ==========================================
pub struct ImportRequest {
    /// 已持久化的 pending 作业
    pub job: ImportJob,
    pub content: Vec<u8>,
    pub schema: Arc<dyn RecordSchema>,
    /// 提交者可创建的用户角色
    pub allowed_roles: Vec<UserRole>,
}

/// 作业结束时的摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub status: JobStatus,
    pub total_rows: usize,
    pub success_count: usize,
    pub failed_count: usize,
}

impl From<&ImportJob> for JobOutcome {
    fn from(job: &ImportJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            total_rows: job.total_rows,
            success_count: job.success_count,
            failed_count: job.failed_count,
        }
    }
}

// ==========================================
// ImportPipeline - 管道编排器
// ==========================================
pub struct ImportPipeline {
    store: Arc<dyn RecordStore>,
    jobs: Arc<dyn ImportJobRepository>,
    settings: ImportSettings,
}

impl ImportPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        jobs: Arc<dyn ImportJobRepository>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            store,
            jobs,
            settings,
        }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    fn error_collector(&self) -> ErrorCollector {
        ErrorCollector::new(self.jobs.clone(), self.settings.error_page_cap)
    }

    /// 执行一个作业直到终态
    ///
    /// 任何错误都不会向上抛出：结构性错误、取消、超时和意外错误
    /// 都转换为作业终态并写回仓储
    #[instrument(skip(self, request, cancel), fields(job_id = %request.job.job_id, domain = %request.job.domain))]
    pub async fn run(&self, request: ImportRequest, cancel: CancellationToken) -> JobOutcome {
        let ImportRequest {
            mut job,
            content,
            schema,
            allowed_roles,
        } = request;

        let deadline = self
            .settings
            .job_timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        info!(file_name = %job.file_name, mode = %job.validation_mode, "开始执行导入作业");

        let result = self
            .execute(&mut job, &content, schema, allowed_roles, &cancel, deadline)
            .await;

        if let Err(e) = result {
            self.finish_with_error(&mut job, e).await;
        }

        info!(
            status = %job.status,
            total_rows = job.total_rows,
            success_count = job.success_count,
            failed_count = job.failed_count,
            "导入作业结束"
        );
        JobOutcome::from(&job)
    }

    async fn execute(
        &self,
        job: &mut ImportJob,
        content: &[u8],
        schema: Arc<dyn RecordSchema>,
        allowed_roles: Vec<UserRole>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> ImportResult<()> {
        self.checkpoint(cancel, deadline)?;
        self.advance(job, JobStatus::Validating).await?;

        // ===== 阶段 1: 解码 =====
        debug!("步骤 1: 解码文件");
        let parser = UniversalFileParser::new(self.settings.max_file_bytes, self.settings.max_rows);
        let decoded = parser.decode_bytes(&job.file_name, content)?;
        job.total_rows = decoded.total_rows();
        self.jobs.update_job(job).await?;
        info!(total_rows = job.total_rows, blank_rows = decoded.blank_rows, "文件解码完成");

        // ===== 阶段 2: 表头 =====
        debug!("步骤 2: 必填列检查");
        let missing = decoded.missing_columns(&schema.required_columns());
        if !missing.is_empty() {
            return Err(ImportError::MissingColumns(missing));
        }

        // ===== 阶段 3: 文件内去重 =====
        debug!("步骤 3: 文件内重复检测");
        let groups = find_duplicates(&decoded.rows, |row| schema.natural_key(row));
        if !groups.is_empty() {
            let mut errors = Vec::new();
            for group in &groups {
                let message = group.describe();
                for row in decoded
                    .rows
                    .iter()
                    .filter(|r| group.row_numbers.contains(&r.row_number))
                {
                    errors.push(ImportRowError::new(
                        &job.job_id,
                        row.row_number,
                        row.to_json(),
                        &message,
                        "",
                    ));
                }
            }
            self.error_collector().record_many(&errors).await?;

            let err = ImportError::DuplicateKeys(groups.len());
            job.structural_error = Some(json!({
                "kind": "duplicate_keys",
                "message": err.to_string(),
                "groups": groups,
            }));
            warn!(groups = groups.len(), "文件内存在重复自然键");
            return Err(err);
        }
        self.checkpoint(cancel, deadline)?;

        // ===== 阶段 4: 引用快照 =====
        debug!("步骤 4: 加载引用快照");
        let resolver = ReferenceResolver::new(self.store.clone());
        let snapshot = resolver
            .snapshot(&schema.reference_namespaces(), job.organization_id.as_deref())
            .await?;
        self.checkpoint(cancel, deadline)?;

        // ===== 阶段 5: 逐行校验 =====
        debug!("步骤 5: 逐行校验");
        let ctx = ValidationContext::new(Arc::new(snapshot), job.write_mode, allowed_roles);
        let validator = SchemaValidator::new(schema);

        let mut staged = Vec::new();
        let mut row_errors = Vec::new();
        let mut invalid_rows = 0;
        for row in &decoded.rows {
            let result = validator.validate(row, &ctx);
            match result.record {
                Some(record) if result.valid => staged.push(StagedRecord {
                    record,
                    row_data: row.to_json(),
                }),
                _ => {
                    invalid_rows += 1;
                    row_errors.extend(ErrorCollector::from_field_errors(
                        &job.job_id,
                        row,
                        &result.errors,
                    ));
                }
            }
        }
        self.error_collector().record_many(&row_errors).await?;
        info!(valid = staged.len(), invalid = invalid_rows, "逐行校验完成");

        if invalid_rows > 0 && job.validation_mode == ValidationMode::Strict {
            job.structural_error = Some(json!({
                "kind": "validation_failed",
                "message": format!(
                    "{} of {} rows failed validation; nothing was imported",
                    invalid_rows, job.total_rows
                ),
            }));
            self.advance(job, JobStatus::Failed).await?;
            return Ok(());
        }

        if staged.is_empty() {
            let total = job.total_rows;
            record_progress(job, total, 0, total)?;
            job.structural_error = Some(json!({
                "kind": "no_valid_rows",
                "message": "No valid rows to import",
            }));
            self.advance(job, JobStatus::Failed).await?;
            return Ok(());
        }
        self.checkpoint(cancel, deadline)?;

        // ===== 阶段 6: 分块落库 =====
        debug!("步骤 6: 分块落库");
        record_progress(job, invalid_rows, 0, invalid_rows)?;
        self.advance(job, JobStatus::Processing).await?;

        let persister = BatchPersister::new(
            self.store.clone(),
            self.settings.chunk_size,
            self.settings.isolate_failed_chunks,
        );
        let collector = self.error_collector();
        let organization_id = job.organization_id.clone();
        let write_mode = job.write_mode;
        let job_id = job.job_id.clone();
        let mut observer = JobCheckpoint {
            jobs: self.jobs.as_ref(),
            collector: &collector,
            job: &mut *job,
            invalid_rows,
        };
        let outcome = persister
            .persist(
                &job_id,
                organization_id.as_deref(),
                &staged,
                write_mode,
                cancel,
                deadline,
                &mut observer,
            )
            .await?;

        match outcome.stopped {
            Some(StopReason::Cancelled) => return Err(ImportError::Cancelled(job_id)),
            Some(StopReason::TimedOut) => return Err(self.timed_out()),
            None => {}
        }

        if outcome.batch_errors > 0 {
            warn!(batch_errors = outcome.batch_errors, "部分分块写入失败");
        }

        let terminal = if job.failed_count == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        self.advance(job, terminal).await
    }

    /// 状态转换 + 同步写回
    async fn advance(&self, job: &mut ImportJob, to: JobStatus) -> ImportResult<()> {
        let from = job.status;
        transition(job, to, self.settings.retention_days)?;
        self.jobs.update_job(job).await?;
        info!(from = %from, to = %to, "作业状态变更");
        Ok(())
    }

    /// 阶段边界检查取消与超时
    fn checkpoint(&self, cancel: &CancellationToken, deadline: Option<Instant>) -> ImportResult<()> {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled("cancelled at checkpoint".to_string()));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(self.timed_out());
        }
        Ok(())
    }

    fn timed_out(&self) -> ImportError {
        ImportError::TimedOut(self.settings.job_timeout_secs.unwrap_or_default())
    }

    /// 将错误转换为作业终态
    async fn finish_with_error(&self, job: &mut ImportJob, err: ImportError) {
        if job.status.is_terminal() {
            error!(error = %err, "作业已处于终态，忽略错误");
            return;
        }

        let target = match &err {
            ImportError::Cancelled(_) => {
                info!("作业已取消");
                JobStatus::Cancelled
            }
            ImportError::TimedOut(secs) => {
                warn!(timeout_secs = secs, "作业超时");
                job.structural_error = Some(json!({
                    "kind": "timed_out",
                    "message": err.to_string(),
                }));
                JobStatus::Failed
            }
            e if e.is_structural() => {
                warn!(error = %e, "结构性错误，作业失败");
                if job.structural_error.is_none() {
                    job.structural_error = Some(json!({
                        "kind": structural_kind(e),
                        "message": e.to_string(),
                    }));
                }
                JobStatus::Failed
            }
            e => {
                error!(error = %e, "导入作业发生意外错误");
                job.structural_error = Some(json!({
                    "kind": "internal",
                    "message": UNEXPECTED_ERROR_MESSAGE,
                }));
                JobStatus::Failed
            }
        };

        // processing 中途失败: 未尝试的行计入失败，保持 success + failed == total
        if target == JobStatus::Failed && job.status == JobStatus::Processing {
            let total = job.total_rows;
            let success = job.success_count;
            if let Err(e) = record_progress(job, total, success, total - success) {
                error!(error = %e, "剩余行计数结算失败");
            }
        }

        if let Err(e) = self.advance(job, target).await {
            error!(error = %e, status = %target, "作业终态写回失败");
        }
    }

    /// 工作任务 panic 后的兜底: 从仓储重新加载作业并置为 failed/internal
    pub async fn recover_after_panic(&self, job_id: &str, reason: &str) -> JobOutcome {
        let err = ImportError::InternalError(format!("worker panicked: {}", reason));
        match self.jobs.find_job(job_id).await {
            Ok(Some(mut job)) => {
                self.finish_with_error(&mut job, err).await;
                JobOutcome::from(&job)
            }
            Ok(None) => {
                error!(job_id, "panic 后作业记录不存在");
                Self::lost_outcome(job_id)
            }
            Err(e) => {
                error!(job_id, error = %e, "panic 后作业记录加载失败");
                Self::lost_outcome(job_id)
            }
        }
    }

    fn lost_outcome(job_id: &str) -> JobOutcome {
        JobOutcome {
            job_id: job_id.to_string(),
            status: JobStatus::Failed,
            total_rows: 0,
            success_count: 0,
            failed_count: 0,
        }
    }
}

/// 结构性错误分类（写入 structural_error.kind）
fn structural_kind(err: &ImportError) -> &'static str {
    match err {
        ImportError::FileNotFound(_) | ImportError::FileReadError(_) => "file_unreadable",
        ImportError::UnsupportedFormat(_) => "unsupported_format",
        ImportError::ExcelParseError(_) | ImportError::CsvParseError(_) => "parse_error",
        ImportError::EmptyFile => "empty_file",
        ImportError::FileTooLarge { .. } => "file_too_large",
        ImportError::TooManyRows { .. } => "too_many_rows",
        ImportError::MissingColumns(_) => "missing_columns",
        ImportError::DuplicateKeys(_) => "duplicate_keys",
        ImportError::ReferenceLoadError(_) => "reference_load_failed",
        _ => "structural",
    }
}

// ==========================================
// JobCheckpoint - 分块检查点
// ==========================================
// 计数口径: processed/failed 包含校验阶段已排除的无效行
struct JobCheckpoint<'a> {
    jobs: &'a dyn ImportJobRepository,
    collector: &'a ErrorCollector,
    job: &'a mut ImportJob,
    invalid_rows: usize,
}

#[async_trait]
impl<'a> ChunkObserver for JobCheckpoint<'a> {
    async fn on_chunk(
        &mut self,
        progress: &ChunkProgress,
        errors: &[ImportRowError],
    ) -> ImportResult<()> {
        if !errors.is_empty() {
            self.collector.record_many(errors).await?;
        }
        record_progress(
            self.job,
            self.invalid_rows + progress.attempted,
            progress.success,
            self.invalid_rows + progress.failed,
        )?;
        self.jobs.update_job(self.job).await?;
        debug!(
            chunk_index = progress.chunk_index,
            chunk_count = progress.chunk_count,
            processed_rows = self.job.processed_rows,
            "分块检查点已写回"
        );
        Ok(())
    }
}
