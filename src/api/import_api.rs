// ==========================================
// 批量导入管道 - 导入API
// ==========================================
// 职责: 提交 / 轮询 / 错误列表 / 模板 / 取消 / 作业列表 / 保留期清理
// 约定: 提交只做准入检查并登记 pending 作业，管道在工作池中异步执行
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::api::permission::Caller;
use crate::config::{ConfigManager, ImportConfigReader, ImportSettings};
use crate::db::open_and_init;
use crate::domain::job::{ErrorPage, ImportJob, JobStatusView};
use crate::domain::types::{ImportDomain, JobStatus, ValidationMode, WriteMode};
use crate::importer::error::ImportError;
use crate::importer::error_collector::ErrorCollector;
use crate::importer::file_parser::FileFormat;
use crate::importer::job_state::transition;
use crate::importer::pipeline::{ImportPipeline, ImportRequest, JobOutcome};
use crate::importer::schema::{schema_for, FieldSpec, GenericSchema, RecordSchema, TemplateFile};
use crate::importer::worker::ImportWorkerPool;
use crate::repository::import_job_repo::ImportJobRepository;
use crate::repository::{ImportJobRepositoryImpl, RecordStoreImpl};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 作业列表单次最多返回条数
pub const MAX_LIST_JOBS: usize = 20;

/// 调用方定义的通用 schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericSchemaDef {
    /// 目标集合名
    pub collection: String,
    /// 字段定义（模板顺序）
    pub fields: Vec<FieldSpec>,
    /// 构成自然键的字段（必须为必填字段）
    pub key_fields: Vec<String>,
}

/// 导入提交请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitImportRequest {
    /// 原始文件名（用于识别 CSV / Excel）
    pub file_name: String,
    /// 文件内容
    pub content: Vec<u8>,
    /// 导入域
    pub domain: ImportDomain,
    /// strict（全有或全无）/ partial（跳过无效行）
    pub validation_mode: ValidationMode,
    /// true: 按自然键覆盖已存在记录
    #[serde(default)]
    pub update_existing: bool,
    /// 组织范围
    #[serde(default)]
    pub organization_id: Option<String>,
    /// domain = generic 时必填
    #[serde(default)]
    pub generic_schema: Option<GenericSchemaDef>,
}

/// 导入提交响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitImportResponse {
    /// 作业ID（用于轮询状态）
    pub job_id: String,
    /// 提交时总是 pending
    pub status: JobStatus,
}

// ==========================================
// ImportApi - 导入API
// ==========================================
pub struct ImportApi {
    jobs: Arc<dyn ImportJobRepository>,
    pool: ImportWorkerPool,
    collector: ErrorCollector,
    settings: ImportSettings,
    completions: Mutex<HashMap<String, JoinHandle<JobOutcome>>>,
}

impl ImportApi {
    /// 打开数据库并按 config_kv 覆写加载导入参数
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub async fn open(db_path: &str) -> ApiResult<Self> {
        let conn = open_and_init(db_path)
            .map_err(|e| ApiError::DatabaseError(format!("{}: {}", db_path, e)))?;
        let conn = Arc::new(Mutex::new(conn));

        let settings = ConfigManager::from_connection(conn.clone())
            .load_settings()
            .await?;
        info!(db_path, ?settings, "导入API初始化完成");

        Ok(Self::from_connection(conn, settings))
    }

    /// 从已有连接创建（共享同一 SQLite 连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>, settings: ImportSettings) -> Self {
        let jobs: Arc<dyn ImportJobRepository> =
            Arc::new(ImportJobRepositoryImpl::from_connection(conn.clone()));
        let store = Arc::new(RecordStoreImpl::from_connection(conn));
        let pipeline = Arc::new(ImportPipeline::new(store, jobs.clone(), settings.clone()));

        Self {
            pool: ImportWorkerPool::new(pipeline, settings.max_concurrent_jobs),
            collector: ErrorCollector::new(jobs.clone(), settings.error_page_cap),
            jobs,
            settings,
            completions: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    // ==========================================
    // 提交
    // ==========================================

    /// 提交导入
    ///
    /// # 准入检查
    /// - 调用方角色可发起导入
    /// - 文件扩展名为 .csv / .xlsx / .xls
    /// - 文件大小不超过上限
    /// - generic 域必须附带合法 schema
    ///
    /// # 返回
    /// - job_id + pending；管道在后台执行
    pub async fn submit_import(
        &self,
        caller: &Caller,
        request: SubmitImportRequest,
    ) -> ApiResult<SubmitImportResponse> {
        caller.require_import()?;

        if request.file_name.trim().is_empty() {
            return Err(ApiError::InvalidInput("file_name must not be empty".to_string()));
        }
        FileFormat::detect(&request.file_name)?;
        if request.content.len() > self.settings.max_file_bytes {
            return Err(ImportError::FileTooLarge {
                size: request.content.len(),
                max: self.settings.max_file_bytes,
            }
            .into());
        }

        let schema = resolve_schema(request.domain, request.generic_schema)?;

        let job = ImportJob::new(
            caller.user_id.clone(),
            request.organization_id,
            request.file_name,
            request.domain,
            request.validation_mode,
            WriteMode::from_update_existing(request.update_existing),
        );
        self.jobs.insert_job(&job).await?;

        let job_id = job.job_id.clone();
        info!(
            job_id = %job_id,
            created_by = %caller.user_id,
            domain = %job.domain,
            file_name = %job.file_name,
            bytes = request.content.len(),
            "导入作业已提交"
        );

        let handle = self.pool.spawn(ImportRequest {
            job,
            content: request.content,
            schema,
            allowed_roles: caller.role.creatable_roles().to_vec(),
        });
        if let Ok(mut completions) = self.completions.lock() {
            completions.retain(|_, h| !h.is_finished());
            completions.insert(job_id.clone(), handle.completion);
        }

        Ok(SubmitImportResponse {
            job_id,
            status: JobStatus::Pending,
        })
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 作业状态（轮询）
    pub async fn get_job_status(&self, caller: &Caller, job_id: &str) -> ApiResult<JobStatusView> {
        Ok(self.load_visible_job(caller, job_id).await?.to_status_view())
    }

    /// 分页错误列表（limit 为 0 或超过上限时按上限截断）
    pub async fn list_job_errors(
        &self,
        caller: &Caller,
        job_id: &str,
        offset: usize,
        limit: usize,
    ) -> ApiResult<ErrorPage> {
        self.load_visible_job(caller, job_id).await?;
        Ok(self.collector.list(job_id, offset, limit).await?)
    }

    /// 完整错误报告（CSV）
    pub async fn export_job_errors_csv(&self, caller: &Caller, job_id: &str) -> ApiResult<String> {
        self.load_visible_job(caller, job_id).await?;
        Ok(self.collector.export_csv(job_id).await?)
    }

    /// 最近的作业（created_at 倒序，最多 20 条）
    ///
    /// superadmin 可见全部作业，其余角色只见自己提交的
    pub async fn list_jobs(&self, caller: &Caller, limit: usize) -> ApiResult<Vec<JobStatusView>> {
        let limit = limit.clamp(1, MAX_LIST_JOBS);
        let created_by = if caller.sees_all_jobs() {
            None
        } else {
            Some(caller.user_id.as_str())
        };

        let jobs = self.jobs.list_recent_jobs(created_by, limit).await?;
        Ok(jobs.iter().map(ImportJob::to_status_view).collect())
    }

    /// 导入模板
    pub fn download_template(&self, domain: ImportDomain) -> ApiResult<TemplateFile> {
        Ok(schema_for(domain)?.template()?)
    }

    /// 通用 schema 的导入模板
    pub fn download_generic_template(&self, def: GenericSchemaDef) -> ApiResult<TemplateFile> {
        Ok(resolve_schema(ImportDomain::Generic, Some(def))?.template()?)
    }

    // ==========================================
    // 取消 / 清理
    // ==========================================

    /// 取消作业
    ///
    /// 运行中的作业在下一个检查点进入 cancelled；
    /// 不在本进程工作池中的 pending 作业直接置为 cancelled
    pub async fn cancel_job(&self, caller: &Caller, job_id: &str) -> ApiResult<JobStatusView> {
        let mut job = self.load_visible_job(caller, job_id).await?;

        if job.status.is_terminal() {
            return Err(ApiError::InvalidStateTransition {
                from: job.status.to_string(),
                to: JobStatus::Cancelled.to_string(),
            });
        }

        if self.pool.cancel(job_id) {
            info!(job_id, cancelled_by = %caller.user_id, "已发出取消信号");
        } else if job.status == JobStatus::Pending {
            transition(&mut job, JobStatus::Cancelled, self.settings.retention_days)?;
            self.jobs.update_job(&job).await?;
            info!(job_id, cancelled_by = %caller.user_id, "孤立的 pending 作业已取消");
        } else {
            warn!(job_id, status = %job.status, "作业不在当前工作池中，无法取消");
            return Err(ApiError::InvalidStateTransition {
                from: job.status.to_string(),
                to: JobStatus::Cancelled.to_string(),
            });
        }

        Ok(job.to_status_view())
    }

    /// 删除 expires_at <= now 的作业及其错误
    pub async fn purge_expired_jobs(&self, now: DateTime<Utc>) -> ApiResult<usize> {
        let deleted = self.jobs.delete_expired_jobs(now).await?;
        if deleted > 0 {
            info!(deleted, "已清理过期导入作业");
        }
        Ok(deleted)
    }

    /// 等待本进程提交的作业结束，返回最终状态
    ///
    /// 作业不是由本实例提交（或已被等待过）时直接返回当前状态
    pub async fn await_job(&self, caller: &Caller, job_id: &str) -> ApiResult<JobStatusView> {
        self.load_visible_job(caller, job_id).await?;
        let handle = self
            .completions
            .lock()
            .map_err(|e| ApiError::InternalError(format!("锁获取失败: {}", e)))?
            .remove(job_id);

        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| ApiError::InternalError(format!("import task failed: {}", e)))?;
        }
        self.get_job_status(caller, job_id).await
    }

    /// 取消全部运行中的作业
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// 加载作业并校验调用方可见（提交者本人或 superadmin）
    async fn load_visible_job(&self, caller: &Caller, job_id: &str) -> ApiResult<ImportJob> {
        let job = self.load_job(job_id).await?;
        caller.require_job_access(&job.created_by)?;
        Ok(job)
    }

    async fn load_job(&self, job_id: &str) -> ApiResult<ImportJob> {
        self.jobs
            .find_job(job_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("ImportJob (id={})", job_id)))
    }
}

/// 内置域用固定 schema；generic 域由调用方定义
fn resolve_schema(
    domain: ImportDomain,
    generic: Option<GenericSchemaDef>,
) -> ApiResult<Arc<dyn RecordSchema>> {
    match (domain, generic) {
        (ImportDomain::Generic, Some(def)) => Ok(Arc::new(GenericSchema::new(
            def.collection,
            def.fields,
            def.key_fields,
        )?)),
        (ImportDomain::Generic, None) => Err(ApiError::InvalidInput(
            "generic imports require generic_schema".to_string(),
        )),
        (domain, _) => Ok(schema_for(domain)?),
    }
}
