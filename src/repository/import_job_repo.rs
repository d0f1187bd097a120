// ==========================================
// 批量导入管道 - 导入作业 Repository Trait
// ==========================================
// 职责: import_job / import_row_error 的数据访问
// 红线: 状态转换合法性由 importer::job_state 负责，这里只做 CRUD
// ==========================================

use crate::domain::job::{ImportJob, ImportRowError};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// ==========================================
// ImportJobRepository Trait
// ==========================================
// 实现者: ImportJobRepositoryImpl（rusqlite）
#[async_trait]
pub trait ImportJobRepository: Send + Sync {
    // ===== 作业 =====

    /// 新建作业记录
    async fn insert_job(&self, job: &ImportJob) -> RepositoryResult<()>;

    /// 按 ID 查询作业
    async fn find_job(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>>;

    /// 检查点: 写回状态、计数、时间戳与结构性错误
    ///
    /// # 返回
    /// - Err(NotFound): 作业不存在
    async fn update_job(&self, job: &ImportJob) -> RepositoryResult<()>;

    /// 最近的作业（created_at 倒序）
    ///
    /// # 参数
    /// - created_by: 仅返回该调用方提交的作业；None 返回全部
    /// - limit: 最大条数
    async fn list_recent_jobs(
        &self,
        created_by: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<ImportJob>>;

    /// 删除 expires_at <= now 的作业（级联删除其错误）
    ///
    /// # 返回
    /// - Ok(usize): 删除的作业数
    async fn delete_expired_jobs(&self, now: DateTime<Utc>) -> RepositoryResult<usize>;

    // ===== 逐行错误 =====

    /// 批量写入错误（单事务）
    async fn insert_row_errors(&self, errors: &[ImportRowError]) -> RepositoryResult<usize>;

    /// 分页查询错误（按行号、写入顺序）
    async fn list_row_errors(
        &self,
        job_id: &str,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<Vec<ImportRowError>>;

    /// 错误总数
    async fn count_row_errors(&self, job_id: &str) -> RepositoryResult<usize>;
}
