// ==========================================
// 批量导入管道 - 导入作业 Repository 实现
// ==========================================
// 职责: 实现作业与逐行错误的数据访问（使用 rusqlite）
// 时间字段: rusqlite chrono 特性直接读写 DateTime<Utc>
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::job::{ImportJob, ImportRowError};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_job_repo::ImportJobRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const JOB_COLUMNS: &str = r#"
    job_id, created_by, organization_id, file_name, domain, validation_mode,
    write_mode, status, total_rows, processed_rows, success_count, failed_count,
    structural_error, created_at, started_at, completed_at, expires_at
"#;

/// 文本列 → 枚举
fn parse_text_column<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

/// 文本列 → JSON
fn parse_json_column(idx: usize, raw: String) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_job_row(row: &Row<'_>) -> rusqlite::Result<ImportJob> {
    let structural_error: Option<String> = row.get(12)?;
    Ok(ImportJob {
        job_id: row.get(0)?,
        created_by: row.get(1)?,
        organization_id: row.get(2)?,
        file_name: row.get(3)?,
        domain: parse_text_column(4, row.get(4)?)?,
        validation_mode: parse_text_column(5, row.get(5)?)?,
        write_mode: parse_text_column(6, row.get(6)?)?,
        status: parse_text_column(7, row.get(7)?)?,
        total_rows: row.get::<_, i64>(8)? as usize,
        processed_rows: row.get::<_, i64>(9)? as usize,
        success_count: row.get::<_, i64>(10)? as usize,
        failed_count: row.get::<_, i64>(11)? as usize,
        structural_error: structural_error
            .map(|raw| parse_json_column(12, raw))
            .transpose()?,
        created_at: row.get(13)?,
        started_at: row.get(14)?,
        completed_at: row.get(15)?,
        expires_at: row.get(16)?,
    })
}

fn map_error_row(row: &Row<'_>) -> rusqlite::Result<ImportRowError> {
    Ok(ImportRowError {
        job_id: row.get(0)?,
        row_number: row.get::<_, i64>(1)? as usize,
        row_data: parse_json_column(2, row.get(2)?)?,
        error_message: row.get(3)?,
        error_field: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// ==========================================
// ImportJobRepositoryImpl
// ==========================================
pub struct ImportJobRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl ImportJobRepositoryImpl {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 共享已有连接
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

#[async_trait]
impl ImportJobRepository for ImportJobRepositoryImpl {
    async fn insert_job(&self, job: &ImportJob) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let structural_error = job
            .structural_error
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            &format!(
                "INSERT INTO import_job ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                JOB_COLUMNS
            ),
            params![
                job.job_id,
                job.created_by,
                job.organization_id,
                job.file_name,
                job.domain.as_str(),
                job.validation_mode.as_str(),
                job.write_mode.as_str(),
                job.status.as_str(),
                job.total_rows as i64,
                job.processed_rows as i64,
                job.success_count as i64,
                job.failed_count as i64,
                structural_error,
                job.created_at,
                job.started_at,
                job.completed_at,
                job.expires_at,
            ],
        )?;
        Ok(())
    }

    async fn find_job(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>> {
        let conn = self.lock()?;
        let job = conn
            .query_row(
                &format!("SELECT {} FROM import_job WHERE job_id = ?1", JOB_COLUMNS),
                params![job_id],
                map_job_row,
            )
            .optional()?;
        Ok(job)
    }

    async fn update_job(&self, job: &ImportJob) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let structural_error = job
            .structural_error
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let affected = conn.execute(
            r#"
            UPDATE import_job
            SET status = ?2,
                total_rows = ?3,
                processed_rows = ?4,
                success_count = ?5,
                failed_count = ?6,
                structural_error = ?7,
                started_at = ?8,
                completed_at = ?9,
                expires_at = ?10
            WHERE job_id = ?1
            "#,
            params![
                job.job_id,
                job.status.as_str(),
                job.total_rows as i64,
                job.processed_rows as i64,
                job.success_count as i64,
                job.failed_count as i64,
                structural_error,
                job.started_at,
                job.completed_at,
                job.expires_at,
            ],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ImportJob".to_string(),
                id: job.job_id.clone(),
            });
        }
        Ok(())
    }

    async fn list_recent_jobs(
        &self,
        created_by: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<ImportJob>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM import_job
            WHERE (?1 IS NULL OR created_by = ?1)
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
            JOB_COLUMNS
        ))?;

        let jobs = stmt
            .query_map(params![created_by, limit as i64], map_job_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    async fn delete_expired_jobs(&self, now: DateTime<Utc>) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        tx.execute(
            r#"
            DELETE FROM import_row_error
            WHERE job_id IN (
                SELECT job_id FROM import_job
                WHERE expires_at IS NOT NULL AND expires_at <= ?1
            )
            "#,
            params![now],
        )?;
        let deleted = tx.execute(
            "DELETE FROM import_job WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now],
        )?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(deleted)
    }

    async fn insert_row_errors(&self, errors: &[ImportRowError]) -> RepositoryResult<usize> {
        if errors.is_empty() {
            return Ok(0);
        }

        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let mut stmt = tx.prepare(
            r#"
            INSERT INTO import_row_error (
                job_id, row_number, row_data, error_message, error_field, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )?;

        let mut count = 0;
        for error in errors {
            stmt.execute(params![
                error.job_id,
                error.row_number as i64,
                serde_json::to_string(&error.row_data)?,
                error.error_message,
                error.error_field,
                error.created_at,
            ])?;
            count += 1;
        }

        // 显式释放 stmt 的借用,以便提交事务
        drop(stmt);

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(count)
    }

    async fn list_row_errors(
        &self,
        job_id: &str,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<Vec<ImportRowError>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT job_id, row_number, row_data, error_message, error_field, created_at
            FROM import_row_error
            WHERE job_id = ?1
            ORDER BY row_number ASC, error_id ASC
            LIMIT ?2 OFFSET ?3
            "#,
        )?;

        let errors = stmt
            .query_map(params![job_id, limit as i64, offset as i64], map_error_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(errors)
    }

    async fn count_row_errors(&self, job_id: &str) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM import_row_error WHERE job_id = ?1",
            params![job_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use crate::domain::types::{ImportDomain, JobStatus, ValidationMode, WriteMode};
    use chrono::Duration;

    fn repo() -> ImportJobRepositoryImpl {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        ImportJobRepositoryImpl::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn job(created_by: &str) -> ImportJob {
        ImportJob::new(
            created_by,
            None,
            "users.csv",
            ImportDomain::Users,
            ValidationMode::Partial,
            WriteMode::Upsert,
        )
    }

    #[tokio::test]
    async fn test_job_roundtrip_and_update() {
        let repo = repo();
        let mut job = job("admin-1");
        repo.insert_job(&job).await.unwrap();

        job.status = JobStatus::Failed;
        job.total_rows = 5;
        job.processed_rows = 5;
        job.success_count = 4;
        job.failed_count = 1;
        job.structural_error = Some(serde_json::json!({"kind": "duplicate_keys"}));
        repo.update_job(&job).await.unwrap();

        let loaded = repo.find_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.success_count, 4);
        assert_eq!(loaded.write_mode, WriteMode::Upsert);
        assert_eq!(loaded.structural_error, job.structural_error);
        assert!(repo.find_job("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_job_is_not_found() {
        let repo = repo();
        let result = repo.update_job(&job("admin-1")).await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_row_errors_paging_and_count() {
        let repo = repo();
        let job = job("admin-1");
        repo.insert_job(&job).await.unwrap();

        let errors: Vec<ImportRowError> = (1..=5)
            .rev()
            .map(|n| {
                ImportRowError::new(
                    &job.job_id,
                    n,
                    serde_json::json!({"name": format!("row {}", n)}),
                    "Missing required field: email",
                    "email",
                )
            })
            .collect();
        assert_eq!(repo.insert_row_errors(&errors).await.unwrap(), 5);

        let page = repo.list_row_errors(&job.job_id, 1, 2).await.unwrap();
        assert_eq!(
            page.iter().map(|e| e.row_number).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(page[0].row_data["name"], "row 2");
        assert_eq!(repo.count_row_errors(&job.job_id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_list_recent_and_purge_expired() {
        let repo = repo();
        let now = Utc::now();

        let mut old = job("admin-1");
        old.created_at = now - Duration::days(10);
        old.expires_at = Some(now - Duration::days(3));
        repo.insert_job(&old).await.unwrap();
        repo.insert_row_errors(&[ImportRowError::new(
            &old.job_id,
            1,
            serde_json::json!({}),
            "bad",
            "",
        )])
        .await
        .unwrap();

        let fresh = job("admin-2");
        repo.insert_job(&fresh).await.unwrap();

        let all = repo.list_recent_jobs(None, 20).await.unwrap();
        assert_eq!(all[0].job_id, fresh.job_id);
        let mine = repo.list_recent_jobs(Some("admin-1"), 20).await.unwrap();
        assert_eq!(mine.len(), 1);

        assert_eq!(repo.delete_expired_jobs(now).await.unwrap(), 1);
        assert!(repo.find_job(&old.job_id).await.unwrap().is_none());
        assert_eq!(repo.count_row_errors(&old.job_id).await.unwrap(), 0);
        assert!(repo.find_job(&fresh.job_id).await.unwrap().is_some());
    }
}
