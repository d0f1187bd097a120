// ==========================================
// 批量导入管道 - 逐行错误收集器
// ==========================================
// 职责: 记录校验/落库阶段的逐行错误，分页查询，导出 CSV 报告
// 约定: 列表单页受 page_cap 限制，总数始终精确
// ==========================================

use crate::domain::job::{ErrorPage, ImportRowError};
use crate::domain::record::RawRow;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_parser::FieldError;
use crate::repository::import_job_repo::ImportJobRepository;
use std::sync::Arc;

/// CSV 错误报告表头
pub const ERROR_REPORT_HEADERS: [&str; 4] = ["Row Number", "Field", "Error Message", "Row Data"];

pub struct ErrorCollector {
    repo: Arc<dyn ImportJobRepository>,
    page_cap: usize,
}

impl ErrorCollector {
    pub fn new(repo: Arc<dyn ImportJobRepository>, page_cap: usize) -> Self {
        Self {
            repo,
            page_cap: page_cap.max(1),
        }
    }

    /// 记录单条错误
    pub async fn record(
        &self,
        job_id: &str,
        row: &RawRow,
        message: &str,
        field: &str,
    ) -> ImportResult<()> {
        let error = ImportRowError::new(job_id, row.row_number, row.to_json(), message, field);
        self.repo.insert_row_errors(&[error]).await?;
        Ok(())
    }

    /// 批量记录（单事务）
    pub async fn record_many(&self, errors: &[ImportRowError]) -> ImportResult<usize> {
        if errors.is_empty() {
            return Ok(0);
        }
        Ok(self.repo.insert_row_errors(errors).await?)
    }

    /// 一行的全部字段错误 → ImportRowError（每个字段一条）
    pub fn from_field_errors(job_id: &str, row: &RawRow, errors: &[FieldError]) -> Vec<ImportRowError> {
        let row_data = row.to_json();
        errors
            .iter()
            .map(|e| {
                ImportRowError::new(job_id, row.row_number, row_data.clone(), &e.message, &e.field)
            })
            .collect()
    }

    /// 分页查询；limit 为 0 或超过上限时按上限截断
    pub async fn list(&self, job_id: &str, offset: usize, limit: usize) -> ImportResult<ErrorPage> {
        let effective_limit = if limit == 0 {
            self.page_cap
        } else {
            limit.min(self.page_cap)
        };

        let total = self.repo.count_row_errors(job_id).await?;
        let errors = self
            .repo
            .list_row_errors(job_id, offset, effective_limit)
            .await?;

        Ok(ErrorPage {
            job_id: job_id.to_string(),
            total,
            offset,
            limit: effective_limit,
            truncated: offset + errors.len() < total,
            errors: errors.iter().map(ImportRowError::to_entry).collect(),
        })
    }

    pub async fn count(&self, job_id: &str) -> ImportResult<usize> {
        Ok(self.repo.count_row_errors(job_id).await?)
    }

    /// 导出完整错误报告（不受分页上限限制）
    pub async fn export_csv(&self, job_id: &str) -> ImportResult<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(ERROR_REPORT_HEADERS)?;

        let mut offset = 0;
        loop {
            let batch = self
                .repo
                .list_row_errors(job_id, offset, self.page_cap)
                .await?;
            if batch.is_empty() {
                break;
            }
            for error in &batch {
                writer.write_record([
                    error.row_number.to_string(),
                    error.error_field.clone(),
                    error.error_message.clone(),
                    error.row_data.to_string(),
                ])?;
            }
            offset += batch.len();
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ImportError::InternalError(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ImportError::InternalError(e.to_string()))
    }
}
