// ==========================================
// 批量导入管道 - 导入作业领域模型
// ==========================================
// ImportJob: 一个文件从提交到终态的工作单元
// ImportRowError: 作业下的逐行错误（不可变）
// 对齐: import_job / import_row_error 表
// ==========================================

use crate::domain::types::{ImportDomain, JobStatus, ValidationMode, WriteMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// ImportJob - 导入作业
// ==========================================
// 不变量: success_count + failed_count <= total_rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: String,
    pub created_by: String,
    pub organization_id: Option<String>,
    pub file_name: String,
    pub domain: ImportDomain,
    pub validation_mode: ValidationMode,
    pub write_mode: WriteMode,
    pub status: JobStatus,

    // ===== 计数 =====
    pub total_rows: usize,
    pub processed_rows: usize,
    pub success_count: usize,
    pub failed_count: usize,

    /// 结构性错误摘要（表头缺失/空文件/超限/重复键等）
    pub structural_error: Option<serde_json::Value>,

    // ===== 时间戳 =====
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn new(
        created_by: impl Into<String>,
        organization_id: Option<String>,
        file_name: impl Into<String>,
        domain: ImportDomain,
        validation_mode: ValidationMode,
        write_mode: WriteMode,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            created_by: created_by.into(),
            organization_id,
            file_name: file_name.into(),
            domain,
            validation_mode,
            write_mode,
            status: JobStatus::Pending,
            total_rows: 0,
            processed_rows: 0,
            success_count: 0,
            failed_count: 0,
            structural_error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            expires_at: None,
        }
    }

    /// 进度百分比（total_rows = 0 时为 0）
    pub fn progress_percentage(&self) -> u8 {
        if self.total_rows == 0 {
            return 0;
        }
        let pct = self.processed_rows.min(self.total_rows) * 100 / self.total_rows;
        pct as u8
    }

    pub fn to_status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.job_id.clone(),
            status: self.status,
            domain: self.domain,
            file_name: self.file_name.clone(),
            total_rows: self.total_rows,
            processed_rows: self.processed_rows,
            success_count: self.success_count,
            failed_count: self.failed_count,
            progress_percentage: self.progress_percentage(),
            structural_error: self.structural_error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

// ==========================================
// JobStatusView - 轮询响应
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub domain: ImportDomain,
    pub file_name: String,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub progress_percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structural_error: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ==========================================
// ImportRowError - 逐行错误
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRowError {
    pub job_id: String,
    /// 1 起始的数据行号（不含表头）
    pub row_number: usize,
    /// 原始行快照
    pub row_data: serde_json::Value,
    pub error_message: String,
    /// 尽力归因的字段名，无法归因时为空串
    pub error_field: String,
    pub created_at: DateTime<Utc>,
}

impl ImportRowError {
    pub fn new(
        job_id: impl Into<String>,
        row_number: usize,
        row_data: serde_json::Value,
        error_message: impl Into<String>,
        error_field: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            row_number,
            row_data,
            error_message: error_message.into(),
            error_field: error_field.into(),
            created_at: Utc::now(),
        }
    }

    pub fn to_entry(&self) -> ErrorEntry {
        ErrorEntry {
            row_number: self.row_number,
            error_message: self.error_message.clone(),
            error_field: self.error_field.clone(),
        }
    }
}

/// 错误列表条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub row_number: usize,
    pub error_message: String,
    pub error_field: String,
}

/// 分页错误列表；total 始终为完整错误数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPage {
    pub job_id: String,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub truncated: bool,
    pub errors: Vec<ErrorEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> ImportJob {
        ImportJob::new(
            "admin-1",
            Some("org-1".to_string()),
            "wards.csv",
            ImportDomain::Wards,
            ValidationMode::Strict,
            WriteMode::Insert,
        )
    }

    #[test]
    fn test_new_job_is_pending_with_zero_counts() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_rows, 0);
        assert_eq!(job.progress_percentage(), 0);
        assert!(Uuid::parse_str(&job.job_id).is_ok());
    }

    #[test]
    fn test_progress_percentage_truncates() {
        let mut job = sample_job();
        job.total_rows = 3;
        job.processed_rows = 2;
        assert_eq!(job.progress_percentage(), 66);
        job.processed_rows = 3;
        assert_eq!(job.to_status_view().progress_percentage, 100);
    }
}
