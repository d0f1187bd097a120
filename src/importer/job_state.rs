// ==========================================
// 批量导入管道 - 作业状态机
// ==========================================
// pending    → validating | cancelled | failed
// validating → processing | failed | cancelled
// processing → completed  | failed | cancelled
// 终态（completed / failed / cancelled）不可再转换
// pending → failed 仅在开始前超时或意外错误时发生
// ==========================================

use crate::domain::job::ImportJob;
use crate::domain::types::JobStatus;
use crate::importer::error::{ImportError, ImportResult};
use chrono::{Duration, Utc};

/// 转换是否合法
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Pending, Validating)
            | (Pending, Cancelled)
            | (Pending, Failed)
            | (Validating, Processing)
            | (Validating, Failed)
            | (Validating, Cancelled)
            | (Processing, Completed)
            | (Processing, Failed)
            | (Processing, Cancelled)
    )
}

/// 执行状态转换并维护时间戳
///
/// - 进入 validating: 记录 started_at
/// - 进入终态: 记录 completed_at 与 expires_at（保留期）
pub fn transition(job: &mut ImportJob, to: JobStatus, retention_days: i64) -> ImportResult<()> {
    if !can_transition(job.status, to) {
        return Err(ImportError::InvalidStateTransition {
            from: job.status.to_string(),
            to: to.to_string(),
        });
    }

    let now = Utc::now();
    if to == JobStatus::Validating {
        job.started_at = Some(now);
    }
    if to.is_terminal() {
        job.completed_at = Some(now);
        job.expires_at = Some(now + Duration::days(retention_days));
    }
    job.status = to;
    Ok(())
}

/// 计数检查点
///
/// processed_rows 单调不减；success + failed 不超过 total_rows
pub fn record_progress(
    job: &mut ImportJob,
    processed_rows: usize,
    success_count: usize,
    failed_count: usize,
) -> ImportResult<()> {
    if processed_rows < job.processed_rows {
        return Err(ImportError::InternalError(format!(
            "processed_rows must not decrease ({} -> {})",
            job.processed_rows, processed_rows
        )));
    }
    if success_count + failed_count > job.total_rows {
        return Err(ImportError::InternalError(format!(
            "success ({}) + failed ({}) exceeds total_rows ({})",
            success_count, failed_count, job.total_rows
        )));
    }

    job.processed_rows = processed_rows;
    job.success_count = success_count;
    job.failed_count = failed_count;
    Ok(())
}
