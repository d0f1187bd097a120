// ==========================================
// 批量导入管道 - 导入运行参数
// ==========================================
// 默认值见 Default 实现；可由 config_kv 覆写（见 ConfigManager）
// ==========================================

use serde::{Deserialize, Serialize};

/// 10 MiB
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_ROWS: usize = 10_000;
pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const DEFAULT_ERROR_PAGE_CAP: usize = 100;
pub const DEFAULT_RETENTION_DAYS: i64 = 7;
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// 单文件最大数据行数
    pub max_rows: usize,
    /// 单文件最大字节数
    pub max_file_bytes: usize,
    /// 每个写入分块的记录数
    pub chunk_size: usize,
    /// 错误列表单页上限
    pub error_page_cap: usize,
    /// 作业保留天数（expires_at = completed_at + retention_days）
    pub retention_days: i64,
    /// 并发作业上限
    pub max_concurrent_jobs: usize,
    /// 分块失败后逐行重试，只让出错记录失败
    pub isolate_failed_chunks: bool,
    /// 作业超时（秒）；在阶段/分块边界检查
    pub job_timeout_secs: Option<u64>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            chunk_size: DEFAULT_CHUNK_SIZE,
            error_page_cap: DEFAULT_ERROR_PAGE_CAP,
            retention_days: DEFAULT_RETENTION_DAYS,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            isolate_failed_chunks: false,
            job_timeout_secs: None,
        }
    }
}
