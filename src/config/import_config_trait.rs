// ==========================================
// 批量导入管道 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::import_settings::ImportSettings;
use crate::importer::error::ImportResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入管道所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 单文件最大数据行数
    ///
    /// # 默认值
    /// - 10000
    async fn get_max_rows(&self) -> ImportResult<usize>;

    /// 单文件最大字节数
    ///
    /// # 默认值
    /// - 10485760 (10 MiB)
    async fn get_max_file_bytes(&self) -> ImportResult<usize>;

    /// 写入分块大小（>= 1）
    ///
    /// # 默认值
    /// - 100
    async fn get_chunk_size(&self) -> ImportResult<usize>;

    /// 错误列表单页上限
    ///
    /// # 默认值
    /// - 100
    async fn get_error_page_cap(&self) -> ImportResult<usize>;

    /// 作业保留天数
    ///
    /// # 默认值
    /// - 7
    async fn get_retention_days(&self) -> ImportResult<i64>;

    /// 并发作业上限（>= 1）
    ///
    /// # 默认值
    /// - 4
    async fn get_max_concurrent_jobs(&self) -> ImportResult<usize>;

    /// 分块失败后是否逐行隔离
    ///
    /// # 默认值
    /// - false
    async fn get_isolate_failed_chunks(&self) -> ImportResult<bool>;

    /// 作业超时（秒）
    ///
    /// # 默认值
    /// - 无超时
    async fn get_job_timeout_secs(&self) -> ImportResult<Option<u64>>;

    /// 一次读取全部导入参数
    async fn load_settings(&self) -> ImportResult<ImportSettings> {
        Ok(ImportSettings {
            max_rows: self.get_max_rows().await?,
            max_file_bytes: self.get_max_file_bytes().await?,
            chunk_size: self.get_chunk_size().await?,
            error_page_cap: self.get_error_page_cap().await?,
            retention_days: self.get_retention_days().await?,
            max_concurrent_jobs: self.get_max_concurrent_jobs().await?,
            isolate_failed_chunks: self.get_isolate_failed_chunks().await?,
            job_timeout_secs: self.get_job_timeout_secs().await?,
        })
    }
}
