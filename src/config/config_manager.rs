// ==========================================
// 批量导入管道 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 约定: 缺失或格式错误的值回退到默认值并记录 warn
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::config::import_settings::{
    DEFAULT_CHUNK_SIZE, DEFAULT_ERROR_PAGE_CAP, DEFAULT_MAX_CONCURRENT_JOBS,
    DEFAULT_MAX_FILE_BYTES, DEFAULT_MAX_ROWS, DEFAULT_RETENTION_DAYS,
};
use crate::db::open_sqlite_connection;
use crate::importer::error::{ImportError, ImportResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// 配置键
pub mod config_keys {
    pub const MAX_ROWS: &str = "import.max_rows";
    pub const MAX_FILE_BYTES: &str = "import.max_file_bytes";
    pub const CHUNK_SIZE: &str = "import.chunk_size";
    pub const ERROR_PAGE_CAP: &str = "import.error_page_cap";
    pub const RETENTION_DAYS: &str = "import.retention_days";
    pub const MAX_CONCURRENT_JOBS: &str = "import.max_concurrent_jobs";
    pub const ISOLATE_FAILED_CHUNKS: &str = "import.isolate_failed_chunks";
    pub const JOB_TIMEOUT_SECS: &str = "import.job_timeout_secs";
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ImportResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> ImportResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ImportResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 配置（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ImportResult<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
            ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value,
                updated_at = datetime('now')
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// 全部导入相关配置（import.* 前缀）
    pub fn get_import_config_snapshot(&self) -> ImportResult<HashMap<String, String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' AND key LIKE 'import.%' ORDER BY key",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(rows)
    }

    /// 读取并解析配置值；缺失或不合法时回退默认值
    fn get_parsed_or_default<T>(
        &self,
        key: &str,
        default: T,
        is_valid: impl Fn(&T) -> bool,
    ) -> ImportResult<T>
    where
        T: FromStr + std::fmt::Display,
    {
        let raw = match self.get_global_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };

        match raw.trim().parse::<T>() {
            Ok(v) if is_valid(&v) => Ok(v),
            _ => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置值格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_max_rows(&self) -> ImportResult<usize> {
        self.get_parsed_or_default(config_keys::MAX_ROWS, DEFAULT_MAX_ROWS, |v| *v > 0)
    }

    async fn get_max_file_bytes(&self) -> ImportResult<usize> {
        self.get_parsed_or_default(config_keys::MAX_FILE_BYTES, DEFAULT_MAX_FILE_BYTES, |v| {
            *v > 0
        })
    }

    async fn get_chunk_size(&self) -> ImportResult<usize> {
        self.get_parsed_or_default(config_keys::CHUNK_SIZE, DEFAULT_CHUNK_SIZE, |v| *v > 0)
    }

    async fn get_error_page_cap(&self) -> ImportResult<usize> {
        self.get_parsed_or_default(config_keys::ERROR_PAGE_CAP, DEFAULT_ERROR_PAGE_CAP, |v| {
            *v > 0
        })
    }

    async fn get_retention_days(&self) -> ImportResult<i64> {
        self.get_parsed_or_default(config_keys::RETENTION_DAYS, DEFAULT_RETENTION_DAYS, |v| {
            *v >= 0
        })
    }

    async fn get_max_concurrent_jobs(&self) -> ImportResult<usize> {
        self.get_parsed_or_default(
            config_keys::MAX_CONCURRENT_JOBS,
            DEFAULT_MAX_CONCURRENT_JOBS,
            |v| *v > 0,
        )
    }

    async fn get_isolate_failed_chunks(&self) -> ImportResult<bool> {
        let value = self.get_global_config_value(config_keys::ISOLATE_FAILED_CHUNKS)?;
        match value.as_deref().map(|v| v.trim().to_lowercase()) {
            None => Ok(false),
            Some(v) if v == "true" || v == "1" => Ok(true),
            Some(v) if v == "false" || v == "0" => Ok(false),
            Some(v) => {
                tracing::warn!(
                    config_key = config_keys::ISOLATE_FAILED_CHUNKS,
                    raw_value = %v,
                    "配置值格式错误，使用默认值 false"
                );
                Ok(false)
            }
        }
    }

    async fn get_job_timeout_secs(&self) -> ImportResult<Option<u64>> {
        // 0 或缺失 = 不超时
        let secs = self.get_parsed_or_default(config_keys::JOB_TIMEOUT_SECS, 0u64, |_| true)?;
        Ok(Some(secs).filter(|s| *s > 0))
    }
}
