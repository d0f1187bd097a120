// ==========================================
// 批量导入管道 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 文件/解码错误 → 结构性错误 → 状态机错误 → 持久化/内部错误
// 说明: 逐行校验错误不走此枚举（见 field_parser::FieldError）
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("unsupported file format: {0} (only .csv/.xlsx/.xls)")]
    UnsupportedFormat(String),

    #[error("failed to read file: {0}")]
    FileReadError(String),

    #[error("failed to parse Excel file: {0}")]
    ExcelParseError(String),

    #[error("failed to parse CSV file: {0}")]
    CsvParseError(String),

    // ===== 结构性错误（作业在 validating 阶段失败）=====
    #[error("file is empty or has no data rows")]
    EmptyFile,

    #[error("file too large: {size} bytes exceeds maximum of {max} bytes")]
    FileTooLarge { size: usize, max: usize },

    #[error("file has {rows} rows, exceeding the maximum of {max}")]
    TooManyRows { rows: usize, max: usize },

    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("found {0} duplicate natural keys in file")]
    DuplicateKeys(usize),

    #[error("failed to load reference data: {0}")]
    ReferenceLoadError(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    // ===== 状态机错误 =====
    #[error("invalid job state transition: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("import job not found: {0}")]
    JobNotFound(String),

    #[error("import job cancelled: {0}")]
    Cancelled(String),

    #[error("import job timed out after {0} seconds")]
    TimedOut(u64),

    // ===== 持久化错误 =====
    #[error("database error: {0}")]
    DatabaseError(String),

    // ===== 配置错误 =====
    #[error("invalid config value (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },

    // ===== 通用错误 =====
    #[error("internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 是否为文件级结构性错误（不落库、计数保持 0）
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ImportError::FileNotFound(_)
                | ImportError::UnsupportedFormat(_)
                | ImportError::FileReadError(_)
                | ImportError::ExcelParseError(_)
                | ImportError::CsvParseError(_)
                | ImportError::EmptyFile
                | ImportError::FileTooLarge { .. }
                | ImportError::TooManyRows { .. }
                | ImportError::MissingColumns(_)
                | ImportError::DuplicateKeys(_)
                | ImportError::ReferenceLoadError(_)
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::DatabaseError(err.to_string())
    }
}

// 实现 From<RepositoryError>
impl From<RepositoryError> for ImportError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } if entity == "ImportJob" => {
                ImportError::JobNotFound(id)
            }
            RepositoryError::InvalidStateTransition { from, to } => {
                ImportError::InvalidStateTransition { from, to }
            }
            other => ImportError::DatabaseError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_columns() {
        let err = ImportError::MissingColumns(vec!["code".to_string(), "name".to_string()]);
        assert_eq!(err.to_string(), "missing required columns: code, name");
        assert!(err.is_structural());
    }

    #[test]
    fn test_state_errors_are_not_structural() {
        let err = ImportError::InvalidStateTransition {
            from: "completed".to_string(),
            to: "processing".to_string(),
        };
        assert!(!err.is_structural());
        assert!(!ImportError::TimedOut(5).is_structural());
    }
}
