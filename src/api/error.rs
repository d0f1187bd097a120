// ==========================================
// 批量导入管道 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换 Repository / Importer 错误为调用方可读的错误消息
// ==========================================

use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 权限与输入错误
    // ==========================================
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ==========================================
    // 导入与数据访问错误
    // ==========================================
    #[error("import failed: {0}")]
    ImportError(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{} (id={})", entity, id))
            }
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("field {}: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::JobNotFound(id) => ApiError::NotFound(format!("ImportJob (id={})", id)),
            ImportError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            ImportError::UnsupportedFormat(_)
            | ImportError::FileTooLarge { .. }
            | ImportError::InvalidSchema(_) => ApiError::InvalidInput(err.to_string()),
            ImportError::DatabaseError(msg) => ApiError::DatabaseError(msg),
            ImportError::InternalError(msg) => ApiError::InternalError(msg),
            ImportError::Other(e) => ApiError::Other(e),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_not_found_maps_to_not_found() {
        let err: ApiError = RepositoryError::NotFound {
            entity: "ImportJob".to_string(),
            id: "job-1".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(err.to_string(), "not found: ImportJob (id=job-1)");
    }

    #[test]
    fn test_import_errors_map_by_kind() {
        let err: ApiError = ImportError::FileTooLarge { size: 20, max: 10 }.into();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let err: ApiError = ImportError::EmptyFile.into();
        assert!(matches!(err, ApiError::ImportError(_)));

        let err: ApiError = ImportError::JobNotFound("job-9".to_string()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
