// ==========================================
// 批量导入管道 - API 层
// ==========================================
// 职责: 面向调用方的库级接口（不含 HTTP 传输）
// ==========================================

pub mod error;
pub mod import_api;
pub mod permission;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_api::{
    GenericSchemaDef, ImportApi, SubmitImportRequest, SubmitImportResponse, MAX_LIST_JOBS,
};
pub use permission::Caller;
