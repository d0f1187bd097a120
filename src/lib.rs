// ==========================================
// 批量导入管道 - 核心库
// ==========================================
// 表格文件（CSV / Excel）→ 结构校验 → 引用校验 → 文件内去重 → 分块落库
// 技术栈: Rust + SQLite + tokio
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 校验与落库管道
pub mod importer;

// 配置层 - 导入参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 库级接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ImportDomain, JobStatus, UserRole, ValidationMode, WriteMode};

// 领域实体
pub use domain::{ErrorPage, ImportJob, ImportRowError, JobStatusView, RawRow, ValidatedRecord};

// 导入管道
pub use importer::{ImportError, ImportPipeline, ImportResult, ImportWorkerPool, JobHandle};

// API
pub use api::{ApiError, ApiResult, Caller, ImportApi, SubmitImportRequest};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "批量导入管道";
