// ==========================================
// 批量导入管道 - 领域模型层
// ==========================================
// 职责: 定义作业实体、行记录、引用快照、枚举类型
// 红线: 不含数据访问逻辑, 不含管道编排逻辑
// ==========================================

pub mod job;
pub mod record;
pub mod reference;
pub mod types;

// 重导出核心类型
pub use job::{ErrorEntry, ErrorPage, ImportJob, ImportRowError, JobStatusView};
pub use record::{
    BoothRecord, BoothType, GenericRecord, IncomeLevel, RawRow, Urbanization, UserRecord,
    ValidatedRecord, WardRecord,
};
pub use reference::{ReferenceNamespace, ReferenceSnapshot};
pub use types::{ImportDomain, JobStatus, UserRole, ValidationMode, WriteMode};
