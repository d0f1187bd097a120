// ==========================================
// 批量导入管道 - 导入层
// ==========================================
// 职责: 表格文件 → 校验 → 分块落库，作业状态与逐行错误跟踪
// 支持: CSV, Excel (.xlsx/.xls)
// ==========================================

// 模块声明
pub mod batch_persister;
pub mod duplicate_detector;
pub mod error;
pub mod error_collector;
pub mod field_parser;
pub mod file_parser;
pub mod job_state;
pub mod pipeline;
pub mod reference_resolver;
pub mod schema;
pub mod validator;
pub mod worker;

// 重导出核心类型
pub use batch_persister::{BatchPersister, ChunkObserver, ChunkProgress, PersistOutcome, StagedRecord};
pub use duplicate_detector::{find_duplicates, DuplicateGroup};
pub use error::{ImportError, ImportResult};
pub use error_collector::ErrorCollector;
pub use field_parser::FieldError;
pub use file_parser::{CsvDecoder, DecodedFile, ExcelDecoder, FileFormat, TabularDecoder, UniversalFileParser};
pub use pipeline::{ImportPipeline, ImportRequest, JobOutcome};
pub use reference_resolver::ReferenceResolver;
pub use schema::{schema_for, FieldKind, FieldSpec, GenericSchema, RecordSchema, TemplateFile};
pub use validator::{RowValidation, SchemaValidator, ValidationContext};
pub use worker::{ImportWorkerPool, JobHandle};
