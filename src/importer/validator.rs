// ==========================================
// 批量导入管道 - Schema 校验器
// ==========================================
// 纯函数: 给定 (行, 上下文) 结果确定，无 I/O
// 上下文: 引用快照 + 写入模式 + 调用方可创建的角色
// ==========================================

use crate::domain::record::{RawRow, ValidatedRecord};
use crate::domain::reference::ReferenceSnapshot;
use crate::domain::types::{UserRole, WriteMode};
use crate::importer::field_parser::FieldError;
use crate::importer::schema::RecordSchema;
use std::sync::Arc;

/// 校验上下文（作业内共享、只读）
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub snapshot: Arc<ReferenceSnapshot>,
    pub write_mode: WriteMode,
    pub allowed_roles: Vec<UserRole>,
}

impl ValidationContext {
    pub fn new(
        snapshot: Arc<ReferenceSnapshot>,
        write_mode: WriteMode,
        allowed_roles: Vec<UserRole>,
    ) -> Self {
        Self {
            snapshot,
            write_mode,
            allowed_roles,
        }
    }

    /// 无引用、无角色授权的上下文
    pub fn detached() -> Self {
        Self::new(Arc::new(ReferenceSnapshot::empty()), WriteMode::Insert, Vec::new())
    }
}

/// 单行校验结果
#[derive(Debug, Clone, PartialEq)]
pub struct RowValidation {
    pub row_number: usize,
    pub valid: bool,
    pub errors: Vec<FieldError>,
    pub record: Option<ValidatedRecord>,
}

pub struct SchemaValidator {
    schema: Arc<dyn RecordSchema>,
}

impl SchemaValidator {
    pub fn new(schema: Arc<dyn RecordSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Arc<dyn RecordSchema> {
        &self.schema
    }

    /// 校验单行
    pub fn validate(&self, row: &RawRow, ctx: &ValidationContext) -> RowValidation {
        match self.schema.validate(row, ctx) {
            Ok(record) => RowValidation {
                row_number: row.row_number,
                valid: true,
                errors: Vec::new(),
                record: Some(record),
            },
            Err(errors) => RowValidation {
                row_number: row.row_number,
                valid: false,
                errors,
                record: None,
            },
        }
    }

    /// 批量校验（保持行序）
    pub fn validate_all(&self, rows: &[RawRow], ctx: &ValidationContext) -> Vec<RowValidation> {
        rows.iter().map(|row| self.validate(row, ctx)).collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::reference::ReferenceNamespace;
    use std::collections::HashMap;

    pub(crate) fn context_with_constituency(code: &str, id: &str) -> ValidationContext {
        let snapshot = ReferenceSnapshot::empty().with_namespace(
            ReferenceNamespace::ConstituencyCode,
            HashMap::from([(code.to_string(), id.to_string())]),
        );
        ValidationContext::new(Arc::new(snapshot), WriteMode::Insert, Vec::new())
    }
}
