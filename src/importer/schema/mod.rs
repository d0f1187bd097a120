// ==========================================
// 批量导入管道 - 领域 Schema
// ==========================================
// 职责: 每个导入域的列定义、模板、自然键、逐行校验规则
// 规则顺序: 必填 → 类型转换 → 数值边界 → 枚举 → 格式 → 跨字段 → 引用存在性
// 约定: 一行内收集全部错误，不短路
// ==========================================

pub mod booth;
pub mod generic;
pub mod user;
pub mod ward;

pub use booth::BoothSchema;
pub use generic::{FieldKind, FieldSpec, GenericSchema};
pub use user::UserSchema;
pub use ward::WardSchema;

use crate::domain::record::{RawRow, ValidatedRecord};
use crate::domain::reference::{ReferenceNamespace, ReferenceSnapshot};
use crate::domain::types::ImportDomain;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_parser::FieldError;
use crate::importer::validator::ValidationContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ==========================================
// TemplateFile - 导入模板
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFile {
    pub file_name: String,
    pub headers: Vec<String>,
    pub example_rows: Vec<Vec<String>>,
    /// 渲染后的 CSV 文本（表头 + 示例行）
    pub csv: String,
}

// ==========================================
// RecordSchema Trait
// ==========================================
pub trait RecordSchema: Send + Sync {
    fn domain(&self) -> ImportDomain;

    /// 模板列（模板顺序）
    fn columns(&self) -> Vec<String>;

    /// 必填列（表头缺失即结构性错误）
    fn required_columns(&self) -> Vec<String>;

    /// 模板示例行
    fn example_rows(&self) -> Vec<Vec<String>>;

    /// 校验前需加载的引用命名空间
    fn reference_namespaces(&self) -> Vec<ReferenceNamespace>;

    /// 文件内去重使用的自然键；键字段为空时返回 None（不参与去重）
    fn natural_key(&self, row: &RawRow) -> Option<String>;

    /// 逐行校验
    ///
    /// # 返回
    /// - Ok(ValidatedRecord): 全部规则通过
    /// - Err(Vec<FieldError>): 本行全部违规项（非空）
    fn validate(
        &self,
        row: &RawRow,
        ctx: &ValidationContext,
    ) -> Result<ValidatedRecord, Vec<FieldError>>;

    /// 生成导入模板
    fn template(&self) -> ImportResult<TemplateFile> {
        let headers = self.columns();
        let example_rows = self.example_rows();

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&headers)?;
        for row in &example_rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ImportError::InternalError(e.to_string()))?;
        let csv = String::from_utf8(bytes).map_err(|e| ImportError::InternalError(e.to_string()))?;

        Ok(TemplateFile {
            file_name: format!("{}_template.csv", self.domain()),
            headers,
            example_rows,
            csv,
        })
    }
}

/// 内置域的 schema；generic 需由调用方提供
pub fn schema_for(domain: ImportDomain) -> ImportResult<Arc<dyn RecordSchema>> {
    match domain {
        ImportDomain::Wards => Ok(Arc::new(WardSchema)),
        ImportDomain::Booths => Ok(Arc::new(BoothSchema)),
        ImportDomain::Users => Ok(Arc::new(UserSchema)),
        ImportDomain::Generic => Err(ImportError::InvalidSchema(
            "generic imports require a caller-supplied schema".to_string(),
        )),
    }
}

/// 组合自然键: 各部分以 ':' 连接，部分内的 '\\' 与 ':' 转义，不同拆分不会得到相同的键
pub(crate) fn compose_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.replace('\\', "\\\\").replace(':', "\\:"))
        .collect::<Vec<_>>()
        .join(":")
}

// ==========================================
// RowFields - 逐行错误收集器
// ==========================================
pub(crate) struct RowFields<'r> {
    row: &'r RawRow,
    errors: Vec<FieldError>,
}

impl<'r> RowFields<'r> {
    pub(crate) fn new(row: &'r RawRow) -> Self {
        Self {
            row,
            errors: Vec::new(),
        }
    }

    /// 必填字段；缺失时记录错误
    pub(crate) fn required(&mut self, field: &str) -> Option<String> {
        match self.row.get(field) {
            Some(v) => Some(v.to_string()),
            None => {
                self.errors.push(FieldError::missing(field));
                None
            }
        }
    }

    /// 可选字段原值
    pub(crate) fn optional(&self, field: &str) -> Option<String> {
        self.row.get(field).map(str::to_string)
    }

    /// 可选字段 + 解析
    pub(crate) fn parsed<T>(
        &mut self,
        field: &str,
        parse: impl FnOnce(&str, &str) -> Result<T, FieldError>,
    ) -> Option<T> {
        let raw = self.row.get(field)?;
        self.check(parse(field, raw))
    }

    /// 记录校验结果；失败返回 None
    pub(crate) fn check<T>(&mut self, result: Result<T, FieldError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    pub(crate) fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub(crate) fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 引用解析；值不存在时记录 "{label} not found: {key}"
    pub(crate) fn resolve(
        &mut self,
        snapshot: &ReferenceSnapshot,
        namespace: ReferenceNamespace,
        field: &str,
        label: &str,
        key: &str,
    ) -> Option<String> {
        match snapshot.resolve(namespace, key) {
            Some(id) => Some(id.to_string()),
            None => {
                self.errors
                    .push(FieldError::new(field, format!("{} not found: {}", label, key)));
                None
            }
        }
    }

    /// 无错误时构造记录，否则返回全部错误
    pub(crate) fn finish(
        self,
        build: impl FnOnce() -> Option<ValidatedRecord>,
    ) -> Result<ValidatedRecord, Vec<FieldError>> {
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        build().ok_or_else(|| {
            vec![FieldError::new(
                "",
                "row could not be converted to a record".to_string(),
            )]
        })
    }
}
