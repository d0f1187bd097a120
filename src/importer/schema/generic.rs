// ==========================================
// 批量导入管道 - 通用 (Generic) Schema
// ==========================================
// 调用方提供字段定义，记录以 JSON payload 存储
// 自然键: key_fields 按顺序拼接（见 compose_key）
// 字段名按表头规则规范化（trim + 小写）
// ==========================================

use super::{compose_key, RecordSchema, RowFields};
use crate::domain::record::{GenericRecord, RawRow, ValidatedRecord};
use crate::domain::reference::ReferenceNamespace;
use crate::domain::types::ImportDomain;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::normalize_header;
use crate::importer::field_parser::{
    check_max_len, check_pattern, check_range, parse_bool, parse_decimal, parse_enum,
    parse_float, parse_int, FieldError,
};
use crate::importer::validator::ValidationContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// 字段类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text {
        #[serde(default)]
        max_len: Option<usize>,
        #[serde(default)]
        pattern: Option<String>,
    },
    Integer {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },
    Decimal {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Float {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Boolean,
    Enum {
        values: Vec<String>,
    },
}

impl FieldKind {
    /// 模板示例值
    fn example(&self) -> String {
        match self {
            FieldKind::Text { .. } => "text".to_string(),
            FieldKind::Integer { min, .. } => min.unwrap_or(1).to_string(),
            FieldKind::Decimal { min, .. } | FieldKind::Float { min, .. } => {
                min.unwrap_or(0.0).to_string()
            }
            FieldKind::Boolean => "true".to_string(),
            FieldKind::Enum { values } => values.first().cloned().unwrap_or_default(),
        }
    }
}

/// 字段定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, required: bool, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            required,
            kind,
        }
    }
}

pub struct GenericSchema {
    collection: String,
    fields: Vec<FieldSpec>,
    key_fields: Vec<String>,
    patterns: HashMap<String, Regex>,
}

impl GenericSchema {
    /// 构造并检查定义
    ///
    /// # 返回
    /// - Err(ImportError::InvalidSchema): 集合名为空 / 字段重名 / 键字段未定义或非必填 / 正则非法
    pub fn new(
        collection: impl Into<String>,
        fields: Vec<FieldSpec>,
        key_fields: Vec<String>,
    ) -> ImportResult<Self> {
        let collection = collection.into();
        if collection.trim().is_empty() {
            return Err(ImportError::InvalidSchema(
                "collection name must not be empty".to_string(),
            ));
        }
        if key_fields.is_empty() {
            return Err(ImportError::InvalidSchema(
                "at least one key field is required".to_string(),
            ));
        }

        // 字段名与解码器表头使用同一规范化
        let fields: Vec<FieldSpec> = fields
            .into_iter()
            .map(|mut spec| {
                spec.name = normalize_header(&spec.name);
                spec
            })
            .collect();
        let key_fields: Vec<String> = key_fields.iter().map(|k| normalize_header(k)).collect();

        let mut patterns = HashMap::new();
        for (idx, spec) in fields.iter().enumerate() {
            if spec.name.is_empty() {
                return Err(ImportError::InvalidSchema(
                    "field name must not be empty".to_string(),
                ));
            }
            if fields[..idx].iter().any(|f| f.name == spec.name) {
                return Err(ImportError::InvalidSchema(format!(
                    "duplicate field: {}",
                    spec.name
                )));
            }
            if let FieldKind::Text {
                pattern: Some(pattern),
                ..
            } = &spec.kind
            {
                let regex = Regex::new(pattern).map_err(|e| {
                    ImportError::InvalidSchema(format!("field {}: {}", spec.name, e))
                })?;
                patterns.insert(spec.name.clone(), regex);
            }
        }

        for key in &key_fields {
            match fields.iter().find(|f| &f.name == key) {
                Some(spec) if spec.required => {}
                Some(_) => {
                    return Err(ImportError::InvalidSchema(format!(
                        "key field {} must be required",
                        key
                    )))
                }
                None => {
                    return Err(ImportError::InvalidSchema(format!(
                        "key field {} is not defined",
                        key
                    )))
                }
            }
        }

        Ok(Self {
            collection,
            fields,
            key_fields,
            patterns,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn validate_field(&self, spec: &FieldSpec, raw: &str) -> Result<Value, FieldError> {
        let field = spec.name.as_str();
        match &spec.kind {
            FieldKind::Text { max_len, .. } => {
                if let Some(max) = max_len {
                    check_max_len(field, raw, *max)?;
                }
                if let Some(regex) = self.patterns.get(field) {
                    check_pattern(field, raw, regex, regex.as_str())?;
                }
                Ok(Value::String(raw.to_string()))
            }
            FieldKind::Integer { min, max } => {
                let v = check_range(field, parse_int(field, raw)?, *min, *max)?;
                Ok(Value::from(v))
            }
            FieldKind::Decimal { min, max } => {
                let v = check_range(field, parse_decimal(field, raw)?, *min, *max)?;
                Ok(Value::from(v))
            }
            FieldKind::Float { min, max } => {
                let v = check_range(field, parse_float(field, raw)?, *min, *max)?;
                Ok(Value::from(v))
            }
            FieldKind::Boolean => Ok(Value::Bool(parse_bool(field, raw)?)),
            FieldKind::Enum { values } => {
                let allowed: Vec<&str> = values.iter().map(String::as_str).collect();
                let matched = parse_enum(
                    field,
                    raw,
                    |v| values.iter().find(|a| a.eq_ignore_ascii_case(v.trim())).cloned(),
                    &allowed,
                )?;
                Ok(Value::String(matched))
            }
        }
    }
}

impl RecordSchema for GenericSchema {
    fn domain(&self) -> ImportDomain {
        ImportDomain::Generic
    }

    fn columns(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    fn required_columns(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.clone())
            .collect()
    }

    fn example_rows(&self) -> Vec<Vec<String>> {
        vec![self.fields.iter().map(|f| f.kind.example()).collect()]
    }

    fn reference_namespaces(&self) -> Vec<ReferenceNamespace> {
        Vec::new()
    }

    fn natural_key(&self, row: &RawRow) -> Option<String> {
        let parts: Option<Vec<&str>> = self.key_fields.iter().map(|k| row.get(k)).collect();
        parts.map(|p| compose_key(&p))
    }

    fn validate(
        &self,
        row: &RawRow,
        _ctx: &ValidationContext,
    ) -> Result<ValidatedRecord, Vec<FieldError>> {
        let mut f = RowFields::new(row);
        let mut payload = Map::new();

        for spec in &self.fields {
            let raw = if spec.required {
                f.required(&spec.name)
            } else {
                f.optional(&spec.name)
            };
            if let Some(raw) = raw {
                if let Some(value) = f.check(self.validate_field(spec, &raw)) {
                    payload.insert(spec.name.clone(), value);
                }
            }
        }

        let natural_key = self.natural_key(row);
        f.finish(|| {
            Some(ValidatedRecord::Generic(GenericRecord {
                row_number: row.row_number,
                collection: self.collection.clone(),
                natural_key: natural_key?,
                payload,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::validator::ValidationContext;

    fn village_schema() -> GenericSchema {
        GenericSchema::new(
            "villages",
            vec![
                FieldSpec::new(
                    "code",
                    true,
                    FieldKind::Text {
                        max_len: Some(12),
                        pattern: Some(r"^V-\d+$".to_string()),
                    },
                ),
                FieldSpec::new("households", false, FieldKind::Integer { min: Some(0), max: None }),
                FieldSpec::new(
                    "terrain",
                    false,
                    FieldKind::Enum {
                        values: vec!["plain".to_string(), "hill".to_string()],
                    },
                ),
                FieldSpec::new("electrified", false, FieldKind::Boolean),
            ],
            vec!["code".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_generic_record_payload() {
        let row = RawRow::from_pairs(
            1,
            vec![
                ("code", "V-12"),
                ("households", "40"),
                ("terrain", "Hill"),
                ("electrified", "no"),
            ],
        );
        let record = village_schema()
            .validate(&row, &ValidationContext::detached())
            .unwrap();
        match record {
            ValidatedRecord::Generic(g) => {
                assert_eq!(g.natural_key, "V-12");
                assert_eq!(g.payload["households"], 40);
                assert_eq!(g.payload["terrain"], "hill");
                assert_eq!(g.payload["electrified"], false);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_generic_collects_field_errors() {
        let row = RawRow::from_pairs(2, vec![("code", "X-1"), ("households", "-3")]);
        let errors = village_schema()
            .validate(&row, &ValidationContext::detached())
            .unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["code", "households"]);
    }

    #[test]
    fn test_invalid_definitions_rejected() {
        let optional_key = GenericSchema::new(
            "villages",
            vec![FieldSpec::new("code", false, FieldKind::Boolean)],
            vec!["code".to_string()],
        );
        assert!(matches!(optional_key, Err(ImportError::InvalidSchema(_))));

        let bad_regex = GenericSchema::new(
            "villages",
            vec![FieldSpec::new(
                "code",
                true,
                FieldKind::Text {
                    max_len: None,
                    pattern: Some("(".to_string()),
                },
            )],
            vec!["code".to_string()],
        );
        assert!(matches!(bad_regex, Err(ImportError::InvalidSchema(_))));
    }

    #[test]
    fn test_field_spec_deserializes_from_json() {
        let spec: FieldSpec = serde_json::from_str(
            r#"{"name":"households","required":true,"kind":{"type":"integer","min":0}}"#,
        )
        .unwrap();
        assert_eq!(
            spec.kind,
            FieldKind::Integer {
                min: Some(0),
                max: None
            }
        );
    }

    #[test]
    fn test_field_names_match_normalized_headers() {
        let schema = GenericSchema::new(
            "contacts",
            vec![FieldSpec::new(" Email ", true, FieldKind::Text { max_len: None, pattern: None })],
            vec!["EMAIL".to_string()],
        )
        .unwrap();
        assert_eq!(schema.required_columns(), vec!["email"]);

        let decoded = crate::importer::file_parser::UniversalFileParser::new(1024, 10)
            .decode_bytes("contacts.csv", b"Email\na@b.c\n")
            .unwrap();
        assert!(decoded.missing_columns(&schema.required_columns()).is_empty());
        assert_eq!(schema.natural_key(&decoded.rows[0]).as_deref(), Some("a@b.c"));
    }

    #[test]
    fn test_composite_keys_with_colons_do_not_collide() {
        let text = || FieldKind::Text { max_len: None, pattern: None };
        let schema = GenericSchema::new(
            "pairs",
            vec![FieldSpec::new("left", true, text()), FieldSpec::new("right", true, text())],
            vec!["left".to_string(), "right".to_string()],
        )
        .unwrap();
        let rows = vec![
            RawRow::from_pairs(1, vec![("left", "a:b"), ("right", "c")]),
            RawRow::from_pairs(2, vec![("left", "a"), ("right", "b:c")]),
        ];
        let groups = crate::importer::duplicate_detector::find_duplicates(&rows, |r| schema.natural_key(r));
        assert!(groups.is_empty());
    }
}
