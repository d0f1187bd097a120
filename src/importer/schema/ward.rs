// ==========================================
// 批量导入管道 - 选区 (Ward) Schema
// ==========================================
// 自然键: code
// upsert 冲突目标: (organization_id, code)
// ==========================================

use super::{RecordSchema, RowFields};
use crate::domain::record::{IncomeLevel, RawRow, Urbanization, ValidatedRecord, WardRecord};
use crate::domain::reference::ReferenceNamespace;
use crate::domain::types::ImportDomain;
use crate::importer::field_parser::{
    check_non_negative, check_pattern, check_range, parse_decimal, parse_enum, parse_int,
    FieldError,
};
use crate::importer::validator::ValidationContext;
use regex::Regex;
use std::sync::OnceLock;

pub const WARD_COLUMNS: [&str; 10] = [
    "constituency_code",
    "name",
    "code",
    "ward_number",
    "population",
    "voter_count",
    "total_booths",
    "urbanization",
    "income_level",
    "literacy_rate",
];

pub const WARD_REQUIRED: [&str; 3] = ["constituency_code", "name", "code"];

const CODE_FORMAT: &str = "XX-AC-000-W-000";

fn ward_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Z]{2}-AC-\d{3}-W-\d{3}$").expect("ward code pattern is valid")
    })
}

pub struct WardSchema;

impl RecordSchema for WardSchema {
    fn domain(&self) -> ImportDomain {
        ImportDomain::Wards
    }

    fn columns(&self) -> Vec<String> {
        WARD_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn required_columns(&self) -> Vec<String> {
        WARD_REQUIRED.iter().map(|c| c.to_string()).collect()
    }

    fn example_rows(&self) -> Vec<Vec<String>> {
        [
            [
                "TN-AC-001", "Ward 1", "TN-AC-001-W-001", "1", "15000", "12000", "10", "urban",
                "medium", "85.5",
            ],
            [
                "TN-AC-001", "Ward 2", "TN-AC-001-W-002", "2", "8000", "6500", "6", "rural", "low",
                "72.0",
            ],
        ]
        .iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect()
    }

    fn reference_namespaces(&self) -> Vec<ReferenceNamespace> {
        vec![ReferenceNamespace::ConstituencyCode]
    }

    fn natural_key(&self, row: &RawRow) -> Option<String> {
        row.get("code").map(str::to_string)
    }

    fn validate(
        &self,
        row: &RawRow,
        ctx: &ValidationContext,
    ) -> Result<ValidatedRecord, Vec<FieldError>> {
        let mut f = RowFields::new(row);

        // (a) 必填
        let constituency_code = f.required("constituency_code");
        let name = f.required("name");
        let code = f.required("code");

        // (b)(c) 类型 + 边界
        let ward_number = f
            .parsed("ward_number", parse_int)
            .and_then(|v| f.check(check_range("ward_number", v, Some(1), None)));
        let population = f
            .parsed("population", parse_int)
            .and_then(|v| f.check(check_non_negative("population", v)));
        let voter_count = f
            .parsed("voter_count", parse_int)
            .and_then(|v| f.check(check_non_negative("voter_count", v)));
        let total_booths = f
            .parsed("total_booths", parse_int)
            .and_then(|v| f.check(check_non_negative("total_booths", v)));
        let literacy_rate = f
            .parsed("literacy_rate", parse_decimal)
            .and_then(|v| f.check(check_range("literacy_rate", v, Some(0.0), Some(100.0))));

        // (d) 枚举
        let urbanization = f.parsed("urbanization", |field, raw| {
            parse_enum(field, raw, Urbanization::parse, &Urbanization::ALLOWED)
        });
        let income_level = f.parsed("income_level", |field, raw| {
            parse_enum(field, raw, IncomeLevel::parse, &IncomeLevel::ALLOWED)
        });

        // (e) 格式
        if let Some(code) = code.as_deref() {
            f.check(check_pattern("code", code, ward_code_pattern(), CODE_FORMAT));
        }

        // (f) 跨字段
        if let (Some(voters), Some(pop)) = (voter_count, population) {
            if voters > pop {
                f.push(FieldError::new(
                    "voter_count",
                    format!(
                        "voter_count ({}) cannot exceed population ({})",
                        voters, pop
                    ),
                ));
            }
        }

        // (g) 引用
        let constituency_id = constituency_code.as_deref().and_then(|key| {
            f.resolve(
                &ctx.snapshot,
                ReferenceNamespace::ConstituencyCode,
                "constituency_code",
                "Constituency",
                key,
            )
        });

        f.finish(|| {
            Some(ValidatedRecord::Ward(WardRecord {
                row_number: row.row_number,
                constituency_id: constituency_id?,
                constituency_code: constituency_code?,
                name: name?,
                code: code?,
                ward_number,
                population,
                voter_count,
                total_booths,
                urbanization,
                income_level,
                literacy_rate,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::validator::test_support::context_with_constituency;

    fn valid_row() -> RawRow {
        RawRow::from_pairs(
            1,
            vec![
                ("constituency_code", "TN-AC-001"),
                ("name", "Ward 1"),
                ("code", "TN-AC-001-W-001"),
                ("ward_number", "1"),
                ("population", "15000"),
                ("voter_count", "12000"),
                ("urbanization", "urban"),
                ("literacy_rate", "85.5"),
            ],
        )
    }

    #[test]
    fn test_valid_ward_resolves_constituency() {
        let ctx = context_with_constituency("TN-AC-001", "c-1");
        match WardSchema.validate(&valid_row(), &ctx).unwrap() {
            ValidatedRecord::Ward(w) => {
                assert_eq!(w.constituency_id, "c-1");
                assert_eq!(w.urbanization, Some(Urbanization::Urban));
                assert_eq!(w.literacy_rate, Some(85.5));
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_all_violations_collected() {
        let ctx = context_with_constituency("TN-AC-001", "c-1");
        let row = RawRow::from_pairs(
            2,
            vec![
                ("constituency_code", "TN-AC-999"),
                ("name", "Ward X"),
                ("code", "tn-ac-1-w-1"),
                ("ward_number", "0"),
                ("population", "100"),
                ("voter_count", "200"),
                ("income_level", "rich"),
                ("literacy_rate", "101"),
            ],
        );

        let errors = WardSchema.validate(&row, &ctx).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        for expected in [
            "ward_number",
            "literacy_rate",
            "income_level",
            "code",
            "voter_count",
            "constituency_code",
        ] {
            assert!(fields.contains(&expected), "missing error for {}", expected);
        }
    }

    #[test]
    fn test_missing_code_is_attributed() {
        let ctx = context_with_constituency("TN-AC-001", "c-1");
        let row = RawRow::from_pairs(
            4,
            vec![("constituency_code", "TN-AC-001"), ("name", "Ward 4")],
        );
        let errors = WardSchema.validate(&row, &ctx).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "code");
    }

    #[test]
    fn test_natural_key_skips_blank_code() {
        let row = RawRow::from_pairs(1, vec![("code", " ")]);
        assert_eq!(WardSchema.natural_key(&row), None);
        assert_eq!(
            WardSchema.natural_key(&valid_row()).as_deref(),
            Some("TN-AC-001-W-001")
        );
    }
}
