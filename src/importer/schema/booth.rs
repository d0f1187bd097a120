// ==========================================
// 批量导入管道 - 投票站 (Polling Booth) Schema
// ==========================================
// 自然键: constituency_code + booth_number
// upsert 冲突目标: (organization_id, constituency_id, booth_number)
// ==========================================

use super::{compose_key, RecordSchema, RowFields};
use crate::domain::record::{BoothRecord, BoothType, RawRow, ValidatedRecord};
use crate::domain::reference::ReferenceNamespace;
use crate::domain::types::ImportDomain;
use crate::importer::field_parser::{
    check_max_len, check_non_negative, check_range, parse_bool, parse_enum, parse_float,
    parse_int, FieldError,
};
use crate::importer::validator::ValidationContext;

pub const BOOTH_COLUMNS: [&str; 18] = [
    "constituency_code",
    "booth_number",
    "name",
    "ward_code",
    "address",
    "latitude",
    "longitude",
    "landmark",
    "total_voters",
    "male_voters",
    "female_voters",
    "transgender_voters",
    "booth_type",
    "is_accessible",
    "is_active",
    "building_name",
    "building_type",
    "priority_level",
];

pub const BOOTH_REQUIRED: [&str; 3] = ["constituency_code", "booth_number", "name"];

pub const BOOTH_NUMBER_MAX_LEN: usize = 50;

pub struct BoothSchema;

impl RecordSchema for BoothSchema {
    fn domain(&self) -> ImportDomain {
        ImportDomain::Booths
    }

    fn columns(&self) -> Vec<String> {
        BOOTH_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn required_columns(&self) -> Vec<String> {
        BOOTH_REQUIRED.iter().map(|c| c.to_string()).collect()
    }

    fn example_rows(&self) -> Vec<Vec<String>> {
        [
            [
                "TN-AC-001",
                "001",
                "Government School Main Hall",
                "TN-AC-001-W-001",
                "12 Main Road",
                "13.0827",
                "80.2707",
                "Near bus stand",
                "1200",
                "600",
                "590",
                "10",
                "regular",
                "true",
                "true",
                "Government School",
                "school",
                "3",
            ],
            [
                "TN-AC-001",
                "001A",
                "Community Hall Annex",
                "",
                "4 Lake View Street",
                "13.0901",
                "80.2811",
                "",
                "400",
                "210",
                "190",
                "0",
                "auxiliary",
                "false",
                "true",
                "Community Hall",
                "community_hall",
                "2",
            ],
        ]
        .iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect()
    }

    fn reference_namespaces(&self) -> Vec<ReferenceNamespace> {
        vec![
            ReferenceNamespace::ConstituencyCode,
            ReferenceNamespace::WardCode,
        ]
    }

    fn natural_key(&self, row: &RawRow) -> Option<String> {
        let constituency = row.get("constituency_code")?;
        let booth_number = row.get("booth_number")?;
        Some(compose_key(&[constituency, booth_number]))
    }

    fn validate(
        &self,
        row: &RawRow,
        ctx: &ValidationContext,
    ) -> Result<ValidatedRecord, Vec<FieldError>> {
        let mut f = RowFields::new(row);

        // (a) 必填
        let constituency_code = f.required("constituency_code");
        let booth_number = f.required("booth_number");
        let name = f.required("name");

        // (b)(c) 类型 + 边界
        let latitude = f
            .parsed("latitude", parse_float)
            .and_then(|v| f.check(check_range("latitude", v, Some(-90.0), Some(90.0))));
        let longitude = f
            .parsed("longitude", parse_float)
            .and_then(|v| f.check(check_range("longitude", v, Some(-180.0), Some(180.0))));

        let mut count = |field: &str| {
            f.parsed(field, parse_int)
                .and_then(|v| f.check(check_non_negative(field, v)))
        };
        let total_voters = count("total_voters");
        let male_voters = count("male_voters");
        let female_voters = count("female_voters");
        let transgender_voters = count("transgender_voters");

        let priority_level = f
            .parsed("priority_level", parse_int)
            .and_then(|v| f.check(check_range("priority_level", v, Some(1), Some(5))));
        let is_accessible = f.parsed("is_accessible", parse_bool);
        let is_active = f.parsed("is_active", parse_bool);

        // (d) 枚举
        let booth_type = f.parsed("booth_type", |field, raw| {
            parse_enum(field, raw, BoothType::parse, &BoothType::ALLOWED)
        });

        // (e) 格式
        if let Some(number) = booth_number.as_deref() {
            f.check(check_max_len("booth_number", number, BOOTH_NUMBER_MAX_LEN));
        }

        // (f) 跨字段: 分项之和不超过总数（总数 > 0 时）
        if let Some(total) = total_voters.filter(|t| *t > 0) {
            let sum = male_voters
                .unwrap_or(0)
                .checked_add(female_voters.unwrap_or(0))
                .and_then(|s| s.checked_add(transgender_voters.unwrap_or(0)));
            match sum {
                Some(sum) if sum <= total => {}
                Some(sum) => f.push(FieldError::new(
                    "total_voters",
                    format!(
                        "Sum of male, female and transgender voters ({}) exceeds total_voters ({})",
                        sum, total
                    ),
                )),
                None => f.push(FieldError::new(
                    "total_voters",
                    format!(
                        "Sum of male, female and transgender voters exceeds total_voters ({})",
                        total
                    ),
                )),
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
        let ward_code = f.optional("ward_code");
        let ward_id = ward_code.as_deref().and_then(|key| {
            f.resolve(
                &ctx.snapshot,
                ReferenceNamespace::WardCode,
                "ward_code",
                "Ward",
                key,
            )
        });

        let address = f.optional("address");
        let landmark = f.optional("landmark");
        let building_name = f.optional("building_name");
        let building_type = f.optional("building_type");

        f.finish(|| {
            Some(ValidatedRecord::Booth(BoothRecord {
                row_number: row.row_number,
                constituency_id: constituency_id?,
                constituency_code: constituency_code?,
                booth_number: booth_number?,
                name: name?,
                ward_id,
                address,
                latitude,
                longitude,
                landmark,
                total_voters,
                male_voters,
                female_voters,
                transgender_voters,
                booth_type,
                is_accessible,
                is_active,
                building_name,
                building_type,
                priority_level,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reference::ReferenceSnapshot;
    use crate::domain::types::WriteMode;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn ctx() -> ValidationContext {
        let snapshot = ReferenceSnapshot::empty()
            .with_namespace(
                ReferenceNamespace::ConstituencyCode,
                HashMap::from([("TN-AC-001".to_string(), "c-1".to_string())]),
            )
            .with_namespace(
                ReferenceNamespace::WardCode,
                HashMap::from([("TN-AC-001-W-001".to_string(), "w-1".to_string())]),
            );
        ValidationContext::new(Arc::new(snapshot), WriteMode::Insert, Vec::new())
    }

    #[test]
    fn test_valid_booth_with_ward() {
        let row = RawRow::from_pairs(
            1,
            vec![
                ("constituency_code", "TN-AC-001"),
                ("booth_number", "001"),
                ("name", "School Hall"),
                ("ward_code", "TN-AC-001-W-001"),
                ("latitude", "13.08"),
                ("longitude", "80.27"),
                ("total_voters", "100"),
                ("male_voters", "50"),
                ("female_voters", "50"),
                ("is_accessible", "yes"),
                ("priority_level", "5"),
            ],
        );
        match BoothSchema.validate(&row, &ctx()).unwrap() {
            ValidatedRecord::Booth(b) => {
                assert_eq!(b.ward_id.as_deref(), Some("w-1"));
                assert_eq!(b.is_accessible, Some(true));
                assert_eq!(b.priority_level, Some(5));
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_voter_breakdown_exceeding_total() {
        let row = RawRow::from_pairs(
            2,
            vec![
                ("constituency_code", "TN-AC-001"),
                ("booth_number", "002"),
                ("name", "Annex"),
                ("total_voters", "100"),
                ("male_voters", "60"),
                ("female_voters", "50"),
            ],
        );
        let errors = BoothSchema.validate(&row, &ctx()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "total_voters");
    }

    #[test]
    fn test_voter_breakdown_overflow_is_row_error() {
        let max = i64::MAX.to_string();
        let row = RawRow::from_pairs(
            5,
            vec![
                ("constituency_code", "TN-AC-001"),
                ("booth_number", "005"),
                ("name", "Annex"),
                ("total_voters", "5"),
                ("male_voters", max.as_str()),
                ("female_voters", max.as_str()),
            ],
        );
        let errors = BoothSchema.validate(&row, &ctx()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "total_voters");
        assert!(errors[0].message.contains("exceeds total_voters (5)"));
    }

    #[test]
    fn test_breakdown_ignored_when_total_is_zero() {
        let row = RawRow::from_pairs(
            3,
            vec![
                ("constituency_code", "TN-AC-001"),
                ("booth_number", "003"),
                ("name", "Annex"),
                ("total_voters", "0"),
                ("male_voters", "60"),
            ],
        );
        assert!(BoothSchema.validate(&row, &ctx()).is_ok());
    }

    #[test]
    fn test_coordinate_and_reference_errors() {
        let row = RawRow::from_pairs(
            4,
            vec![
                ("constituency_code", "TN-AC-001"),
                ("booth_number", "004"),
                ("name", "Annex"),
                ("ward_code", "TN-AC-001-W-404"),
                ("latitude", "91"),
                ("longitude", "east"),
                ("booth_type", "mobile"),
                ("priority_level", "9"),
            ],
        );
        let errors = BoothSchema.validate(&row, &ctx()).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(errors.len(), 5);
        for expected in ["latitude", "longitude", "booth_type", "priority_level", "ward_code"] {
            assert!(fields.contains(&expected), "missing error for {}", expected);
        }
    }

    #[test]
    fn test_natural_key_combines_constituency_and_number() {
        let row = RawRow::from_pairs(
            1,
            vec![("constituency_code", "TN-AC-001"), ("booth_number", "7")],
        );
        assert_eq!(BoothSchema.natural_key(&row).as_deref(), Some("TN-AC-001:7"));
    }
}
