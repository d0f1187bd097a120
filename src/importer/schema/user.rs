// ==========================================
// 批量导入管道 - 用户 (User) Schema
// ==========================================
// 自然键: email（小写）
// 角色约束: 只能创建调用方角色层级以下的角色
// insert 模式: 库中已存在的 email 为行错误
// ==========================================

use super::{RecordSchema, RowFields};
use crate::domain::record::{RawRow, UserRecord, ValidatedRecord};
use crate::domain::reference::ReferenceNamespace;
use crate::domain::types::{ImportDomain, UserRole, WriteMode};
use crate::importer::field_parser::{check_max_len, parse_enum, parse_int, FieldError};
use crate::importer::validator::ValidationContext;

pub const USER_COLUMNS: [&str; 6] = ["name", "email", "role", "phone", "state_id", "district_id"];

pub const USER_REQUIRED: [&str; 3] = ["name", "email", "role"];

const PHONE_MAX_LEN: usize = 20;

pub struct UserSchema;

impl UserSchema {
    fn importable_role(raw: &str) -> Option<UserRole> {
        raw.parse::<UserRole>()
            .ok()
            .filter(|role| UserRole::IMPORTABLE.contains(role))
    }
}

impl RecordSchema for UserSchema {
    fn domain(&self) -> ImportDomain {
        ImportDomain::Users
    }

    fn columns(&self) -> Vec<String> {
        USER_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn required_columns(&self) -> Vec<String> {
        USER_REQUIRED.iter().map(|c| c.to_string()).collect()
    }

    fn example_rows(&self) -> Vec<Vec<String>> {
        [
            ["John Doe", "john@example.com", "analyst", "+919876543210", "1", "1"],
            ["Jane Smith", "jane@example.com", "volunteer", "+919876543211", "1", "2"],
        ]
        .iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect()
    }

    fn reference_namespaces(&self) -> Vec<ReferenceNamespace> {
        vec![
            ReferenceNamespace::StateId,
            ReferenceNamespace::DistrictId,
            ReferenceNamespace::UserEmail,
        ]
    }

    fn natural_key(&self, row: &RawRow) -> Option<String> {
        row.get("email").map(str::to_lowercase)
    }

    fn validate(
        &self,
        row: &RawRow,
        ctx: &ValidationContext,
    ) -> Result<ValidatedRecord, Vec<FieldError>> {
        let mut f = RowFields::new(row);

        // (a) 必填
        let name = f.required("name");
        let email = f.required("email").map(|e| e.to_lowercase());
        let raw_role = f.required("role");

        // (b) 类型
        let state_id = f.parsed("state_id", parse_int);
        let district_id = f.parsed("district_id", parse_int);

        // (d) 枚举 + 层级
        let allowed: Vec<&str> = UserRole::IMPORTABLE.iter().map(UserRole::as_str).collect();
        let role = raw_role
            .as_deref()
            .and_then(|raw| f.check(parse_enum("role", raw, Self::importable_role, &allowed)));
        if let Some(role) = role {
            if !ctx.allowed_roles.contains(&role) {
                f.push(FieldError::new(
                    "role",
                    format!("You don't have permission to create users with role: {}", role),
                ));
            }
        }

        // (e) 格式
        if let Some(email) = email.as_deref() {
            if !email.contains('@') {
                f.push(FieldError::new(
                    "email",
                    format!("Invalid email format: {}", email),
                ));
            } else if ctx.write_mode == WriteMode::Insert
                && ctx.snapshot.contains(ReferenceNamespace::UserEmail, email)
            {
                f.push(FieldError::new(
                    "email",
                    format!("User with email {} already exists", email),
                ));
            }
        }
        let phone = f.optional("phone");
        if let Some(phone) = phone.as_deref() {
            f.check(check_max_len("phone", phone, PHONE_MAX_LEN));
        }

        // (g) 引用
        let state_id = state_id.and_then(|id| {
            f.resolve(
                &ctx.snapshot,
                ReferenceNamespace::StateId,
                "state_id",
                "State",
                &id.to_string(),
            )
        });
        let district_id = district_id.and_then(|id| {
            f.resolve(
                &ctx.snapshot,
                ReferenceNamespace::DistrictId,
                "district_id",
                "District",
                &id.to_string(),
            )
        });

        f.finish(|| {
            Some(ValidatedRecord::User(UserRecord {
                row_number: row.row_number,
                name: name?,
                email: email?,
                role: role?,
                phone,
                state_id,
                district_id,
            }))
        })
    }
}
