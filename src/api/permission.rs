// ==========================================
// 批量导入管道 - 调用方与权限
// ==========================================
// 可发起导入: superadmin / admin / manager / analyst
// 用户导入额外受角色层级限制（见 UserRole::creatable_roles）
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::types::UserRole;
use serde::{Deserialize, Serialize};

/// 发起请求的已认证调用方
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    pub role: UserRole,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: UserRole) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn can_import(&self) -> bool {
        matches!(
            self.role,
            UserRole::Superadmin | UserRole::Admin | UserRole::Manager | UserRole::Analyst
        )
    }

    /// 可见全部作业（否则只能看到自己提交的）
    pub fn sees_all_jobs(&self) -> bool {
        self.role == UserRole::Superadmin
    }

    pub fn require_import(&self) -> ApiResult<()> {
        if self.can_import() {
            Ok(())
        } else {
            Err(ApiError::PermissionDenied(format!(
                "role {} cannot run bulk imports",
                self.role
            )))
        }
    }

    /// 是否可访问该作业（提交者本人或 superadmin）
    pub fn require_job_access(&self, created_by: &str) -> ApiResult<()> {
        if self.sees_all_jobs() || self.user_id == created_by {
            Ok(())
        } else {
            Err(ApiError::PermissionDenied(
                "job belongs to another user".to_string(),
            ))
        }
    }
}
