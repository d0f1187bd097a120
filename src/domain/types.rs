// ==========================================
// 批量导入管道 - 领域类型定义
// ==========================================
// 职责: 导入域 / 校验模式 / 写入模式 / 作业状态 / 用户角色
// 序列化格式: snake_case (与数据库、外部接口一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 导入域 (Import Domain)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportDomain {
    Users,  // 用户账号
    Wards,  // 选区（ward）
    Booths, // 投票站
    Generic, // 调用方自定义 schema
}

impl ImportDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportDomain::Users => "users",
            ImportDomain::Wards => "wards",
            ImportDomain::Booths => "booths",
            ImportDomain::Generic => "generic",
        }
    }
}

impl fmt::Display for ImportDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImportDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "users" | "user" => Ok(ImportDomain::Users),
            "wards" | "ward" => Ok(ImportDomain::Wards),
            "booths" | "booth" | "polling_booths" => Ok(ImportDomain::Booths),
            "generic" => Ok(ImportDomain::Generic),
            other => Err(format!("unknown import domain: {}", other)),
        }
    }
}

// ==========================================
// 校验模式 (Validation Mode)
// ==========================================
// strict: 任一行校验失败 → 整个作业失败，不落库
// partial: 剔除失败行，其余行继续落库
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    Strict,
    Partial,
}

impl ValidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Partial => "partial",
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "partial" => Ok(ValidationMode::Partial),
            other => Err(format!("unknown validation mode: {}", other)),
        }
    }
}

// ==========================================
// 写入模式 (Write Mode)
// ==========================================
// 由 update_existing 决定: false → Insert（冲突即失败）, true → Upsert（按自然键覆盖）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Insert,
    Upsert,
}

impl WriteMode {
    pub fn from_update_existing(update_existing: bool) -> Self {
        if update_existing {
            WriteMode::Upsert
        } else {
            WriteMode::Insert
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Insert => "insert",
            WriteMode::Upsert => "upsert",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "insert" => Ok(WriteMode::Insert),
            "upsert" => Ok(WriteMode::Upsert),
            other => Err(format!("unknown write mode: {}", other)),
        }
    }
}

// ==========================================
// 作业状态 (Job Status)
// ==========================================
// pending → validating → {failed | processing} → {completed | failed}
// cancelled: 仅在检查点（阶段/分块边界）进入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Validating,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Validating => "validating",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(JobStatus::Pending),
            "validating" => Ok(JobStatus::Validating),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

// ==========================================
// 用户角色 (User Role)
// ==========================================
// 层级: superadmin > admin > manager > analyst > user/volunteer/viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Superadmin,
    Admin,
    Manager,
    Analyst,
    User,
    Volunteer,
    Viewer,
}

impl UserRole {
    /// 可通过导入创建的角色（superadmin 不可导入）
    pub const IMPORTABLE: [UserRole; 6] = [
        UserRole::Admin,
        UserRole::Manager,
        UserRole::Analyst,
        UserRole::User,
        UserRole::Volunteer,
        UserRole::Viewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Superadmin => "superadmin",
            UserRole::Admin => "admin",
            UserRole::Manager => "manager",
            UserRole::Analyst => "analyst",
            UserRole::User => "user",
            UserRole::Volunteer => "volunteer",
            UserRole::Viewer => "viewer",
        }
    }

    /// 当前角色可创建的下级角色
    pub fn creatable_roles(&self) -> &'static [UserRole] {
        match self {
            UserRole::Superadmin => &UserRole::IMPORTABLE,
            UserRole::Admin => &UserRole::IMPORTABLE[1..],
            UserRole::Manager => &UserRole::IMPORTABLE[2..],
            UserRole::Analyst => &UserRole::IMPORTABLE[3..],
            UserRole::User | UserRole::Volunteer | UserRole::Viewer => &[],
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "superadmin" => Ok(UserRole::Superadmin),
            "admin" => Ok(UserRole::Admin),
            "manager" => Ok(UserRole::Manager),
            "analyst" => Ok(UserRole::Analyst),
            "user" => Ok(UserRole::User),
            "volunteer" => Ok(UserRole::Volunteer),
            "viewer" => Ok(UserRole::Viewer),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}
