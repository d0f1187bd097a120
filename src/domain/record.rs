// ==========================================
// 批量导入管道 - 行记录模型
// ==========================================
// RawRow: 解码器输出（有序 列名 → 字符串值），校验器唯一输入
// ValidatedRecord: 校验通过后的强类型记录，落库器唯一输入
// ==========================================

use crate::domain::types::UserRole;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// RawRow - 原始行
// ==========================================
// row_number: 1 起始的数据行号（不含表头）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub row_number: usize,
    cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            cells: Vec::new(),
        }
    }

    /// 由 (列名, 值) 列表构造，值统一 trim
    pub fn from_pairs<K, V, I>(row_number: usize, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut row = Self::new(row_number);
        for (k, v) in pairs {
            row.push(k, v);
        }
        row
    }

    /// 追加一列；同名列后者覆盖前者
    pub fn push(&mut self, header: impl Into<String>, value: impl Into<String>) {
        let header = header.into().trim().to_string();
        let value = value.into().trim().to_string();
        if let Some(cell) = self.cells.iter_mut().find(|(h, _)| *h == header) {
            cell.1 = value;
        } else {
            self.cells.push((header, value));
        }
    }

    /// 取值（空字符串视为缺失）
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(h, _)| h.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// 行快照（写入 import_row_error.row_data，供运营人员修正）
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .cells
            .iter()
            .map(|(h, v)| (h.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::Value::Object(map)
    }
}

// ==========================================
// 枚举字段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urbanization {
    Urban,
    SemiUrban,
    Rural,
}

impl Urbanization {
    pub const ALLOWED: [&'static str; 3] = ["urban", "semi_urban", "rural"];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "urban" => Some(Urbanization::Urban),
            "semi_urban" => Some(Urbanization::SemiUrban),
            "rural" => Some(Urbanization::Rural),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urbanization::Urban => "urban",
            Urbanization::SemiUrban => "semi_urban",
            Urbanization::Rural => "rural",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeLevel {
    Low,
    Medium,
    High,
}

impl IncomeLevel {
    pub const ALLOWED: [&'static str; 3] = ["low", "medium", "high"];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(IncomeLevel::Low),
            "medium" => Some(IncomeLevel::Medium),
            "high" => Some(IncomeLevel::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IncomeLevel::Low => "low",
            IncomeLevel::Medium => "medium",
            IncomeLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoothType {
    Regular,
    Auxiliary,
    Special,
}

impl BoothType {
    pub const ALLOWED: [&'static str; 3] = ["regular", "auxiliary", "special"];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "regular" => Some(BoothType::Regular),
            "auxiliary" => Some(BoothType::Auxiliary),
            "special" => Some(BoothType::Special),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BoothType::Regular => "regular",
            BoothType::Auxiliary => "auxiliary",
            BoothType::Special => "special",
        }
    }
}

// ==========================================
// 领域记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardRecord {
    pub row_number: usize,
    pub constituency_id: String,
    pub constituency_code: String,
    pub name: String,
    pub code: String,
    pub ward_number: Option<i64>,
    pub population: Option<i64>,
    pub voter_count: Option<i64>,
    pub total_booths: Option<i64>,
    pub urbanization: Option<Urbanization>,
    pub income_level: Option<IncomeLevel>,
    pub literacy_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoothRecord {
    pub row_number: usize,
    pub constituency_id: String,
    pub constituency_code: String,
    pub booth_number: String,
    pub name: String,
    pub ward_id: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub landmark: Option<String>,
    pub total_voters: Option<i64>,
    pub male_voters: Option<i64>,
    pub female_voters: Option<i64>,
    pub transgender_voters: Option<i64>,
    pub booth_type: Option<BoothType>,
    pub is_accessible: Option<bool>,
    pub is_active: Option<bool>,
    pub building_name: Option<String>,
    pub building_type: Option<String>,
    pub priority_level: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub row_number: usize,
    pub name: String,
    /// 已转小写
    pub email: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub state_id: Option<String>,
    pub district_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericRecord {
    pub row_number: usize,
    pub collection: String,
    pub natural_key: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

// ==========================================
// ValidatedRecord - 校验通过的记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum ValidatedRecord {
    Ward(WardRecord),
    Booth(BoothRecord),
    User(UserRecord),
    Generic(GenericRecord),
}

impl ValidatedRecord {
    /// 来源行号（落库失败时回溯错误行）
    pub fn row_number(&self) -> usize {
        match self {
            ValidatedRecord::Ward(r) => r.row_number,
            ValidatedRecord::Booth(r) => r.row_number,
            ValidatedRecord::User(r) => r.row_number,
            ValidatedRecord::Generic(r) => r.row_number,
        }
    }

    /// 自然键（upsert 冲突目标的业务表达）
    pub fn natural_key(&self) -> String {
        match self {
            ValidatedRecord::Ward(r) => r.code.clone(),
            ValidatedRecord::Booth(r) => format!("{}:{}", r.constituency_code, r.booth_number),
            ValidatedRecord::User(r) => r.email.clone(),
            ValidatedRecord::Generic(r) => r.natural_key.clone(),
        }
    }
}

impl fmt::Display for ValidatedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {} ({})", self.row_number(), self.natural_key())
    }
}
