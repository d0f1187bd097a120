// ==========================================
// 批量导入管道 - 引用快照
// ==========================================
// 作业开始时一次性加载 自然键 → 内部 ID 映射，作业内只读
// 快照之后写入 RecordStore 的引用对本作业不可见
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 引用命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceNamespace {
    ConstituencyCode,
    WardCode,
    StateId,
    DistrictId,
    UserEmail,
}

impl ReferenceNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceNamespace::ConstituencyCode => "constituency_code",
            ReferenceNamespace::WardCode => "ward_code",
            ReferenceNamespace::StateId => "state_id",
            ReferenceNamespace::DistrictId => "district_id",
            ReferenceNamespace::UserEmail => "user_email",
        }
    }
}

impl fmt::Display for ReferenceNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSnapshot {
    loaded_at: DateTime<Utc>,
    namespaces: HashMap<ReferenceNamespace, HashMap<String, String>>,
}

impl ReferenceSnapshot {
    pub fn new(loaded_at: DateTime<Utc>) -> Self {
        Self {
            loaded_at,
            namespaces: HashMap::new(),
        }
    }

    /// 空快照（不引用任何外键的 schema 使用）
    pub fn empty() -> Self {
        Self::new(Utc::now())
    }

    pub fn with_namespace(
        mut self,
        namespace: ReferenceNamespace,
        entries: HashMap<String, String>,
    ) -> Self {
        self.namespaces.insert(namespace, entries);
        self
    }

    /// 自然键 → 内部 ID；命名空间未加载或键不存在均返回 None
    pub fn resolve(&self, namespace: ReferenceNamespace, key: &str) -> Option<&str> {
        self.namespaces
            .get(&namespace)
            .and_then(|m| m.get(key))
            .map(String::as_str)
    }

    pub fn contains(&self, namespace: ReferenceNamespace, key: &str) -> bool {
        self.resolve(namespace, key).is_some()
    }

    pub fn is_loaded(&self, namespace: ReferenceNamespace) -> bool {
        self.namespaces.contains_key(&namespace)
    }

    pub fn len(&self, namespace: ReferenceNamespace) -> usize {
        self.namespaces.get(&namespace).map(HashMap::len).unwrap_or(0)
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_by_namespace() {
        let snapshot = ReferenceSnapshot::empty().with_namespace(
            ReferenceNamespace::ConstituencyCode,
            HashMap::from([("TN-AC-001".to_string(), "c-1".to_string())]),
        );

        assert_eq!(
            snapshot.resolve(ReferenceNamespace::ConstituencyCode, "TN-AC-001"),
            Some("c-1")
        );
        assert!(!snapshot.contains(ReferenceNamespace::WardCode, "TN-AC-001"));
        assert!(snapshot.is_loaded(ReferenceNamespace::ConstituencyCode));
        assert!(!snapshot.is_loaded(ReferenceNamespace::WardCode));
        assert_eq!(snapshot.len(ReferenceNamespace::ConstituencyCode), 1);
    }
}
