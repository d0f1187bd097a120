// ==========================================
// 批量导入管道 - 文件内重复检测
// ==========================================
// 单次扫描，按首次出现顺序输出重复组
// 键无法构成（键字段为空）的行不参与检测
// ==========================================

use crate::domain::record::RawRow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 重复组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub key: String,
    /// 升序（与文件顺序一致）
    pub row_numbers: Vec<usize>,
}

impl DuplicateGroup {
    /// 面向运营人员的描述
    pub fn describe(&self) -> String {
        let rows: Vec<String> = self.row_numbers.iter().map(|r| r.to_string()).collect();
        format!(
            "Duplicate key '{}' appears in rows {}",
            self.key,
            rows.join(", ")
        )
    }
}

/// 查找重复自然键
///
/// # 参数
/// - rows: 解码后的行
/// - natural_key: 行 → 自然键，None 表示跳过
pub fn find_duplicates<F>(rows: &[RawRow], natural_key: F) -> Vec<DuplicateGroup>
where
    F: Fn(&RawRow) -> Option<String>,
{
    // key → groups 下标
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<DuplicateGroup> = Vec::new();

    for row in rows {
        let Some(key) = natural_key(row) else {
            continue;
        };

        match index.get(&key) {
            Some(&idx) => groups[idx].row_numbers.push(row.row_number),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(DuplicateGroup {
                    key,
                    row_numbers: vec![row.row_number],
                });
            }
        }
    }

    groups.retain(|g| g.row_numbers.len() > 1);
    groups
}
