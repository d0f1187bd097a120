// ==========================================
// 批量导入管道 - 记录存储 Trait
// ==========================================
// 职责: 引用数据读取 + 校验后记录的分块写入
// 红线: 只做数据读写，不含校验规则
// ==========================================

use crate::domain::record::ValidatedRecord;
use crate::domain::reference::ReferenceNamespace;
use crate::domain::types::WriteMode;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use std::collections::HashMap;

// ==========================================
// RecordStore Trait
// ==========================================
// 实现者: RecordStoreImpl（rusqlite）
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 加载一个引用命名空间（自然键 → 内部 ID）
    ///
    /// # 参数
    /// - namespace: 引用命名空间
    /// - organization_id: 组织范围（选区/投票站编码按组织隔离）
    async fn load_reference(
        &self,
        namespace: ReferenceNamespace,
        organization_id: Option<&str>,
    ) -> RepositoryResult<HashMap<String, String>>;

    /// 单事务写入一个分块
    ///
    /// # 参数
    /// - organization_id: 记录所属组织
    /// - records: 分块内记录
    /// - mode: Insert（冲突即失败）/ Upsert（按自然键覆盖）
    ///
    /// # 返回
    /// - Ok(usize): 写入条数（= records.len()）
    /// - Err: 任一记录失败，整个分块回滚
    async fn write_chunk(
        &self,
        organization_id: Option<&str>,
        records: &[ValidatedRecord],
        mode: WriteMode,
    ) -> RepositoryResult<usize>;
}
