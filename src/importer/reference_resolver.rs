// ==========================================
// 批量导入管道 - 引用快照加载
// ==========================================
// 职责: 作业开始校验前，一次性加载 schema 需要的全部引用命名空间
// 约定: 任一命名空间加载失败 → 结构性错误 ReferenceLoadError
// ==========================================

use crate::domain::reference::{ReferenceNamespace, ReferenceSnapshot};
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::record_store::RecordStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

pub struct ReferenceResolver {
    store: Arc<dyn RecordStore>,
}

impl ReferenceResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// 加载引用快照
    ///
    /// # 参数
    /// - namespaces: 需要加载的命名空间（通常来自 RecordSchema::reference_namespaces）
    /// - organization_id: 组织范围
    pub async fn snapshot(
        &self,
        namespaces: &[ReferenceNamespace],
        organization_id: Option<&str>,
    ) -> ImportResult<ReferenceSnapshot> {
        let mut snapshot = ReferenceSnapshot::new(Utc::now());

        for namespace in namespaces {
            let entries = self
                .store
                .load_reference(*namespace, organization_id)
                .await
                .map_err(|e| ImportError::ReferenceLoadError(format!("{}: {}", namespace, e)))?;
            debug!(namespace = %namespace, entries = entries.len(), "引用命名空间加载完成");
            snapshot = snapshot.with_namespace(*namespace, entries);
        }

        Ok(snapshot)
    }
}
