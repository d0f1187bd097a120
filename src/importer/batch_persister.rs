// ==========================================
// 批量导入管道 - 分块落库器
// ==========================================
// 职责: 校验通过的记录按固定大小分块写入 RecordStore
// 事务: 每块一个事务，块间无事务；后续块失败不回滚先前块
// 失败: 块失败 → 块内全部记录计为失败，共享同一原因；继续下一块
//       开启 isolate_failed_chunks 时，失败块逐行重试，仅出错记录失败
// 取消/超时: 仅在块边界检查，从不中断块内写入
// ==========================================

use crate::domain::job::ImportRowError;
use crate::domain::record::ValidatedRecord;
use crate::domain::types::WriteMode;
use crate::importer::error::ImportResult;
use crate::repository::record_store::RecordStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 待落库记录 + 原始行快照（失败时写入错误报告）
#[derive(Debug, Clone)]
pub struct StagedRecord {
    pub record: ValidatedRecord,
    pub row_data: serde_json::Value,
}

/// 单块完成后的累计进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// 0 起始
    pub chunk_index: usize,
    pub chunk_count: usize,
    /// 已尝试写入的记录数（累计）
    pub attempted: usize,
    pub success: usize,
    pub failed: usize,
}

/// 块完成回调（检查点）
///
/// 回调返回错误时落库中止，错误向上传播
#[async_trait]
pub trait ChunkObserver: Send {
    async fn on_chunk(
        &mut self,
        progress: &ChunkProgress,
        errors: &[ImportRowError],
    ) -> ImportResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    pub success_count: usize,
    pub failed_count: usize,
    /// 失败块数量
    pub batch_errors: usize,
    /// 在块边界提前停止的原因
    pub stopped: Option<StopReason>,
}

pub struct BatchPersister {
    store: Arc<dyn RecordStore>,
    chunk_size: usize,
    isolate_failed_chunks: bool,
}

impl BatchPersister {
    pub fn new(store: Arc<dyn RecordStore>, chunk_size: usize, isolate_failed_chunks: bool) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
            isolate_failed_chunks,
        }
    }

    /// 分块落库
    ///
    /// # 参数
    /// - job_id: 作业 ID（用于生成逐行错误）
    /// - organization_id: 组织范围
    /// - records: 待写入记录（保持文件行序）
    /// - mode: Insert / Upsert
    /// - cancel: 取消令牌（块边界检查）
    /// - deadline: 作业截止时间（块边界检查）
    /// - observer: 每块完成后的检查点回调
    #[allow(clippy::too_many_arguments)]
    pub async fn persist(
        &self,
        job_id: &str,
        organization_id: Option<&str>,
        records: &[StagedRecord],
        mode: WriteMode,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        observer: &mut dyn ChunkObserver,
    ) -> ImportResult<PersistOutcome> {
        let chunk_count = records.len().div_ceil(self.chunk_size);
        let mut outcome = PersistOutcome {
            success_count: 0,
            failed_count: 0,
            batch_errors: 0,
            stopped: None,
        };
        let mut attempted = 0;

        for (chunk_index, chunk) in records.chunks(self.chunk_size).enumerate() {
            if cancel.is_cancelled() {
                outcome.stopped = Some(StopReason::Cancelled);
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                outcome.stopped = Some(StopReason::TimedOut);
                break;
            }

            let batch: Vec<ValidatedRecord> = chunk.iter().map(|s| s.record.clone()).collect();
            let mut errors = Vec::new();

            match self.store.write_chunk(organization_id, &batch, mode).await {
                Ok(written) => {
                    outcome.success_count += written;
                    debug!(job_id, chunk_index, written, "分块写入完成");
                }
                Err(e) => {
                    outcome.batch_errors += 1;
                    warn!(job_id, chunk_index, error = %e, "分块写入失败");

                    if self.isolate_failed_chunks {
                        let (ok, row_errors) = self
                            .retry_rows(job_id, organization_id, chunk, mode)
                            .await;
                        outcome.success_count += ok;
                        errors = row_errors;
                    } else {
                        let message = format!("Batch {} failed: {}", chunk_index + 1, e);
                        errors = chunk
                            .iter()
                            .map(|s| row_error(job_id, s, &message))
                            .collect();
                    }
                    outcome.failed_count += errors.len();
                }
            }

            attempted += chunk.len();
            let progress = ChunkProgress {
                chunk_index,
                chunk_count,
                attempted,
                success: outcome.success_count,
                failed: outcome.failed_count,
            };
            observer.on_chunk(&progress, &errors).await?;
        }

        Ok(outcome)
    }

    /// 失败块逐行重试
    ///
    /// # 返回
    /// - (成功条数, 失败行错误)
    async fn retry_rows(
        &self,
        job_id: &str,
        organization_id: Option<&str>,
        chunk: &[StagedRecord],
        mode: WriteMode,
    ) -> (usize, Vec<ImportRowError>) {
        let mut ok = 0;
        let mut errors = Vec::new();

        for staged in chunk {
            match self
                .store
                .write_chunk(organization_id, std::slice::from_ref(&staged.record), mode)
                .await
            {
                Ok(written) => ok += written,
                Err(e) => {
                    debug!(job_id, row_number = staged.record.row_number(), error = %e, "逐行重试失败");
                    errors.push(row_error(job_id, staged, &format!("Failed to persist row: {}", e)));
                }
            }
        }

        (ok, errors)
    }
}

fn row_error(job_id: &str, staged: &StagedRecord, message: &str) -> ImportRowError {
    ImportRowError::new(
        job_id,
        staged.record.row_number(),
        staged.row_data.clone(),
        message,
        "",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::GenericRecord;
    use crate::domain::reference::ReferenceNamespace;
    use crate::repository::error::{RepositoryError, RepositoryResult};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// 键以 "bad" 开头的记录所在的块写入失败
    #[derive(Default)]
    struct FlakyStore {
        written: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RecordStore for FlakyStore {
        async fn load_reference(
            &self,
            _namespace: ReferenceNamespace,
            _organization_id: Option<&str>,
        ) -> RepositoryResult<HashMap<String, String>> {
            Ok(HashMap::new())
        }

        async fn write_chunk(
            &self,
            _organization_id: Option<&str>,
            records: &[ValidatedRecord],
            _mode: WriteMode,
        ) -> RepositoryResult<usize> {
            if records.iter().any(|r| r.natural_key().starts_with("bad")) {
                return Err(RepositoryError::UniqueConstraintViolation("generic_record".into()));
            }
            let mut written = self.written.lock().unwrap();
            written.extend(records.iter().map(|r| r.natural_key()));
            Ok(records.len())
        }
    }

    #[derive(Default)]
    struct Recorder {
        progress: Vec<ChunkProgress>,
        errors: Vec<ImportRowError>,
        cancel_after_first: Option<CancellationToken>,
    }

    #[async_trait]
    impl ChunkObserver for Recorder {
        async fn on_chunk(
            &mut self,
            progress: &ChunkProgress,
            errors: &[ImportRowError],
        ) -> ImportResult<()> {
            self.progress.push(*progress);
            self.errors.extend_from_slice(errors);
            if let Some(token) = &self.cancel_after_first {
                token.cancel();
            }
            Ok(())
        }
    }

    fn staged(keys: &[&str]) -> Vec<StagedRecord> {
        keys.iter()
            .enumerate()
            .map(|(i, key)| StagedRecord {
                record: ValidatedRecord::Generic(GenericRecord {
                    row_number: i + 1,
                    collection: "volunteers".to_string(),
                    natural_key: key.to_string(),
                    payload: serde_json::Map::new(),
                }),
                row_data: serde_json::json!({ "key": key }),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_failed_chunk_is_contained() {
        let store = Arc::new(FlakyStore::default());
        let persister = BatchPersister::new(store.clone(), 2, false);
        let records = staged(&["a", "b", "c", "bad-d", "e"]);
        let mut recorder = Recorder::default();

        let outcome = persister
            .persist("job-1", None, &records, WriteMode::Insert, &CancellationToken::new(), None, &mut recorder)
            .await
            .unwrap();

        assert_eq!(outcome.success_count, 3);
        assert_eq!(outcome.failed_count, 2);
        assert_eq!(outcome.batch_errors, 1);
        assert_eq!(outcome.stopped, None);
        assert_eq!(*store.written.lock().unwrap(), vec!["a", "b", "e"]);

        let rows: Vec<usize> = recorder.errors.iter().map(|e| e.row_number).collect();
        assert_eq!(rows, vec![3, 4]);
        assert!(recorder.errors[0].error_message.starts_with("Batch 2 failed:"));

        let attempted: Vec<usize> = recorder.progress.iter().map(|p| p.attempted).collect();
        assert_eq!(attempted, vec![2, 4, 5]);
        assert!(recorder.progress.iter().all(|p| p.chunk_count == 3));
    }

    #[tokio::test]
    async fn test_isolation_fails_only_offending_rows() {
        let store = Arc::new(FlakyStore::default());
        let persister = BatchPersister::new(store.clone(), 3, true);
        let records = staged(&["a", "bad-b", "c"]);
        let mut recorder = Recorder::default();

        let outcome = persister
            .persist("job-1", None, &records, WriteMode::Upsert, &CancellationToken::new(), None, &mut recorder)
            .await
            .unwrap();

        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.failed_count, 1);
        assert_eq!(recorder.errors.len(), 1);
        assert_eq!(recorder.errors[0].row_number, 2);
    }

    #[tokio::test]
    async fn test_cancellation_checked_between_chunks() {
        let store = Arc::new(FlakyStore::default());
        let persister = BatchPersister::new(store.clone(), 2, false);
        let records = staged(&["a", "b", "c", "d"]);
        let token = CancellationToken::new();
        let mut recorder = Recorder {
            cancel_after_first: Some(token.clone()),
            ..Recorder::default()
        };

        let outcome = persister
            .persist("job-1", None, &records, WriteMode::Insert, &token, None, &mut recorder)
            .await
            .unwrap();

        assert_eq!(outcome.stopped, Some(StopReason::Cancelled));
        assert_eq!(outcome.success_count, 2);
        assert_eq!(recorder.progress.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_deadline_stops_before_first_chunk() {
        let persister = BatchPersister::new(Arc::new(FlakyStore::default()), 10, false);
        let mut recorder = Recorder::default();

        let outcome = persister
            .persist(
                "job-1",
                None,
                &staged(&["a"]),
                WriteMode::Insert,
                &CancellationToken::new(),
                Some(Instant::now()),
                &mut recorder,
            )
            .await
            .unwrap();

        assert_eq!(outcome.stopped, Some(StopReason::TimedOut));
        assert_eq!(outcome.success_count, 0);
        assert!(recorder.progress.is_empty());
    }
}
