// ==========================================
// 批量导入管道 - 作业工作池
// ==========================================
// 每个作业一个 tokio 任务，提交方立即拿到 JobHandle
// 并发: 信号量限制同时运行的作业数（max_concurrent_jobs）
// 取消: 每个作业一个子令牌；shutdown 取消根令牌
// panic: 在任务内捕获，作业按意外错误置为 failed
// ==========================================

use crate::importer::pipeline::{ImportPipeline, ImportRequest, JobOutcome};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// 已提交作业的句柄
pub struct JobHandle {
    pub job_id: String,
    pub cancel: CancellationToken,
    pub completion: JoinHandle<JobOutcome>,
}

pub struct ImportWorkerPool {
    pipeline: Arc<ImportPipeline>,
    semaphore: Arc<Semaphore>,
    root: CancellationToken,
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl ImportWorkerPool {
    pub fn new(pipeline: Arc<ImportPipeline>, max_concurrent_jobs: usize) -> Self {
        Self {
            pipeline,
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            root: CancellationToken::new(),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 提交作业（立即返回；排队等待信号量许可）
    pub fn spawn(&self, request: ImportRequest) -> JobHandle {
        let job_id = request.job.job_id.clone();
        let cancel = self.root.child_token();
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(job_id.clone(), cancel.clone());
        }

        let pipeline = self.pipeline.clone();
        let semaphore = self.semaphore.clone();
        let tokens = self.tokens.clone();
        let task_cancel = cancel.clone();
        let task_job_id = job_id.clone();

        let completion = tokio::spawn(async move {
            // 信号量只在 shutdown 时关闭；关闭后作业仍执行并在首个检查点取消
            let _permit = semaphore.acquire_owned().await.ok();
            debug!(job_id = %task_job_id, "作业获得执行许可");

            let outcome = match AssertUnwindSafe(pipeline.run(request, task_cancel))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    error!(job_id = %task_job_id, reason = %reason, "导入任务 panic");
                    pipeline.recover_after_panic(&task_job_id, &reason).await
                }
            };

            if let Ok(mut tokens) = tokens.lock() {
                tokens.remove(&task_job_id);
            }
            outcome
        });

        JobHandle {
            job_id,
            cancel,
            completion,
        }
    }

    /// 请求取消作业
    ///
    /// # 返回
    /// - true: 作业仍在本池中运行或排队，已发出取消信号
    /// - false: 作业不在本池中（已结束或未知）
    pub fn cancel(&self, job_id: &str) -> bool {
        let token = match self.tokens.lock() {
            Ok(tokens) => tokens.get(job_id).cloned(),
            Err(e) => {
                warn!(job_id, error = %e, "作业令牌表锁获取失败");
                None
            }
        };
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 运行或排队中的作业 ID
    pub fn active_jobs(&self) -> Vec<String> {
        self.tokens
            .lock()
            .map(|tokens| tokens.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// 取消全部作业并拒绝新的许可
    pub fn shutdown(&self) {
        self.root.cancel();
        self.semaphore.close();
    }

    /// 等待一组作业结束
    pub async fn wait_all(handles: Vec<JobHandle>) -> Vec<JobOutcome> {
        let results = futures::future::join_all(handles.into_iter().map(|h| h.completion)).await;
        results
            .into_iter()
            .filter_map(|r| match r {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(error = %e, "导入任务异常退出");
                    None
                }
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
