// ==========================================
// 并发导入测试
// ==========================================
// 测试目标: 多作业并发执行、轮询进度单调不减、取消在检查点生效
// ==========================================


use bulk_import::config::ImportSettings;
use bulk_import::domain::types::{ImportDomain, JobStatus, ValidationMode};
use std::time::{Duration, Instant};
use test_helpers::*;

fn user_rows(prefix: &str, count: usize) -> Vec<Vec<String>> {
    (0..count)
        .map(|i| user_row(&format!("User {}", i), &format!("{}-{}@example.com", prefix, i), "viewer"))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_progress_is_monotonic_while_polling() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let conn = open_shared(&db_path);
    let api = test_api(&conn, ImportSettings { chunk_size: 5, ..ImportSettings::default() });

    let submitted = api
        .submit_import(
            &admin(),
            submit_request(
                "users.csv",
                csv_bytes(&USER_HEADER, &user_rows("poll", 400)),
                ImportDomain::Users,
                ValidationMode::Partial,
            ),
        )
        .await
        .unwrap();

    let started = Instant::now();
    let mut last_processed = 0;
    let mut last_status = JobStatus::Pending;
    loop {
        let status = api.get_job_status(&admin(), &submitted.job_id).await.unwrap();
        assert!(
            status.processed_rows >= last_processed,
            "processed_rows went backwards: {} -> {}",
            last_processed,
            status.processed_rows
        );
        assert!(status.success_count + status.failed_count <= status.total_rows);
        last_processed = status.processed_rows;
        last_status = status.status;
        if status.status.is_terminal() {
            break;
        }
        assert!(started.elapsed() < Duration::from_secs(30), "作业未在 30 秒内结束");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(last_status, JobStatus::Completed);
    assert_eq!(last_processed, 400);
    assert_eq!(count_rows(&conn, "app_user"), 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_multiple_jobs_run_concurrently() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let conn = open_shared(&db_path);
    let api = test_api(
        &conn,
        ImportSettings {
            max_concurrent_jobs: 2,
            chunk_size: 10,
            ..ImportSettings::default()
        },
    );

    let mut job_ids = Vec::new();
    for n in 0..5 {
        let submitted = api
            .submit_import(
                &admin(),
                submit_request(
                    "users.csv",
                    csv_bytes(&USER_HEADER, &user_rows(&format!("job{}", n), 50)),
                    ImportDomain::Users,
                    ValidationMode::Strict,
                ),
            )
            .await
            .unwrap();
        job_ids.push(submitted.job_id);
    }

    for job_id in &job_ids {
        let status = api.await_job(&admin(), job_id).await.unwrap();
        assert_eq!(status.status, JobStatus::Completed);
        assert_eq!(status.success_count, 50);
    }
    assert_eq!(count_rows(&conn, "app_user"), 250);
}

// 单线程运行时: 提交返回后工作任务尚未被调度，取消必然先于首个检查点
#[tokio::test]
async fn test_cancel_queued_job() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let conn = open_shared(&db_path);
    let api = test_api(
        &conn,
        ImportSettings {
            max_concurrent_jobs: 1,
            chunk_size: 1,
            ..ImportSettings::default()
        },
    );

    let blocker = api
        .submit_import(
            &admin(),
            submit_request(
                "users.csv",
                csv_bytes(&USER_HEADER, &user_rows("blocker", 300)),
                ImportDomain::Users,
                ValidationMode::Partial,
            ),
        )
        .await
        .unwrap();
    let queued = api
        .submit_import(
            &admin(),
            submit_request(
                "users.csv",
                csv_bytes(&USER_HEADER, &user_rows("queued", 10)),
                ImportDomain::Users,
                ValidationMode::Partial,
            ),
        )
        .await
        .unwrap();

    api.cancel_job(&admin(), &queued.job_id).await.unwrap();
    let status = api.await_job(&admin(), &queued.job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Cancelled);
    assert_eq!(status.success_count, 0);
    assert!(status.completed_at.is_some());

    let blocker_status = api.await_job(&admin(), &blocker.job_id).await.unwrap();
    assert_eq!(blocker_status.status, JobStatus::Completed);
    assert_eq!(count_rows(&conn, "app_user"), 300);
}
