// ==========================================
// 导入 API 端到端测试
// ==========================================
// 模拟调用方: 提交 → 轮询 → 错误列表/导出 → 作业列表 → 取消 → 保留期清理
// ==========================================


use bulk_import::api::{ApiError, Caller, GenericSchemaDef};
use bulk_import::config::ImportSettings;
use bulk_import::domain::types::{ImportDomain, JobStatus, UserRole, ValidationMode};
use bulk_import::importer::schema::{FieldKind, FieldSpec};
use chrono::{Duration, Utc};
use test_helpers::*;

#[tokio::test]
async fn test_import_api_full_flow() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let conn = open_shared(&db_path);
    seed_state_and_district(&conn, 1, 10);
    let api = test_api(&conn, ImportSettings { error_page_cap: 2, ..ImportSettings::default() });

    let header = ["name", "email", "role", "phone", "state_id", "district_id"];
    let rows = vec![
        vec!["Asha".into(), "asha@example.com".into(), "viewer".into(), "".into(), "1".into(), "10".into()],
        vec!["Bala".into(), "bala".into(), "viewer".into(), "".into(), "".into(), "".into()],
        vec!["Chitra".into(), "chitra@example.com".into(), "root".into(), "".into(), "".into(), "".into()],
        vec!["Devi".into(), "devi@example.com".into(), "user".into(), "".into(), "9".into(), "".into()],
    ];

    let submitted = api
        .submit_import(
            &admin(),
            submit_request("users.csv", csv_bytes(&header, &rows), ImportDomain::Users, ValidationMode::Partial),
        )
        .await
        .unwrap();
    let status = api.await_job(&admin(), &submitted.job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!((status.success_count, status.failed_count), (1, 3));
    assert!(status.started_at.is_some());
    assert!(status.completed_at.is_some());

    // 分页上限 2，总数精确
    let page = api.list_job_errors(&admin(), &submitted.job_id, 0, 100).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.errors.len(), 2);
    assert!(page.truncated);
    assert_eq!(page.errors[0].error_message, "Invalid email format: bala");
    assert!(page.errors[1].error_message.starts_with("Invalid role: root"));

    let rest = api.list_job_errors(&admin(), &submitted.job_id, 2, 2).await.unwrap();
    assert_eq!(rest.errors.len(), 1);
    assert_eq!(rest.errors[0].error_message, "State not found: 9");

    // 导出不受分页上限限制
    let report = api.export_job_errors_csv(&admin(), &submitted.job_id).await.unwrap();
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines[0], "Row Number,Field,Error Message,Row Data");
    assert_eq!(lines.len(), 4);
}

#[tokio::test]
async fn test_list_jobs_visibility() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let conn = open_shared(&db_path);
    let api = test_api(&conn, ImportSettings::default());

    let analyst = Caller::new("analyst-1", UserRole::Analyst);
    let superadmin = Caller::new("root", UserRole::Superadmin);

    for caller in [&admin(), &analyst, &analyst] {
        let submitted = api
            .submit_import(
                caller,
                submit_request(
                    "users.csv",
                    csv_bytes(&USER_HEADER, &[user_row("X", &format!("{}@x.io", uuid::Uuid::new_v4()), "viewer")]),
                    ImportDomain::Users,
                    ValidationMode::Strict,
                ),
            )
            .await
            .unwrap();
        api.await_job(caller, &submitted.job_id).await.unwrap();
    }

    assert_eq!(api.list_jobs(&analyst, 20).await.unwrap().len(), 2);
    assert_eq!(api.list_jobs(&admin(), 20).await.unwrap().len(), 1);
    assert_eq!(api.list_jobs(&superadmin, 20).await.unwrap().len(), 3);
    assert_eq!(api.list_jobs(&superadmin, 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_finished_job_is_rejected() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let conn = open_shared(&db_path);
    let api = test_api(&conn, ImportSettings::default());

    let submitted = api
        .submit_import(
            &admin(),
            submit_request(
                "users.csv",
                csv_bytes(&USER_HEADER, &[user_row("A", "a@example.com", "viewer")]),
                ImportDomain::Users,
                ValidationMode::Strict,
            ),
        )
        .await
        .unwrap();
    let status = api.await_job(&admin(), &submitted.job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);

    let err = api.cancel_job(&admin(), &submitted.job_id).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidStateTransition { .. }));

    let stranger = Caller::new("someone-else", UserRole::Manager);
    let err = api.cancel_job(&stranger, &submitted.job_id).await.unwrap_err();
    assert!(matches!(err, ApiError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_purge_expired_jobs() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let conn = open_shared(&db_path);
    let api = test_api(&conn, ImportSettings::default());

    let submitted = api
        .submit_import(
            &admin(),
            submit_request(
                "users.csv",
                csv_bytes(&USER_HEADER, &[user_row("A", "", "viewer")]),
                ImportDomain::Users,
                ValidationMode::Partial,
            ),
        )
        .await
        .unwrap();
    api.await_job(&admin(), &submitted.job_id).await.unwrap();

    assert_eq!(api.purge_expired_jobs(Utc::now()).await.unwrap(), 0);
    assert_eq!(api.purge_expired_jobs(Utc::now() + Duration::days(8)).await.unwrap(), 1);
    assert!(matches!(
        api.get_job_status(&admin(), &submitted.job_id).await,
        Err(ApiError::NotFound(_))
    ));
    assert_eq!(count_rows(&conn, "import_row_error"), 0);
}

#[tokio::test]
async fn test_generic_schema_import() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let conn = open_shared(&db_path);
    let api = test_api(&conn, ImportSettings::default());

    let def = GenericSchemaDef {
        collection: "volunteer_shifts".to_string(),
        fields: vec![
            FieldSpec::new("shift_code", true, FieldKind::Text { max_len: Some(10), pattern: None }),
            FieldSpec::new("hours", true, FieldKind::Integer { min: Some(1), max: Some(12) }),
            FieldSpec::new("remote", false, FieldKind::Boolean),
        ],
        key_fields: vec!["shift_code".to_string()],
    };

    let template = api.download_generic_template(def.clone()).unwrap();
    assert_eq!(template.headers, vec!["shift_code", "hours", "remote"]);

    let rows = vec![
        vec!["S-1".to_string(), "4".to_string(), "yes".to_string()],
        vec!["S-2".to_string(), "20".to_string(), "".to_string()],
    ];
    let mut request = submit_request(
        "shifts.csv",
        csv_bytes(&["shift_code", "hours", "remote"], &rows),
        ImportDomain::Generic,
        ValidationMode::Partial,
    );
    request.generic_schema = Some(def);

    let submitted = api.submit_import(&admin(), request).await.unwrap();
    let status = api.await_job(&admin(), &submitted.job_id).await.unwrap();
    assert_eq!((status.success_count, status.failed_count), (1, 1));
    assert_eq!(count_rows(&conn, "generic_record"), 1);

    let page = api.list_job_errors(&admin(), &submitted.job_id, 0, 10).await.unwrap();
    assert_eq!(page.errors[0].error_field, "hours");
}

#[tokio::test]
async fn test_empty_and_header_only_files_fail_structurally() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let conn = open_shared(&db_path);
    let api = test_api(&conn, ImportSettings::default());

    let submitted = api
        .submit_import(
            &admin(),
            submit_request("users.csv", b"name,email,role\n".to_vec(), ImportDomain::Users, ValidationMode::Partial),
        )
        .await
        .unwrap();
    let status = api.await_job(&admin(), &submitted.job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.total_rows, 0);
    assert_eq!(status.progress_percentage, 0);
    assert_eq!(status.structural_error.unwrap()["kind"], "empty_file");
}
