// ==========================================
// ConfigManager 集成测试
// ==========================================
// 测试目标: config_kv 覆写对导入参数和管道行为生效
// ==========================================


use bulk_import::api::ImportApi;
use bulk_import::config::{config_keys, ConfigManager, ImportConfigReader, ImportSettings};
use bulk_import::domain::types::{ImportDomain, JobStatus, ValidationMode};
use test_helpers::*;

#[tokio::test]
async fn test_config_manager_creation() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let config_manager = ConfigManager::new(&db_path);
    assert!(config_manager.is_ok(), "ConfigManager should be created successfully");

    let settings = config_manager.unwrap().load_settings().await.unwrap();
    assert_eq!(settings, ImportSettings::default());
}

#[tokio::test]
async fn test_overrides_survive_reopen() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    {
        let config = ConfigManager::new(&db_path).unwrap();
        config.set_global_config_value(config_keys::ERROR_PAGE_CAP, "5").unwrap();
        config.set_global_config_value(config_keys::RETENTION_DAYS, "30").unwrap();
        config.set_global_config_value(config_keys::RETENTION_DAYS, "14").unwrap();
    }

    let config = ConfigManager::new(&db_path).unwrap();
    assert_eq!(config.get_error_page_cap().await.unwrap(), 5);
    assert_eq!(config.get_retention_days().await.unwrap(), 14);
    assert_eq!(config.get_chunk_size().await.unwrap(), 100);
}

#[tokio::test]
async fn test_max_rows_override_applies_to_imports() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    ConfigManager::new(&db_path)
        .unwrap()
        .set_global_config_value(config_keys::MAX_ROWS, "2")
        .unwrap();

    let api = ImportApi::open(&db_path).await.unwrap();
    assert_eq!(api.settings().max_rows, 2);

    let rows = vec![
        user_row("A", "a@example.com", "viewer"),
        user_row("B", "b@example.com", "viewer"),
        user_row("C", "c@example.com", "viewer"),
    ];
    let submitted = api
        .submit_import(
            &admin(),
            submit_request("users.csv", csv_bytes(&USER_HEADER, &rows), ImportDomain::Users, ValidationMode::Partial),
        )
        .await
        .unwrap();
    let status = api.await_job(&admin(), &submitted.job_id).await.unwrap();

    assert_eq!(status.status, JobStatus::Failed);
    let structural = status.structural_error.unwrap();
    assert_eq!(structural["kind"], "too_many_rows");
    assert_eq!(
        structural["message"],
        "file has 3 rows, exceeding the maximum of 2"
    );
}
