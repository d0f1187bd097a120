// ==========================================
// 批量导入管道 - 命令行入口
// ==========================================
// 用法:
//   bulk-import <file> --domain <users|wards|booths> --mode <strict|partial>
//               [--update-existing] [--db <path>] [--org <id>] [--errors-csv <path>]
// 输出: 作业最终状态（JSON）
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use bulk_import::api::{Caller, ImportApi, SubmitImportRequest};
use bulk_import::domain::types::{ImportDomain, UserRole, ValidationMode};
use bulk_import::logging;
use std::path::{Path, PathBuf};

struct CliArgs {
    file: PathBuf,
    domain: ImportDomain,
    mode: ValidationMode,
    update_existing: bool,
    db_path: String,
    organization_id: Option<String>,
    errors_csv: Option<PathBuf>,
}

const USAGE: &str = "usage: bulk-import <file> --domain <users|wards|booths> --mode <strict|partial> \
[--update-existing] [--db <path>] [--org <id>] [--errors-csv <path>]";

fn parse_args() -> Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut file = None;
    let mut domain = None;
    let mut mode = None;
    let mut update_existing = false;
    let mut db_path = None;
    let mut organization_id = None;
    let mut errors_csv = None;

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| anyhow!("{} requires a value", flag));
        match arg.as_str() {
            "--domain" => {
                domain = Some(value("--domain")?.parse::<ImportDomain>().map_err(|e| anyhow!(e))?)
            }
            "--mode" => {
                mode = Some(value("--mode")?.parse::<ValidationMode>().map_err(|e| anyhow!(e))?)
            }
            "--update-existing" => update_existing = true,
            "--db" => db_path = Some(value("--db")?),
            "--org" => organization_id = Some(value("--org")?),
            "--errors-csv" => errors_csv = Some(PathBuf::from(value("--errors-csv")?)),
            "-h" | "--help" => bail!(USAGE),
            other if other.starts_with("--") => bail!("unknown option {}\n{}", other, USAGE),
            other => file = Some(PathBuf::from(other)),
        }
    }

    Ok(CliArgs {
        file: file.ok_or_else(|| anyhow!(USAGE))?,
        domain: domain.ok_or_else(|| anyhow!("--domain is required\n{}", USAGE))?,
        mode: mode.ok_or_else(|| anyhow!("--mode is required\n{}", USAGE))?,
        update_existing,
        db_path: db_path.unwrap_or_else(default_db_path),
        organization_id,
        errors_csv,
    })
}

/// 默认数据库路径
///
/// # 返回
/// - 环境变量 BULK_IMPORT_DB_PATH（若设置）
/// - 否则: 用户数据目录/bulk-import/bulk_import.db
fn default_db_path() -> String {
    if let Ok(path) = std::env::var("BULK_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./bulk_import.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("bulk-import");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("bulk_import.db");
        }
    }
    path.to_string_lossy().to_string()
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("invalid file path: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = parse_args()?;

    tracing::info!("==================================================");
    tracing::info!("批量导入管道 v{}", bulk_import::VERSION);
    tracing::info!("使用数据库: {}", args.db_path);
    tracing::info!("==================================================");

    let content = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let api = ImportApi::open(&args.db_path).await?;
    let caller = Caller::new("cli", UserRole::Superadmin);

    let submitted = api
        .submit_import(
            &caller,
            SubmitImportRequest {
                file_name: file_name_of(&args.file)?,
                content,
                domain: args.domain,
                validation_mode: args.mode,
                update_existing: args.update_existing,
                organization_id: args.organization_id,
                generic_schema: None,
            },
        )
        .await?;

    let status = api.await_job(&caller, &submitted.job_id).await?;

    if let Some(path) = &args.errors_csv {
        let report = api.export_job_errors_csv(&caller, &submitted.job_id).await?;
        std::fs::write(path, report)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "错误报告已写出");
    }

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
