// ==========================================
// 批量导入管道 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键 + busy_timeout）
// - 建库: 作业/错误表 + 引用表 + 领域记录表 + 配置表
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表（幂等）
///
/// organization_id 统一以空串表示"无组织"，保证唯一约束对其生效
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- ===== 配置 =====
        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        -- ===== 导入作业 =====
        CREATE TABLE IF NOT EXISTS import_job (
            job_id TEXT PRIMARY KEY,
            created_by TEXT NOT NULL,
            organization_id TEXT,
            file_name TEXT NOT NULL,
            domain TEXT NOT NULL,
            validation_mode TEXT NOT NULL,
            write_mode TEXT NOT NULL,
            status TEXT NOT NULL,
            total_rows INTEGER NOT NULL DEFAULT 0,
            processed_rows INTEGER NOT NULL DEFAULT 0,
            success_count INTEGER NOT NULL DEFAULT 0,
            failed_count INTEGER NOT NULL DEFAULT 0,
            structural_error TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            expires_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_import_job_created
            ON import_job(created_by, created_at DESC);

        CREATE TABLE IF NOT EXISTS import_row_error (
            error_id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL REFERENCES import_job(job_id) ON DELETE CASCADE,
            row_number INTEGER NOT NULL,
            row_data TEXT NOT NULL,
            error_message TEXT NOT NULL,
            error_field TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_import_row_error_job
            ON import_row_error(job_id, row_number);

        -- ===== 引用数据 =====
        CREATE TABLE IF NOT EXISTS state (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS district (
            id INTEGER PRIMARY KEY,
            state_id INTEGER REFERENCES state(id),
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS constituency (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL DEFAULT '',
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(organization_id, code)
        );

        -- ===== 领域记录 =====
        CREATE TABLE IF NOT EXISTS ward (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL DEFAULT '',
            constituency_id TEXT NOT NULL REFERENCES constituency(id),
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            ward_number INTEGER,
            population INTEGER,
            voter_count INTEGER,
            total_booths INTEGER,
            urbanization TEXT,
            income_level TEXT,
            literacy_rate REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(organization_id, code)
        );

        CREATE TABLE IF NOT EXISTS polling_booth (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL DEFAULT '',
            constituency_id TEXT NOT NULL REFERENCES constituency(id),
            ward_id TEXT REFERENCES ward(id),
            booth_number TEXT NOT NULL,
            name TEXT NOT NULL,
            address TEXT,
            latitude REAL,
            longitude REAL,
            landmark TEXT,
            total_voters INTEGER,
            male_voters INTEGER,
            female_voters INTEGER,
            transgender_voters INTEGER,
            booth_type TEXT,
            is_accessible INTEGER,
            is_active INTEGER,
            building_name TEXT,
            building_type TEXT,
            priority_level INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(organization_id, constituency_id, booth_number)
        );

        CREATE TABLE IF NOT EXISTS app_user (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            phone TEXT,
            state_id INTEGER REFERENCES state(id),
            district_id INTEGER REFERENCES district(id),
            organization_id TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS generic_record (
            organization_id TEXT NOT NULL DEFAULT '',
            collection TEXT NOT NULL,
            natural_key TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (organization_id, collection, natural_key)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 打开连接并建表
pub fn open_and_init(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN \
                 ('import_job','import_row_error','ward','polling_booth','app_user','generic_record')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }

    #[test]
    fn test_read_schema_version_without_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
