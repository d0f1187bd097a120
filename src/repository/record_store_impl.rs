// ==========================================
// 批量导入管道 - 记录存储实现（rusqlite）
// ==========================================
// 写入: 每个分块一个事务；Insert 冲突即整块回滚，Upsert 以自然键为冲突目标
// 冲突目标:
// - ward:          (organization_id, code)
// - polling_booth: (organization_id, constituency_id, booth_number)
// - app_user:      (email)
// - generic_record:(organization_id, collection, natural_key)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::record::{BoothRecord, GenericRecord, UserRecord, ValidatedRecord, WardRecord};
use crate::domain::reference::ReferenceNamespace;
use crate::domain::types::WriteMode;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_store::RecordStore;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, Transaction};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Upsert 子句；Insert 模式为空
fn conflict_clause(mode: WriteMode, target: &str, updates: &[&str]) -> String {
    match mode {
        WriteMode::Insert => String::new(),
        WriteMode::Upsert => {
            let sets: Vec<String> = updates
                .iter()
                .map(|col| format!("{col} = excluded.{col}"))
                .collect();
            format!(" ON CONFLICT({}) DO UPDATE SET {}", target, sets.join(", "))
        }
    }
}

fn key_id_pair(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String)> {
    Ok((row.get(0)?, row.get(1)?))
}

// ==========================================
// RecordStoreImpl
// ==========================================
pub struct RecordStoreImpl {
    conn: Arc<Mutex<Connection>>,
}

impl RecordStoreImpl {
    /// 创建新的存储实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 共享已有连接
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn insert_ward_tx(
        tx: &Transaction,
        org: &str,
        ward: &WardRecord,
        mode: WriteMode,
    ) -> RepositoryResult<()> {
        let sql = format!(
            r#"
            INSERT INTO ward (
                id, organization_id, constituency_id, name, code, ward_number,
                population, voter_count, total_booths, urbanization, income_level,
                literacy_rate, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13){}
            "#,
            conflict_clause(
                mode,
                "organization_id, code",
                &[
                    "constituency_id",
                    "name",
                    "ward_number",
                    "population",
                    "voter_count",
                    "total_booths",
                    "urbanization",
                    "income_level",
                    "literacy_rate",
                    "updated_at",
                ],
            )
        );

        tx.execute(
            &sql,
            params![
                Uuid::new_v4().to_string(),
                org,
                ward.constituency_id,
                ward.name,
                ward.code,
                ward.ward_number,
                ward.population,
                ward.voter_count,
                ward.total_booths,
                ward.urbanization.map(|u| u.as_str()),
                ward.income_level.map(|i| i.as_str()),
                ward.literacy_rate,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn insert_booth_tx(
        tx: &Transaction,
        org: &str,
        booth: &BoothRecord,
        mode: WriteMode,
    ) -> RepositoryResult<()> {
        let sql = format!(
            r#"
            INSERT INTO polling_booth (
                id, organization_id, constituency_id, ward_id, booth_number, name,
                address, latitude, longitude, landmark, total_voters, male_voters,
                female_voters, transgender_voters, booth_type, is_accessible, is_active,
                building_name, building_type, priority_level, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?21
            ){}
            "#,
            conflict_clause(
                mode,
                "organization_id, constituency_id, booth_number",
                &[
                    "ward_id",
                    "name",
                    "address",
                    "latitude",
                    "longitude",
                    "landmark",
                    "total_voters",
                    "male_voters",
                    "female_voters",
                    "transgender_voters",
                    "booth_type",
                    "is_accessible",
                    "is_active",
                    "building_name",
                    "building_type",
                    "priority_level",
                    "updated_at",
                ],
            )
        );

        tx.execute(
            &sql,
            params![
                Uuid::new_v4().to_string(),
                org,
                booth.constituency_id,
                booth.ward_id,
                booth.booth_number,
                booth.name,
                booth.address,
                booth.latitude,
                booth.longitude,
                booth.landmark,
                booth.total_voters,
                booth.male_voters,
                booth.female_voters,
                booth.transgender_voters,
                booth.booth_type.map(|b| b.as_str()),
                booth.is_accessible,
                booth.is_active,
                booth.building_name,
                booth.building_type,
                booth.priority_level,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn insert_user_tx(
        tx: &Transaction,
        org: &str,
        user: &UserRecord,
        mode: WriteMode,
    ) -> RepositoryResult<()> {
        let sql = format!(
            r#"
            INSERT INTO app_user (
                id, email, name, role, phone, state_id, district_id,
                organization_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9){}
            "#,
            conflict_clause(
                mode,
                "email",
                &["name", "role", "phone", "state_id", "district_id", "updated_at"],
            )
        );

        tx.execute(
            &sql,
            params![
                Uuid::new_v4().to_string(),
                user.email,
                user.name,
                user.role.as_str(),
                user.phone,
                user.state_id,
                user.district_id,
                org,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn insert_generic_tx(
        tx: &Transaction,
        org: &str,
        record: &GenericRecord,
        mode: WriteMode,
    ) -> RepositoryResult<()> {
        let sql = format!(
            r#"
            INSERT INTO generic_record (
                organization_id, collection, natural_key, payload, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5){}
            "#,
            conflict_clause(
                mode,
                "organization_id, collection, natural_key",
                &["payload", "updated_at"],
            )
        );

        tx.execute(
            &sql,
            params![
                org,
                record.collection,
                record.natural_key,
                serde_json::to_string(&record.payload)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RecordStoreImpl {
    async fn load_reference(
        &self,
        namespace: ReferenceNamespace,
        organization_id: Option<&str>,
    ) -> RepositoryResult<HashMap<String, String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let org = organization_id.unwrap_or_default();

        let (sql, scoped) = match namespace {
            ReferenceNamespace::ConstituencyCode => (
                "SELECT code, id FROM constituency WHERE organization_id = ?1",
                true,
            ),
            ReferenceNamespace::WardCode => {
                ("SELECT code, id FROM ward WHERE organization_id = ?1", true)
            }
            ReferenceNamespace::StateId => (
                "SELECT CAST(id AS TEXT), CAST(id AS TEXT) FROM state",
                false,
            ),
            ReferenceNamespace::DistrictId => (
                "SELECT CAST(id AS TEXT), CAST(id AS TEXT) FROM district",
                false,
            ),
            ReferenceNamespace::UserEmail => ("SELECT lower(email), id FROM app_user", false),
        };

        let mut stmt = conn.prepare(sql)?;
        let entries = if scoped {
            stmt.query_map(params![org], key_id_pair)?
                .collect::<Result<HashMap<_, _>, _>>()?
        } else {
            stmt.query_map([], key_id_pair)?
                .collect::<Result<HashMap<_, _>, _>>()?
        };

        Ok(entries)
    }

    async fn write_chunk(
        &self,
        organization_id: Option<&str>,
        records: &[ValidatedRecord],
        mode: WriteMode,
    ) -> RepositoryResult<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        let org = organization_id.unwrap_or_default();

        for record in records {
            match record {
                ValidatedRecord::Ward(w) => Self::insert_ward_tx(&tx, org, w, mode)?,
                ValidatedRecord::Booth(b) => Self::insert_booth_tx(&tx, org, b, mode)?,
                ValidatedRecord::User(u) => Self::insert_user_tx(&tx, org, u, mode)?,
                ValidatedRecord::Generic(g) => Self::insert_generic_tx(&tx, org, g, mode)?,
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(records.len())
    }
}
