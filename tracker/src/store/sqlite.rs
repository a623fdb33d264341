use super::{InsertOutcome, Store};
use crate::errors::StoreError;
use crate::types::{Project, TenantPolicy, TrackingEntry, TrackingKey, VersionSet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use platforms::Platform;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqlitePool, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tenants (
        tenant_id TEXT PRIMARY KEY,
        max_tracked_projects INTEGER NOT NULL,
        notification_style TEXT NOT NULL,
        changelog_max_length INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        platform TEXT NOT NULL,
        name TEXT NOT NULL,
        date_updated TEXT NOT NULL,
        game_id INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS project_versions (
        project_id TEXT NOT NULL REFERENCES projects(id),
        version_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (project_id, version_id)
    )",
    "CREATE TABLE IF NOT EXISTS tracked_projects (
        project_id TEXT NOT NULL,
        destination_id TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        role_ids TEXT NOT NULL DEFAULT '[]',
        PRIMARY KEY (project_id, destination_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_tracked_projects_tenant ON tracked_projects(tenant_id)",
    "CREATE INDEX IF NOT EXISTS idx_tracked_projects_destination ON tracked_projects(destination_id)",
];

type ProjectRow = (String, String, String, DateTime<Utc>, Option<i64>);
type PolicyRow = (String, i64, String, i64);
type EntryRow = (String, String, String, String);

pub struct SqliteStore {
    pool: SqlitePool,
    // SQLite has a single writer. Multi-statement writes take this first so a transaction
    // never has to upgrade a stale read snapshot.
    writer: Mutex<()>,
}

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let newly_created = !path.exists();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        if newly_created {
            tracing::info!("Initialized new database: {}", path.display());
        } else {
            tracing::info!("Opened existing database: {}", path.display());
        }

        Self::with_pool(pool).await
    }

    /// Private in-memory database. It lives as long as the store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(SqliteStore {
            pool,
            writer: Mutex::new(()),
        })
    }

    async fn load_versions(&self, project_id: &str) -> Result<VersionSet, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT version_id FROM project_versions WHERE project_id = ? ORDER BY position",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn fetch_entry(
        tx: &mut Transaction<'_, Sqlite>,
        key: &TrackingKey,
    ) -> Result<Option<TrackingEntry>, StoreError> {
        let row: Option<EntryRow> = sqlx::query_as(
            "SELECT project_id, destination_id, tenant_id, role_ids FROM tracked_projects
             WHERE project_id = ? AND destination_id = ?",
        )
        .bind(&key.project_id)
        .bind(&key.destination_id)
        .fetch_optional(&mut **tx)
        .await?;
        row.map(entry_from_row).transpose()
    }
}

fn project_from_row(row: ProjectRow, versions: VersionSet) -> Result<Project, StoreError> {
    let (id, platform, name, date_updated, game_id) = row;
    let platform =
        Platform::from_str(&platform).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(Project {
        id,
        platform,
        name,
        date_updated,
        versions,
        game_id,
    })
}

fn policy_from_row(row: PolicyRow) -> Result<TenantPolicy, StoreError> {
    let (tenant_id, max_tracked_projects, style, changelog_max_length) = row;
    let corrupt = |what: &str| StoreError::Corrupt(format!("{what} for tenant {tenant_id}"));
    Ok(TenantPolicy {
        max_tracked_projects: u32::try_from(max_tracked_projects)
            .map_err(|_| corrupt("max_tracked_projects"))?,
        notification_style: style.parse().map_err(|_| corrupt("notification_style"))?,
        changelog_max_length: u32::try_from(changelog_max_length)
            .map_err(|_| corrupt("changelog_max_length"))?,
        tenant_id,
    })
}

fn entry_from_row(row: EntryRow) -> Result<TrackingEntry, StoreError> {
    let (project_id, destination_id, tenant_id, role_ids) = row;
    Ok(TrackingEntry {
        key: TrackingKey {
            project_id,
            destination_id,
        },
        tenant_id,
        role_ids: serde_json::from_str(&role_ids)?,
    })
}

fn encode_roles(role_ids: &IndexSet<String>) -> Result<String, StoreError> {
    Ok(serde_json::to_string(role_ids)?)
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        let row: Option<ProjectRow> = sqlx::query_as(
            "SELECT id, platform, name, date_updated, game_id FROM projects WHERE id = ?",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let versions = self.load_versions(project_id).await?;
                Ok(Some(project_from_row(row, versions)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_project(&self, project: &Project) -> Result<InsertOutcome, StoreError> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO projects (id, platform, name, date_updated, game_id)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&project.id)
        .bind(project.platform.as_str())
        .bind(&project.name)
        .bind(project.date_updated)
        .bind(project.game_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Ok(InsertOutcome::Duplicate);
        }

        for (position, version_id) in project.versions.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO project_versions (project_id, version_id, position)
                 VALUES (?, ?, ?)",
            )
            .bind(&project.id)
            .bind(version_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(InsertOutcome::Inserted)
    }

    async fn record_version(
        &self,
        project_id: &str,
        version_id: &str,
        name: &str,
        date_updated: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO project_versions (project_id, version_id, position)
             SELECT id, ?, (SELECT COUNT(*) FROM project_versions WHERE project_id = ?)
             FROM projects WHERE id = ?",
        )
        .bind(version_id)
        .bind(project_id)
        .bind(project_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE projects SET name = ?, date_updated = ? WHERE id = ?")
            .bind(name)
            .bind(date_updated)
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            "SELECT id, platform, name, date_updated, game_id FROM projects ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        let versions: Vec<(String, String)> = sqlx::query_as(
            "SELECT project_id, version_id FROM project_versions ORDER BY project_id, position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_project: IndexMap<String, VersionSet> = IndexMap::new();
        for (project_id, version_id) in versions {
            by_project.entry(project_id).or_default().insert(version_id);
        }

        rows.into_iter()
            .map(|row| {
                let versions = by_project.swap_remove(&row.0).unwrap_or_default();
                project_from_row(row, versions)
            })
            .collect()
    }

    async fn count_projects(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn get_policy(&self, tenant_id: &str) -> Result<Option<TenantPolicy>, StoreError> {
        let row: Option<PolicyRow> = sqlx::query_as(
            "SELECT tenant_id, max_tracked_projects, notification_style, changelog_max_length
             FROM tenants WHERE tenant_id = ?",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(policy_from_row).transpose()
    }

    async fn insert_policy(&self, policy: &TenantPolicy) -> Result<InsertOutcome, StoreError> {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO tenants
             (tenant_id, max_tracked_projects, notification_style, changelog_max_length)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&policy.tenant_id)
        .bind(i64::from(policy.max_tracked_projects))
        .bind(policy.notification_style.as_str())
        .bind(i64::from(policy.changelog_max_length))
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(if inserted == 0 {
            InsertOutcome::Duplicate
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn save_policy(&self, policy: &TenantPolicy) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tenants
             (tenant_id, max_tracked_projects, notification_style, changelog_max_length)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET
                max_tracked_projects = excluded.max_tracked_projects,
                notification_style = excluded.notification_style,
                changelog_max_length = excluded.changelog_max_length",
        )
        .bind(&policy.tenant_id)
        .bind(i64::from(policy.max_tracked_projects))
        .bind(policy.notification_style.as_str())
        .bind(i64::from(policy.changelog_max_length))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_entry(&self, key: &TrackingKey) -> Result<Option<TrackingEntry>, StoreError> {
        let row: Option<EntryRow> = sqlx::query_as(
            "SELECT project_id, destination_id, tenant_id, role_ids FROM tracked_projects
             WHERE project_id = ? AND destination_id = ?",
        )
        .bind(&key.project_id)
        .bind(&key.destination_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(entry_from_row).transpose()
    }

    async fn insert_entry(&self, entry: &TrackingEntry) -> Result<InsertOutcome, StoreError> {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO tracked_projects (project_id, destination_id, tenant_id, role_ids)
             VALUES (?, ?, ?, ?)",
        )
        .bind(entry.project_id())
        .bind(entry.destination_id())
        .bind(&entry.tenant_id)
        .bind(encode_roles(&entry.role_ids)?)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(if inserted == 0 {
            InsertOutcome::Duplicate
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn merge_roles(
        &self,
        key: &TrackingKey,
        role_ids: &IndexSet<String>,
    ) -> Result<Option<TrackingEntry>, StoreError> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        let Some(mut entry) = Self::fetch_entry(&mut tx, key).await? else {
            return Ok(None);
        };

        if entry.merge_roles(role_ids) {
            sqlx::query(
                "UPDATE tracked_projects SET role_ids = ? WHERE project_id = ? AND destination_id = ?",
            )
            .bind(encode_roles(&entry.role_ids)?)
            .bind(&key.project_id)
            .bind(&key.destination_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
        }

        Ok(Some(entry))
    }

    async fn update_entry(
        &self,
        key: &TrackingKey,
        tenant_id: &str,
        destination_id: &str,
        role_ids: &IndexSet<String>,
    ) -> Result<u64, StoreError> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        match Self::fetch_entry(&mut tx, key).await? {
            Some(entry) if entry.tenant_id == tenant_id => {}
            _ => return Ok(0),
        }

        let target = TrackingKey::new(key.project_id.clone(), destination_id);
        if target != *key && Self::fetch_entry(&mut tx, &target).await?.is_some() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE tracked_projects SET destination_id = ?, role_ids = ?
             WHERE project_id = ? AND destination_id = ? AND tenant_id = ?",
        )
        .bind(destination_id)
        .bind(encode_roles(role_ids)?)
        .bind(&key.project_id)
        .bind(&key.destination_id)
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn delete_entry(&self, key: &TrackingKey, tenant_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM tracked_projects
             WHERE project_id = ? AND destination_id = ? AND tenant_id = ?",
        )
        .bind(&key.project_id)
        .bind(&key.destination_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn entries_for_project(&self, project_id: &str) -> Result<Vec<TrackingEntry>, StoreError> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            "SELECT project_id, destination_id, tenant_id, role_ids FROM tracked_projects
             WHERE project_id = ? ORDER BY destination_id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(entry_from_row).collect()
    }

    async fn entries_for_tenant(&self, tenant_id: &str) -> Result<Vec<TrackingEntry>, StoreError> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            "SELECT project_id, destination_id, tenant_id, role_ids FROM tracked_projects
             WHERE tenant_id = ? ORDER BY destination_id, project_id",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(entry_from_row).collect()
    }

    async fn count_entries_for_tenant(&self, tenant_id: &str) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tracked_projects WHERE tenant_id = ?")
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn delete_entries_for_destination(&self, destination_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tracked_projects WHERE destination_id = ?")
            .bind(destination_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_tenant(&self, tenant_id: &str) -> Result<u64, StoreError> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tenants WHERE tenant_id = ?")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM tracked_projects WHERE tenant_id = ?")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::exercise_store;

    #[tokio::test]
    async fn test_sqlite_store() {
        exercise_store(&SqliteStore::in_memory().await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modrunner.db");

        let store = SqliteStore::open(&path).await.unwrap();
        let policy = TenantPolicy {
            tenant_id: "guild-1".into(),
            max_tracked_projects: 5,
            notification_style: crate::types::NotificationStyle::Compact,
            changelog_max_length: 200,
        };
        store.save_policy(&policy).await.unwrap();
        store.pool.close().await;

        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(store.get_policy("guild-1").await.unwrap(), Some(policy));
    }
}
