//! Persistence for projects, tenant policies and ledger entries.
//!
//! Every method is atomic on its own. Callers never need to wrap a single call in a
//! transaction, but sequences of calls are not atomic together.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::errors::StoreError;
use crate::types::{Project, TenantPolicy, TrackingEntry, TrackingKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Sqlite {
        path: PathBuf,
    },
    #[default]
    Memory,
}

/// Result of inserting a row keyed by a primary key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with the same key already existed and was left untouched.
    Duplicate,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError>;

    async fn insert_project(&self, project: &Project) -> Result<InsertOutcome, StoreError>;

    /// Adds `version_id` to the project's seen set and, if it was not already there, stores the
    /// new display name and update time. Returns whether the version was new. Unknown projects
    /// return false.
    async fn record_version(
        &self,
        project_id: &str,
        version_id: &str,
        name: &str,
        date_updated: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError>;

    async fn count_projects(&self) -> Result<u64, StoreError>;

    async fn get_policy(&self, tenant_id: &str) -> Result<Option<TenantPolicy>, StoreError>;

    /// Stores the policy only if the tenant has none.
    async fn insert_policy(&self, policy: &TenantPolicy) -> Result<InsertOutcome, StoreError>;

    /// Overwrites the tenant's policy, creating it if needed.
    async fn save_policy(&self, policy: &TenantPolicy) -> Result<(), StoreError>;

    async fn get_entry(&self, key: &TrackingKey) -> Result<Option<TrackingEntry>, StoreError>;

    async fn insert_entry(&self, entry: &TrackingEntry) -> Result<InsertOutcome, StoreError>;

    /// Unions `role_ids` into an existing entry's roles and returns the updated entry.
    async fn merge_roles(
        &self,
        key: &TrackingKey,
        role_ids: &IndexSet<String>,
    ) -> Result<Option<TrackingEntry>, StoreError>;

    /// Moves one of `tenant_id`'s entries to another destination and replaces its roles.
    /// Returns 0 without changing anything when the entry belongs to another tenant or the
    /// target key is already tracked.
    async fn update_entry(
        &self,
        key: &TrackingKey,
        tenant_id: &str,
        destination_id: &str,
        role_ids: &IndexSet<String>,
    ) -> Result<u64, StoreError>;

    async fn delete_entry(&self, key: &TrackingKey, tenant_id: &str) -> Result<u64, StoreError>;

    async fn entries_for_project(&self, project_id: &str) -> Result<Vec<TrackingEntry>, StoreError>;

    async fn entries_for_tenant(&self, tenant_id: &str) -> Result<Vec<TrackingEntry>, StoreError>;

    async fn count_entries_for_tenant(&self, tenant_id: &str) -> Result<u64, StoreError>;

    async fn delete_entries_for_destination(&self, destination_id: &str) -> Result<u64, StoreError>;

    /// Removes the tenant's policy and every ledger entry it owns. Returns the number of
    /// entries removed.
    async fn delete_tenant(&self, tenant_id: &str) -> Result<u64, StoreError>;
}

pub async fn open(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    match config {
        StoreConfig::Sqlite { path } => Ok(Arc::new(SqliteStore::open(path).await?)),
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{NotificationStyle, VersionSet};
    use platforms::Platform;
    use platforms::testutils::timestamp;

    fn project(id: &str, versions: &[&str]) -> Project {
        Project {
            id: id.to_string(),
            platform: Platform::Modrinth,
            name: format!("Project {id}"),
            date_updated: timestamp(1_700_000_000),
            versions: versions.iter().copied().collect::<VersionSet>(),
            game_id: None,
        }
    }

    fn entry(project_id: &str, destination_id: &str, tenant_id: &str, roles: &[&str]) -> TrackingEntry {
        TrackingEntry {
            key: TrackingKey::new(project_id, destination_id),
            tenant_id: tenant_id.to_string(),
            role_ids: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Behaviour every `Store` implementation must share.
    pub(crate) async fn exercise_store(store: &dyn Store) {
        // Projects
        let p1 = project("AANobbMI", &["a", "b"]);
        assert_eq!(store.insert_project(&p1).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert_project(&p1).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.get_project("AANobbMI").await.unwrap(), Some(p1.clone()));
        assert_eq!(store.get_project("missing").await.unwrap(), None);

        let later = timestamp(1_800_000_000);
        assert!(!store.record_version("AANobbMI", "a", "Renamed", later).await.unwrap());
        assert!(store.record_version("AANobbMI", "c", "Renamed", later).await.unwrap());
        assert!(!store.record_version("AANobbMI", "c", "Renamed", later).await.unwrap());
        assert!(!store.record_version("missing", "c", "Renamed", later).await.unwrap());

        let stored = store.get_project("AANobbMI").await.unwrap().unwrap();
        assert_eq!(stored.versions.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.date_updated, later);

        store.insert_project(&project("238222", &[])).await.unwrap();
        assert_eq!(store.count_projects().await.unwrap(), 2);
        let all = store.list_projects().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "238222");
        assert!(all[0].versions.is_empty());
        assert_eq!(all[1].versions.len(), 3);

        // Policies
        let policy = TenantPolicy {
            tenant_id: "guild-1".into(),
            max_tracked_projects: 100,
            notification_style: NotificationStyle::Normal,
            changelog_max_length: 4000,
        };
        assert_eq!(store.insert_policy(&policy).await.unwrap(), InsertOutcome::Inserted);
        let mut changed = policy.clone();
        changed.notification_style = NotificationStyle::Compact;
        assert_eq!(store.insert_policy(&changed).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.get_policy("guild-1").await.unwrap(), Some(policy));
        store.save_policy(&changed).await.unwrap();
        assert_eq!(store.get_policy("guild-1").await.unwrap(), Some(changed));

        // Ledger
        let e1 = entry("AANobbMI", "chan-1", "guild-1", &["r1"]);
        assert_eq!(store.insert_entry(&e1).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert_entry(&e1).await.unwrap(), InsertOutcome::Duplicate);
        store.insert_entry(&entry("238222", "chan-1", "guild-1", &[])).await.unwrap();
        store.insert_entry(&entry("AANobbMI", "chan-9", "guild-2", &[])).await.unwrap();

        let merged = store
            .merge_roles(&e1.key, &["r2".to_string(), "r1".to_string()].into_iter().collect())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merged.role_ids.iter().collect::<Vec<_>>(), vec!["r1", "r2"]);
        assert_eq!(store.get_entry(&e1.key).await.unwrap(), Some(merged));
        assert_eq!(
            store.merge_roles(&TrackingKey::new("x", "y"), &IndexSet::new()).await.unwrap(),
            None
        );

        assert_eq!(store.count_entries_for_tenant("guild-1").await.unwrap(), 2);
        let for_project = store.entries_for_project("AANobbMI").await.unwrap();
        assert_eq!(
            for_project.iter().map(|e| e.destination_id()).collect::<Vec<_>>(),
            vec!["chan-1", "chan-9"]
        );

        let moved = store
            .update_entry(&e1.key, "guild-1", "chan-2", &["r3".to_string()].into_iter().collect())
            .await
            .unwrap();
        assert_eq!(moved, 1);
        assert_eq!(store.get_entry(&e1.key).await.unwrap(), None);
        let new_key = TrackingKey::new("AANobbMI", "chan-2");
        let moved_entry = store.get_entry(&new_key).await.unwrap().unwrap();
        assert_eq!(moved_entry.tenant_id, "guild-1");
        assert_eq!(moved_entry.role_ids.iter().collect::<Vec<_>>(), vec!["r3"]);
        assert_eq!(
            store.update_entry(&e1.key, "guild-1", "chan-3", &IndexSet::new()).await.unwrap(),
            0
        );

        // Another tenant's entry at the target key is left alone.
        assert_eq!(
            store
                .update_entry(&new_key, "guild-1", "chan-9", &IndexSet::new())
                .await
                .unwrap(),
            0
        );
        let other = store
            .get_entry(&TrackingKey::new("AANobbMI", "chan-9"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other.tenant_id, "guild-2");
        assert!(store.get_entry(&new_key).await.unwrap().is_some());

        // Only the owning tenant can edit an entry.
        assert_eq!(
            store
                .update_entry(&new_key, "guild-2", "chan-4", &IndexSet::new())
                .await
                .unwrap(),
            0
        );

        // Keeping the destination only replaces the roles.
        assert_eq!(
            store
                .update_entry(&new_key, "guild-1", "chan-2", &["r4".to_string()].into_iter().collect())
                .await
                .unwrap(),
            1
        );
        let kept = store.get_entry(&new_key).await.unwrap().unwrap();
        assert_eq!(kept.role_ids.iter().collect::<Vec<_>>(), vec!["r4"]);

        let by_tenant = store.entries_for_tenant("guild-1").await.unwrap();
        assert_eq!(
            by_tenant.iter().map(|e| e.destination_id()).collect::<Vec<_>>(),
            vec!["chan-1", "chan-2"]
        );

        assert_eq!(store.delete_entry(&new_key, "guild-2").await.unwrap(), 0);
        assert_eq!(store.delete_entry(&new_key, "guild-1").await.unwrap(), 1);
        assert_eq!(store.delete_entries_for_destination("chan-9").await.unwrap(), 1);

        assert_eq!(store.delete_tenant("guild-1").await.unwrap(), 1);
        assert_eq!(store.get_policy("guild-1").await.unwrap(), None);
        assert_eq!(store.count_entries_for_tenant("guild-1").await.unwrap(), 0);
        // Projects are never removed with their trackers.
        assert_eq!(store.count_projects().await.unwrap(), 2);
    }

    #[test]
    fn test_store_config() {
        let config: StoreConfig = serde_yaml::from_str("type: sqlite\npath: /var/lib/modrunner.db").unwrap();
        assert_eq!(
            config,
            StoreConfig::Sqlite {
                path: PathBuf::from("/var/lib/modrunner.db")
            }
        );
        let config: StoreConfig = serde_yaml::from_str("type: memory").unwrap();
        assert_eq!(config, StoreConfig::Memory);
    }

    #[tokio::test]
    async fn test_open_sqlite_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("modrunner.db");
        let store = open(&StoreConfig::Sqlite { path: path.clone() }).await.unwrap();
        assert_eq!(store.count_projects().await.unwrap(), 0);
        assert!(path.exists());
    }
}
