use super::{InsertOutcome, Store};
use crate::errors::StoreError;
use crate::types::{Project, TenantPolicy, TrackingEntry, TrackingKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Tables {
    projects: BTreeMap<String, Project>,
    policies: HashMap<String, TenantPolicy>,
    entries: BTreeMap<TrackingKey, TrackingEntry>,
}

/// Store kept entirely in process memory. A single lock guards all tables so every call is
/// atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.tables.lock().projects.get(project_id).cloned())
    }

    async fn insert_project(&self, project: &Project) -> Result<InsertOutcome, StoreError> {
        let mut tables = self.tables.lock();
        if tables.projects.contains_key(&project.id) {
            return Ok(InsertOutcome::Duplicate);
        }
        tables.projects.insert(project.id.clone(), project.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn record_version(
        &self,
        project_id: &str,
        version_id: &str,
        name: &str,
        date_updated: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let Some(project) = tables.projects.get_mut(project_id) else {
            return Ok(false);
        };
        if !project.versions.insert(version_id) {
            return Ok(false);
        }
        project.name = name.to_string();
        project.date_updated = date_updated;
        Ok(true)
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.tables.lock().projects.values().cloned().collect())
    }

    async fn count_projects(&self) -> Result<u64, StoreError> {
        Ok(self.tables.lock().projects.len() as u64)
    }

    async fn get_policy(&self, tenant_id: &str) -> Result<Option<TenantPolicy>, StoreError> {
        Ok(self.tables.lock().policies.get(tenant_id).cloned())
    }

    async fn insert_policy(&self, policy: &TenantPolicy) -> Result<InsertOutcome, StoreError> {
        let mut tables = self.tables.lock();
        if tables.policies.contains_key(&policy.tenant_id) {
            return Ok(InsertOutcome::Duplicate);
        }
        tables
            .policies
            .insert(policy.tenant_id.clone(), policy.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn save_policy(&self, policy: &TenantPolicy) -> Result<(), StoreError> {
        self.tables
            .lock()
            .policies
            .insert(policy.tenant_id.clone(), policy.clone());
        Ok(())
    }

    async fn get_entry(&self, key: &TrackingKey) -> Result<Option<TrackingEntry>, StoreError> {
        Ok(self.tables.lock().entries.get(key).cloned())
    }

    async fn insert_entry(&self, entry: &TrackingEntry) -> Result<InsertOutcome, StoreError> {
        let mut tables = self.tables.lock();
        if tables.entries.contains_key(&entry.key) {
            return Ok(InsertOutcome::Duplicate);
        }
        tables.entries.insert(entry.key.clone(), entry.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn merge_roles(
        &self,
        key: &TrackingKey,
        role_ids: &IndexSet<String>,
    ) -> Result<Option<TrackingEntry>, StoreError> {
        let mut tables = self.tables.lock();
        Ok(tables.entries.get_mut(key).map(|entry| {
            entry.merge_roles(role_ids);
            entry.clone()
        }))
    }

    async fn update_entry(
        &self,
        key: &TrackingKey,
        tenant_id: &str,
        destination_id: &str,
        role_ids: &IndexSet<String>,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock();
        match tables.entries.get(key) {
            Some(entry) if entry.tenant_id == tenant_id => {}
            _ => return Ok(0),
        }

        let target = TrackingKey::new(key.project_id.clone(), destination_id);
        if target != *key && tables.entries.contains_key(&target) {
            return Ok(0);
        }

        let Some(mut entry) = tables.entries.remove(key) else {
            return Ok(0);
        };
        entry.key = target;
        entry.role_ids = role_ids.clone();
        tables.entries.insert(entry.key.clone(), entry);
        Ok(1)
    }

    async fn delete_entry(&self, key: &TrackingKey, tenant_id: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock();
        match tables.entries.get(key) {
            Some(entry) if entry.tenant_id == tenant_id => {
                tables.entries.remove(key);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn entries_for_project(&self, project_id: &str) -> Result<Vec<TrackingEntry>, StoreError> {
        Ok(self
            .tables
            .lock()
            .entries
            .values()
            .filter(|e| e.key.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn entries_for_tenant(&self, tenant_id: &str) -> Result<Vec<TrackingEntry>, StoreError> {
        let mut entries: Vec<TrackingEntry> = self
            .tables
            .lock()
            .entries
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            (a.destination_id(), a.project_id()).cmp(&(b.destination_id(), b.project_id()))
        });
        Ok(entries)
    }

    async fn count_entries_for_tenant(&self, tenant_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .tables
            .lock()
            .entries
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .count() as u64)
    }

    async fn delete_entries_for_destination(&self, destination_id: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock();
        let before = tables.entries.len();
        tables
            .entries
            .retain(|key, _| key.destination_id != destination_id);
        Ok((before - tables.entries.len()) as u64)
    }

    async fn delete_tenant(&self, tenant_id: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock();
        tables.policies.remove(tenant_id);
        let before = tables.entries.len();
        tables.entries.retain(|_, entry| entry.tenant_id != tenant_id);
        Ok((before - tables.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::exercise_store;

    #[tokio::test]
    async fn test_memory_store() {
        exercise_store(&MemoryStore::new()).await;
    }
}
