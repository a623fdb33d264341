use crate::errors::LedgerError;
use crate::metrics_defs::{ENTRIES_CREATED, QUOTA_EXCEEDED};
use crate::policy::PolicyStore;
use crate::store::{InsertOutcome, Store};
use crate::types::{TrackingEntry, TrackingKey};
use indexmap::{IndexMap, IndexSet};
use shared::counter;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct Tracked {
    pub entry: TrackingEntry,
    /// False when the destination already tracked the project and only roles were merged.
    pub created: bool,
}

/// Which destinations track which projects, on behalf of which tenant.
#[derive(Clone)]
pub struct TrackingLedger {
    store: Arc<dyn Store>,
    policies: PolicyStore,
}

impl TrackingLedger {
    pub fn new(store: Arc<dyn Store>, policies: PolicyStore) -> Self {
        TrackingLedger { store, policies }
    }

    /// Starts tracking `project_id` in `destination_id`. Tracking an already tracked pair only
    /// merges `role_ids` into the entry and never counts against the tenant's quota.
    pub async fn track(
        &self,
        project_id: &str,
        tenant_id: &str,
        destination_id: &str,
        role_ids: IndexSet<String>,
    ) -> Result<Tracked, LedgerError> {
        let key = TrackingKey::new(project_id, destination_id);

        if let Some(entry) = self.store.merge_roles(&key, &role_ids).await? {
            return Ok(Tracked {
                entry,
                created: false,
            });
        }

        let policy = self.policies.get_or_create(tenant_id).await?;
        let tracked = self.store.count_entries_for_tenant(tenant_id).await?;
        if tracked >= u64::from(policy.max_tracked_projects) {
            tracing::info!(
                tenant_id,
                project_id,
                max_tracked_projects = policy.max_tracked_projects,
                "Tenant at tracking quota"
            );
            counter!(QUOTA_EXCEEDED).increment(1);
            return Err(LedgerError::QuotaExceeded {
                tenant_id: tenant_id.to_string(),
                max: policy.max_tracked_projects,
            });
        }

        let entry = TrackingEntry {
            key,
            tenant_id: tenant_id.to_string(),
            role_ids,
        };

        match self.store.insert_entry(&entry).await? {
            InsertOutcome::Inserted => {
                tracing::info!(tenant_id, project_id, destination_id, "Tracking project");
                counter!(ENTRIES_CREATED).increment(1);
                Ok(Tracked {
                    entry,
                    created: true,
                })
            }
            InsertOutcome::Duplicate => {
                // A concurrent request created the entry first.
                let merged = self.store.merge_roles(&entry.key, &entry.role_ids).await?;
                Ok(Tracked {
                    entry: merged.unwrap_or(entry),
                    created: false,
                })
            }
        }
    }

    pub async fn untrack(
        &self,
        project_id: &str,
        tenant_id: &str,
        destination_id: &str,
    ) -> Result<u64, LedgerError> {
        let key = TrackingKey::new(project_id, destination_id);
        let deleted = self.store.delete_entry(&key, tenant_id).await?;
        if deleted > 0 {
            tracing::info!(tenant_id, project_id, destination_id, "Untracked project");
        }
        Ok(deleted)
    }

    /// Moves one of the tenant's entries to `destination_id` and replaces its roles. Returns 0
    /// when the entry is not the tenant's or the project is already tracked there.
    pub async fn edit_entry(
        &self,
        key: &TrackingKey,
        tenant_id: &str,
        destination_id: &str,
        role_ids: IndexSet<String>,
    ) -> Result<u64, LedgerError> {
        let edited = self
            .store
            .update_entry(key, tenant_id, destination_id, &role_ids)
            .await?;
        if edited > 0 {
            tracing::info!(
                tenant_id,
                project_id = %key.project_id,
                from = %key.destination_id,
                to = destination_id,
                "Edited tracking entry"
            );
        }
        Ok(edited)
    }

    pub async fn entries_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<TrackingEntry>, LedgerError> {
        Ok(self.store.entries_for_project(project_id).await?)
    }

    /// The tenant's entries grouped by destination.
    pub async fn entries_for_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<IndexMap<String, Vec<TrackingEntry>>, LedgerError> {
        let mut grouped: IndexMap<String, Vec<TrackingEntry>> = IndexMap::new();
        for entry in self.store.entries_for_tenant(tenant_id).await? {
            grouped
                .entry(entry.destination_id().to_string())
                .or_default()
                .push(entry);
        }
        Ok(grouped)
    }

    /// Drops the tenant's policy and everything it tracks.
    pub async fn remove_tenant(&self, tenant_id: &str) -> Result<u64, LedgerError> {
        let removed = self.store.delete_tenant(tenant_id).await?;
        tracing::info!(tenant_id, entries = removed, "Removed tenant");
        Ok(removed)
    }

    /// Drops every entry pointing at a destination that no longer exists.
    pub async fn remove_destination(&self, destination_id: &str) -> Result<u64, LedgerError> {
        let removed = self.store.delete_entries_for_destination(destination_id).await?;
        if removed > 0 {
            tracing::info!(destination_id, entries = removed, "Removed deleted destination");
        }
        Ok(removed)
    }
}
