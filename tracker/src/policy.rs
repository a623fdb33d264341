use crate::errors::PolicyError;
use crate::store::{InsertOutcome, Store};
use crate::types::{
    MAX_CHANGELOG_LENGTH, MIN_CHANGELOG_LENGTH, NotificationStyle, PolicyDefaults, TenantPolicy,
};
use std::sync::Arc;

/// Fields a tenant may change on its own policy. `None` leaves a field as is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolicyUpdate {
    pub changelog_max_length: Option<u32>,
    pub notification_style: Option<NotificationStyle>,
}

#[derive(Clone)]
pub struct PolicyStore {
    store: Arc<dyn Store>,
    defaults: PolicyDefaults,
}

impl PolicyStore {
    pub fn new(store: Arc<dyn Store>, defaults: PolicyDefaults) -> Self {
        PolicyStore { store, defaults }
    }

    pub fn defaults(&self) -> &PolicyDefaults {
        &self.defaults
    }

    pub async fn get(&self, tenant_id: &str) -> Result<Option<TenantPolicy>, PolicyError> {
        Ok(self.store.get_policy(tenant_id).await?)
    }

    /// Creates the default policy for a tenant that has none. Called when a tenant first
    /// appears.
    pub async fn ensure(&self, tenant_id: &str) -> Result<(), PolicyError> {
        let policy = TenantPolicy::with_defaults(tenant_id, &self.defaults);
        if self.store.insert_policy(&policy).await? == InsertOutcome::Inserted {
            tracing::info!(tenant_id, "Created default tenant policy");
        }
        Ok(())
    }

    pub async fn get_or_create(&self, tenant_id: &str) -> Result<TenantPolicy, PolicyError> {
        if let Some(policy) = self.store.get_policy(tenant_id).await? {
            return Ok(policy);
        }
        self.ensure(tenant_id).await?;
        // Another caller may have won the insert, so read back whatever is stored.
        Ok(self
            .store
            .get_policy(tenant_id)
            .await?
            .unwrap_or_else(|| TenantPolicy::with_defaults(tenant_id, &self.defaults)))
    }

    pub async fn update(
        &self,
        tenant_id: &str,
        update: PolicyUpdate,
    ) -> Result<TenantPolicy, PolicyError> {
        if let Some(value) = update.changelog_max_length
            && !(MIN_CHANGELOG_LENGTH..=MAX_CHANGELOG_LENGTH).contains(&value)
        {
            return Err(PolicyError::ChangelogLengthOutOfRange {
                value,
                min: MIN_CHANGELOG_LENGTH,
                max: MAX_CHANGELOG_LENGTH,
            });
        }

        let mut policy = self.get_or_create(tenant_id).await?;
        if let Some(value) = update.changelog_max_length {
            policy.changelog_max_length = value;
        }
        if let Some(style) = update.notification_style {
            policy.notification_style = style;
        }
        self.store.save_policy(&policy).await?;

        tracing::info!(
            tenant_id,
            changelog_max_length = policy.changelog_max_length,
            notification_style = %policy.notification_style,
            "Updated tenant policy"
        );
        Ok(policy)
    }

    /// Operator override of a tenant's tracking quota.
    pub async fn set_max_tracked_projects(
        &self,
        tenant_id: &str,
        max: u32,
    ) -> Result<TenantPolicy, PolicyError> {
        let mut policy = self.get_or_create(tenant_id).await?;
        policy.max_tracked_projects = max;
        self.store.save_policy(&policy).await?;
        tracing::info!(tenant_id, max_tracked_projects = max, "Updated tenant quota");
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn policies() -> PolicyStore {
        PolicyStore::new(Arc::new(MemoryStore::new()), PolicyDefaults::default())
    }

    #[tokio::test]
    async fn test_get_or_create_applies_defaults() {
        let policies = policies();
        assert_eq!(policies.get("guild-1").await.unwrap(), None);

        let policy = policies.get_or_create("guild-1").await.unwrap();
        assert_eq!(policy.max_tracked_projects, 100);
        assert_eq!(policy.notification_style, NotificationStyle::Normal);
        assert_eq!(policy.changelog_max_length, 4000);
        assert_eq!(policies.get("guild-1").await.unwrap(), Some(policy));
    }

    #[tokio::test]
    async fn test_ensure_keeps_existing_policy() {
        let policies = policies();
        policies.set_max_tracked_projects("guild-1", 5).await.unwrap();
        policies.ensure("guild-1").await.unwrap();
        let policy = policies.get("guild-1").await.unwrap().unwrap();
        assert_eq!(policy.max_tracked_projects, 5);
    }

    #[tokio::test]
    async fn test_update() {
        let policies = policies();
        let policy = policies
            .update(
                "guild-1",
                PolicyUpdate {
                    changelog_max_length: Some(100),
                    notification_style: Some(NotificationStyle::Alt),
                },
            )
            .await
            .unwrap();
        assert_eq!(policy.changelog_max_length, 100);
        assert_eq!(policy.notification_style, NotificationStyle::Alt);

        let policy = policies
            .update(
                "guild-1",
                PolicyUpdate {
                    notification_style: Some(NotificationStyle::Compact),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(policy.changelog_max_length, 100);
        assert_eq!(policy.notification_style, NotificationStyle::Compact);
    }

    #[tokio::test]
    async fn test_changelog_length_bounds() {
        let policies = policies();
        for value in [3, 4000] {
            let update = PolicyUpdate {
                changelog_max_length: Some(value),
                ..Default::default()
            };
            assert!(policies.update("guild-1", update).await.is_ok());
        }
        for value in [0, 2, 4001] {
            let update = PolicyUpdate {
                changelog_max_length: Some(value),
                ..Default::default()
            };
            let err = policies.update("guild-1", update).await.unwrap_err();
            assert!(matches!(err, PolicyError::ChangelogLengthOutOfRange { .. }));
        }
        assert_eq!(
            policies.get("guild-1").await.unwrap().unwrap().changelog_max_length,
            4000
        );
    }
}
