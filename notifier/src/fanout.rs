use crate::chat::{ChatPlatform, DestinationKind};
use crate::metrics_defs::{NOTIFICATIONS_DELIVERED, NOTIFICATIONS_FAILED, NOTIFICATIONS_SKIPPED};
use crate::render::{render, thread_name};
use platforms::VersionMetadata;
use shared::counter;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracker::{LedgerError, PolicyStore, Project, TrackingEntry, TrackingLedger};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    UnknownDestination,
    MissingPermissions,
    MissingPolicy,
}

impl SkipReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SkipReason::UnknownDestination => "unknown_destination",
            SkipReason::MissingPermissions => "missing_permissions",
            SkipReason::MissingPolicy => "missing_policy",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeliveryOutcome {
    Delivered,
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub destination_id: String,
    pub outcome: DeliveryOutcome,
}

/// Delivers one detected update to every destination tracking the project.
#[derive(Clone)]
pub struct FanoutEngine {
    ledger: TrackingLedger,
    policies: PolicyStore,
    chat: Arc<dyn ChatPlatform>,
}

impl FanoutEngine {
    pub fn new(ledger: TrackingLedger, policies: PolicyStore, chat: Arc<dyn ChatPlatform>) -> Self {
        FanoutEngine {
            ledger,
            policies,
            chat,
        }
    }

    /// Each destination is handled in its own task. A failure or panic in one delivery never
    /// affects the others. Results are returned in ledger order.
    pub async fn notify(
        &self,
        project: &Project,
        version: &VersionMetadata,
    ) -> Result<Vec<Delivery>, LedgerError> {
        let entries = self.ledger.entries_for_project(&project.id).await?;
        if entries.is_empty() {
            tracing::debug!(project_id = %project.id, "No destinations track project");
            return Ok(Vec::new());
        }

        let project = Arc::new(project.clone());
        let version = Arc::new(version.clone());
        let order: Vec<String> = entries
            .iter()
            .map(|e| e.destination_id().to_string())
            .collect();

        let mut join_set = JoinSet::new();
        let mut task_destinations = HashMap::new();
        for entry in entries {
            let engine = self.clone();
            let project = project.clone();
            let version = version.clone();
            let destination_id = entry.destination_id().to_string();

            let handle = join_set.spawn(async move {
                let destination_id = entry.destination_id().to_string();
                let outcome = engine.deliver(&entry, &project, &version).await;
                Delivery {
                    destination_id,
                    outcome,
                }
            });
            task_destinations.insert(handle.id(), destination_id);
        }

        let mut results: HashMap<String, DeliveryOutcome> = HashMap::new();
        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((_, delivery)) => {
                    results.insert(delivery.destination_id, delivery.outcome);
                }
                Err(e) => {
                    tracing::error!("Task panicked: {}", e);
                    counter!(NOTIFICATIONS_FAILED).increment(1);
                    if let Some(destination_id) = task_destinations.remove(&e.id()) {
                        results.insert(destination_id, DeliveryOutcome::Failed(e.to_string()));
                    }
                }
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|destination_id| {
                let outcome = results.remove(&destination_id)?;
                Some(Delivery {
                    destination_id,
                    outcome,
                })
            })
            .collect())
    }

    async fn deliver(
        &self,
        entry: &TrackingEntry,
        project: &Project,
        version: &VersionMetadata,
    ) -> DeliveryOutcome {
        let destination_id = entry.destination_id();
        let tenant_id = entry.tenant_id.as_str();

        let Some(destination) = self.chat.destination(destination_id).await else {
            return skip(entry, SkipReason::UnknownDestination);
        };

        if !self.chat.permissions(&destination).await.can_notify() {
            return skip(entry, SkipReason::MissingPermissions);
        }

        let policy = match self.policies.get(tenant_id).await {
            Ok(Some(policy)) => policy,
            Ok(None) => return skip(entry, SkipReason::MissingPolicy),
            Err(e) => {
                tracing::error!(tenant_id, destination_id, "Could not load tenant policy: {e}");
                counter!(NOTIFICATIONS_FAILED).increment(1);
                return DeliveryOutcome::Failed(e.to_string());
            }
        };

        let message = render(project, version, &policy, &entry.role_ids);
        let result = match destination.kind {
            DestinationKind::Forum => {
                self.chat
                    .start_thread(&destination, &thread_name(version), &message)
                    .await
            }
            DestinationKind::Text => self.chat.send(&destination, &message).await,
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    project_id = %project.id,
                    version_id = %version.id,
                    tenant_id,
                    destination_id,
                    "Sent update notification"
                );
                counter!(NOTIFICATIONS_DELIVERED, "style" => policy.notification_style.as_str())
                    .increment(1);
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                tracing::error!(
                    project_id = %project.id,
                    tenant_id,
                    destination_id,
                    "Failed to deliver update notification: {e}"
                );
                counter!(NOTIFICATIONS_FAILED).increment(1);
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }
}

fn skip(entry: &TrackingEntry, reason: SkipReason) -> DeliveryOutcome {
    tracing::warn!(
        project_id = entry.project_id(),
        tenant_id = %entry.tenant_id,
        destination_id = entry.destination_id(),
        %reason,
        "Skipping destination"
    );
    counter!(NOTIFICATIONS_SKIPPED, "reason" => reason.as_str()).increment(1);
    DeliveryOutcome::Skipped(reason)
}
