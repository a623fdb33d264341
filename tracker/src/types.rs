use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use platforms::{Platform, ProjectMetadata};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_CHANGELOG_LENGTH: u32 = 3;
pub const MAX_CHANGELOG_LENGTH: u32 = 4000;

/// Version or file ids already seen for a project. Membership is what marks a version as
/// already notified; insertion order is kept only for storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionSet(IndexSet<String>);

impl VersionSet {
    pub fn new() -> Self {
        VersionSet(IndexSet::new())
    }

    pub fn contains(&self, version_id: &str) -> bool {
        self.0.contains(version_id)
    }

    /// Returns false if the id was already present.
    pub fn insert(&mut self, version_id: impl Into<String>) -> bool {
        self.0.insert(version_id.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for VersionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        VersionSet(iter.into_iter().map(Into::into).collect())
    }
}

/// Locally cached record of an upstream project.
#[derive(Clone, Debug, PartialEq)]
pub struct Project {
    pub id: String,
    pub platform: Platform,
    pub name: String,
    pub date_updated: DateTime<Utc>,
    pub versions: VersionSet,
    pub game_id: Option<i64>,
}

impl From<ProjectMetadata> for Project {
    fn from(metadata: ProjectMetadata) -> Self {
        Project {
            id: metadata.id,
            platform: metadata.platform,
            name: metadata.name,
            date_updated: metadata.date_updated,
            versions: metadata.version_ids.into_iter().collect(),
            game_id: metadata.game_id,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStyle {
    #[default]
    Normal,
    Alt,
    Compact,
    Ai,
}

impl NotificationStyle {
    pub const fn as_str(&self) -> &'static str {
        match self {
            NotificationStyle::Normal => "normal",
            NotificationStyle::Alt => "alt",
            NotificationStyle::Compact => "compact",
            NotificationStyle::Ai => "ai",
        }
    }
}

impl fmt::Display for NotificationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("unknown notification style: {0}")]
pub struct UnknownStyle(pub String);

impl FromStr for NotificationStyle {
    type Err = UnknownStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(NotificationStyle::Normal),
            "alt" => Ok(NotificationStyle::Alt),
            "compact" => Ok(NotificationStyle::Compact),
            "ai" => Ok(NotificationStyle::Ai),
            _ => Err(UnknownStyle(s.to_string())),
        }
    }
}

/// Values applied to tenants that have no stored policy yet.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyDefaults {
    pub max_tracked_projects: u32,
    pub notification_style: NotificationStyle,
    pub changelog_max_length: u32,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        PolicyDefaults {
            max_tracked_projects: 100,
            notification_style: NotificationStyle::Normal,
            changelog_max_length: MAX_CHANGELOG_LENGTH,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TenantPolicy {
    pub tenant_id: String,
    pub max_tracked_projects: u32,
    pub notification_style: NotificationStyle,
    pub changelog_max_length: u32,
}

impl TenantPolicy {
    pub fn with_defaults(tenant_id: &str, defaults: &PolicyDefaults) -> Self {
        TenantPolicy {
            tenant_id: tenant_id.to_string(),
            max_tracked_projects: defaults.max_tracked_projects,
            notification_style: defaults.notification_style,
            changelog_max_length: defaults.changelog_max_length,
        }
    }
}

/// Composite primary key of a ledger entry. A destination tracks a project at most once.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackingKey {
    pub project_id: String,
    pub destination_id: String,
}

impl TrackingKey {
    pub fn new(project_id: impl Into<String>, destination_id: impl Into<String>) -> Self {
        TrackingKey {
            project_id: project_id.into(),
            destination_id: destination_id.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackingEntry {
    pub key: TrackingKey,
    pub tenant_id: String,
    /// Roles mentioned when an update is posted.
    pub role_ids: IndexSet<String>,
}

impl TrackingEntry {
    pub fn project_id(&self) -> &str {
        &self.key.project_id
    }

    pub fn destination_id(&self) -> &str {
        &self.key.destination_id
    }

    /// Adds any missing roles. Returns whether the set changed.
    pub fn merge_roles<'a>(&mut self, role_ids: impl IntoIterator<Item = &'a String>) -> bool {
        let before = self.role_ids.len();
        self.role_ids.extend(role_ids.into_iter().cloned());
        self.role_ids.len() != before
    }
}
