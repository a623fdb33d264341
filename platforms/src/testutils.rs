use crate::errors::PlatformError;
use crate::types::{Platform, ProjectMetadata, ProjectSummary, ReleaseType, VersionMetadata};
use crate::PlatformAdapter;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

pub fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

pub fn project_metadata(
    platform: Platform,
    id: &str,
    name: &str,
    version_ids: &[&str],
) -> ProjectMetadata {
    ProjectMetadata {
        id: id.to_string(),
        platform,
        slug: name.to_lowercase().replace(' ', "-"),
        name: name.to_string(),
        date_updated: timestamp(1_700_000_000),
        version_ids: version_ids.iter().map(|v| v.to_string()).collect(),
        game_id: None,
        icon_url: None,
    }
}

pub fn version_metadata(project: &ProjectMetadata, version_id: &str) -> VersionMetadata {
    VersionMetadata {
        id: version_id.to_string(),
        project_id: project.id.clone(),
        platform: project.platform,
        project_name: project.name.clone(),
        project_updated: project.date_updated,
        name: format!("{} {version_id}", project.name),
        number: version_id.to_string(),
        release_type: ReleaseType::Release,
        published_at: project.date_updated,
        changelog: format!("Changes in {version_id}"),
        url: format!("https://example.invalid/{}/{version_id}", project.id),
        icon_url: None,
    }
}

#[derive(Default)]
struct State {
    projects: HashMap<String, ProjectMetadata>,
    aliases: HashMap<String, String>,
    latest: HashMap<String, VersionMetadata>,
    unavailable: bool,
    calls: HashMap<&'static str, usize>,
}

/// In-memory [`PlatformAdapter`] whose upstream state is scripted by the test.
pub struct ScriptedAdapter {
    platform: Platform,
    state: Mutex<State>,
}

impl ScriptedAdapter {
    pub fn new(platform: Platform) -> Self {
        ScriptedAdapter {
            platform,
            state: Mutex::new(State::default()),
        }
    }

    /// Adds a project. Its last version id, if any, becomes the latest version.
    pub fn add_project(&self, project: ProjectMetadata) {
        let mut state = self.state.lock();
        if let Some(last) = project.version_ids.last() {
            let version = version_metadata(&project, last);
            state.latest.insert(project.id.clone(), version);
        }
        state.projects.insert(project.id.clone(), project);
    }

    pub fn add_alias(&self, alias: &str, id: &str) {
        self.state
            .lock()
            .aliases
            .insert(alias.to_string(), id.to_string());
    }

    /// Publishes a new version and bumps the project's update date.
    pub fn publish(&self, project_id: &str, version_id: &str, updated: DateTime<Utc>) {
        let mut state = self.state.lock();
        let Some(project) = state.projects.get_mut(project_id) else {
            return;
        };
        project.version_ids.push(version_id.to_string());
        project.date_updated = updated;
        let mut version = version_metadata(project, version_id);
        version.published_at = updated;
        state.latest.insert(project_id.to_string(), version);
    }

    pub fn set_latest_version(&self, version: VersionMetadata) {
        self.state
            .lock()
            .latest
            .insert(version.project_id.clone(), version);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    fn record(&self, operation: &'static str) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        *state.calls.entry(operation).or_default() += 1;
        if state.unavailable {
            return Err(PlatformError::Unavailable {
                platform: self.platform,
                attempts: 3,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn canonical_id(&self, identifier: &str) -> Result<String, PlatformError> {
        self.record("canonical_id")?;
        let state = self.state.lock();
        if state.projects.contains_key(identifier) {
            return Ok(identifier.to_string());
        }
        state
            .aliases
            .get(identifier)
            .cloned()
            .ok_or_else(|| PlatformError::not_found(self.platform, identifier))
    }

    async fn fetch_project(&self, project_id: &str) -> Result<ProjectMetadata, PlatformError> {
        self.record("fetch_project")?;
        self.state
            .lock()
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| PlatformError::not_found(self.platform, project_id))
    }

    async fn fetch_latest_version(
        &self,
        project_id: &str,
    ) -> Result<VersionMetadata, PlatformError> {
        self.record("fetch_latest_version")?;
        self.state
            .lock()
            .latest
            .get(project_id)
            .cloned()
            .ok_or_else(|| PlatformError::not_found(self.platform, project_id))
    }

    async fn search(&self, query: &str) -> Result<Vec<ProjectSummary>, PlatformError> {
        self.record("search")?;
        let query = query.to_lowercase();
        let state = self.state.lock();
        let mut results: Vec<ProjectSummary> = state
            .projects
            .values()
            .filter(|p| p.name.to_lowercase().contains(&query))
            .map(|p| ProjectSummary {
                id: p.id.clone(),
                platform: p.platform,
                slug: p.slug.clone(),
                name: p.name.clone(),
                category: "Mod".to_string(),
                downloads: 0,
                url: format!("https://example.invalid/{}", p.id),
            })
            .collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(results)
    }
}
