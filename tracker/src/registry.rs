use crate::errors::RegistryError;
use crate::metrics_defs::{PROJECTS_CACHED, VERSIONS_RECORDED};
use crate::store::{InsertOutcome, Store};
use crate::types::Project;
use platforms::{Platforms, VersionMetadata};
use shared::counter;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub enum UpdateDecision {
    /// `version` was not seen before. `project` already includes it.
    Updated {
        project: Project,
        version: VersionMetadata,
    },
    NoChange,
}

/// Local cache of upstream projects and the versions already seen for each.
#[derive(Clone)]
pub struct ProjectRegistry {
    store: Arc<dyn Store>,
    platforms: Arc<Platforms>,
}

impl ProjectRegistry {
    pub fn new(store: Arc<dyn Store>, platforms: Arc<Platforms>) -> Self {
        ProjectRegistry { store, platforms }
    }

    pub fn platforms(&self) -> &Arc<Platforms> {
        &self.platforms
    }

    /// Returns the cached project for `identifier`, fetching and caching it on first use. A
    /// newly cached project starts with every version upstream currently lists, so none of
    /// them are reported as updates later.
    pub async fn fetch(&self, identifier: &str) -> Result<Project, RegistryError> {
        if let Some(project) = self.store.get_project(identifier).await? {
            return Ok(project);
        }

        let (platform, id) = self.platforms.canonical_id(identifier).await?;
        if id != identifier
            && let Some(project) = self.store.get_project(&id).await?
        {
            return Ok(project);
        }

        let metadata = self.platforms.fetch_project(platform, &id).await?;
        let project = Project::from(metadata);

        match self.store.insert_project(&project).await? {
            InsertOutcome::Inserted => {
                tracing::info!(
                    project_id = %project.id,
                    %platform,
                    versions = project.versions.len(),
                    "Cached new project"
                );
                counter!(PROJECTS_CACHED, "platform" => platform.as_str()).increment(1);
                Ok(project)
            }
            InsertOutcome::Duplicate => Ok(self
                .store
                .get_project(&project.id)
                .await?
                .unwrap_or(project)),
        }
    }

    pub async fn get(&self, project_id: &str) -> Result<Option<Project>, RegistryError> {
        Ok(self.store.get_project(project_id).await?)
    }

    pub async fn all(&self) -> Result<Vec<Project>, RegistryError> {
        Ok(self.store.list_projects().await?)
    }

    pub async fn count(&self) -> Result<u64, RegistryError> {
        Ok(self.store.count_projects().await?)
    }

    /// Decides whether `latest` is a version not seen before for `project`. Recording the
    /// version is a single atomic store call, so two concurrent reconciliations of the same
    /// project cannot both report it.
    pub async fn reconcile(
        &self,
        project: &Project,
        latest: VersionMetadata,
    ) -> Result<UpdateDecision, RegistryError> {
        if project.versions.contains(&latest.id) {
            return Ok(UpdateDecision::NoChange);
        }

        let recorded = self
            .store
            .record_version(
                &project.id,
                &latest.id,
                &latest.project_name,
                latest.project_updated,
            )
            .await?;
        if !recorded {
            return Ok(UpdateDecision::NoChange);
        }

        counter!(VERSIONS_RECORDED, "platform" => project.platform.as_str()).increment(1);
        tracing::info!(
            project_id = %project.id,
            version_id = %latest.id,
            "Detected new version"
        );

        let mut updated = project.clone();
        updated.versions.insert(latest.id.clone());
        updated.name = latest.project_name.clone();
        updated.date_updated = latest.project_updated;

        Ok(UpdateDecision::Updated {
            project: updated,
            version: latest,
        })
    }
}
