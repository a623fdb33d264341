//! Upstream platform adapters.
//!
//! Each supported hosting platform is wrapped in a [`PlatformAdapter`]. [`Platforms`] owns one
//! adapter per platform, routes raw user-supplied identifiers to the right one and remembers
//! recent misses in a short-lived negative cache.

pub mod config;
pub mod curseforge;
pub mod errors;
pub mod markup;
pub mod metrics_defs;
pub mod modrinth;
pub mod negative_cache;
mod request;
pub mod types;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use config::{ClientConfig, CurseForgeConfig, ModrinthConfig, PlatformsConfig};
pub use errors::PlatformError;
pub use request::RetryPolicy;
pub use types::{Platform, ProjectMetadata, ProjectSummary, ReleaseType, VersionMetadata};

use async_trait::async_trait;
use negative_cache::NegativeCache;
use std::sync::Arc;

/// Maximum number of results returned by a search.
pub const SEARCH_PAGE_SIZE: usize = 25;

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Resolves a user-supplied identifier (id or slug) to the platform's stable id.
    async fn canonical_id(&self, identifier: &str) -> Result<String, PlatformError>;

    async fn fetch_project(&self, project_id: &str) -> Result<ProjectMetadata, PlatformError>;

    async fn fetch_latest_version(&self, project_id: &str)
    -> Result<VersionMetadata, PlatformError>;

    async fn search(&self, query: &str) -> Result<Vec<ProjectSummary>, PlatformError>;
}

pub struct Platforms {
    curseforge: Arc<dyn PlatformAdapter>,
    modrinth: Arc<dyn PlatformAdapter>,
    not_found: NegativeCache,
}

impl Platforms {
    pub fn new(curseforge: Arc<dyn PlatformAdapter>, modrinth: Arc<dyn PlatformAdapter>) -> Self {
        Self::with_negative_cache(curseforge, modrinth, NegativeCache::new())
    }

    pub fn with_negative_cache(
        curseforge: Arc<dyn PlatformAdapter>,
        modrinth: Arc<dyn PlatformAdapter>,
        not_found: NegativeCache,
    ) -> Self {
        Platforms {
            curseforge,
            modrinth,
            not_found,
        }
    }

    pub fn from_config(config: &PlatformsConfig) -> Result<Self, PlatformError> {
        let curseforge = curseforge::CurseForge::new(&config.curseforge)?;
        let modrinth = modrinth::Modrinth::new(&config.modrinth)?;
        Ok(Self::new(Arc::new(curseforge), Arc::new(modrinth)))
    }

    pub fn adapter(&self, platform: Platform) -> &Arc<dyn PlatformAdapter> {
        match platform {
            Platform::CurseForge => &self.curseforge,
            Platform::Modrinth => &self.modrinth,
        }
    }

    /// Picks the adapter responsible for a raw identifier.
    pub fn route(&self, identifier: &str) -> &Arc<dyn PlatformAdapter> {
        self.adapter(Platform::for_identifier(identifier))
    }

    fn cache_key(platform: Platform, identifier: &str) -> String {
        format!("{}:{identifier}", platform.as_str())
    }

    /// Resolves a raw identifier to its platform and canonical id. Identifiers that recently
    /// failed to resolve are rejected without contacting upstream.
    pub async fn canonical_id(&self, identifier: &str) -> Result<(Platform, String), PlatformError> {
        let adapter = self.route(identifier);
        let platform = adapter.platform();
        let key = Self::cache_key(platform, identifier);

        if self.not_found.contains(&key) {
            tracing::debug!(%platform, identifier, "Identifier in negative cache");
            return Err(PlatformError::not_found(platform, identifier));
        }

        match adapter.canonical_id(identifier).await {
            Ok(id) => Ok((platform, id)),
            Err(err) => {
                if err.is_not_found() {
                    self.not_found.insert(&key);
                }
                Err(err)
            }
        }
    }

    /// Resolves a raw identifier and fetches the project's metadata.
    pub async fn resolve_project(&self, identifier: &str) -> Result<ProjectMetadata, PlatformError> {
        let (platform, id) = self.canonical_id(identifier).await?;
        self.adapter(platform).fetch_project(&id).await
    }

    pub async fn fetch_project(
        &self,
        platform: Platform,
        project_id: &str,
    ) -> Result<ProjectMetadata, PlatformError> {
        self.adapter(platform).fetch_project(project_id).await
    }

    pub async fn fetch_latest_version(
        &self,
        platform: Platform,
        project_id: &str,
    ) -> Result<VersionMetadata, PlatformError> {
        self.adapter(platform).fetch_latest_version(project_id).await
    }

    pub async fn search(
        &self,
        platform: Platform,
        query: &str,
    ) -> Result<Vec<ProjectSummary>, PlatformError> {
        self.adapter(platform).search(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{ScriptedAdapter, project_metadata};

    fn platforms() -> (Arc<ScriptedAdapter>, Arc<ScriptedAdapter>, Platforms) {
        let cf = Arc::new(ScriptedAdapter::new(Platform::CurseForge));
        let mr = Arc::new(ScriptedAdapter::new(Platform::Modrinth));
        let platforms = Platforms::new(cf.clone(), mr.clone());
        (cf, mr, platforms)
    }

    #[tokio::test]
    async fn test_routes_by_identifier_shape() {
        let (cf, mr, platforms) = platforms();
        cf.add_project(project_metadata(Platform::CurseForge, "238222", "JEI", &["1"]));
        mr.add_project(project_metadata(Platform::Modrinth, "AANobbMI", "Sodium", &["a"]));
        mr.add_alias("sodium", "AANobbMI");

        let project = platforms.resolve_project("238222").await.unwrap();
        assert_eq!(project.platform, Platform::CurseForge);

        let project = platforms.resolve_project("sodium").await.unwrap();
        assert_eq!(project.platform, Platform::Modrinth);
        assert_eq!(project.id, "AANobbMI");
    }

    #[tokio::test]
    async fn test_negative_cache_short_circuits() {
        let (_, mr, platforms) = platforms();

        assert!(platforms.canonical_id("missing").await.unwrap_err().is_not_found());
        assert!(platforms.canonical_id("missing").await.unwrap_err().is_not_found());
        assert_eq!(mr.calls("canonical_id"), 1);
    }

    #[tokio::test]
    async fn test_unavailable_is_not_cached() {
        let (_, mr, platforms) = platforms();
        mr.set_unavailable(true);

        assert!(platforms.canonical_id("sodium").await.unwrap_err().is_unavailable());
        assert!(platforms.canonical_id("sodium").await.unwrap_err().is_unavailable());
        assert_eq!(mr.calls("canonical_id"), 2);
    }
}
