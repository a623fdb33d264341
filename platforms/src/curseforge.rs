//! Client for the CurseForge API (`https://api.curseforge.com/v1`).
//!
//! CurseForge identifies projects ("mods") by numeric id and requires a static
//! API key in the `x-api-key` header.

use crate::config::CurseForgeConfig;
use crate::errors::PlatformError;
use crate::markup::sanitize_changelog;
use crate::request::{RetryPolicy, check_status, decode, endpoint, send_with_retry};
use crate::types::{
    Platform, ProjectMetadata, ProjectSummary, ReleaseType, VersionMetadata, class_label,
    class_url_segment,
};
use crate::{PlatformAdapter, SEARCH_PAGE_SIZE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

const PLATFORM: Platform = Platform::CurseForge;
const API_KEY_HEADER: &str = "x-api-key";
const MINECRAFT_GAME_ID: &str = "432";
const SITE_URL: &str = "https://www.curseforge.com/minecraft";

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Mod {
    id: i64,
    name: String,
    slug: String,
    game_id: Option<i64>,
    class_id: Option<i64>,
    date_released: DateTime<Utc>,
    logo: Option<Logo>,
    links: Option<Links>,
    #[serde(default)]
    latest_files: Vec<File>,
    #[serde(default)]
    download_count: f64,
}

#[derive(Deserialize)]
struct Logo {
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Links {
    website_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct File {
    id: i64,
    display_name: String,
    file_name: String,
    release_type: i64,
    file_date: DateTime<Utc>,
}

impl Mod {
    fn website_url(&self) -> String {
        if let Some(url) = self.links.as_ref().and_then(|l| l.website_url.as_deref())
            && !url.is_empty()
        {
            return url.trim_end_matches('/').to_string();
        }

        match class_url_segment(self.class_id) {
            Some(segment) => format!("{SITE_URL}/{segment}/{}", self.slug),
            None => format!("https://www.curseforge.com/projects/{}", self.id),
        }
    }

    /// The newest file by publish date. Later entries win ties.
    fn latest_file(&self) -> Option<&File> {
        self.latest_files.iter().max_by_key(|f| f.file_date)
    }

    fn into_metadata(self) -> ProjectMetadata {
        ProjectMetadata {
            id: self.id.to_string(),
            platform: PLATFORM,
            version_ids: self.latest_files.iter().map(|f| f.id.to_string()).collect(),
            slug: self.slug,
            name: self.name,
            date_updated: self.date_released,
            game_id: self.game_id,
            icon_url: self.logo.map(|l| l.url),
        }
    }

    fn into_summary(self) -> ProjectSummary {
        ProjectSummary {
            id: self.id.to_string(),
            platform: PLATFORM,
            category: class_label(self.class_id).to_string(),
            downloads: self.download_count.max(0.0) as u64,
            url: self.website_url(),
            slug: self.slug,
            name: self.name,
        }
    }
}

pub struct CurseForge {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    retry: RetryPolicy,
}

impl CurseForge {
    pub fn new(config: &CurseForgeConfig) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(config.client.timeout())
            .build()
            .map_err(|source| PlatformError::Request {
                platform: PLATFORM,
                source,
            })?;

        Ok(CurseForge {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            retry: RetryPolicy {
                max_attempts: config.client.max_attempts,
                base_delay: config.client.retry_base_delay(),
            },
        })
    }

    async fn get_mod(&self, mod_id: &str) -> Result<Mod, PlatformError> {
        let url = endpoint(&self.base_url, &["v1", "mods", mod_id])?;
        let response = send_with_retry(PLATFORM, "get_mod", &self.retry, || {
            self.client
                .get(url.clone())
                .header(API_KEY_HEADER, &self.api_key)
        })
        .await?;
        let response = check_status(PLATFORM, mod_id, response)?;
        Ok(decode::<Envelope<Mod>>(PLATFORM, &response)?.data)
    }

    async fn get_file_changelog(&self, mod_id: &str, file_id: &str) -> Result<String, PlatformError> {
        let url = endpoint(
            &self.base_url,
            &["v1", "mods", mod_id, "files", file_id, "changelog"],
        )?;
        let response = send_with_retry(PLATFORM, "get_mod_file_changelog", &self.retry, || {
            self.client
                .get(url.clone())
                .header(API_KEY_HEADER, &self.api_key)
        })
        .await?;
        let response = check_status(PLATFORM, file_id, response)?;
        Ok(decode::<Envelope<String>>(PLATFORM, &response)?.data)
    }
}

fn ensure_numeric(identifier: &str) -> Result<(), PlatformError> {
    if identifier.is_empty() || !identifier.chars().all(|c| c.is_ascii_digit()) {
        return Err(PlatformError::not_found(PLATFORM, identifier));
    }
    Ok(())
}

#[async_trait]
impl PlatformAdapter for CurseForge {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    /// CurseForge has no slugs in its public lookup API, so numeric ids are already canonical.
    async fn canonical_id(&self, identifier: &str) -> Result<String, PlatformError> {
        ensure_numeric(identifier)?;
        Ok(identifier.to_string())
    }

    async fn fetch_project(&self, project_id: &str) -> Result<ProjectMetadata, PlatformError> {
        ensure_numeric(project_id)?;
        Ok(self.get_mod(project_id).await?.into_metadata())
    }

    async fn fetch_latest_version(
        &self,
        project_id: &str,
    ) -> Result<VersionMetadata, PlatformError> {
        ensure_numeric(project_id)?;
        let project = self.get_mod(project_id).await?;
        let file = project
            .latest_file()
            .ok_or_else(|| PlatformError::not_found(PLATFORM, project_id))?;
        let file_id = file.id.to_string();

        let changelog = match self.get_file_changelog(project_id, &file_id).await {
            Ok(changelog) => sanitize_changelog(&changelog),
            Err(err) if err.is_not_found() => {
                tracing::debug!(project_id, %file_id, "No changelog published for file");
                String::new()
            }
            Err(err) => return Err(err),
        };

        Ok(VersionMetadata {
            url: format!("{}/files/{file_id}", project.website_url()),
            id: file_id,
            project_id: project.id.to_string(),
            platform: PLATFORM,
            project_name: project.name.clone(),
            project_updated: project.date_released,
            name: file.display_name.clone(),
            number: file.file_name.clone(),
            release_type: ReleaseType::from_code(file.release_type),
            published_at: file.file_date,
            changelog,
            icon_url: project.logo.as_ref().map(|l| l.url.clone()),
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<ProjectSummary>, PlatformError> {
        let url = endpoint(&self.base_url, &["v1", "mods", "search"])?;
        let page_size = SEARCH_PAGE_SIZE.to_string();
        let response = send_with_retry(PLATFORM, "search_mods", &self.retry, || {
            self.client
                .get(url.clone())
                .header(API_KEY_HEADER, &self.api_key)
                .query(&[
                    ("gameId", MINECRAFT_GAME_ID),
                    ("searchFilter", query),
                    ("pageSize", page_size.as_str()),
                ])
        })
        .await?;
        let response = check_status(PLATFORM, query, response)?;
        let mods = decode::<Envelope<Vec<Mod>>>(PLATFORM, &response)?.data;

        Ok(mods
            .into_iter()
            .take(SEARCH_PAGE_SIZE)
            .map(Mod::into_summary)
            .collect())
    }
}
