//! Client for the Modrinth API (`https://api.modrinth.com/v2`).
//!
//! Modrinth accepts either a project's base62 id or its slug wherever a project is expected,
//! and asks API users to identify themselves with a descriptive `user-agent`.

use crate::config::ModrinthConfig;
use crate::errors::PlatformError;
use crate::request::{RetryPolicy, check_status, decode, endpoint, send_with_retry};
use crate::types::{
    Platform, ProjectMetadata, ProjectSummary, ReleaseType, VersionMetadata, capitalize,
};
use crate::{PlatformAdapter, SEARCH_PAGE_SIZE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use url::Url;

const PLATFORM: Platform = Platform::Modrinth;
const SITE_URL: &str = "https://modrinth.com";

#[derive(Deserialize)]
struct Check {
    id: String,
}

#[derive(Deserialize)]
struct Project {
    id: String,
    slug: String,
    title: String,
    updated: DateTime<Utc>,
    #[serde(default)]
    versions: Vec<String>,
    icon_url: Option<String>,
    project_type: String,
}

#[derive(Deserialize)]
struct Version {
    id: String,
    name: String,
    version_number: String,
    version_type: String,
    date_published: DateTime<Utc>,
    changelog: Option<String>,
}

#[derive(Deserialize)]
struct SearchResults {
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    project_id: String,
    slug: String,
    title: String,
    project_type: String,
    #[serde(default)]
    downloads: u64,
}

pub struct Modrinth {
    client: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl Modrinth {
    pub fn new(config: &ModrinthConfig) -> Result<Self, PlatformError> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static(crate::config::DEFAULT_USER_AGENT));
        headers.insert(USER_AGENT, user_agent);

        let client = reqwest::Client::builder()
            .timeout(config.client.timeout())
            .default_headers(headers)
            .build()
            .map_err(|source| PlatformError::Request {
                platform: PLATFORM,
                source,
            })?;

        Ok(Modrinth {
            client,
            base_url: config.base_url.clone(),
            retry: RetryPolicy {
                max_attempts: config.client.max_attempts,
                base_delay: config.client.retry_base_delay(),
            },
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        operation: &'static str,
        identifier: &str,
        segments: &[&str],
    ) -> Result<T, PlatformError> {
        let url = endpoint(&self.base_url, segments)?;
        let response =
            send_with_retry(PLATFORM, operation, &self.retry, || self.client.get(url.clone()))
                .await?;
        let response = check_status(PLATFORM, identifier, response)?;
        decode(PLATFORM, &response)
    }

    async fn get_project(&self, id: &str) -> Result<Project, PlatformError> {
        self.get("get_project", id, &["v2", "project", id]).await
    }
}

fn version_url(project_type: &str, slug: &str, version_id: &str) -> String {
    format!("{SITE_URL}/{project_type}/{slug}/version/{version_id}")
}

#[async_trait]
impl PlatformAdapter for Modrinth {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    async fn canonical_id(&self, identifier: &str) -> Result<String, PlatformError> {
        let check: Check = self
            .get("check_project", identifier, &["v2", "project", identifier, "check"])
            .await?;
        Ok(check.id)
    }

    async fn fetch_project(&self, project_id: &str) -> Result<ProjectMetadata, PlatformError> {
        let project = self.get_project(project_id).await?;
        Ok(ProjectMetadata {
            id: project.id,
            platform: PLATFORM,
            slug: project.slug,
            name: project.title,
            date_updated: project.updated,
            version_ids: project.versions,
            game_id: None,
            icon_url: project.icon_url,
        })
    }

    async fn fetch_latest_version(
        &self,
        project_id: &str,
    ) -> Result<VersionMetadata, PlatformError> {
        let project = self.get_project(project_id).await?;
        let versions: Vec<Version> = self
            .get(
                "list_versions",
                project_id,
                &["v2", "project", project_id, "version"],
            )
            .await?;

        // Versions are listed newest first.
        let version = versions
            .into_iter()
            .next()
            .ok_or_else(|| PlatformError::not_found(PLATFORM, project_id))?;

        Ok(VersionMetadata {
            url: version_url(&project.project_type, &project.slug, &version.id),
            id: version.id,
            project_id: project.id,
            platform: PLATFORM,
            project_name: project.title,
            project_updated: project.updated,
            name: version.name,
            number: version.version_number,
            release_type: ReleaseType::from_label(&version.version_type),
            published_at: version.date_published,
            changelog: version.changelog.unwrap_or_default(),
            icon_url: project.icon_url,
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<ProjectSummary>, PlatformError> {
        let url = endpoint(&self.base_url, &["v2", "search"])?;
        let limit = SEARCH_PAGE_SIZE.to_string();
        let response = send_with_retry(PLATFORM, "search_projects", &self.retry, || {
            self.client
                .get(url.clone())
                .query(&[("query", query), ("limit", limit.as_str())])
        })
        .await?;
        let response = check_status(PLATFORM, query, response)?;
        let results: SearchResults = decode(PLATFORM, &response)?;

        Ok(results
            .hits
            .into_iter()
            .take(SEARCH_PAGE_SIZE)
            .map(|hit| ProjectSummary {
                url: format!("{SITE_URL}/{}/{}", hit.project_type, hit.slug),
                category: capitalize(&hit.project_type),
                id: hit.project_id,
                platform: PLATFORM,
                slug: hit.slug,
                name: hit.title,
                downloads: hit.downloads,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> Modrinth {
        Modrinth::new(&ModrinthConfig {
            base_url: Url::parse(&server.uri()).unwrap(),
            user_agent: "modrunner-tests".into(),
            client: ClientConfig {
                timeout_secs: 2,
                max_attempts: 3,
                retry_base_delay_ms: 1,
            },
        })
        .unwrap()
    }

    fn project_body() -> serde_json::Value {
        serde_json::json!({
            "id": "AANobbMI",
            "slug": "sodium",
            "title": "Sodium",
            "updated": "2024-03-01T10:00:00Z",
            "project_type": "mod",
            "icon_url": "https://cdn.modrinth.com/data/AANobbMI/icon.png",
            "versions": ["v1", "v2", "v3"]
        })
    }

    #[tokio::test]
    async fn test_canonical_id_from_slug() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/project/sodium/check"))
            .and(header("user-agent", "modrunner-tests"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "AANobbMI"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server).canonical_id("sodium").await.unwrap();
        assert_eq!(id, "AANobbMI");
    }

    #[tokio::test]
    async fn test_unknown_slug_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/project/nope/check"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).canonical_id("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_project() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/project/AANobbMI"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_body()))
            .mount(&server)
            .await;

        let project = client(&server).fetch_project("AANobbMI").await.unwrap();
        assert_eq!(project.name, "Sodium");
        assert_eq!(project.slug, "sodium");
        assert_eq!(project.version_ids, vec!["v1", "v2", "v3"]);
        assert_eq!(project.game_id, None);
    }

    #[tokio::test]
    async fn test_fetch_latest_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/project/AANobbMI"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/project/AANobbMI/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": "v3",
                    "name": "Sodium 0.5.8",
                    "version_number": "mc1.20.4-0.5.8",
                    "version_type": "beta",
                    "date_published": "2024-03-01T09:00:00Z",
                    "changelog": "- Fixed a crash"
                },
                {
                    "id": "v2",
                    "name": "Sodium 0.5.7",
                    "version_number": "mc1.20.4-0.5.7",
                    "version_type": "release",
                    "date_published": "2024-02-01T09:00:00Z",
                    "changelog": null
                }
            ])))
            .mount(&server)
            .await;

        let version = client(&server)
            .fetch_latest_version("AANobbMI")
            .await
            .unwrap();
        assert_eq!(version.id, "v3");
        assert_eq!(version.number, "mc1.20.4-0.5.8");
        assert_eq!(version.release_type, ReleaseType::Beta);
        assert_eq!(version.changelog, "- Fixed a crash");
        assert_eq!(version.url, "https://modrinth.com/mod/sodium/version/v3");
    }

    #[tokio::test]
    async fn test_no_versions_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/project/AANobbMI"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/project/AANobbMI/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_latest_version("AANobbMI")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/project/AANobbMI"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).fetch_project("AANobbMI").await.unwrap_err();
        assert!(matches!(err, PlatformError::Upstream { .. }));
    }

    #[tokio::test]
    async fn test_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/search"))
            .and(query_param("query", "sodium"))
            .and(query_param("limit", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hits": [
                    {"project_id": "AANobbMI", "slug": "sodium", "title": "Sodium", "project_type": "mod", "downloads": 1000},
                    {"project_id": "1IjD5062", "slug": "continuity", "title": "Continuity", "project_type": "resourcepack"}
                ]
            })))
            .mount(&server)
            .await;

        let results = client(&server).search("sodium").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].category, "Mod");
        assert_eq!(results[0].url, "https://modrinth.com/mod/sodium");
        assert_eq!(results[1].downloads, 0);
        assert_eq!(results[1].category, "Resourcepack");
    }
}
