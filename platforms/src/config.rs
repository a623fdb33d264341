use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const CURSEFORGE_API_URL: &str = "https://api.curseforge.com";
pub const MODRINTH_API_URL: &str = "https://api.modrinth.com";
pub const DEFAULT_USER_AGENT: &str = concat!("Modrunner/", env!("CARGO_PKG_VERSION"), " (modrunner.net)");

/// HTTP behaviour shared by both platform clients.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempts per call, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CurseForgeConfig {
    #[serde(default = "default_curseforge_url")]
    pub base_url: Url,
    /// Sent as the `x-api-key` header on every request.
    pub api_key: String,
    #[serde(flatten)]
    pub client: ClientConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ModrinthConfig {
    #[serde(default = "default_modrinth_url")]
    pub base_url: Url,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(flatten)]
    pub client: ClientConfig,
}

impl Default for ModrinthConfig {
    fn default() -> Self {
        ModrinthConfig {
            base_url: default_modrinth_url(),
            user_agent: default_user_agent(),
            client: ClientConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PlatformsConfig {
    pub curseforge: CurseForgeConfig,
    #[serde(default)]
    pub modrinth: ModrinthConfig,
}

fn default_curseforge_url() -> Url {
    Url::parse(CURSEFORGE_API_URL).expect("constant URL is valid")
}

fn default_modrinth_url() -> Url {
    Url::parse(MODRINTH_API_URL).expect("constant URL is valid")
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
