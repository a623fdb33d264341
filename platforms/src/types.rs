use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream platforms a project can be hosted on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    CurseForge,
    Modrinth,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::CurseForge, Platform::Modrinth];

    /// CurseForge ids are purely numeric. Modrinth ids and slugs always contain a letter.
    pub fn for_identifier(identifier: &str) -> Platform {
        if identifier.chars().any(|c| c.is_ascii_alphabetic()) {
            Platform::Modrinth
        } else {
            Platform::CurseForge
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Platform::CurseForge => "CurseForge",
            Platform::Modrinth => "Modrinth",
        }
    }

    pub const fn site(&self) -> &'static str {
        match self {
            Platform::CurseForge => "curseforge.com",
            Platform::Modrinth => "modrinth.com",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "curseforge" => Ok(Platform::CurseForge),
            "modrinth" => Ok(Platform::Modrinth),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    Release,
    Beta,
    Alpha,
    Unknown,
}

impl ReleaseType {
    /// CurseForge encodes release types as integers.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ReleaseType::Release,
            2 => ReleaseType::Beta,
            3 => ReleaseType::Alpha,
            _ => ReleaseType::Unknown,
        }
    }

    /// Modrinth encodes release types as lowercase names.
    pub fn from_label(label: &str) -> Self {
        match label {
            "release" => ReleaseType::Release,
            "beta" => ReleaseType::Beta,
            "alpha" => ReleaseType::Alpha,
            _ => ReleaseType::Unknown,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            ReleaseType::Release => "Release",
            ReleaseType::Beta => "Beta",
            ReleaseType::Alpha => "Alpha",
            ReleaseType::Unknown => "Unknown",
        }
    }
}

/// Human label for a CurseForge class id.
pub fn class_label(class_id: Option<i64>) -> &'static str {
    match class_id {
        Some(5) => "Bukkit Plugin",
        Some(6) => "Mod",
        Some(12) => "Resource Pack",
        Some(17) => "World",
        Some(4471) => "Modpack",
        Some(4546) => "Customization",
        Some(4559) => "Addon",
        _ => "Unknown",
    }
}

/// Path segment used by curseforge.com for a class id.
pub fn class_url_segment(class_id: Option<i64>) -> Option<&'static str> {
    match class_id {
        Some(5) => Some("bukkit-plugins"),
        Some(6) => Some("mc-mods"),
        Some(12) => Some("texture-packs"),
        Some(17) => Some("worlds"),
        Some(4471) => Some("modpacks"),
        Some(4546) => Some("customization"),
        Some(4559) => Some("mc-addons"),
        _ => None,
    }
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Full upstream description of a project, as needed to start caching it.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectMetadata {
    pub id: String,
    pub platform: Platform,
    pub slug: String,
    pub name: String,
    pub date_updated: DateTime<Utc>,
    /// Every version/file id upstream currently reports for the project.
    pub version_ids: Vec<String>,
    pub game_id: Option<i64>,
    pub icon_url: Option<String>,
}

/// The single most recent version of a project.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionMetadata {
    pub id: String,
    pub project_id: String,
    pub platform: Platform,
    pub project_name: String,
    pub project_updated: DateTime<Utc>,
    pub name: String,
    pub number: String,
    pub release_type: ReleaseType,
    pub published_at: DateTime<Utc>,
    /// Raw changelog as returned upstream. May contain HTML markup.
    pub changelog: String,
    pub url: String,
    pub icon_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub id: String,
    pub platform: Platform,
    pub slug: String,
    pub name: String,
    pub category: String,
    pub downloads: u64,
    pub url: String,
}
