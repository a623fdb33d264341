//! Turns a detected update into a chat message in the tenant's notification style.

use crate::chat::{Embed, EmbedAuthor, EmbedField, EmbedFooter, LinkButton, Message};
use indexmap::IndexSet;
use platforms::markup::sanitize_changelog;
use platforms::{Platform, VersionMetadata};
use tracker::{NotificationStyle, Project, TenantPolicy};

const TRUNCATION_MARKER: &str = "...";
/// Longest thread name the chat platform accepts.
const MAX_THREAD_NAME_LENGTH: usize = 100;

struct Branding {
    color: u32,
    icon_url: &'static str,
}

fn branding(platform: Platform) -> Branding {
    match platform {
        Platform::CurseForge => Branding {
            color: 0xf87a1b,
            icon_url: "https://i.imgur.com/uA9lFcz.png",
        },
        Platform::Modrinth => Branding {
            color: 0x1bd96a,
            icon_url: "https://i.imgur.com/2XDguyk.png",
        },
    }
}

/// Sanitises a changelog and cuts it to at most `max_length` characters, marking the cut.
pub fn format_changelog(raw: &str, max_length: usize) -> String {
    let text = sanitize_changelog(raw);
    if text.chars().count() <= max_length {
        return text;
    }

    let keep = max_length.saturating_sub(TRUNCATION_MARKER.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

fn code_block(text: &str) -> String {
    format!("```\n{text}\n```")
}

/// Role mentions separated by spaces, or `None` when there are no roles.
pub fn mention_line(role_ids: &IndexSet<String>) -> Option<String> {
    if role_ids.is_empty() {
        return None;
    }
    let mentions: Vec<String> = role_ids.iter().map(|id| format!("<@&{id}>")).collect();
    Some(mentions.join(" "))
}

pub fn thread_name(version: &VersionMetadata) -> String {
    version.name.chars().take(MAX_THREAD_NAME_LENGTH).collect()
}

pub fn render(
    project: &Project,
    version: &VersionMetadata,
    policy: &TenantPolicy,
    role_ids: &IndexSet<String>,
) -> Message {
    let embed = match policy.notification_style {
        NotificationStyle::Normal => full_embed(project, version, policy, true),
        NotificationStyle::Alt => full_embed(project, version, policy, false),
        NotificationStyle::Compact => compact_embed(project, version),
        NotificationStyle::Ai => {
            tracing::debug!(
                tenant_id = %policy.tenant_id,
                "AI summaries are not available, using the normal style"
            );
            full_embed(project, version, policy, true)
        }
    };

    let buttons = match policy.notification_style {
        NotificationStyle::Compact => Vec::new(),
        _ => vec![LinkButton {
            label: format!("View on {}", project.platform),
            url: version.url.clone(),
        }],
    };

    Message {
        content: mention_line(role_ids),
        embed,
        buttons,
    }
}

fn full_embed(
    project: &Project,
    version: &VersionMetadata,
    policy: &TenantPolicy,
    verbatim: bool,
) -> Embed {
    let brand = branding(project.platform);
    let changelog = format_changelog(&version.changelog, policy.changelog_max_length as usize);
    let description = if verbatim {
        format!("**Changelog:** {}", code_block(&changelog))
    } else {
        changelog
    };

    Embed {
        title: format!("{} has been updated", project.name),
        url: None,
        description: Some(description),
        color: brand.color,
        author: Some(EmbedAuthor {
            name: format!("From {}", project.platform.site()),
            icon_url: brand.icon_url.to_string(),
            url: format!("https://{}", project.platform.site()),
        }),
        fields: vec![
            field("Version Name", &version.name),
            field("Version Number", &version.number),
            field("Release Type", version.release_type.label()),
            field(
                "Date Published",
                &format!("<t:{}:f>", version.published_at.timestamp()),
            ),
        ],
        thumbnail: version.icon_url.clone(),
        footer: None,
        timestamp: Some(version.published_at),
    }
}

fn compact_embed(project: &Project, version: &VersionMetadata) -> Embed {
    let brand = branding(project.platform);
    Embed {
        title: format!("{} {}", project.name, version.name),
        url: Some(version.url.clone()),
        description: Some(format!(
            "{} ({})",
            version.number,
            version.release_type.label()
        )),
        color: brand.color,
        footer: Some(EmbedFooter {
            text: version.published_at.format("%b %-d, %Y").to_string(),
            icon_url: brand.icon_url.to_string(),
        }),
        ..Embed::default()
    }
}

fn field(name: &str, value: &str) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value: value.to_string(),
        inline: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platforms::ReleaseType;
    use platforms::testutils::{project_metadata, timestamp, version_metadata};

    fn fixture(platform: Platform) -> (Project, VersionMetadata) {
        let metadata = project_metadata(platform, "238222", "JEI", &["1"]);
        let mut version = version_metadata(&metadata, "2");
        version.name = "jei-1.20.4-17.3.0.49".into();
        version.number = "17.3.0.49".into();
        version.release_type = ReleaseType::Beta;
        // 2024-03-05T10:00:00Z
        version.published_at = timestamp(1_709_632_800);
        version.changelog = "<p>Fixed a crash</p>".into();
        version.icon_url = Some("https://media.forgecdn.net/avatars/jei.png".into());
        (Project::from(metadata), version)
    }

    fn policy(style: NotificationStyle, changelog_max_length: u32) -> TenantPolicy {
        TenantPolicy {
            tenant_id: "guild-1".into(),
            max_tracked_projects: 100,
            notification_style: style,
            changelog_max_length,
        }
    }

    #[test]
    fn test_changelog_truncation() {
        let raw = format!("<b>{}</b>", "x".repeat(5000));
        let formatted = format_changelog(&raw, 100);
        assert_eq!(formatted.chars().count(), 100);
        assert!(formatted.starts_with("xxx"));
        assert!(formatted.ends_with("..."));
        assert_eq!(formatted.matches('x').count(), 97);
    }

    #[test]
    fn test_short_changelog_is_kept() {
        assert_eq!(format_changelog("Line 1<br>Line 2", 100), "Line 1\nLine 2");
        assert_eq!(format_changelog("abc", 3), "abc");
        assert_eq!(format_changelog("abcd", 3), "...");
    }

    #[test]
    fn test_normal_style() {
        let (project, version) = fixture(Platform::CurseForge);
        let message = render(
            &project,
            &version,
            &policy(NotificationStyle::Normal, 4000),
            &IndexSet::new(),
        );

        assert_eq!(message.content, None);
        let embed = &message.embed;
        assert_eq!(embed.title, "JEI has been updated");
        assert_eq!(
            embed.description.as_deref(),
            Some("**Changelog:** ```\nFixed a crash\n```")
        );
        assert_eq!(embed.color, 0xf87a1b);
        assert_eq!(embed.author.as_ref().unwrap().name, "From curseforge.com");
        let fields: Vec<(&str, &str)> = embed
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.value.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("Version Name", "jei-1.20.4-17.3.0.49"),
                ("Version Number", "17.3.0.49"),
                ("Release Type", "Beta"),
                ("Date Published", "<t:1709632800:f>"),
            ]
        );
        assert_eq!(
            embed.thumbnail.as_deref(),
            Some("https://media.forgecdn.net/avatars/jei.png")
        );
        assert_eq!(message.buttons.len(), 1);
        assert_eq!(message.buttons[0].label, "View on CurseForge");
        assert_eq!(message.buttons[0].url, version.url);
    }

    #[test]
    fn test_alt_style_uses_plain_changelog() {
        let (project, version) = fixture(Platform::Modrinth);
        let message = render(
            &project,
            &version,
            &policy(NotificationStyle::Alt, 4000),
            &IndexSet::new(),
        );
        assert_eq!(
            message.embed.description.as_deref(),
            Some("Fixed a crash")
        );
        assert_eq!(message.embed.color, 0x1bd96a);
        assert_eq!(message.embed.fields.len(), 4);
        assert_eq!(message.buttons[0].label, "View on Modrinth");
    }

    #[test]
    fn test_compact_style() {
        let (project, version) = fixture(Platform::Modrinth);
        let message = render(
            &project,
            &version,
            &policy(NotificationStyle::Compact, 4000),
            &IndexSet::new(),
        );
        let embed = &message.embed;
        assert_eq!(embed.title, "JEI jei-1.20.4-17.3.0.49");
        assert_eq!(embed.url.as_deref(), Some(version.url.as_str()));
        assert_eq!(embed.description.as_deref(), Some("17.3.0.49 (Beta)"));
        assert_eq!(embed.footer.as_ref().unwrap().text, "Mar 5, 2024");
        assert!(embed.thumbnail.is_none());
        assert!(embed.fields.is_empty());
        assert!(message.buttons.is_empty());
    }

    #[test]
    fn test_ai_style_falls_back_to_normal() {
        let (project, version) = fixture(Platform::CurseForge);
        let roles = IndexSet::new();
        let ai = render(&project, &version, &policy(NotificationStyle::Ai, 4000), &roles);
        let normal = render(&project, &version, &policy(NotificationStyle::Normal, 4000), &roles);
        assert_eq!(ai, normal);
    }

    #[test]
    fn test_mentions() {
        let roles: IndexSet<String> = ["111".to_string(), "222".to_string()].into_iter().collect();
        assert_eq!(mention_line(&roles).as_deref(), Some("<@&111> <@&222>"));
        assert_eq!(mention_line(&IndexSet::new()), None);
    }

    #[test]
    fn test_thread_name_is_capped() {
        let (_, mut version) = fixture(Platform::Modrinth);
        version.name = "v".repeat(150);
        assert_eq!(thread_name(&version).len(), 100);
    }
}
