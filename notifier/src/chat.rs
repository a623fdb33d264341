//! The chat platform that notifications are delivered through.
//!
//! Only the capabilities the fan-out needs are modelled here. A real client keeps its own
//! cache of destinations and answers lookups from it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    Text,
    /// Forum-like container where every post opens a thread.
    Forum,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Destination {
    pub id: String,
    pub name: String,
    pub kind: DestinationKind,
}

/// What the bot's own member may do in a destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Permissions {
    pub view: bool,
    pub send: bool,
    pub embed: bool,
}

impl Permissions {
    pub const ALL: Permissions = Permissions {
        view: true,
        send: true,
        embed: true,
    };

    pub fn can_notify(&self) -> bool {
        self.view && self.send && self.embed
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    pub icon_url: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    pub icon_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub color: u32,
    pub author: Option<EmbedAuthor>,
    pub fields: Vec<EmbedField>,
    pub thumbnail: Option<String>,
    pub footer: Option<EmbedFooter>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Message {
    /// Plain text above the embed. Carries role mentions.
    pub content: Option<String>,
    pub embed: Embed,
    pub buttons: Vec<LinkButton>,
}

#[derive(thiserror::Error, Debug)]
pub enum ChatError {
    #[error("destination {0} is gone")]
    DestinationGone(String),

    #[error("delivery rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn destination(&self, destination_id: &str) -> Option<Destination>;

    async fn permissions(&self, destination: &Destination) -> Permissions;

    async fn send(&self, destination: &Destination, message: &Message) -> Result<(), ChatError>;

    /// Opens a new thread named `name` in a forum destination with `message` as its first post.
    async fn start_thread(
        &self,
        destination: &Destination,
        name: &str,
        message: &Message,
    ) -> Result<(), ChatError>;
}

/// Writes every notification to the log instead of a chat service. Every destination exists,
/// is a plain text channel and is fully permitted.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingChat;

#[async_trait]
impl ChatPlatform for LoggingChat {
    async fn destination(&self, destination_id: &str) -> Option<Destination> {
        Some(Destination {
            id: destination_id.to_string(),
            name: destination_id.to_string(),
            kind: DestinationKind::Text,
        })
    }

    async fn permissions(&self, _destination: &Destination) -> Permissions {
        Permissions::ALL
    }

    async fn send(&self, destination: &Destination, message: &Message) -> Result<(), ChatError> {
        let body = serde_json::to_string(message).map_err(|e| ChatError::Rejected(e.to_string()))?;
        tracing::info!(destination_id = %destination.id, message = %body, "Notification");
        Ok(())
    }

    async fn start_thread(
        &self,
        destination: &Destination,
        name: &str,
        message: &Message,
    ) -> Result<(), ChatError> {
        tracing::info!(destination_id = %destination.id, thread = name, "Opening thread");
        self.send(destination, message).await
    }
}
