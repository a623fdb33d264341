use crate::chat::{ChatError, ChatPlatform, Destination, DestinationKind, Message, Permissions};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

pub fn text_channel(id: &str) -> Destination {
    Destination {
        id: id.to_string(),
        name: id.to_string(),
        kind: DestinationKind::Text,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SentMessage {
    pub destination_id: String,
    /// Name of the thread opened for the message, for forum destinations.
    pub thread: Option<String>,
    pub message: Message,
}

#[derive(Default)]
struct State {
    destinations: HashMap<String, Destination>,
    permissions: HashMap<String, Permissions>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    sent: Vec<SentMessage>,
}

/// Chat platform fake that records every message it is asked to post.
#[derive(Default)]
pub struct RecordingChat {
    state: Mutex<State>,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_destination(&self, destination: Destination) {
        self.state
            .lock()
            .destinations
            .insert(destination.id.clone(), destination);
    }

    pub fn set_permissions(&self, destination_id: &str, permissions: Permissions) {
        self.state
            .lock()
            .permissions
            .insert(destination_id.to_string(), permissions);
    }

    pub fn fail_sends_to(&self, destination_id: &str) {
        self.state.lock().failing.insert(destination_id.to_string());
    }

    pub fn panic_on_send_to(&self, destination_id: &str) {
        self.state.lock().panicking.insert(destination_id.to_string());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    fn record(
        &self,
        destination: &Destination,
        thread: Option<&str>,
        message: &Message,
    ) -> Result<(), ChatError> {
        let mut state = self.state.lock();
        if state.panicking.contains(&destination.id) {
            drop(state);
            panic!("chat client crashed sending to {}", destination.id);
        }
        if state.failing.contains(&destination.id) {
            return Err(ChatError::Rejected(format!(
                "missing access to {}",
                destination.id
            )));
        }
        state.sent.push(SentMessage {
            destination_id: destination.id.clone(),
            thread: thread.map(str::to_string),
            message: message.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for RecordingChat {
    async fn destination(&self, destination_id: &str) -> Option<Destination> {
        self.state.lock().destinations.get(destination_id).cloned()
    }

    async fn permissions(&self, destination: &Destination) -> Permissions {
        self.state
            .lock()
            .permissions
            .get(&destination.id)
            .copied()
            .unwrap_or(Permissions::ALL)
    }

    async fn send(&self, destination: &Destination, message: &Message) -> Result<(), ChatError> {
        self.record(destination, None, message)
    }

    async fn start_thread(
        &self,
        destination: &Destination,
        name: &str,
        message: &Message,
    ) -> Result<(), ChatError> {
        self.record(destination, Some(name), message)
    }
}
