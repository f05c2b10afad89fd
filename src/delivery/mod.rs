// Delivery adapters: image hosting, chat replies and profile lookup.
//
// The workflow only sees the traits below; concrete implementations talk to
// ImgBB and the LINE Messaging API, or just log in local mode.

pub mod imgbb;
pub mod line;
pub mod retry;

use async_trait::async_trait;

use crate::error::DeliveryError;

/// What kind of conversation an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatKind {
    User,
    Group,
    Room,
}

/// Address of a conversation. `id` is the user id for one-to-one chats.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatRef {
    pub kind: ChatKind,
    pub id: String,
}

impl ChatRef {
    pub fn new(kind: ChatKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// An outbound answer to the originating chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    TextWithImage { text: String, image_url: String },
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Text(text) | Reply::TextWithImage { text, .. } => text,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            Reply::Text(_) => None,
            Reply::TextWithImage { image_url, .. } => Some(image_url),
        }
    }
}

/// Blob store for rendered maps; returns a public URL.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, jpeg: Vec<u8>, name: &str) -> Result<String, DeliveryError>;
}

/// Sends replies back into a chat.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn reply(&self, reply_token: &str, reply: &Reply) -> Result<(), DeliveryError>;
}

/// Resolves user ids to display names for reply texts.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn display_name(&self, chat: &ChatRef, user_id: &str) -> Option<String>;
}

/// Local-mode stand-in: logs replies and knows no names.
#[derive(Debug, Default, Clone)]
pub struct ConsoleMessenger;

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn reply(&self, reply_token: &str, reply: &Reply) -> Result<(), DeliveryError> {
        match reply.image_url() {
            Some(url) => tracing::info!("[reply {reply_token}] {} <image {url}>", reply.text()),
            None => tracing::info!("[reply {reply_token}] {}", reply.text()),
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileDirectory for ConsoleMessenger {
    async fn display_name(&self, _chat: &ChatRef, _user_id: &str) -> Option<String> {
        None
    }
}
