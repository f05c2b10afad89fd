// LINE Messaging API client: reply messages and member profile lookup.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ChatKind, ChatRef, Messenger, ProfileDirectory, Reply};
use crate::error::DeliveryError;

pub const LINE_API_BASE: &str = "https://api.line.me";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct LineClient {
    client: reqwest::Client,
    access_token: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    display_name: String,
}

/// Message objects for a reply. Image replies send the text first.
fn reply_messages(reply: &Reply) -> Vec<Value> {
    match reply {
        Reply::Text(text) => vec![json!({ "type": "text", "text": text })],
        Reply::TextWithImage { text, image_url } => vec![
            json!({ "type": "text", "text": text }),
            json!({
                "type": "image",
                "originalContentUrl": image_url,
                "previewImageUrl": image_url,
            }),
        ],
    }
}

/// Profile endpoint for a user as seen from the given chat.
fn profile_path(chat: &ChatRef, user_id: &str) -> String {
    match chat.kind {
        ChatKind::User => format!("v2/bot/profile/{user_id}"),
        ChatKind::Group => format!("v2/bot/group/{}/member/{user_id}", chat.id),
        ChatKind::Room => format!("v2/bot/room/{}/member/{user_id}", chat.id),
    }
}

impl LineClient {
    pub fn new(access_token: String) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            access_token,
            api_base: LINE_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    async fn fetch_profile(&self, chat: &ChatRef, user_id: &str) -> Result<Profile, DeliveryError> {
        let response = self
            .client
            .get(self.endpoint(&profile_path(chat, user_id)))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Messenger for LineClient {
    async fn reply(&self, reply_token: &str, reply: &Reply) -> Result<(), DeliveryError> {
        let payload = json!({
            "replyToken": reply_token,
            "messages": reply_messages(reply),
        });
        let response = self
            .client
            .post(self.endpoint("v2/bot/message/reply"))
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_string());
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileDirectory for LineClient {
    async fn display_name(&self, chat: &ChatRef, user_id: &str) -> Option<String> {
        match self.fetch_profile(chat, user_id).await {
            Ok(profile) => Some(profile.display_name),
            Err(e) => {
                tracing::debug!("Profile lookup for {user_id} in {} failed: {e}", chat.id);
                None
            }
        }
    }
}
