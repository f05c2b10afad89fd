// Webhook transport: signature check, event parsing and dispatch.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::AppState;
use crate::delivery::{ChatKind, ChatRef};
use crate::metrics;
use crate::workflow::InboundMessage;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// base64(HMAC-SHA256(secret, body)), the value the platform puts in the
/// signature header.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length; the error arm is unreachable.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Constant-time check of a signature header against the raw body.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

// ── Event envelope ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub reply_token: Option<String>,
    pub source: Option<EventSource>,
    pub message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum EventSource {
    User {
        user_id: String,
    },
    Group {
        group_id: String,
        user_id: Option<String>,
    },
    Room {
        room_id: String,
        user_id: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl EventSource {
    /// The chat and the sending user, when the platform disclosed the user.
    fn chat_and_user(&self) -> Option<(ChatRef, &str)> {
        match self {
            EventSource::User { user_id } => {
                Some((ChatRef::new(ChatKind::User, user_id), user_id.as_str()))
            }
            EventSource::Group { group_id, user_id } => {
                Some((ChatRef::new(ChatKind::Group, group_id), user_id.as_deref()?))
            }
            EventSource::Room { room_id, user_id } => {
                Some((ChatRef::new(ChatKind::Room, room_id), user_id.as_deref()?))
            }
            EventSource::Other => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventMessage {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// A text message ready for the workflow, plus where to send the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub reply_token: String,
    pub message: InboundMessage,
}

/// Keep text-message events that carry a reply token and a user id.
pub fn extract_messages(body: &WebhookBody) -> Vec<Delivery> {
    body.events
        .iter()
        .filter(|event| event.kind == "message")
        .filter_map(|event| {
            let Some(EventMessage::Text { text }) = &event.message else {
                return None;
            };
            let reply_token = event.reply_token.clone()?;
            let (chat, user_id) = event.source.as_ref()?.chat_and_user()?;
            Some(Delivery {
                reply_token,
                message: InboundMessage {
                    chat,
                    participant: user_id.to_string(),
                    text: text.clone(),
                },
            })
        })
        .collect()
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(secret) = state.channel_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(secret, &body, signature) {
            metrics::WEBHOOK_EVENTS_TOTAL
                .with_label_values(&["bad_signature"])
                .inc();
            tracing::warn!("Rejected webhook call with invalid signature");
            return (StatusCode::BAD_REQUEST, "Invalid signature").into_response();
        }
    }

    let parsed: WebhookBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Malformed webhook body: {e}");
            return (StatusCode::BAD_REQUEST, "Malformed body").into_response();
        }
    };

    let deliveries = extract_messages(&parsed);
    let ignored = parsed.events.len() - deliveries.len();
    metrics::WEBHOOK_EVENTS_TOTAL
        .with_label_values(&["ignored"])
        .inc_by(ignored as u64);
    metrics::WEBHOOK_EVENTS_TOTAL
        .with_label_values(&["text"])
        .inc_by(deliveries.len() as u64);

    // One task per chat: a chat's events are handled in delivery order,
    // different chats run in parallel.
    for chat_deliveries in group_by_chat(deliveries) {
        let state = state.clone();
        tokio::spawn(async move {
            for delivery in chat_deliveries {
                dispatch(&state, delivery).await;
            }
        });
    }

    (StatusCode::OK, "OK").into_response()
}

/// Split deliveries per chat, keeping delivery order within each chat and
/// first-seen order across chats.
fn group_by_chat(deliveries: Vec<Delivery>) -> Vec<Vec<Delivery>> {
    let mut groups: Vec<Vec<Delivery>> = Vec::new();
    for delivery in deliveries {
        match groups
            .iter_mut()
            .find(|g| g[0].message.chat == delivery.message.chat)
        {
            Some(group) => group.push(delivery),
            None => groups.push(vec![delivery]),
        }
    }
    groups
}

/// Run the workflow for one message and send its reply.
pub async fn dispatch(state: &AppState, delivery: Delivery) {
    let reply = state.workflow.handle(&delivery.message).await;
    if let Err(e) = state.messenger.reply(&delivery.reply_token, &reply).await {
        metrics::DELIVERY_FAILURES_TOTAL
            .with_label_values(&["reply"])
            .inc();
        tracing::error!(
            "Reply to {} in {} failed: {e}",
            delivery.message.participant,
            delivery.message.chat.id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "channel-secret";

    #[test]
    fn test_sign_and_verify() {
        let body = br#"{"events":[]}"#;
        let signature = sign(SECRET, body);
        assert!(verify_signature(SECRET, body, &signature));
        assert!(!verify_signature("other-secret", body, &signature));
        assert!(!verify_signature(SECRET, br#"{"events":[1]}"#, &signature));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        assert!(!verify_signature(SECRET, b"{}", ""));
        assert!(!verify_signature(SECRET, b"{}", "not base64!!"));
    }

    #[test]
    fn test_extract_group_text_message() {
        let body: WebhookBody = serde_json::from_str(
            r#"{
                "destination": "Uxxx",
                "events": [{
                    "type": "message",
                    "replyToken": "r1",
                    "timestamp": 1700000000000,
                    "source": { "type": "group", "groupId": "C1", "userId": "U1" },
                    "message": { "type": "text", "id": "m1", "text": "渋谷" }
                }]
            }"#,
        )
        .unwrap();
        let deliveries = extract_messages(&body);
        assert_eq!(
            deliveries,
            vec![Delivery {
                reply_token: "r1".into(),
                message: InboundMessage {
                    chat: ChatRef::new(ChatKind::Group, "C1"),
                    participant: "U1".into(),
                    text: "渋谷".into(),
                },
            }]
        );
    }

    #[test]
    fn test_extract_skips_non_text_and_anonymous() {
        let body: WebhookBody = serde_json::from_str(
            r#"{
                "events": [
                    { "type": "follow", "replyToken": "r0",
                      "source": { "type": "user", "userId": "U0" } },
                    { "type": "message", "replyToken": "r1",
                      "source": { "type": "user", "userId": "U1" },
                      "message": { "type": "sticker", "id": "m1", "packageId": "1", "stickerId": "2" } },
                    { "type": "message", "replyToken": "r2",
                      "source": { "type": "room", "roomId": "R1" },
                      "message": { "type": "text", "id": "m2", "text": "東京" } },
                    { "type": "message", "replyToken": "r3",
                      "source": { "type": "user", "userId": "U3" },
                      "message": { "type": "text", "id": "m3", "text": "上野" } }
                ]
            }"#,
        )
        .unwrap();
        let deliveries = extract_messages(&body);
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].reply_token, "r3");
        assert_eq!(deliveries[0].message.chat, ChatRef::new(ChatKind::User, "U3"));
    }

    #[test]
    fn test_group_by_chat_keeps_order() {
        let delivery = |token: &str, chat: &str, text: &str| Delivery {
            reply_token: token.into(),
            message: InboundMessage {
                chat: ChatRef::new(ChatKind::Group, chat),
                participant: "U1".into(),
                text: text.into(),
            },
        };
        let groups = group_by_chat(vec![
            delivery("r1", "C1", "渋谷"),
            delivery("r2", "C2", "上野"),
            delivery("r3", "C1", "東京"),
        ]);
        let tokens: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| g.iter().map(|d| d.reply_token.as_str()).collect())
            .collect();
        assert_eq!(tokens, vec![vec!["r1", "r3"], vec!["r2"]]);
    }

    #[test]
    fn test_empty_verification_body() {
        let body: WebhookBody = serde_json::from_str(r#"{"destination":"U","events":[]}"#).unwrap();
        assert!(extract_messages(&body).is_empty());
    }
}
