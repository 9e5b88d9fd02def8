use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum C2SCommand {
    /// First-frame credential; ignored once the connection identity is fixed.
    Authenticate(AuthenticateFrame),
    Subscribe(SubscribeFrame),
    ChatMessageSend(ChatMessageSend),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthenticateFrame {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscribeFrame {
    pub room_id: RoomId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessageSend {
    pub room_id: RoomId,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct S2CEnvelope {
    pub room_id: RoomId,
    pub receivers: Vec<MemberId>,
    pub body: S2CEvent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum S2CEvent {
    Authenticated(Authenticated),
    SubscribeAck(SubscribeAck),
    ChatMessageAck(ChatMessageAck),
    ChatMessageNew(ChatMessageNew),
    Error(ErrorEvent),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Authenticated {
    pub member_id: MemberId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscribeAck {
    pub room_id: RoomId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessageAck {
    pub room_id: RoomId,
    pub message_id: MessageId,
    pub inserted_at: DateTime<Utc>,
}

/// Push payload for a newly appended message, enriched with sender display
/// fields so subscribers can render it without a member lookup.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessageNew {
    pub room_id: RoomId,
    pub message_id: MessageId,
    pub sender_id: MemberId,
    pub sender_nickname: String,
    pub sender_avatar_url: String,
    pub content: String,
    pub inserted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub code: String,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_owned(),
            message: message.into(),
        }
    }
}
