use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::ChatError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
}

/// Body of `POST /api/chat` exactly as the backend sends it. Optional fields
/// that fail to decode are dropped instead of failing the whole payload.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChatResponseBody {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub response: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub quick_replies: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub metadata: Option<ResponseMetadata>,
    #[serde(default, deserialize_with = "lenient")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResponseMetadata {
    #[serde(default, deserialize_with = "lenient")]
    pub phones: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum PhoneId {
    Num(i64),
    Text(String),
}

impl fmt::Display for PhoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhoneId::Num(n) => write!(f, "{n}"),
            PhoneId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoneSummary {
    pub id: PhoneId,
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub brand: Option<String>,
    pub price: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub match_score: Option<f64>,
}

impl PhoneSummary {
    /// `"<brand> <name>"` when a non-empty brand is present.
    pub fn display_name(&self) -> String {
        match self.brand.as_deref().filter(|b| !b.is_empty()) {
            Some(brand) => format!("{brand} {}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    #[default]
    Plain,
    Recommendation,
    PhoneDetails,
}

impl ResponseKind {
    /// Unknown tags (the backend defaults to `"text"`) read as plain.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some("recommendation") => ResponseKind::Recommendation,
            Some("phone_details") => ResponseKind::PhoneDetails,
            _ => ResponseKind::Plain,
        }
    }
}

/// A successful chat reply, validated at the boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatReply {
    pub text: String,
    pub kind: ResponseKind,
    pub quick_replies: Vec<String>,
    pub phones: Vec<PhoneSummary>,
}

impl ChatReply {
    pub fn shows_phone_cards(&self) -> bool {
        matches!(self.kind, ResponseKind::Recommendation | ResponseKind::PhoneDetails)
            && !self.phones.is_empty()
    }
}

impl TryFrom<ChatResponseBody> for ChatReply {
    type Error = ChatError;

    fn try_from(body: ChatResponseBody) -> Result<Self, Self::Error> {
        if !body.success {
            return Err(ChatError::Application(body.error));
        }
        let phones = body
            .metadata
            .and_then(|m| m.phones)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| serde_json::from_value::<PhoneSummary>(p).ok())
            .collect();
        Ok(ChatReply {
            text: body.response.unwrap_or_default(),
            kind: ResponseKind::from_tag(body.kind.as_deref()),
            quick_replies: body.quick_replies.unwrap_or_default(),
            phones,
        })
    }
}

/// Result of one chat round trip, either a reply or a classified failure.
pub type ChatOutcome = Result<ChatReply, ChatError>;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HistoryResponseBody {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub history: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryTurn {
    pub message: String,
    pub response: String,
}

impl HistoryResponseBody {
    /// Turns as sent by the backend (newest first). Malformed turns are skipped.
    pub fn into_turns(self) -> Result<Vec<HistoryTurn>, ChatError> {
        if !self.success {
            return Err(ChatError::Application(None));
        }
        Ok(self
            .history
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| serde_json::from_value::<HistoryTurn>(t).ok())
            .collect())
    }
}

fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| serde_json::from_value(v).ok()))
}
