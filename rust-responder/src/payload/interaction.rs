//! Interaction callback payloads.
//!
//! Block actions, dialog submissions, shortcuts and friends arrive as a form
//! body with a single `payload` field whose value is a JSON document.

use std::collections::HashMap;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::payload::form_pairs;

/// Name of the form field carrying the JSON document.
pub const PAYLOAD_FIELD: &str = "payload";

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Like [`null_as_default`] for string maps, where a `null` value becomes an
/// empty string.
fn null_values_as_empty<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<HashMap<String, Option<String>>>::deserialize(deserializer)?;

    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.unwrap_or_default()))
        .collect())
}

/// Kind of interaction Slack is reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    BlockActions,
    BlockSuggestion,
    InteractiveMessage,
    DialogSubmission,
    DialogCancellation,
    DialogSuggestion,
    ViewSubmission,
    ViewClosed,
    Shortcut,
    MessageAction,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Team {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub domain: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Channel {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub team_id: String,
}

/// Where the interaction happened: a message, a view, an attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub view_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub message_ts: String,
    #[serde(deserialize_with = "null_as_default")]
    pub thread_ts: String,
    #[serde(deserialize_with = "null_as_default")]
    pub channel_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub is_ephemeral: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub is_app_unfurl: bool,
}

/// Plain or markdown text object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextObject {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub emoji: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionObject {
    pub text: Option<TextObject>,
    #[serde(deserialize_with = "null_as_default")]
    pub value: String,
}

/// A single action taken on a Block Kit element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockAction {
    #[serde(deserialize_with = "null_as_default")]
    pub action_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub block_id: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    pub text: Option<TextObject>,
    #[serde(deserialize_with = "null_as_default")]
    pub value: String,
    #[serde(deserialize_with = "null_as_default")]
    pub action_ts: String,
    pub selected_option: Option<OptionObject>,
    #[serde(deserialize_with = "null_as_default")]
    pub selected_options: Vec<OptionObject>,
    #[serde(deserialize_with = "null_as_default")]
    pub selected_user: String,
    #[serde(deserialize_with = "null_as_default")]
    pub selected_channel: String,
    #[serde(deserialize_with = "null_as_default")]
    pub selected_conversation: String,
    #[serde(deserialize_with = "null_as_default")]
    pub selected_date: String,
}

/// An action taken on a legacy message attachment button or menu.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentAction {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub value: String,
    #[serde(deserialize_with = "null_as_default")]
    pub style: String,
    #[serde(deserialize_with = "null_as_default")]
    pub selected_options: Vec<OptionObject>,
}

/// The `actions` array, split by the kind of element each entry came from.
///
/// Entries carrying a string `block_id` are block actions; all others are
/// attachment actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionCallbacks {
    pub attachment_actions: Vec<AttachmentAction>,
    pub block_actions: Vec<BlockAction>,
}

impl ActionCallbacks {
    pub fn is_empty(&self) -> bool {
        self.attachment_actions.is_empty() && self.block_actions.is_empty()
    }
}

impl Serialize for ActionCallbacks {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = self.block_actions.len() + self.attachment_actions.len();
        let mut seq = serializer.serialize_seq(Some(len))?;
        for action in &self.block_actions {
            seq.serialize_element(action)?;
        }
        for action in &self.attachment_actions {
            seq.serialize_element(action)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ActionCallbacks {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
        let mut callbacks = ActionCallbacks::default();

        for value in raw.unwrap_or_default() {
            if value.get("block_id").is_some_and(|id| id.is_string()) {
                let action = serde_json::from_value(value).map_err(de::Error::custom)?;
                callbacks.block_actions.push(action);
            } else {
                let action = serde_json::from_value(value).map_err(de::Error::custom)?;
                callbacks.attachment_actions.push(action);
            }
        }

        Ok(callbacks)
    }
}

/// A verified interaction callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionCallback {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: InteractionType,
    #[serde(deserialize_with = "null_as_default")]
    pub token: String,
    #[serde(deserialize_with = "null_as_default")]
    pub callback_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub response_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub trigger_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub action_ts: String,
    #[serde(deserialize_with = "null_as_default")]
    pub team: Team,
    #[serde(deserialize_with = "null_as_default")]
    pub channel: Channel,
    #[serde(deserialize_with = "null_as_default")]
    pub user: User,
    #[serde(rename = "actions")]
    pub action_callback: ActionCallbacks,
    #[serde(deserialize_with = "null_as_default")]
    pub api_app_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub container: Container,
    #[serde(deserialize_with = "null_values_as_empty")]
    pub submission: HashMap<String, String>,
    pub message: Option<serde_json::Value>,
    pub view: Option<serde_json::Value>,
}

/// Decode an interaction callback form body.
///
/// Both stages (form, then JSON) report failures as `MalformedPayload`.
pub fn decode_interaction_callback(body: &[u8]) -> Result<InteractionCallback> {
    let json = form_pairs(body)?
        .find(|(key, _)| key == PAYLOAD_FIELD)
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| {
            warn!(body_length = body.len(), "interaction_payload_missing");
            Error::MalformedPayload(format!("missing `{}` form field", PAYLOAD_FIELD))
        })?;

    let callback: InteractionCallback = serde_json::from_str(&json).map_err(|e| {
        warn!(
            error = %e,
            payload_preview = preview(&json, 200),
            "interaction_payload_parse_failed"
        );
        Error::MalformedPayload(format!("invalid payload JSON: {}", e))
    })?;

    info!(
        kind = ?callback.kind,
        team_id = %callback.team.id,
        user_id = %callback.user.id,
        block_actions = callback.action_callback.block_actions.len(),
        attachment_actions = callback.action_callback.attachment_actions.len(),
        "interaction_callback_decoded"
    );

    Ok(callback)
}

fn preview(s: &str, max: usize) -> &str {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
