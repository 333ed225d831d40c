//! Slash command payloads.
//!
//! Slack posts slash commands as `application/x-www-form-urlencoded` bodies.
//! Only a fixed set of fields is recognised; anything else is ignored and
//! absent fields stay empty.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::payload::form_pairs;

/// A verified slash command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlashCommand {
    pub token: String,
    pub team_id: String,
    pub team_domain: String,
    pub enterprise_id: String,
    pub enterprise_name: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,
    pub command: String,
    pub text: String,
    pub response_url: String,
    pub trigger_id: String,
}

impl SlashCommand {
    fn field_mut(&mut self, name: &str) -> Option<&mut String> {
        let field = match name {
            "token" => &mut self.token,
            "team_id" => &mut self.team_id,
            "team_domain" => &mut self.team_domain,
            "enterprise_id" => &mut self.enterprise_id,
            "enterprise_name" => &mut self.enterprise_name,
            "channel_id" => &mut self.channel_id,
            "channel_name" => &mut self.channel_name,
            "user_id" => &mut self.user_id,
            "user_name" => &mut self.user_name,
            "command" => &mut self.command,
            "text" => &mut self.text,
            "response_url" => &mut self.response_url,
            "trigger_id" => &mut self.trigger_id,
            _ => return None,
        };
        Some(field)
    }
}

/// Decode a slash command form body.
///
/// When a field repeats, the first occurrence wins.
pub fn decode_slash_command(body: &[u8]) -> Result<SlashCommand> {
    let mut cmd = SlashCommand::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (key, value) in form_pairs(body)? {
        if seen.contains(&*key) {
            continue;
        }
        if let Some(field) = cmd.field_mut(&key) {
            *field = value.into_owned();
            seen.insert(key.into_owned());
        }
    }

    info!(
        command = %cmd.command,
        team_id = %cmd.team_id,
        channel_id = %cmd.channel_id,
        user_id = %cmd.user_id,
        "slash_command_decoded"
    );

    Ok(cmd)
}
