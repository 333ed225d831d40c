//! Payload decoding for verified request bodies.
//!
//! Two independent paths, chosen by the caller rather than sniffed from the
//! body:
//!
//! ```text
//! slash command:        form body            → SlashCommand
//! interaction callback: form body → payload= → JSON → InteractionCallback
//! ```

pub mod interaction;
pub mod slash;

use url::form_urlencoded;

use crate::error::{Error, Result};

pub use interaction::{
    decode_interaction_callback, ActionCallbacks, AttachmentAction, BlockAction,
    InteractionCallback, InteractionType,
};
pub use slash::{decode_slash_command, SlashCommand};

/// Iterate the percent-decoded key/value pairs of a form body.
fn form_pairs(body: &[u8]) -> Result<form_urlencoded::Parse<'_>> {
    std::str::from_utf8(body)
        .map_err(|e| Error::MalformedPayload(format!("form body is not UTF-8: {}", e)))?;

    Ok(form_urlencoded::parse(body))
}
