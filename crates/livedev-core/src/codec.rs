//! JSON codec between `Message` and its wire text.

use crate::{Envelope, Message, Method, MethodParseError};
use serde_json::Value;

/// Error decoding or encoding a wire message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has neither `orig` nor `method`")]
    MissingMethod,
    #[error(transparent)]
    Method(#[from] MethodParseError),
}

/// Serialize a message to its wire text.
pub fn encode(message: &Message) -> Result<String, CodecError> {
    let envelope = Envelope::from(message.clone());
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse and classify one wire message.
///
/// Anything carrying `orig` is a response, whatever else it carries.
pub fn decode(text: &str) -> Result<Message, CodecError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    if let Some(orig) = envelope.orig {
        let outcome = match envelope.error {
            Some(error) => Err(error),
            None => Ok(envelope.result.unwrap_or(Value::Null)),
        };
        return Ok(Message::Response { orig, outcome });
    }

    let method: Method = envelope.method.ok_or(CodecError::MissingMethod)?.parse()?;
    Ok(match envelope.id {
        Some(id) => Message::Request {
            id,
            method,
            params: envelope.params,
        },
        None => Message::Notification {
            method,
            params: envelope.params,
        },
    })
}
