//! Protocol messages.
//!
//! `Envelope` is the loose JSON shape exchanged with the remote page;
//! `Message` is the classified form the dispatcher works with.

use crate::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Raw wire envelope.
///
/// `id` absent means fire-and-forget; `orig` present means this is the
/// response to the request carrying that id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

/// Error reported by the remote runtime in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A classified protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Expects exactly one response carrying `orig = id`.
    Request {
        id: u64,
        method: Method,
        params: Value,
    },
    /// Fire-and-forget; remote events arrive in this form.
    Notification { method: Method, params: Value },
    /// Answer to an earlier request.
    Response {
        orig: u64,
        outcome: Result<Value, RemoteError>,
    },
}

impl Message {
    pub fn request(id: u64, method: Method, params: Value) -> Self {
        Message::Request { id, method, params }
    }

    pub fn notification(method: Method, params: Value) -> Self {
        Message::Notification { method, params }
    }

    pub fn response(orig: u64, result: Value) -> Self {
        Message::Response {
            orig,
            outcome: Ok(result),
        }
    }

    pub fn error_response(orig: u64, error: RemoteError) -> Self {
        Message::Response {
            orig,
            outcome: Err(error),
        }
    }

    /// The method, if this is not a response.
    pub fn method(&self) -> Option<Method> {
        match self {
            Message::Request { method, .. } | Message::Notification { method, .. } => Some(*method),
            Message::Response { .. } => None,
        }
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        match message {
            Message::Request { id, method, params } => Envelope {
                id: Some(id),
                method: Some(method.to_string()),
                params,
                ..Envelope::default()
            },
            Message::Notification { method, params } => Envelope {
                method: Some(method.to_string()),
                params,
                ..Envelope::default()
            },
            Message::Response { orig, outcome } => {
                let (result, error) = match outcome {
                    Ok(value) => (Some(value), None),
                    Err(error) => (None, Some(error)),
                };
                Envelope {
                    orig: Some(orig),
                    result,
                    error,
                    ..Envelope::default()
                }
            }
        }
    }
}
