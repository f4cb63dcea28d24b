//! Frames a page sends over the socket.

use serde::{Deserialize, Serialize};

/// Page → editor framing. Editor → page traffic is the bare protocol text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageFrame {
    /// Handshake, sent once the socket opens.
    Connect { url: String },
    /// A protocol message (response or event) as text.
    Message { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_handshake() {
        let frame: PageFrame =
            serde_json::from_str(r#"{"type":"connect","url":"http://localhost/"}"#).unwrap();
        assert_eq!(
            frame,
            PageFrame::Connect {
                url: "http://localhost/".into()
            }
        );
    }

    #[test]
    fn message_wraps_text() {
        let text = serde_json::to_string(&PageFrame::Message {
            message: r#"{"orig":1}"#.into(),
        })
        .unwrap();
        assert_eq!(text, r#"{"type":"message","message":"{\"orig\":1}"}"#);
    }
}
