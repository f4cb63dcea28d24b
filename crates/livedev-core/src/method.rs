//! Closed set of protocol methods.
//!
//! Method format on the wire: `Domain.name`
//!
//! Requests flow editor → page, events flow page → editor. The
//! `Connection.*` events are synthesized by the dispatcher from transport
//! lifecycle notifications and never appear on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction and purpose of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Invoked by the editor in the remote page.
    Request,
    /// Raised by the remote page (or the dispatcher) towards the editor.
    Event,
}

/// A protocol method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Method {
    RuntimeEvaluate,
    RuntimePing,
    PageReload,
    PageNavigate,
    CssSetStylesheetText,
    DomApplyEdits,
    DomHighlight,
    DomHideHighlight,
    BrowserClose,
    ConnectionConnect,
    ConnectionClose,
    PageNavigated,
    DocumentRelated,
    StylesheetAdded,
    StylesheetRemoved,
    ConsoleMessage,
}

impl Method {
    /// Every method, used as the name lookup table.
    pub const ALL: [Method; 16] = [
        Method::RuntimeEvaluate,
        Method::RuntimePing,
        Method::PageReload,
        Method::PageNavigate,
        Method::CssSetStylesheetText,
        Method::DomApplyEdits,
        Method::DomHighlight,
        Method::DomHideHighlight,
        Method::BrowserClose,
        Method::ConnectionConnect,
        Method::ConnectionClose,
        Method::PageNavigated,
        Method::DocumentRelated,
        Method::StylesheetAdded,
        Method::StylesheetRemoved,
        Method::ConsoleMessage,
    ];

    /// Wire name, e.g. `DOM.highlight`.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::RuntimeEvaluate => "Runtime.evaluate",
            Method::RuntimePing => "Runtime.ping",
            Method::PageReload => "Page.reload",
            Method::PageNavigate => "Page.navigate",
            Method::CssSetStylesheetText => "CSS.setStylesheetText",
            Method::DomApplyEdits => "DOM.applyEdits",
            Method::DomHighlight => "DOM.highlight",
            Method::DomHideHighlight => "DOM.hideHighlight",
            Method::BrowserClose => "Browser.close",
            Method::ConnectionConnect => "Connection.connect",
            Method::ConnectionClose => "Connection.close",
            Method::PageNavigated => "Page.navigated",
            Method::DocumentRelated => "Document.related",
            Method::StylesheetAdded => "Stylesheet.added",
            Method::StylesheetRemoved => "Stylesheet.removed",
            Method::ConsoleMessage => "Console.message",
        }
    }

    pub fn kind(self) -> MethodKind {
        match self {
            Method::RuntimeEvaluate
            | Method::RuntimePing
            | Method::PageReload
            | Method::PageNavigate
            | Method::CssSetStylesheetText
            | Method::DomApplyEdits
            | Method::DomHighlight
            | Method::DomHideHighlight
            | Method::BrowserClose => MethodKind::Request,
            Method::ConnectionConnect
            | Method::ConnectionClose
            | Method::PageNavigated
            | Method::DocumentRelated
            | Method::StylesheetAdded
            | Method::StylesheetRemoved
            | Method::ConsoleMessage => MethodKind::Event,
        }
    }

    /// True for events the dispatcher raises itself.
    pub fn is_synthetic(self) -> bool {
        matches!(self, Method::ConnectionConnect | Method::ConnectionClose)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = MethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(MethodParseError::Empty);
        }
        Method::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| MethodParseError::Unknown(s.to_string()))
    }
}

impl TryFrom<String> for Method {
    type Error = MethodParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Method> for String {
    fn from(method: Method) -> Self {
        method.as_str().to_string()
    }
}

/// Error parsing a method name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MethodParseError {
    #[error("unknown method: {0}")]
    Unknown(String),
    #[error("method name cannot be empty")]
    Empty,
}
