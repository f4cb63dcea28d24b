//! Edit and highlight contracts with the remote runtime.

use livedev_core::TagId;
use serde::{Deserialize, Serialize};

/// Which node an edit applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditTarget {
    TagId(TagId),
    Selector(String),
}

impl From<TagId> for EditTarget {
    fn from(id: TagId) -> Self {
        Self::TagId(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Edit {
    SetAttribute { name: String, value: String },
    RemoveAttribute { name: String },
    SetText { text: String },
    ReplaceInnerHtml { html: String },
    Remove,
    /// `value: None` clears the property.
    SetStyle {
        property: String,
        value: Option<String>,
    },
}

/// One entry of a `DOM.applyEdits` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditInstruction {
    pub target: EditTarget,
    #[serde(flatten)]
    pub edit: Edit,
}

impl EditInstruction {
    pub fn new(target: impl Into<EditTarget>, edit: Edit) -> Self {
        Self {
            target: target.into(),
            edit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyEdits {
    pub edits: Vec<EditInstruction>,
}

/// Result of `DOM.applyEdits`. Targets that no longer exist are reported,
/// not treated as failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyEditsOutcome {
    pub applied: usize,
    #[serde(default)]
    pub missing: Vec<EditTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRequest {
    pub tag_id: TagId,
}

/// `found: false` means the node is gone since the last pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightOutcome {
    pub found: bool,
}
