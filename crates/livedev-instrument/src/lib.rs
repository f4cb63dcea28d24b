//! HTML instrumentation and the remote runtime it talks to.
//!
//! [`instrument`] tags every element of a page with a `data-ld-id` and
//! records where each tag came from, so nodes in the live page can be
//! mapped back to source ranges. [`LiveDocument`] turns later edits of the
//! same page into DOM patches for the [`REMOTE_RUNTIME`] to apply.

mod document;
mod edit;
mod instrument;
mod scan;

pub use document::{DocumentUpdate, LiveDocument};
pub use edit::{
    ApplyEdits, ApplyEditsOutcome, Edit, EditInstruction, EditTarget, HighlightOutcome,
    HighlightRequest,
};
pub use instrument::{Element, Instrumented, TAG_ATTRIBUTE, TagMap, inject_scripts, instrument};
pub use scan::{Attribute, decode_entities};

/// Page-side runtime implementing the protocol methods. Needs the
/// transport bootstrap to have run first.
pub const REMOTE_RUNTIME: &str = include_str!("../assets/remote_runtime.js");
