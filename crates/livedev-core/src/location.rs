//! Source locations for instrumentation tags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier embedded into served HTML, unique within one instrumentation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub u32);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TagId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(TagId)
    }
}

/// Where a tagged element lives in the edited document.
///
/// `start..end` is the byte range of the element's start tag in the original
/// source; `element_end` is where the element itself ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagLocation {
    pub file: String,
    /// Lowercased element name.
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub element_end: usize,
}

impl TagLocation {
    /// True if `offset` falls inside the element.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.element_end
    }

    pub fn element_len(&self) -> usize {
        self.element_end - self.start
    }
}
