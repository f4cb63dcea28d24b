//! Live documents: diff successive instrumentation passes into DOM edits.

use crate::edit::{Edit, EditInstruction};
use crate::instrument::{Element, Instrumented, TAG_ATTRIBUTE, TagMap, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentUpdate {
    /// Nothing visible changed.
    Unchanged,
    /// The open page can be patched in place.
    Edits(Vec<EditInstruction>),
    /// The element structure changed; the page must reload.
    Reload,
}

/// An HTML file currently open in a preview.
#[derive(Debug, Clone)]
pub struct LiveDocument {
    file: String,
    source: String,
    pass: Instrumented,
}

impl LiveDocument {
    pub fn new(file: impl Into<String>, source: impl Into<String>) -> Self {
        let file = file.into();
        let source = source.into();
        let pass = instrument(&file, &source);
        Self { file, source, pass }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Instrumented HTML for the current source.
    pub fn html(&self) -> &str {
        &self.pass.html
    }

    pub fn tags(&self) -> &TagMap {
        &self.pass.tags
    }

    /// Replace the source and describe how to bring the page up to date.
    pub fn update(&mut self, source: impl Into<String>) -> DocumentUpdate {
        let source = source.into();
        if source == self.source {
            return DocumentUpdate::Unchanged;
        }
        let next = instrument(&self.file, &source);
        let update = match diff(&self.pass.elements, &next.elements) {
            Some(edits) if edits.is_empty() => DocumentUpdate::Unchanged,
            Some(edits) => DocumentUpdate::Edits(edits),
            None => DocumentUpdate::Reload,
        };
        self.source = source;
        self.pass = next;
        update
    }
}

/// Attribute and text edits turning `old` into `new`, or `None` when the
/// element structure differs.
fn diff(old: &[Element], new: &[Element]) -> Option<Vec<EditInstruction>> {
    if old.len() != new.len() {
        return None;
    }
    let mut edits = Vec::new();
    for (a, b) in old.iter().zip(new) {
        if a.name != b.name || a.parent != b.parent || a.has_children != b.has_children {
            return None;
        }

        for attr in &b.attrs {
            if attr.name == TAG_ATTRIBUTE {
                continue;
            }
            if a.attr(&attr.name) != Some(attr.value.as_str()) {
                edits.push(EditInstruction::new(
                    b.id,
                    Edit::SetAttribute {
                        name: attr.name.clone(),
                        value: attr.value.clone(),
                    },
                ));
            }
        }
        for attr in &a.attrs {
            if attr.name != TAG_ATTRIBUTE && b.attr(&attr.name).is_none() {
                edits.push(EditInstruction::new(
                    b.id,
                    Edit::RemoveAttribute {
                        name: attr.name.clone(),
                    },
                ));
            }
        }

        if a.text != b.text {
            // Mixed content and scripts cannot be patched through textContent.
            if b.has_children || b.name == "script" {
                return None;
            }
            edits.push(EditInstruction::new(
                b.id,
                Edit::SetText {
                    text: b.text.clone(),
                },
            ));
        }
    }
    Some(edits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use livedev_core::TagId;

    const PAGE: &str = r#"<html><body><h1 class="t">Hi</h1><p>one <b>two</b></p></body></html>"#;

    #[test]
    fn unchanged_source_is_a_no_op() {
        let mut doc = LiveDocument::new("index.html", PAGE);
        assert_eq!(doc.update(PAGE), DocumentUpdate::Unchanged);
        assert_eq!(
            doc.update(PAGE.replace("<html>", "<html><!-- note -->")),
            DocumentUpdate::Unchanged
        );
    }

    #[test]
    fn text_changes_become_set_text() {
        let mut doc = LiveDocument::new("index.html", PAGE);
        let update = doc.update(PAGE.replace(">Hi<", ">Hello &amp; welcome<"));
        assert_eq!(
            update,
            DocumentUpdate::Edits(vec![EditInstruction::new(
                TagId(3),
                Edit::SetText {
                    text: "Hello & welcome".into()
                }
            )])
        );
        assert!(doc.html().contains("Hello &amp; welcome"));
    }

    #[test]
    fn attribute_changes_become_set_and_remove() {
        let mut doc = LiveDocument::new("index.html", PAGE);
        let update = doc.update(PAGE.replace(r#"<h1 class="t">"#, r#"<h1 id="top">"#));
        assert_eq!(
            update,
            DocumentUpdate::Edits(vec![
                EditInstruction::new(
                    TagId(3),
                    Edit::SetAttribute {
                        name: "id".into(),
                        value: "top".into()
                    }
                ),
                EditInstruction::new(
                    TagId(3),
                    Edit::RemoveAttribute {
                        name: "class".into()
                    }
                ),
            ])
        );
    }

    #[test]
    fn structural_changes_reload() {
        let mut doc = LiveDocument::new("index.html", PAGE);
        assert_eq!(
            doc.update(PAGE.replace("<b>two</b>", "<i>two</i>")),
            DocumentUpdate::Reload
        );
        assert_eq!(
            doc.update(PAGE.replace("</body>", "<hr></body>")),
            DocumentUpdate::Reload
        );
    }

    #[test]
    fn mixed_content_text_changes_reload() {
        let mut doc = LiveDocument::new("index.html", PAGE);
        assert_eq!(
            doc.update(PAGE.replace("one ", "uno ")),
            DocumentUpdate::Reload
        );
    }

    #[test]
    fn tags_track_the_latest_source() {
        let mut doc = LiveDocument::new("index.html", PAGE);
        let source = PAGE.replace(">Hi<", ">Hi there<");
        doc.update(source.clone());
        let h1 = doc.tags().get(TagId(3)).unwrap();
        assert_eq!(&source[h1.start..h1.element_end], "<h1 class=\"t\">Hi there</h1>");
        assert_eq!(doc.source(), source);
    }
}
