//! The instrumentation pass.

use crate::scan::{self, Attribute, Token};
use livedev_core::{TagId, TagLocation};
use serde::Serialize;
use std::collections::BTreeMap;

/// Attribute carrying the tag id in served HTML.
pub const TAG_ATTRIBUTE: &str = "data-ld-id";

/// One element seen by the pass, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub id: TagId,
    pub name: String,
    /// Index of the parent in the element list.
    pub parent: Option<usize>,
    pub attrs: Vec<Attribute>,
    /// Direct text content, entity-decoded.
    pub text: String,
    pub has_children: bool,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

/// `tagId → location` for one instrumentation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagMap {
    tags: BTreeMap<TagId, TagLocation>,
}

impl TagMap {
    pub fn get(&self, id: TagId) -> Option<&TagLocation> {
        self.tags.get(&id)
    }

    /// Innermost tag whose element contains `offset`.
    pub fn tag_at(&self, offset: usize) -> Option<TagId> {
        self.tags
            .iter()
            .filter(|(_, loc)| loc.contains(offset))
            .max_by_key(|(_, loc)| loc.start)
            .map(|(id, _)| *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TagId, &TagLocation)> {
        self.tags.iter().map(|(id, loc)| (*id, loc))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Instrumented {
    pub html: String,
    pub tags: TagMap,
    pub elements: Vec<Element>,
}

/// Give every element start tag in `html` a [`TAG_ATTRIBUTE`].
///
/// Ids are assigned in document order starting at 1, so two passes over
/// sources with the same element structure agree on ids.
pub fn instrument(file: &str, html: &str) -> Instrumented {
    let mut elements: Vec<Element> = Vec::new();
    let mut locations: Vec<TagLocation> = Vec::new();
    let mut inserts: Vec<(usize, TagId)> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for token in scan::tokenize(html) {
        match token {
            Token::Start(tag) => {
                let index = elements.len();
                let id = TagId(index as u32 + 1);
                let parent = open.last().copied();
                if let Some(p) = parent {
                    elements[p].has_children = true;
                }
                let leaves_open = !tag.self_closing && !scan::is_void(&tag.name);
                inserts.push((tag.insert_at, id));
                locations.push(TagLocation {
                    file: file.to_string(),
                    name: tag.name.clone(),
                    start: tag.start,
                    end: tag.end,
                    element_end: tag.end,
                });
                elements.push(Element {
                    id,
                    name: tag.name,
                    parent,
                    attrs: tag.attrs,
                    text: String::new(),
                    has_children: false,
                });
                if leaves_open {
                    open.push(index);
                }
            }
            Token::End { name, start, end } => {
                // Unmatched end tags are ignored; anything left open inside
                // the matched element ends where the end tag starts.
                let Some(pos) = open.iter().rposition(|&i| elements[i].name == name) else {
                    continue;
                };
                for &inner in &open[pos + 1..] {
                    locations[inner].element_end = start;
                }
                locations[open[pos]].element_end = end;
                open.truncate(pos);
            }
            Token::Text { start, end } => {
                if let Some(&top) = open.last() {
                    elements[top]
                        .text
                        .push_str(&scan::decode_entities(&html[start..end]));
                }
            }
        }
    }
    for &unclosed in &open {
        locations[unclosed].element_end = html.len();
    }

    let mut out = String::with_capacity(html.len() + inserts.len() * 16);
    let mut cursor = 0;
    for (at, id) in inserts {
        out.push_str(&html[cursor..at]);
        out.push_str(&format!(" {TAG_ATTRIBUTE}=\"{id}\""));
        cursor = at;
    }
    out.push_str(&html[cursor..]);

    let tags = TagMap {
        tags: elements
            .iter()
            .map(|e| e.id)
            .zip(locations)
            .collect(),
    };
    Instrumented {
        html: out,
        tags,
        elements,
    }
}

/// Insert `scripts` as inline `<script>` blocks right after `<head>`,
/// falling back to `<html>` and then to the very start.
pub fn inject_scripts(html: &str, scripts: &[&str]) -> String {
    if scripts.is_empty() {
        return html.to_string();
    }
    let tokens = scan::tokenize(html);
    let after = |name: &str| {
        tokens.iter().find_map(|t| match t {
            Token::Start(tag) if tag.name == name => Some(tag.end),
            _ => None,
        })
    };
    let at = after("head").or_else(|| after("html")).unwrap_or(0);

    let mut out = String::with_capacity(html.len() + scripts.iter().map(|s| s.len() + 17).sum::<usize>());
    out.push_str(&html[..at]);
    for script in scripts {
        out.push_str("<script>");
        out.push_str(&script.replace("</script", "<\\/script"));
        out.push_str("</script>");
    }
    out.push_str(&html[at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>T</title><link rel="stylesheet" href="a.css"></head>
<body>
  <!-- <div>not me</div> -->
  <div class="box"><p>Hello <b>you</b></p><img src="x.png"/></div>
  <script>var s = "<p>";</script>
</body>
</html>
"#;

    #[test]
    fn every_tag_maps_back_to_its_source() {
        let result = instrument("index.html", PAGE);
        let names: Vec<_> = result.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            ["html", "head", "title", "link", "body", "div", "p", "b", "img", "script"]
        );

        for (id, loc) in result.tags.iter() {
            assert_eq!(loc.file, "index.html");
            let source = &PAGE[loc.start..loc.end];
            assert!(source.starts_with(&format!("<{}", loc.name)), "{source}");
            assert!(source.ends_with('>'));
            let marker = format!("{TAG_ATTRIBUTE}=\"{id}\"");
            assert_eq!(result.html.matches(&marker).count(), 1, "{marker}");
        }
    }

    #[test]
    fn instrumented_html_only_adds_attributes() {
        let result = instrument("index.html", PAGE);
        let mut stripped = result.html.clone();
        for (id, _) in result.tags.iter() {
            stripped = stripped.replace(&format!(" {TAG_ATTRIBUTE}=\"{id}\""), "");
        }
        assert_eq!(stripped, PAGE);
        assert!(result.html.contains(r#"<img src="x.png" data-ld-id="9"/>"#));
    }

    #[test]
    fn element_ranges_nest() {
        let html = "<div><p>a<b>b</b></p><span>c</div>";
        let result = instrument("f.html", html);
        let div = result.tags.get(TagId(1)).unwrap();
        let p = result.tags.get(TagId(2)).unwrap();
        let span = result.tags.get(TagId(4)).unwrap();

        assert_eq!(div.element_end, html.len());
        assert_eq!(&html[p.start..p.element_end], "<p>a<b>b</b></p>");
        assert_eq!(span.element_end, html.find("</div>").unwrap());
    }

    #[test]
    fn reverse_lookup_finds_the_innermost_tag() {
        let html = "<div><p>a<b>bold</b></p></div>";
        let result = instrument("f.html", html);
        assert_eq!(result.tags.tag_at(html.find("bold").unwrap()), Some(TagId(3)));
        assert_eq!(result.tags.tag_at(html.find("a<b>").unwrap()), Some(TagId(2)));
        assert_eq!(result.tags.tag_at(0), Some(TagId(1)));
        assert_eq!(result.tags.tag_at(html.len()), None);
    }

    #[test]
    fn leaf_text_is_collected() {
        let result = instrument("f.html", "<p>a &amp; b</p><ul><li>x</li></ul>");
        assert_eq!(result.elements[0].text, "a & b");
        assert!(!result.elements[0].has_children);
        assert!(result.elements[1].has_children);
    }

    #[test]
    fn scripts_go_after_head() {
        let html = "<html><HEAD><title>x</title></HEAD></html>";
        let out = inject_scripts(html, &["a()", "b('</script>')"]);
        assert_eq!(
            out,
            "<html><HEAD><script>a()</script><script>b('<\\/script>')</script><title>x</title></HEAD></html>"
        );
    }

    #[test]
    fn scripts_fall_back_to_html_then_start() {
        assert_eq!(
            inject_scripts("<html><p>", &["x"]),
            "<html><script>x</script><p>"
        );
        assert_eq!(inject_scripts("<p>hi</p>", &["x"]), "<script>x</script><p>hi</p>");
        assert_eq!(inject_scripts("<p>", &[]), "<p>");
    }

    #[test]
    fn tag_map_serializes_by_id() {
        let result = instrument("f.html", "<p></p>");
        let json = serde_json::to_value(&result.tags).unwrap();
        assert_eq!(json["1"]["name"], "p");
        assert_eq!(json["1"]["element_end"], 7);
    }
}
