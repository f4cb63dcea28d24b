//! Forgiving HTML tokenizer with byte offsets.
//!
//! Only what instrumentation needs: element start/end tags with their
//! attributes, and the text runs between them. Comments, doctype and
//! processing instructions are skipped. Raw-text element bodies are a
//! single text run.

/// Elements that never have an end tag.
const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose body is not markup.
const RAW_TEXT: &[&str] = &["script", "style", "textarea", "title"];

pub(crate) fn is_void(name: &str) -> bool {
    VOID.contains(&name)
}

pub(crate) fn is_raw_text(name: &str) -> bool {
    RAW_TEXT.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StartTag {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub attrs: Vec<Attribute>,
    pub self_closing: bool,
    /// Where a new attribute can be spliced in (before `>` or `/>`).
    pub insert_at: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Start(StartTag),
    End {
        name: String,
        start: usize,
        end: usize,
    },
    Text {
        start: usize,
        end: usize,
    },
}

pub(crate) fn tokenize(html: &str) -> Vec<Token> {
    let b = html.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut text_start = 0;

    let flush = |tokens: &mut Vec<Token>, from: usize, to: usize| {
        if from < to {
            tokens.push(Token::Text {
                start: from,
                end: to,
            });
        }
    };

    while i < b.len() {
        if b[i] != b'<' {
            i += 1;
            continue;
        }
        let rest = &html[i..];
        let next = b.get(i + 1).copied().unwrap_or(0);

        if rest.starts_with("<!--") {
            flush(&mut tokens, text_start, i);
            i = rest[4..].find("-->").map_or(b.len(), |p| i + 4 + p + 3);
            text_start = i;
        } else if next == b'!' || next == b'?' {
            flush(&mut tokens, text_start, i);
            i = rest.find('>').map_or(b.len(), |p| i + p + 1);
            text_start = i;
        } else if next == b'/' && b.get(i + 2).is_some_and(u8::is_ascii_alphabetic) {
            flush(&mut tokens, text_start, i);
            let name_end = scan_name(b, i + 2);
            let end = rest.find('>').map_or(b.len(), |p| i + p + 1);
            tokens.push(Token::End {
                name: html[i + 2..name_end].to_ascii_lowercase(),
                start: i,
                end,
            });
            i = end;
            text_start = i;
        } else if next.is_ascii_alphabetic() {
            let Some(tag) = parse_start_tag(html, i) else {
                i += 1;
                continue;
            };
            flush(&mut tokens, text_start, i);
            i = tag.end;
            text_start = i;
            let raw = is_raw_text(&tag.name) && !tag.self_closing;
            let name = tag.name.clone();
            tokens.push(Token::Start(tag));
            if raw {
                let close = find_end_tag(html, i, &name);
                flush(&mut tokens, i, close);
                i = close;
                text_start = i;
            }
        } else {
            i += 1;
        }
    }
    flush(&mut tokens, text_start, b.len());
    tokens
}

fn scan_name(b: &[u8], mut j: usize) -> usize {
    while j < b.len() && !b[j].is_ascii_whitespace() && b[j] != b'>' && b[j] != b'/' {
        j += 1;
    }
    j
}

fn skip_ws(b: &[u8], mut j: usize) -> usize {
    while j < b.len() && b[j].is_ascii_whitespace() {
        j += 1;
    }
    j
}

/// Parse the start tag opening at `start`. `None` if it never closes.
fn parse_start_tag(html: &str, start: usize) -> Option<StartTag> {
    let b = html.as_bytes();
    let name_end = scan_name(b, start + 1);
    let name = html[start + 1..name_end].to_ascii_lowercase();
    let mut attrs = Vec::new();
    let mut j = name_end;

    loop {
        j = skip_ws(b, j);
        match b.get(j).copied()? {
            b'>' => {
                return Some(StartTag {
                    name,
                    start,
                    end: j + 1,
                    attrs,
                    self_closing: false,
                    insert_at: j,
                });
            }
            b'/' if b.get(j + 1) == Some(&b'>') => {
                return Some(StartTag {
                    name,
                    start,
                    end: j + 2,
                    attrs,
                    self_closing: true,
                    insert_at: j,
                });
            }
            b'/' => j += 1,
            _ => {
                let attr_start = j;
                while j < b.len()
                    && !b[j].is_ascii_whitespace()
                    && !matches!(b[j], b'=' | b'>' | b'/')
                {
                    j += 1;
                }
                let attr_name = html[attr_start..j].to_ascii_lowercase();
                let after_name = skip_ws(b, j);
                let mut value = String::new();
                if b.get(after_name) == Some(&b'=') {
                    j = skip_ws(b, after_name + 1);
                    match b.get(j).copied()? {
                        q @ (b'"' | b'\'') => {
                            let close = html[j + 1..].find(q as char)? + j + 1;
                            value = decode_entities(&html[j + 1..close]);
                            j = close + 1;
                        }
                        _ => {
                            let value_start = j;
                            while j < b.len() && !b[j].is_ascii_whitespace() && b[j] != b'>' {
                                j += 1;
                            }
                            value = decode_entities(&html[value_start..j]);
                        }
                    }
                }
                if !attr_name.is_empty() {
                    attrs.push(Attribute {
                        name: attr_name,
                        value,
                    });
                }
            }
        }
    }
}

/// Offset of the `</name` that closes a raw-text element, or the end of input.
fn find_end_tag(html: &str, from: usize, name: &str) -> usize {
    let lower = html[from..].to_ascii_lowercase();
    let needle = format!("</{name}");
    let mut search = 0;
    while let Some(p) = lower[search..].find(&needle) {
        let at = search + p;
        let after = lower.as_bytes().get(at + needle.len()).copied();
        if after.is_none_or(|c| c.is_ascii_whitespace() || c == b'>' || c == b'/') {
            return from + at;
        }
        search = at + needle.len();
    }
    html.len()
}

/// Decode the character references that matter for attribute and text diffs.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &rest[1..semi];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((c, semi + 1))
        });
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn starts(html: &str) -> Vec<StartTag> {
        tokenize(html)
            .into_iter()
            .filter_map(|t| match t {
                Token::Start(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn start_tags_with_attributes() {
        let html = r#"<div class="a b" id=main data-x='1' hidden><br/></div>"#;
        let tags = starts(html);
        assert_eq!(tags.len(), 2);
        let div = &tags[0];
        assert_eq!(div.name, "div");
        assert_eq!(&html[div.start..div.end], r#"<div class="a b" id=main data-x='1' hidden>"#);
        let names: Vec<_> = div.attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["class", "id", "data-x", "hidden"]);
        assert_eq!(div.attrs[1].value, "main");
        assert!(tags[1].self_closing);
        assert_eq!(&html[tags[1].insert_at..tags[1].end], "/>");
    }

    #[test]
    fn skips_comments_doctype_and_processing_instructions() {
        let html = "<!DOCTYPE html><?xml x?><!-- <p>no</p> --><p>yes</p>";
        let tags = starts(html);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].start, html.find("<p>yes").unwrap());
    }

    #[test]
    fn raw_text_bodies_are_opaque() {
        let html = "<script>if (a<b) { x = '<div>'; }</script><p>";
        let tokens = tokenize(html);
        assert!(matches!(&tokens[0], Token::Start(t) if t.name == "script"));
        assert!(matches!(tokens[1], Token::Text { .. }));
        assert!(matches!(&tokens[2], Token::End { name, .. } if name == "script"));
        assert!(matches!(&tokens[3], Token::Start(t) if t.name == "p"));
    }

    #[test]
    fn raw_text_end_is_case_insensitive() {
        let html = "<STYLE>p{}</Style ><b>";
        let tags = starts(html);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name, "style");
    }

    #[test]
    fn stray_angle_brackets_are_text() {
        let html = "a < b <3 <p>ok</p> <unterminated";
        let tags = starts(html);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "p");
    }

    #[test]
    fn entities() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
        assert_eq!(decode_entities("AT&T &bogus; &"), "AT&T &bogus; &");
    }
}
