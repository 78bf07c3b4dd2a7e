//! First-element extraction from rendered markup fragments.
//!
//! A shell fragment contributes exactly one element: the first top-level
//! element in the markup. Leading text, comments, doctype and processing
//! instructions are skipped; anything after the first element is ignored.

/// Elements that never have content or an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose content is text up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Start tags that end an open `p`.
const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hgroup", "hr", "main", "menu", "nav", "ol", "p", "pre", "section", "table", "ul",
];

/// A single element extracted from a markup fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    outer_html: String,
    inner_start: usize,
    inner_end: usize,
}

impl Element {
    /// Lowercased tag name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Attributes in source order, names lowercased.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    /// The element's markup, start tag through end tag.
    pub fn outer_html(&self) -> &str {
        &self.outer_html
    }

    /// Markup between the start and end tags.
    pub fn inner_html(&self) -> &str {
        &self.outer_html[self.inner_start..self.inner_end]
    }
}

/// Extract the first top-level element of `markup`.
///
/// Returns `None` when the fragment contains no element. An element left
/// open at the end of input runs to the end of input. A `p` ends before the
/// first block-level start tag inside it and gains an explicit end tag.
pub fn first_element(markup: &str) -> Option<Element> {
    let mut pos = 0;
    while let Some(offset) = markup[pos..].find('<') {
        let start = pos + offset;
        let rest = &markup[start..];

        if rest.starts_with("<!--") {
            pos = start + rest.find("-->")? + 3;
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") || rest.starts_with("</") {
            pos = start + rest.find('>')? + 1;
            continue;
        }

        match parse_start_tag(markup, start) {
            Some(tag) => return Some(complete(markup, start, tag)),
            None => pos = start + 1,
        }
    }
    None
}

#[derive(Debug)]
struct StartTag {
    name: String,
    attributes: Vec<(String, String)>,
    /// Offset just past the closing `>`.
    end: usize,
    self_closing: bool,
}

/// Parse a start tag beginning at `start` (which holds `<`).
fn parse_start_tag(markup: &str, start: usize) -> Option<StartTag> {
    let bytes = markup.as_bytes();
    let mut i = start + 1;

    if !bytes.get(i)?.is_ascii_alphabetic() {
        return None;
    }
    let name_start = i;
    while i < bytes.len() && is_name_byte(bytes[i]) {
        i += 1;
    }
    let name = markup[name_start..i].to_ascii_lowercase();

    let mut attributes = Vec::new();
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match *bytes.get(i)? {
            b'>' => {
                return Some(StartTag {
                    name,
                    attributes,
                    end: i + 1,
                    self_closing: false,
                });
            }
            b'/' if bytes.get(i + 1) == Some(&b'>') => {
                return Some(StartTag {
                    name,
                    attributes,
                    end: i + 2,
                    self_closing: true,
                });
            }
            b'/' => {
                i += 1;
                continue;
            }
            _ => {}
        }

        let attr_start = i;
        while i < bytes.len() && !is_attr_name_end(bytes[i]) {
            i += 1;
        }
        if i == attr_start {
            // Stray '=' or similar.
            i += 1;
            continue;
        }
        let attr_name = markup[attr_start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            attributes.push((attr_name, String::new()));
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = match *bytes.get(i)? {
            quote @ (b'"' | b'\'') => {
                let value_start = i + 1;
                let close = markup[value_start..].find(quote as char)? + value_start;
                i = close + 1;
                &markup[value_start..close]
            }
            _ => {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                &markup[value_start..i]
            }
        };
        attributes.push((attr_name, value.to_string()));
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

fn is_attr_name_end(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/')
}

/// Whether `markup[at..]` is an end tag for `name`. Returns the offset past its `>`.
fn end_tag_at(markup: &str, at: usize, name: &str) -> Option<usize> {
    let rest = &markup[at..];
    if !rest.starts_with("</") {
        return None;
    }
    let candidate = rest.get(2..2 + name.len())?;
    if !candidate.eq_ignore_ascii_case(name) {
        return None;
    }
    match rest.as_bytes().get(2 + name.len()) {
        Some(b) if *b == b'>' || b.is_ascii_whitespace() => {
            let close = rest.find('>')?;
            Some(at + close + 1)
        }
        _ => None,
    }
}

/// Find the end of the element whose start tag was parsed at `start`.
fn complete(markup: &str, start: usize, tag: StartTag) -> Element {
    let StartTag {
        name,
        attributes,
        end: content_start,
        self_closing,
    } = tag;

    let build = |inner_end: usize, outer_end: usize| Element {
        outer_html: markup[start..outer_end].to_string(),
        inner_start: content_start - start,
        inner_end: inner_end - start,
        tag: name.clone(),
        attributes: attributes.clone(),
    };

    if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
        return build(content_start, content_start);
    }

    if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
        let mut pos = content_start;
        while let Some(offset) = markup[pos..].find("</") {
            let at = pos + offset;
            if let Some(end) = end_tag_at(markup, at, &name) {
                return build(at, end);
            }
            pos = at + 2;
        }
        return build(markup.len(), markup.len());
    }

    let mut depth = 1usize;
    let mut pos = content_start;
    while let Some(offset) = markup[pos..].find('<') {
        let at = pos + offset;
        let rest = &markup[at..];

        if rest.starts_with("<!--") {
            match rest.find("-->") {
                Some(close) => {
                    pos = at + close + 3;
                    continue;
                }
                None => break,
            }
        }

        if rest.starts_with("</") {
            if let Some(end) = end_tag_at(markup, at, &name) {
                depth -= 1;
                if depth == 0 {
                    return build(at, end);
                }
                pos = end;
            } else {
                pos = at + 2;
            }
            continue;
        }

        match parse_start_tag(markup, at) {
            Some(inner) => {
                if name == "p" && CLOSES_PARAGRAPH.contains(&inner.name.as_str()) {
                    let mut element = build(at, at);
                    element.outer_html.push_str("</p>");
                    return element;
                }
                if inner.name == name && !inner.self_closing {
                    depth += 1;
                }
                pos = inner.end;
            }
            None => pos = at + 1,
        }
    }

    build(markup.len(), markup.len())
}
