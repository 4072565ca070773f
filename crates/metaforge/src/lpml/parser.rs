//! Stack-machine LPML parser.
//!
//! Tags are located with regular expressions and folded into a tree with an
//! explicit open-element stack. Nothing here fails: anything that does not
//! look like a tag is text, and anything that cannot be matched up is kept as
//! text too.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex_lite::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::node::{Element, Node};

/// One ` name="value"` fragment inside a tag.
const ATTRIBUTE: &str = r#" [^"'/<> -]+=(?:"[^"]*"|'[^']*')"#;

/// Start, end and self-closing tags.
///
/// Groups: 1/2 start name/attributes, 3 end name, 4/5 self-closing
/// name/attributes.
#[allow(clippy::expect_used)]
static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let start = format!(r#"<([^/>\s]+)((?:{ATTRIBUTE})*)\s*>"#);
    let end = r"</([^/>\s]+)\s*>";
    let empty = format!(r#"<([^/>\s]+)((?:{ATTRIBUTE})*)\s*/>"#);
    Regex::new(&format!("(?:{start})|(?:{end})|(?:{empty})")).expect("tag pattern is valid")
});

#[allow(clippy::expect_used)]
static ATTRIBUTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#" ([^"'/<> -]+)=(?:"([^"]*)"|'([^']*)')"#).expect("attribute pattern is valid")
});

/// Backtick spans, comments and declarations.
#[allow(clippy::expect_used)]
static PROTECT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)`.*?`|<!--.*?-->|<!.*?>").expect("protect pattern is valid")
});

const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// Parser settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Trim text between tags, dropping spans that become empty.
    pub trim_text: bool,
    /// Tags whose body is kept as raw text up to the first matching end tag.
    pub excluded_tags: Vec<String>,
}

impl ParseOptions {
    /// The profile used for agent responses: trimmed text, and file bodies
    /// of `create_file` / `edit_file` kept verbatim.
    pub fn agent() -> Self {
        Self {
            trim_text: true,
            excluded_tags: vec!["create_file".to_string(), "edit_file".to_string()],
        }
    }

    /// Set whether text between tags is trimmed.
    pub fn trim_text(mut self, trim: bool) -> Self {
        self.trim_text = trim;
        self
    }

    /// Add an excluded tag.
    pub fn exclude(mut self, tag: impl Into<String>) -> Self {
        self.excluded_tags.push(tag.into());
        self
    }

    fn is_excluded(&self, tag: &str) -> bool {
        self.excluded_tags.iter().any(|t| t == tag)
    }
}

/// A recoverable problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    /// An end tag with no open element of that name; kept as text.
    UnmatchedEndTag {
        /// The end tag's name.
        tag: String,
    },
}

/// Parse result with diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    /// Top-level nodes in document order.
    pub nodes: Vec<Node>,
    /// Recovery warnings, in the order they were hit.
    pub warnings: Vec<ParseWarning>,
}

/// Parse LPML text into a tree.
pub fn parse(text: &str, options: &ParseOptions) -> Vec<Node> {
    parse_document(text, options).nodes
}

/// Parse LPML text, also reporting what had to be recovered.
pub fn parse_document(text: &str, options: &ParseOptions) -> Document {
    let protected = ProtectedText::new(text);
    let source = protected.text.as_str();

    let mut builder = TreeBuilder::new(options.trim_text);
    let mut warnings = Vec::new();
    let mut excluded: Option<&str> = None;
    let mut cursor = 0;

    for caps in TAG_PATTERN.captures_iter(source) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let Some(token) = Token::from_captures(&caps) else {
            continue;
        };

        if let Some(name) = excluded {
            match token {
                Token::End { name: end } if end == name => excluded = None,
                _ => continue,
            }
        }

        builder.push_text(&source[cursor..whole.start()]);
        cursor = whole.end();

        match token {
            Token::Start { name, attributes } => {
                if options.is_excluded(name) {
                    excluded = Some(name);
                }
                builder.open(name, parse_attributes(attributes));
            }
            Token::SelfClosing { name, attributes } => {
                builder.append(Element {
                    tag: name.to_string(),
                    attributes: parse_attributes(attributes),
                    content: None,
                });
            }
            Token::End { name } => {
                if !builder.close(name) {
                    tracing::warn!("Unmatched closing tag </{}> kept as text", name);
                    warnings.push(ParseWarning::UnmatchedEndTag {
                        tag: name.to_string(),
                    });
                    builder.push_raw(whole.as_str());
                }
            }
        }
    }

    builder.push_text(&source[cursor..]);

    let mut nodes = builder.finish();
    protected.restore_nodes(&mut nodes);

    Document { nodes, warnings }
}

#[derive(Clone, Copy)]
enum Token<'t> {
    Start { name: &'t str, attributes: &'t str },
    End { name: &'t str },
    SelfClosing { name: &'t str, attributes: &'t str },
}

impl<'t> Token<'t> {
    fn from_captures(caps: &Captures<'t>) -> Option<Self> {
        let text = |i: usize| caps.get(i).map_or("", |m| m.as_str());
        if let Some(name) = caps.get(1) {
            Some(Token::Start {
                name: name.as_str(),
                attributes: text(2),
            })
        } else if let Some(name) = caps.get(3) {
            Some(Token::End {
                name: name.as_str(),
            })
        } else {
            caps.get(4).map(|name| Token::SelfClosing {
                name: name.as_str(),
                attributes: text(5),
            })
        }
    }
}

fn parse_attributes(text: &str) -> BTreeMap<String, String> {
    ATTRIBUTE_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str();
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// An element that has been opened but not closed yet.
struct Frame {
    tag: String,
    attributes: BTreeMap<String, String>,
    content: Vec<Node>,
}

/// Open-element stack. `root` is the bottom sentinel and cannot be popped.
struct TreeBuilder {
    root: Vec<Node>,
    open: Vec<Frame>,
    trim: bool,
}

impl TreeBuilder {
    fn new(trim: bool) -> Self {
        Self {
            root: Vec::new(),
            open: Vec::new(),
            trim,
        }
    }

    fn current(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(frame) => &mut frame.content,
            None => &mut self.root,
        }
    }

    fn push_text(&mut self, text: &str) {
        let text = if self.trim { text.trim() } else { text };
        if !text.is_empty() {
            self.push_raw(text);
        }
    }

    fn push_raw(&mut self, text: &str) {
        self.current().push(Node::Text(text.to_string()));
    }

    fn append(&mut self, element: Element) {
        self.current().push(Node::Element(element));
    }

    fn open(&mut self, tag: &str, attributes: BTreeMap<String, String>) {
        self.open.push(Frame {
            tag: tag.to_string(),
            attributes,
            content: Vec::new(),
        });
    }

    /// Close the innermost open element named `tag` along with everything
    /// opened inside it. Returns false if no such element is open.
    fn close(&mut self, tag: &str) -> bool {
        let Some(index) = self.open.iter().rposition(|frame| frame.tag == tag) else {
            return false;
        };
        while self.open.len() > index {
            self.close_top();
        }
        true
    }

    fn close_top(&mut self) {
        if let Some(frame) = self.open.pop() {
            self.append(Element {
                tag: frame.tag,
                attributes: frame.attributes,
                content: Some(frame.content),
            });
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while !self.open.is_empty() {
            self.close_top();
        }
        self.root
    }
}

/// Source text with protected regions swapped out for placeholder tokens.
struct ProtectedText {
    text: String,
    prefix: String,
    regions: Vec<String>,
}

impl ProtectedText {
    fn new(source: &str) -> Self {
        let prefix = placeholder_prefix(source);
        let mut regions = Vec::new();
        let text = PROTECT_PATTERN
            .replace_all(source, |caps: &Captures<'_>| {
                let token = format!("{prefix}{}{PLACEHOLDER_CLOSE}", regions.len());
                regions.push(caps[0].to_string());
                token
            })
            .into_owned();
        Self {
            text,
            prefix,
            regions,
        }
    }

    fn restore_nodes(&self, nodes: &mut [Node]) {
        if self.regions.is_empty() {
            return;
        }
        for node in nodes {
            match node {
                Node::Text(text) => *text = self.restore(text),
                Node::Element(element) => {
                    for value in element.attributes.values_mut() {
                        *value = self.restore(value);
                    }
                    if let Some(content) = element.content.as_mut() {
                        self.restore_nodes(content);
                    }
                }
            }
        }
    }

    fn restore(&self, text: &str) -> String {
        if self.prefix.is_empty() || !text.contains(self.prefix.as_str()) {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find(self.prefix.as_str()) {
            let after = &rest[start + self.prefix.len()..];
            let Some(end) = after.find(PLACEHOLDER_CLOSE) else {
                break;
            };
            match after[..end]
                .parse::<usize>()
                .ok()
                .and_then(|index| self.regions.get(index))
            {
                Some(original) => {
                    out.push_str(&rest[..start]);
                    out.push_str(original);
                    rest = &after[end + PLACEHOLDER_CLOSE.len_utf8()..];
                }
                None => {
                    out.push_str(&rest[..start + self.prefix.len()]);
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// A placeholder prefix that does not occur anywhere in `source`, so every
/// occurrence after masking is one of ours.
fn placeholder_prefix(source: &str) -> String {
    (0u32..)
        .map(|salt| format!("{PLACEHOLDER_OPEN}{salt}:"))
        .find(|prefix| !source.contains(prefix.as_str()))
        .unwrap_or_default()
}
