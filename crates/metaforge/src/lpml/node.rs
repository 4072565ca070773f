//! Markup tree types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A node in a parsed LPML tree: either literal text or an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// Literal text between tags.
    Text(String),
    /// A tagged element.
    Element(Element),
}

impl Node {
    /// Returns the text if this is a text node.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(text) => Some(text),
            Node::Element(_) => None,
        }
    }

    /// Returns the element if this is an element node.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Text(_) => None,
            Node::Element(element) => Some(element),
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::Text(text.to_string())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Node::Text(text)
    }
}

/// An LPML element.
///
/// `content` is `None` for self-closing elements (`<list_files/>`), which is
/// different from an element that was opened and closed with nothing in
/// between (`<list_files></list_files>` has `Some(vec![])`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Tag name.
    pub tag: String,
    /// Attributes, unique by name.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Children in document order, or `None` when self-closing.
    pub content: Option<Vec<Node>>,
}

impl Element {
    /// Create an element with an empty body.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            content: Some(Vec::new()),
        }
    }

    /// Create a self-closing element.
    pub fn self_closing(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            content: None,
        }
    }

    /// Set an attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Append a child node, turning a self-closing element into a regular one.
    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.content.get_or_insert_with(Vec::new).push(child.into());
        self
    }

    /// Look up an attribute value.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whether this element was written as `<tag/>`.
    pub fn is_self_closing(&self) -> bool {
        self.content.is_none()
    }

    /// Child nodes; empty for self-closing elements.
    pub fn children(&self) -> &[Node] {
        self.content.as_deref().unwrap_or_default()
    }

    /// Concatenated direct text children. Nested elements contribute nothing.
    pub fn text(&self) -> String {
        self.children().iter().filter_map(Node::as_text).collect()
    }
}
