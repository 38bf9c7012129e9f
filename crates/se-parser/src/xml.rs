//! A small element tree over quick-xml with resolved namespaces and source positions.

use std::collections::HashMap;
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use style_common::QName;

use crate::error::{ParseError, ParseResult};

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlAttribute {
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
    pub nodes: Vec<XmlNode>,
    pub line: usize,
    pub column: usize,
    /// Prefix bindings in scope, the default namespace under `""`.
    scope: Arc<HashMap<String, String>>,
}

/// Split a raw `prefix:local` name.
fn split_name(raw: &[u8]) -> (Option<String>, String) {
    let raw = String::from_utf8_lossy(raw);
    match raw.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, raw.into_owned()),
    }
}

/// Byte offsets of line starts, for mapping positions to line and column.
struct LineIndex(Vec<usize>);

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self(starts)
    }

    fn position(&self, offset: usize) -> (usize, usize) {
        let line = match self.0.binary_search(&offset) {
            Ok(l) => l,
            Err(l) => l - 1,
        };
        (line + 1, offset - self.0[line] + 1)
    }
}

impl XmlElement {
    /// Parse a document and return its root element.
    pub fn parse(text: &str) -> ParseResult<XmlElement> {
        let index = LineIndex::new(text);
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;

        loop {
            let offset = reader.buffer_position();
            match reader.read_event()? {
                Event::Start(e) => {
                    let parent_scope = stack.last().map(|p| Arc::clone(&p.scope));
                    let el = Self::open(&e, parent_scope, index.position(offset))?;
                    stack.push(el);
                }
                Event::Empty(e) => {
                    let parent_scope = stack.last().map(|p| Arc::clone(&p.scope));
                    let el = Self::open(&e, parent_scope, index.position(offset))?;
                    match stack.last_mut() {
                        Some(parent) => parent.nodes.push(XmlNode::Element(el)),
                        None => root = Some(el),
                    }
                }
                Event::End(_) => {
                    if let Some(el) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.nodes.push(XmlNode::Element(el)),
                            None => root = Some(el),
                        }
                    }
                }
                Event::Text(e) => {
                    if let Some(top) = stack.last_mut() {
                        top.push_text(&e.unescape()?);
                    }
                }
                Event::CData(e) => {
                    if let Some(top) = stack.last_mut() {
                        top.push_text(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.ok_or(ParseError::Empty)
    }

    fn open(
        start: &BytesStart,
        parent_scope: Option<Arc<HashMap<String, String>>>,
        (line, column): (usize, usize),
    ) -> ParseResult<XmlElement> {
        let mut scope = parent_scope.unwrap_or_default();
        let mut raw_attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let value = attr.unescape_value()?.into_owned();
            let key = attr.key.as_ref();
            if key == b"xmlns" {
                Arc::make_mut(&mut scope).insert(String::new(), value);
            } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                Arc::make_mut(&mut scope).insert(String::from_utf8_lossy(prefix).into_owned(), value);
            } else {
                raw_attributes.push((split_name(key), value));
            }
        }

        // unprefixed attributes are in no namespace, unprefixed elements in the default one
        let attributes = raw_attributes
            .into_iter()
            .map(|((prefix, name), value)| XmlAttribute {
                namespace: prefix.and_then(|p| scope.get(&p).cloned()),
                name,
                value,
            })
            .collect();

        let (prefix, name) = split_name(start.name().as_ref());
        let namespace = scope.get(prefix.as_deref().unwrap_or("")).cloned();

        Ok(XmlElement {
            namespace,
            name,
            attributes,
            nodes: Vec::new(),
            line,
            column,
            scope,
        })
    }

    fn push_text(&mut self, text: &str) {
        if let Some(XmlNode::Text(prev)) = self.nodes.last_mut() {
            prev.push_str(text);
        } else {
            self.nodes.push(XmlNode::Text(text.to_string()));
        }
    }

    /// `line L, column C` of the start tag.
    pub fn location(&self) -> String {
        format!("line {}, column {}", self.line, self.column)
    }

    pub fn is(&self, local: &str) -> bool {
        self.name == local
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.nodes.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == local)
    }

    /// First child element, if any.
    pub fn first_element(&self) -> Option<&XmlElement> {
        self.elements().next()
    }

    /// All child elements with the given local name.
    pub fn children<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |e| e.name == local)
    }

    /// Like [`XmlElement::child`] but a missing element is an error.
    pub fn require(&self, local: &str) -> ParseResult<&XmlElement> {
        self.child(local).ok_or_else(|| ParseError::Missing {
            element: local.to_string(),
            parent: self.name.clone(),
            location: self.location(),
        })
    }

    /// Direct text content, trimmed.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            if let XmlNode::Text(t) = node {
                out.push_str(t);
            }
        }
        out.trim().to_string()
    }

    /// Text of a child element, trimmed.
    pub fn child_text(&self, local: &str) -> Option<String> {
        self.child(local).map(XmlElement::text)
    }

    /// Attribute by local name, in any namespace.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == local)
            .map(|a| a.value.as_str())
    }

    /// Attribute by namespace and local name.
    pub fn attr_ns(&self, namespace: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == local && a.namespace.as_deref() == Some(namespace))
            .map(|a| a.value.as_str())
    }

    /// Whether this element or any descendant lives in `namespace`.
    pub fn has_descendant_in(&self, namespace: &str) -> bool {
        self.namespace.as_deref() == Some(namespace)
            || self.elements().any(|e| e.has_descendant_in(namespace))
    }

    /// Resolve a `prefix:local` text value against the namespaces in scope.
    pub fn resolve_qname(&self, text: &str) -> QName {
        let text = text.trim();
        if text.starts_with('{') {
            return QName::parse(text);
        }
        match text.split_once(':') {
            Some((prefix, local)) => match self.scope.get(prefix) {
                Some(ns) => QName::new(ns.clone(), local),
                None => QName::local(local),
            },
            None => match self.scope.get("") {
                Some(ns) => QName::new(ns.clone(), text),
                None => QName::local(text),
            },
        }
    }
}
