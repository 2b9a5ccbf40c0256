//! A small, lenient HTML tree used by the composition engine.
//!
//! Layout composition moves whole subtrees between documents: a page's area
//! content replaces a layout's area content, a component's markup replaces
//! its host element. Doing that on strings breaks as soon as areas nest or
//! repeat a tag name, so composition works on this tree instead.
//!
//! # Model
//!
//! A [`Document`] is an arena of nodes addressed by [`NodeId`]. Node `0` is
//! the document root. Detached nodes stay in the arena; they are simply no
//! longer reachable from the root.
//!
//! # Parsing
//!
//! The parser is forgiving and structure-preserving, not a full HTML5
//! tree builder:
//!
//! - no implied `<html>`/`<head>`/`<body>` are inserted, so fragments parse
//!   as fragments;
//! - attribute values and text are kept verbatim (entities are not decoded),
//!   so serialization reproduces the author's markup;
//! - `script`, `style`, `textarea` and `title` content is raw text;
//! - void elements never take children, and an unmatched end tag is ignored;
//! - sibling `li`, `p`, `option`, `dt`/`dd` and table cells/rows close the
//!   previous open one.

use std::fmt::Write as _;

/// Handle to a node inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// `None` for boolean attributes written without a value.
    pub value: Option<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name.
    pub name: String,
    pub attrs: Vec<Attribute>,
    /// Written as `<x ... />` in the source.
    pub self_closing: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            attrs: Vec::new(),
            self_closing: false,
        }
    }

    /// Attribute value; boolean attributes read as `""`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_deref().unwrap_or(""))
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }

    /// Set an attribute, keeping its position if it already exists.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = Some(value.into());
        match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attrs.push(Attribute {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attrs.len();
        self.attrs.retain(|a| a.name != name);
        self.attrs.len() != before
    }

    /// Whitespace-separated entries of the `class` attribute.
    pub fn classes(&self) -> Vec<&str> {
        self.attr("class")
            .map(|c| c.split_ascii_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().contains(&class)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Doctype(String),
    Comment(String),
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Tags that implicitly close an open sibling of the same group.
const AUTO_CLOSE_GROUPS: &[&[&str]] = &[
    &["li"],
    &["p"],
    &["option"],
    &["dt", "dd"],
    &["td", "th"],
    &["tr"],
];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document holding only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn parse(html: &str) -> Self {
        Parser::new(html).run()
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    // =========================================================================
    // Node access
    // =========================================================================

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0].data
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn is_element_named(&self, id: NodeId, name: &str) -> bool {
        self.element(id).is_some_and(|el| el.name == name)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Whether `id` is still reachable from the document root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root() {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// All nodes below `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Element descendants of `id` in document order.
    pub fn elements(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|n| self.element(*n).is_some())
            .collect()
    }

    /// First element below `id` matching `pred`.
    pub fn find(&self, id: NodeId, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|n| self.element(*n).is_some_and(&pred))
    }

    /// First element in the whole document with tag `name`.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.find(self.root(), |el| el.name == name)
    }

    // =========================================================================
    // Tree mutation
    // =========================================================================

    pub fn create(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    pub fn create_element(&mut self, element: Element) -> NodeId {
        self.create(NodeData::Element(element))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.create(NodeData::Text(text.into()))
    }

    /// Remove `id` from its parent. The node keeps its own subtree.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(0, child);
    }

    /// Detach every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    /// Replace `target` with `replacements`, in order, at the same position.
    pub fn replace_with(&mut self, target: NodeId, replacements: &[NodeId]) {
        let Some(parent) = self.parent(target) else {
            return;
        };
        for r in replacements {
            self.detach(*r);
        }
        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == target)
            .unwrap_or(0);
        self.nodes[parent.0]
            .children
            .splice(position..=position, replacements.iter().copied());
        self.nodes[target.0].parent = None;
        for r in replacements {
            self.nodes[r.0].parent = Some(parent);
        }
    }

    /// Deep-copy `node` (and its subtree) from `other` into this document.
    /// The copy is detached; attach it with [`append_child`](Self::append_child).
    pub fn import(&mut self, other: &Document, node: NodeId) -> NodeId {
        let copy = self.create(other.data(node).clone());
        for child in other.children(node) {
            let child_copy = self.import(other, *child);
            self.nodes[child_copy.0].parent = Some(copy);
            self.nodes[copy.0].children.push(child_copy);
        }
        copy
    }

    /// Replace the children of `target` with copies of the children of
    /// `source` in `other`.
    pub fn replace_children_from(&mut self, target: NodeId, other: &Document, source: NodeId) {
        self.clear_children(target);
        for child in other.children(source) {
            let copy = self.import(other, *child);
            self.append_child(target, copy);
        }
    }

    /// Remove `name` from every element in the document.
    pub fn strip_attribute(&mut self, name: &str) {
        for node in &mut self.nodes {
            if let NodeData::Element(el) = &mut node.data {
                el.remove_attr(name);
            }
        }
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    pub fn to_html(&self) -> String {
        self.inner_html(self.root())
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_node(*child, &mut out);
        }
        out
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match self.data(id) {
            NodeData::Document => {
                for child in self.children(id) {
                    self.write_node(*child, out);
                }
            }
            NodeData::Doctype(text) => {
                let _ = write!(out, "<!{}>", text);
            }
            NodeData::Comment(text) => {
                let _ = write!(out, "<!--{}-->", text);
            }
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for attr in &el.attrs {
                    out.push(' ');
                    out.push_str(&attr.name);
                    if let Some(value) = &attr.value {
                        let _ = write!(out, "=\"{}\"", value.replace('"', "&quot;"));
                    }
                }
                let children = self.children(id);
                if is_void_element(&el.name) {
                    out.push_str(if el.self_closing { " />" } else { ">" });
                    return;
                }
                if el.self_closing && children.is_empty() {
                    out.push_str(" />");
                    return;
                }
                out.push('>');
                for child in children {
                    self.write_node(*child, out);
                }
                let _ = write!(out, "</{}>", el.name);
            }
        }
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    doc: Document,
    open: Vec<NodeId>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            doc: Document::new(),
            open: Vec::new(),
        }
    }

    fn run(mut self) -> Document {
        while self.pos < self.src.len() {
            let rest = &self.src[self.pos..];
            if rest.starts_with("<!--") {
                self.comment();
            } else if rest.starts_with("</") && starts_tag_name(&rest[2..]) {
                self.end_tag();
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.doctype();
            } else if rest.starts_with('<') && starts_tag_name(&rest[1..]) {
                self.start_tag();
            } else {
                self.text();
            }
        }
        self.doc
    }

    fn current_parent(&self) -> NodeId {
        self.open.last().copied().unwrap_or(self.doc.root())
    }

    fn append(&mut self, data: NodeData) -> NodeId {
        let id = self.doc.create(data);
        let parent = self.current_parent();
        self.doc.append_child(parent, id);
        id
    }

    fn text(&mut self) {
        let rest = &self.src[self.pos..];
        // Skip the leading '<' when it does not open a tag.
        let search_from = usize::from(rest.starts_with('<'));
        let end = rest[search_from..]
            .find('<')
            .map(|i| i + search_from)
            .unwrap_or(rest.len());
        let text = &rest[..end];
        self.pos += end;
        self.append_text(text);
    }

    fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let parent = self.current_parent();
        if let Some(last) = self.doc.children(parent).last().copied()
            && let NodeData::Text(existing) = &mut self.doc.nodes[last.0].data
        {
            existing.push_str(text);
            return;
        }
        self.append(NodeData::Text(text.to_string()));
    }

    fn comment(&mut self) {
        let body_start = self.pos + 4;
        let (body, next) = match self.src[body_start..].find("-->") {
            Some(i) => (&self.src[body_start..body_start + i], body_start + i + 3),
            None => (&self.src[body_start..], self.src.len()),
        };
        self.pos = next;
        self.append(NodeData::Comment(body.to_string()));
    }

    fn doctype(&mut self) {
        let body_start = self.pos + 2;
        let (body, next) = match self.src[body_start..].find('>') {
            Some(i) => (&self.src[body_start..body_start + i], body_start + i + 1),
            None => (&self.src[body_start..], self.src.len()),
        };
        let marker = &self.src[self.pos + 1..self.pos + 2];
        self.pos = next;
        if marker == "?" {
            // Processing instructions survive as comments-like text.
            self.append_text(&format!("<?{}>", body));
        } else {
            self.append(NodeData::Doctype(body.to_string()));
        }
    }

    fn end_tag(&mut self) {
        let start = self.pos + 2;
        let name_len = tag_name_len(&self.src[start..]);
        let name = self.src[start..start + name_len].to_ascii_lowercase();
        self.pos = match self.src[start..].find('>') {
            Some(i) => start + i + 1,
            None => self.src.len(),
        };
        if let Some(index) = self
            .open
            .iter()
            .rposition(|id| self.doc.is_element_named(*id, &name))
        {
            self.open.truncate(index);
        }
    }

    fn start_tag(&mut self) {
        let start = self.pos + 1;
        let name_len = tag_name_len(&self.src[start..]);
        let name = self.src[start..start + name_len].to_ascii_lowercase();
        self.pos = start + name_len;

        let mut element = Element::new(&name);
        self.attributes(&mut element);

        let self_closing = element.self_closing;
        self.auto_close(&name);
        let id = self.append(NodeData::Element(element));

        if is_void_element(&name) || self_closing {
            return;
        }
        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            self.raw_text(id, &name);
            return;
        }
        self.open.push(id);
    }

    fn auto_close(&mut self, name: &str) {
        let Some(group) = AUTO_CLOSE_GROUPS.iter().find(|g| g.contains(&name)) else {
            return;
        };
        if let Some(top) = self.open.last().copied()
            && self
                .doc
                .element(top)
                .is_some_and(|el| group.contains(&el.name.as_str()))
        {
            self.open.pop();
        }
    }

    fn raw_text(&mut self, id: NodeId, name: &str) {
        let rest = &self.src[self.pos..];
        let closing = format!("</{}", name);
        let end = find_ascii_case_insensitive(rest, &closing).unwrap_or(rest.len());
        let text = &rest[..end];
        if !text.is_empty() {
            let text_id = self.doc.create_text(text);
            self.doc.append_child(id, text_id);
        }
        self.pos += end;
        if self.pos < self.src.len() {
            self.pos = match self.src[self.pos..].find('>') {
                Some(i) => self.pos + i + 1,
                None => self.src.len(),
            };
        }
    }

    fn attributes(&mut self, element: &mut Element) {
        let bytes = self.src.as_bytes();
        loop {
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos >= bytes.len() {
                return;
            }
            match bytes[self.pos] {
                b'>' => {
                    self.pos += 1;
                    return;
                }
                b'/' => {
                    self.pos += 1;
                    if bytes.get(self.pos) == Some(&b'>') {
                        element.self_closing = true;
                        self.pos += 1;
                        return;
                    }
                    continue;
                }
                _ => {}
            }

            let name_start = self.pos;
            while self.pos < bytes.len()
                && !bytes[self.pos].is_ascii_whitespace()
                && !matches!(bytes[self.pos], b'=' | b'>')
                && !(bytes[self.pos] == b'/' && bytes.get(self.pos + 1) == Some(&b'>'))
            {
                self.pos += 1;
            }
            let name = self.src[name_start..self.pos].to_ascii_lowercase();

            while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            let value = if bytes.get(self.pos) == Some(&b'=') {
                self.pos += 1;
                while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
                    self.pos += 1;
                }
                Some(self.attribute_value())
            } else {
                None
            };

            if !name.is_empty() && !element.has_attr(&name) {
                element.attrs.push(Attribute { name, value });
            }
        }
    }

    fn attribute_value(&mut self) -> String {
        let bytes = self.src.as_bytes();
        match bytes.get(self.pos) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let start = self.pos + 1;
                let end = self.src[start..]
                    .find(quote as char)
                    .map(|i| start + i)
                    .unwrap_or(self.src.len());
                self.pos = (end + 1).min(self.src.len());
                let raw = &self.src[start..end];
                // Single-quoted values may legitimately contain '"'.
                if quote == b'\'' {
                    raw.replace('"', "&quot;")
                } else {
                    raw.to_string()
                }
            }
            _ => {
                let start = self.pos;
                while self.pos < bytes.len()
                    && !bytes[self.pos].is_ascii_whitespace()
                    && bytes[self.pos] != b'>'
                {
                    self.pos += 1;
                }
                self.src[start..self.pos].to_string()
            }
        }
    }
}

fn starts_tag_name(rest: &str) -> bool {
    rest.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

fn tag_name_len(rest: &str) -> usize {
    rest.find(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len())
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}
