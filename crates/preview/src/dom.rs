//! Arena-backed HTML document used by the preview sandbox.
//!
//! Nodes are never freed; detaching a node only unlinks it from its parent,
//! so a `NodeId` stays valid for the lifetime of the document.

use scraper::{Html, node::Node as ParsedNode};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "param", "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "iframe", "noembed", "noframes", "noscript", "plaintext", "script", "style", "xmp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    name: String,
    attrs: Vec<(String, String)>,
}

impl ElementData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
        }
    }

    /// Lowercase local name, e.g. `div`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uppercase tag name as reported to the host, e.g. `DIV`.
    pub fn tag_name(&self) -> String {
        self.name.to_ascii_uppercase()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(index).1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Doctype(String),
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// Parses a full document; missing `html`, `head` and `body` are synthesized.
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut document = Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
        };

        let root = document.root();
        let mut pending: Vec<_> = parsed.tree.root().children().map(|c| (c, root)).collect();
        pending.reverse();

        while let Some((source, parent)) = pending.pop() {
            let data = match source.value() {
                ParsedNode::Doctype(doctype) => NodeData::Doctype(doctype.name().to_string()),
                ParsedNode::Element(element) => NodeData::Element(ElementData {
                    name: element.name().to_string(),
                    attrs: element
                        .attrs()
                        .map(|(name, value)| (name.to_string(), value.to_string()))
                        .collect(),
                }),
                ParsedNode::Text(text) => NodeData::Text((**text).to_owned()),
                ParsedNode::Comment(comment) => NodeData::Comment((**comment).to_owned()),
                _ => continue,
            };
            let id = document.append(parent, data);
            let children: Vec<_> = source.children().collect();
            pending.extend(children.into_iter().rev().map(|child| (child, id)));
        }

        document
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes.get(id.0)?.data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(id.0)?.data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Appends a new node as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Unlinks a node (and its subtree) from the tree.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root() {
                return true;
            }
            match self.nodes.get(current.0).and_then(|node| node.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// The node itself followed by each of its ancestors.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), |current| self.parent(*current))
    }

    /// Nearest inclusive ancestor element with the given local name.
    pub fn closest(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.ancestors(id)
            .find(|node| self.element(*node).is_some_and(|el| el.name() == name))
    }

    /// Attached descendants of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    pub fn elements(&self) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|node| self.element(*node).is_some())
            .collect()
    }

    /// First element in document order with the given local name.
    pub fn find_first(&self, name: &str) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|node| self.element(*node).is_some_and(|el| el.name() == name))
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|node| self.attr(*node, "id") == Some(id))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(element) = self.element_mut(id) {
            element.set_attr(name, value);
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.element_mut(id)?.remove_attr(name)
    }

    pub fn style_property(&self, id: NodeId, property: &str) -> Option<String> {
        parse_declarations(self.attr(id, "style")?)
            .into_iter()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value)
    }

    /// Sets one inline style property; an empty value removes it.
    ///
    /// A `style` attribute emptied by a removal is dropped entirely.
    pub fn set_style_property(&mut self, id: NodeId, property: &str, value: &str) {
        let Some(element) = self.element_mut(id) else {
            return;
        };
        let mut declarations = element.attr("style").map(parse_declarations).unwrap_or_default();
        let existing = declarations.iter().position(|(name, _)| name == property);

        match (existing, value.trim().is_empty()) {
            (Some(index), true) => {
                declarations.remove(index);
            }
            (None, true) => return,
            (Some(index), false) => declarations[index].1 = value.trim().to_string(),
            (None, false) => declarations.push((property.to_string(), value.trim().to_string())),
        }

        if declarations.is_empty() {
            element.remove_attr("style");
        } else {
            element.set_attr("style", serialize_declarations(&declarations));
        }
    }

    /// Rendered text of a subtree, skipping script and style contents.
    pub fn inner_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            match self.data(node) {
                NodeData::Text(text) => out.push_str(text),
                NodeData::Element(el) if matches!(el.name(), "script" | "style") => {}
                _ => stack.extend(self.children(node).iter().rev()),
            }
        }
        out
    }

    /// Replaces all children of `id` with a single text node.
    pub fn set_inner_text(&mut self, id: NodeId, text: &str) {
        if self.element(id).is_none() {
            return;
        }
        for child in std::mem::take(&mut self.nodes[id.0].children) {
            self.nodes[child.0].parent = None;
        }
        if !text.is_empty() {
            self.append(id, NodeData::Text(text.to_string()));
        }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root()) {
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
            NodeData::Doctype(name) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            NodeData::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeData::Text(text) => {
                let raw = self
                    .parent(id)
                    .and_then(|parent| self.element(parent))
                    .is_some_and(|el| RAW_TEXT_ELEMENTS.contains(&el.name()));
                if raw {
                    out.push_str(text);
                } else {
                    escape_into(text, false, out);
                }
            }
            NodeData::Element(element) => {
                out.push('<');
                out.push_str(element.name());
                for (name, value) in element.attrs() {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&element.name()) {
                    return;
                }
                for child in self.children(id) {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(element.name());
                out.push('>');
            }
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

/// Splits an inline `style` attribute into `(property, value)` pairs.
///
/// Separators inside quotes, parentheses or after a backslash belong to the
/// value, so `url(data:...;base64,...)` and `content: "a;b"` stay whole.
pub fn parse_declarations(style: &str) -> Vec<(String, String)> {
    split_top_level(style, ';')
        .into_iter()
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            let name = name.trim();
            let value = value.trim();
            (!name.is_empty() && !value.is_empty()).then(|| (name.to_string(), value.to_string()))
        })
        .collect()
}

fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (index, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' | '\'' if quote == Some(c) => quote = None,
            _ if quote.is_some() => {}
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&text[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

pub fn serialize_declarations(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(name, value)| format!("{name}: {value};"))
        .collect::<Vec<_>>()
        .join(" ")
}
