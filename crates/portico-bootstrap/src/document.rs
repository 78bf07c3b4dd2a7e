//! In-memory document tree the shell is mounted into.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Mutations follow
//! DOM semantics: inserting a node that already has a parent moves it.

use std::fmt;

use crate::error::{BootstrapError, BootstrapResult};
use crate::markup::Element;

/// Handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    /// Opaque markup mounted from a rendered fragment.
    Fragment(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed document tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new("body")
    }
}

impl Document {
    /// Create a document with a single root element.
    pub fn new(root_tag: &str) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        doc.root = doc.create_element(root_tag);
        doc
    }

    /// `<body>` holding an empty `<div id="{anchor_id}">`.
    pub fn with_anchor(anchor_id: &str) -> Self {
        let mut doc = Self::default();
        let anchor = doc.create_element("div");
        doc.set_attribute(anchor, "id", anchor_id);
        let root = doc.root;
        doc.nodes[root.0].children.push(anchor);
        doc.nodes[anchor.0].parent = Some(root);
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes ever created, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    /// Create a node carrying an extracted fragment element.
    pub fn create_fragment(&mut self, element: Element) -> NodeId {
        self.push(NodeKind::Fragment(element))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> BootstrapResult<&Node> {
        self.nodes.get(id.0).ok_or_else(|| BootstrapError::Document {
            message: format!("unknown node {:?}", id),
        })
    }

    /// Set or replace an attribute on an element node.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(Node {
            kind: NodeKind::Element { attributes, .. },
            ..
        }) = self.nodes.get_mut(node.0)
        {
            let name = name.to_ascii_lowercase();
            match attributes.iter_mut().find(|(k, _)| *k == name) {
                Some((_, v)) => *v = value.to_string(),
                None => attributes.push((name, value.to_string())),
            }
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            NodeKind::Fragment(element) => element.attribute(name),
            NodeKind::Text(_) => None,
        }
    }

    /// Tag name of an element or fragment node.
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Fragment(element) => Some(element.tag()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0)?.parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node.0)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }

    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|c| *c == node)?;
        index.checked_sub(1).map(|i| siblings[i])
    }

    /// Whether `node` is `ancestor` or lies beneath it.
    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Connected element with the given `id` attribute, in tree order.
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            if self.attribute(node, "id") == Some(id) {
                return Some(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        None
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> BootstrapResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `node` into `parent` before `reference`, or last when `reference` is `None`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> BootstrapResult<()> {
        if !matches!(self.node(parent)?.kind, NodeKind::Element { .. }) {
            return Err(BootstrapError::Document {
                message: format!("node {:?} cannot have children", parent),
            });
        }
        self.node(node)?;
        if self.is_inclusive_ancestor(node, parent) {
            return Err(BootstrapError::Document {
                message: format!("inserting {:?} into {:?} would create a cycle", node, parent),
            });
        }
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(BootstrapError::Document {
                    message: format!("{:?} is not a child of {:?}", reference, parent),
                });
            }
            if reference == node {
                return Ok(());
            }
        }

        self.detach(node);

        let children = &mut self.nodes[parent.0].children;
        let index = match reference {
            Some(reference) => children
                .iter()
                .position(|c| *c == reference)
                .unwrap_or(children.len()),
            None => children.len(),
        };
        children.insert(index, node);
        self.nodes[node.0].parent = Some(parent);
        Ok(())
    }

    /// Remove `node` from its parent. Its subtree stays intact.
    pub fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        self.nodes[parent.0].children.retain(|c| *c != node);
        self.nodes[node.0].parent = None;
    }

    /// Serialize the subtree rooted at `node`.
    pub fn render_node(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    fn write_node(&self, node: NodeId, out: &mut String) {
        let Some(n) = self.nodes.get(node.0) else {
            return;
        };
        match &n.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Fragment(element) => out.push_str(element.outer_html()),
            NodeKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&value.replace('"', "&quot;"));
                    out.push('"');
                }
                out.push('>');
                for child in &n.children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_node(self.root))
    }
}
