//! In-memory document model.
//!
//! An arena of elements rooted at `body`. Detached subtrees stay in the
//! arena so removal records can still be inspected. Structural changes
//! under the root are recorded as `MutationRecord`s, drained by the
//! page driver the way a subtree-wide mutation observer would see them.

use crate::error::{AnnotateError, AnnotateResult};
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Default)]
pub struct Element {
    tag: String,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    style: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Element {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// True when every class in `required` is present (extra classes allowed).
    pub fn has_all_classes<S: AsRef<str>>(&self, required: &[S]) -> bool {
        !required.is_empty() && required.iter().all(|c| self.has_class(c.as_ref()))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn style(&self, property: &str) -> Option<&str> {
        self.style.get(property).map(String::as_str)
    }

    /// Own text, excluding children.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Structural change under the document root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationRecord {
    Added { parent: NodeId, node: NodeId },
    Removed { parent: NodeId, node: NodeId },
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Element>,
    mutations: Vec<MutationRecord>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Element {
                tag: "body".to_string(),
                ..Element::default()
            }],
            mutations: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.push(Element {
            tag: tag.to_ascii_lowercase(),
            ..Element::default()
        });
        NodeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> Option<&Element> {
        self.nodes.get(id.0)
    }

    pub fn element(&self, id: NodeId) -> AnnotateResult<&Element> {
        self.get(id).ok_or(AnnotateError::NodeNotFound(id))
    }

    fn element_mut(&mut self, id: NodeId) -> AnnotateResult<&mut Element> {
        self.nodes
            .get_mut(id.0)
            .ok_or(AnnotateError::NodeNotFound(id))
    }

    /// Replace the class list with the whitespace-separated tokens of `class_name`.
    pub fn set_class_name(&mut self, id: NodeId, class_name: &str) -> AnnotateResult<()> {
        self.element_mut(id)?.classes = class_name.split_whitespace().map(str::to_string).collect();
        Ok(())
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> AnnotateResult<()> {
        self.element_mut(id)?
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> AnnotateResult<()> {
        self.element_mut(id)?.text = text.to_string();
        Ok(())
    }

    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) -> AnnotateResult<()> {
        self.element_mut(id)?
            .style
            .insert(property.to_string(), value.to_string());
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> AnnotateResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` into `parent` before `reference`, or at the end when
    /// `reference` is `None`. The child is detached from its old parent first.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> AnnotateResult<()> {
        self.element(parent)?;
        self.element(child)?;
        if child == self.root() || self.is_inclusive_ancestor(child, parent) {
            return Err(AnnotateError::Hierarchy(format!(
                "{child:?} cannot be inserted into {parent:?}"
            )));
        }
        if let Some(reference) = reference {
            if self.element(reference)?.parent != Some(parent) {
                return Err(AnnotateError::Hierarchy(format!(
                    "{reference:?} is not a child of {parent:?}"
                )));
            }
        }

        if self.element(child)?.parent.is_some() {
            self.remove(child)?;
        }

        let position = match reference {
            Some(reference) => self.nodes[parent.0]
                .children
                .iter()
                .position(|&c| c == reference)
                .unwrap_or(self.nodes[parent.0].children.len()),
            None => self.nodes[parent.0].children.len(),
        };
        self.nodes[parent.0].children.insert(position, child);
        self.nodes[child.0].parent = Some(parent);

        if self.is_connected(parent) {
            self.mutations.push(MutationRecord::Added { parent, node: child });
        }
        Ok(())
    }

    /// Insert `child` as the next sibling of `reference`.
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) -> AnnotateResult<()> {
        let parent = self.element(reference)?.parent.ok_or_else(|| {
            AnnotateError::Hierarchy(format!("{reference:?} has no parent"))
        })?;
        let next = {
            let siblings = &self.nodes[parent.0].children;
            siblings
                .iter()
                .position(|&c| c == reference)
                .and_then(|i| siblings.get(i + 1).copied())
        };
        self.insert_before(parent, child, next)
    }

    /// Detach `id` from its parent. The subtree stays readable.
    pub fn remove(&mut self, id: NodeId) -> AnnotateResult<()> {
        let Some(parent) = self.element(id)?.parent else {
            return Ok(());
        };
        let connected = self.is_connected(parent);
        self.nodes[parent.0].children.retain(|&c| c != id);
        self.nodes[id.0].parent = None;
        if connected {
            self.mutations.push(MutationRecord::Removed { parent, node: id });
        }
        Ok(())
    }

    /// Whether `id` is attached to the document root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.is_inclusive_ancestor(self.root(), id)
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.get(node).and_then(|e| e.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// Descendants of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.get(id) {
            Some(e) => e.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(node) = stack.pop() {
            out.push(node);
            if let Some(e) = self.get(node) {
                stack.extend(e.children.iter().rev().copied());
            }
        }
        out
    }

    /// Nearest ancestor-or-self satisfying `pred`.
    pub fn closest(&self, id: NodeId, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            let element = self.get(node)?;
            if pred(element) {
                return Some(node);
            }
            current = element.parent;
        }
        None
    }

    /// First descendant of `id` in document order satisfying `pred`.
    pub fn find_descendant(&self, id: NodeId, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|&node| self.get(node).is_some_and(&pred))
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(e) = self.get(id) {
            out.push_str(&e.text);
        }
        for node in self.descendants(id) {
            if let Some(e) = self.get(node) {
                out.push_str(&e.text);
            }
        }
        out
    }

    /// Serialized markup of `id` and its subtree.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Some(e) = self.get(id) else {
            return;
        };
        let _ = write!(out, "<{}", e.tag);
        if !e.classes.is_empty() {
            let _ = write!(out, " class=\"{}\"", e.classes.join(" "));
        }
        for (name, value) in &e.attributes {
            let _ = write!(out, " {name}=\"{value}\"");
        }
        if !e.style.is_empty() {
            let style: Vec<String> = e.style.iter().map(|(k, v)| format!("{k}: {v};")).collect();
            let _ = write!(out, " style=\"{}\"", style.join(" "));
        }
        out.push('>');
        out.push_str(&e.text);
        for &child in &e.children {
            self.write_html(child, out);
        }
        let _ = write!(out, "</{}>", e.tag);
    }

    /// Drain mutation records accumulated since the last call.
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    /// Create an element with classes and append it to `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        class_name: &str,
    ) -> AnnotateResult<NodeId> {
        let id = self.create_element(tag);
        self.set_class_name(id, class_name)?;
        self.append_child(parent, id)?;
        Ok(id)
    }
}
