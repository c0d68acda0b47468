//! In-memory document tree.
//!
//! An arena of nodes addressed by [`NodeId`]. It offers the small set of
//! operations the renderer needs: create, insert relative to a sibling,
//! remove, query structure, and serialize. Removing a node only detaches it,
//! so a detached subtree can be inserted again later. [`Document::release`]
//! frees a subtree for reuse; ids pointing into it go stale and every
//! operation on a stale id does nothing.
//!
//! Inserting a [`NodeKind::Fragment`] moves its children instead of the
//! fragment itself, leaving the fragment empty.

mod events;

pub use events::{Event, Listener, ListenerId, next_listener_id};

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::value::Value;
use events::ListenerRegistry;

/// Handle to a node in a [`Document`].
///
/// Carries the generation of its arena slot, so an id kept after
/// [`Document::release`] never aliases a node created later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(String),
    Text,
    Comment,
    Fragment,
}

struct NodeData {
    kind: NodeKind,
    /// Content of text and comment nodes.
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<(String, String)>,
    properties: BTreeMap<String, Value>,
}

impl NodeData {
    fn new(kind: NodeKind, text: String) -> Self {
        Self {
            kind,
            text,
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Copy)]
enum Position {
    End,
    Before(NodeId),
    After(NodeId),
}

struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

struct Tree {
    slots: Vec<Slot>,
    /// Indices of released slots, reused before the arena grows.
    free: Vec<usize>,
    live: usize,
    body: NodeId,
}

impl Tree {
    fn new() -> Self {
        let mut tree = Tree {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            body: NodeId {
                index: 0,
                generation: 0,
            },
        };
        tree.body = tree.push(NodeData::new(NodeKind::Element("body".into()), String::new()));
        tree
    }

    fn push(&mut self, node: NodeData) -> NodeId {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.data = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    data: Some(node),
                });
                NodeId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut())
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|data| data.parent)
    }

    fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map_or(&[], |data| data.children.as_slice())
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.get(node).map(|_| node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    fn detach(&mut self, node: NodeId) {
        let parent = self.get_mut(node).and_then(|data| data.parent.take());
        if let Some(parent) = parent
            && let Some(data) = self.get_mut(parent)
        {
            data.children.retain(|&c| c != node);
        }
    }

    fn insert(&mut self, parent: NodeId, position: Position, node: NodeId) -> bool {
        let (Some(_), Some(moved)) = (self.get(parent), self.get(node)) else {
            return false;
        };
        let moving = if moved.kind == NodeKind::Fragment {
            moved.children.clone()
        } else {
            vec![node]
        };

        if let Position::Before(reference) | Position::After(reference) = position
            && moving.contains(&reference)
        {
            // Placing a node next to itself leaves it where it is.
            return moving.len() == 1;
        }
        if moving.contains(&self.body) || moving.iter().any(|&m| self.contains(m, parent)) {
            return false;
        }

        for &m in &moving {
            self.detach(m);
        }

        let children = self.children(parent);
        let mut index = match position {
            Position::End => children.len(),
            Position::Before(reference) => match children.iter().position(|&c| c == reference) {
                Some(i) => i,
                None => return false,
            },
            Position::After(reference) => match children.iter().position(|&c| c == reference) {
                Some(i) => i + 1,
                None => return false,
            },
        };

        for m in moving {
            if let Some(data) = self.get_mut(parent) {
                data.children.insert(index, m);
            }
            if let Some(data) = self.get_mut(m) {
                data.parent = Some(parent);
            }
            index += 1;
        }
        true
    }

    /// Free `node` and its subtree. Returns the ids that went stale.
    fn release(&mut self, node: NodeId) -> Vec<NodeId> {
        if node == self.body || self.get(node).is_none() {
            return Vec::new();
        }
        self.detach(node);

        let mut freed = Vec::new();
        let mut pending = vec![node];
        while let Some(id) = pending.pop() {
            let slot = &mut self.slots[id.index];
            if slot.generation != id.generation {
                continue;
            }
            if let Some(data) = slot.data.take() {
                slot.generation = slot.generation.wrapping_add(1);
                pending.extend(data.children);
                self.free.push(id.index);
                self.live -= 1;
                freed.push(id);
            }
        }
        freed
    }
}

/// An in-memory document with a `<body>` root.
///
/// Cloning yields another handle to the same document.
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

struct DocumentInner {
    tree: RefCell<Tree>,
    listeners: RefCell<ListenerRegistry>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DocumentInner {
                tree: RefCell::new(Tree::new()),
                listeners: RefCell::new(ListenerRegistry::default()),
            }),
        }
    }

    /// The root element.
    pub fn body(&self) -> NodeId {
        self.inner.tree.borrow().body
    }

    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A handle that does not keep the document alive.
    pub fn downgrade(&self) -> WeakDocument {
        WeakDocument {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.create(NodeKind::Element(tag.to_owned()), String::new())
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.create(NodeKind::Text, text.to_owned())
    }

    pub fn create_comment(&self, text: &str) -> NodeId {
        self.create(NodeKind::Comment, text.to_owned())
    }

    pub fn create_fragment(&self) -> NodeId {
        self.create(NodeKind::Fragment, String::new())
    }

    fn create(&self, kind: NodeKind, text: String) -> NodeId {
        self.inner.tree.borrow_mut().push(NodeData::new(kind, text))
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Append `node` as the last child of `parent`.
    ///
    /// Returns `false` when the insertion would make a node its own ancestor.
    pub fn append(&self, parent: NodeId, node: NodeId) -> bool {
        self.inner
            .tree
            .borrow_mut()
            .insert(parent, Position::End, node)
    }

    /// Insert `node` immediately before `reference`.
    ///
    /// Returns `false` when `reference` has no parent or on a cycle.
    pub fn insert_before(&self, reference: NodeId, node: NodeId) -> bool {
        self.insert_relative(reference, node, Position::Before(reference))
    }

    /// Insert `node` immediately after `reference`.
    pub fn insert_after(&self, reference: NodeId, node: NodeId) -> bool {
        self.insert_relative(reference, node, Position::After(reference))
    }

    fn insert_relative(&self, reference: NodeId, node: NodeId, position: Position) -> bool {
        let mut tree = self.inner.tree.borrow_mut();
        match tree.parent(reference) {
            Some(parent) => tree.insert(parent, position, node),
            None => false,
        }
    }

    /// Detach `node` from its parent. Returns whether it had one.
    pub fn remove(&self, node: NodeId) -> bool {
        let mut tree = self.inner.tree.borrow_mut();
        let had_parent = tree.parent(node).is_some();
        tree.detach(node);
        had_parent
    }

    /// Free `node` and its subtree, dropping their listeners. Returns how
    /// many nodes were freed.
    ///
    /// The body and stale ids are left alone.
    pub fn release(&self, node: NodeId) -> usize {
        let freed = self.inner.tree.borrow_mut().release(node);
        if freed.is_empty() {
            return 0;
        }
        let dropped = self.inner.listeners.borrow_mut().remove_nodes(&freed);
        drop(dropped);
        freed.len()
    }

    /// Whether `node` still refers to a node of this document.
    pub fn is_live(&self, node: NodeId) -> bool {
        self.inner.tree.borrow().get(node).is_some()
    }

    /// Number of nodes currently allocated, detached ones included.
    pub fn node_count(&self) -> usize {
        self.inner.tree.borrow().live
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.tree.borrow().parent(node)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner.tree.borrow().children(node).to_vec()
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.inner.tree.borrow().children(node).first().copied()
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.sibling(node, 1)
    }

    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.sibling(node, -1)
    }

    fn sibling(&self, node: NodeId, offset: isize) -> Option<NodeId> {
        let tree = self.inner.tree.borrow();
        let parent = tree.parent(node)?;
        let siblings = tree.children(parent);
        let index = siblings.iter().position(|&c| c == node)?;
        let target = index.checked_add_signed(offset)?;
        siblings.get(target).copied()
    }

    /// Whether `node` is `ancestor` or one of its descendants.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.inner.tree.borrow().contains(ancestor, node)
    }

    /// Whether `node` is attached under the body.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.contains(self.body(), node)
    }

    // ------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------

    /// Kind of `node`, `None` once released.
    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.inner.tree.borrow().get(node).map(|data| data.kind.clone())
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        match self.inner.tree.borrow().get(node).map(|data| &data.kind) {
            Some(NodeKind::Element(tag)) => Some(tag.clone()),
            _ => None,
        }
    }

    /// Content of a text or comment node.
    pub fn text(&self, node: NodeId) -> String {
        self.inner
            .tree
            .borrow()
            .get(node)
            .map(|data| data.text.clone())
            .unwrap_or_default()
    }

    pub fn set_text(&self, node: NodeId, text: &str) {
        let mut tree = self.inner.tree.borrow_mut();
        if let Some(data) = tree.get_mut(node)
            && data.text != text
        {
            data.text = text.to_owned();
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner
            .tree
            .borrow()
            .get(node)?
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut tree = self.inner.tree.borrow_mut();
        let Some(data) = tree.get_mut(node) else { return };
        match data.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value.to_owned(),
            None => data.attributes.push((name.to_owned(), value.to_owned())),
        }
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) -> bool {
        let mut tree = self.inner.tree.borrow_mut();
        let Some(data) = tree.get_mut(node) else {
            return false;
        };
        let before = data.attributes.len();
        data.attributes.retain(|(n, _)| n != name);
        data.attributes.len() != before
    }

    /// A live property of an element (`value`, `checked`, ...). Unset if
    /// never assigned.
    pub fn property(&self, node: NodeId, name: &str) -> Value {
        self.inner
            .tree
            .borrow()
            .get(node)
            .and_then(|data| data.properties.get(name).cloned())
            .unwrap_or_default()
    }

    pub fn set_property(&self, node: NodeId, name: &str, value: Value) {
        if let Some(data) = self.inner.tree.borrow_mut().get_mut(node) {
            data.properties.insert(name.to_owned(), value);
        }
    }

    /// Concatenated text of every text node under `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        let tree = self.inner.tree.borrow();
        let mut out = String::new();
        collect_text(&tree, node, &mut out);
        out
    }

    /// Serialize `node` and its subtree.
    pub fn to_html(&self, node: NodeId) -> String {
        let tree = self.inner.tree.borrow();
        let mut out = String::new();
        write_html(&tree, node, &mut out);
        out
    }

    /// Serialize the children of `node`.
    pub fn inner_html(&self, node: NodeId) -> String {
        let tree = self.inner.tree.borrow();
        let mut out = String::new();
        for &child in tree.children(node) {
            write_html(&tree, child, &mut out);
        }
        out
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Register `listener` for `event` on `node`.
    pub fn add_listener(
        &self,
        node: NodeId,
        event: &str,
        listener: impl Fn(&Event) + 'static,
    ) -> ListenerId {
        self.inner
            .listeners
            .borrow_mut()
            .add(node, event, Rc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self.inner.listeners.borrow_mut().remove(id);
        removed.is_some()
    }

    /// Deliver `event` to the listeners of `node`. Returns how many ran.
    pub fn dispatch(&self, node: NodeId, event: &str, detail: Value) -> usize {
        let listeners = self.inner.listeners.borrow().matching(node, event);
        let event = Event {
            name: event.to_owned(),
            target: node,
            detail,
        };
        for listener in &listeners {
            listener(&event);
        }
        listeners.len()
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.inner.listeners.borrow().count_for(node)
    }

    /// Number of listeners registered anywhere in the document.
    pub fn total_listeners(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

/// Non-owning handle to a [`Document`], held by callbacks the document
/// itself may end up owning.
#[derive(Clone)]
pub struct WeakDocument {
    inner: Weak<DocumentInner>,
}

impl WeakDocument {
    pub fn upgrade(&self) -> Option<Document> {
        self.inner.upgrade().map(|inner| Document { inner })
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.node_count())
            .finish()
    }
}

fn collect_text(tree: &Tree, node: NodeId, out: &mut String) {
    let Some(data) = tree.get(node) else { return };
    match data.kind {
        NodeKind::Text => out.push_str(&data.text),
        NodeKind::Comment => {}
        NodeKind::Element(_) | NodeKind::Fragment => {
            for &child in &data.children {
                collect_text(tree, child, out);
            }
        }
    }
}

fn write_html(tree: &Tree, node: NodeId, out: &mut String) {
    let Some(data) = tree.get(node) else { return };
    match &data.kind {
        NodeKind::Text => out.push_str(&html_escape(&data.text)),
        NodeKind::Comment => {
            out.push_str("<!--");
            out.push_str(&data.text);
            out.push_str("-->");
        }
        NodeKind::Fragment => {
            for &child in &data.children {
                write_html(tree, child, out);
            }
        }
        NodeKind::Element(tag) => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in &data.attributes {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&html_escape(value));
                out.push('"');
            }
            out.push('>');
            for &child in &data.children {
                write_html(tree, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

/// Escape HTML special characters in text and attribute values.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_serialize() {
        let doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(div, "class", "a \"b\"");
        let text = doc.create_text("1 < 2");
        doc.append(div, text);
        doc.append(doc.body(), div);

        assert_eq!(
            doc.inner_html(doc.body()),
            "<div class=\"a &quot;b&quot;\">1 &lt; 2</div>"
        );
        assert_eq!(doc.text_content(doc.body()), "1 < 2");
        assert!(doc.is_connected(text));
    }

    #[test]
    fn test_relative_insertion() {
        let doc = Document::new();
        let body = doc.body();
        let a = doc.create_text("a");
        let c = doc.create_text("c");
        doc.append(body, a);
        doc.append(body, c);

        let b = doc.create_text("b");
        assert!(doc.insert_after(a, b));
        let z = doc.create_text("z");
        assert!(doc.insert_before(a, z));

        assert_eq!(doc.text_content(body), "zabc");
        assert_eq!(doc.next_sibling(a), Some(b));
        assert_eq!(doc.previous_sibling(a), Some(z));
        assert_eq!(doc.previous_sibling(z), None);
    }

    #[test]
    fn test_fragment_moves_children() {
        let doc = Document::new();
        let fragment = doc.create_fragment();
        let x = doc.create_text("x");
        let y = doc.create_text("y");
        doc.append(fragment, x);
        doc.append(fragment, y);

        doc.append(doc.body(), fragment);

        assert!(doc.children(fragment).is_empty());
        assert_eq!(doc.children(doc.body()), vec![x, y]);
        assert_eq!(doc.parent(x), Some(doc.body()));
    }

    #[test]
    fn test_moving_within_same_parent() {
        let doc = Document::new();
        let body = doc.body();
        let nodes: Vec<_> = ["a", "b", "c"].iter().map(|t| doc.create_text(t)).collect();
        for &n in &nodes {
            doc.append(body, n);
        }

        assert!(doc.insert_after(nodes[2], nodes[0]));
        assert_eq!(doc.text_content(body), "bca");
        assert!(doc.insert_before(nodes[1], nodes[1]));
        assert_eq!(doc.text_content(body), "bca");
    }

    #[test]
    fn test_cycles_are_refused() {
        let doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("span");
        doc.append(outer, inner);

        assert!(!doc.append(inner, outer));
        assert!(!doc.append(outer, outer));
        assert_eq!(doc.parent(outer), None);
    }

    #[test]
    fn test_remove_detaches() {
        let doc = Document::new();
        let node = doc.create_element("p");
        doc.append(doc.body(), node);
        assert!(doc.remove(node));
        assert!(!doc.remove(node));
        assert_eq!(doc.inner_html(doc.body()), "");
        assert!(!doc.insert_after(node, doc.create_text("orphan")));
    }

    #[test]
    fn test_properties_and_attributes() {
        let doc = Document::new();
        let input = doc.create_element("input");
        assert!(doc.property(input, "value").is_unset());
        doc.set_property(input, "value", Value::from("hi"));
        assert_eq!(doc.property(input, "value"), Value::from("hi"));

        doc.set_attribute(input, "type", "text");
        doc.set_attribute(input, "type", "checkbox");
        assert_eq!(doc.attribute(input, "type").as_deref(), Some("checkbox"));
        assert!(doc.remove_attribute(input, "type"));
        assert_eq!(doc.to_html(input), "<input></input>");
    }

    #[test]
    fn test_release_frees_subtree() {
        let doc = Document::new();
        let before = doc.node_count();
        let div = doc.create_element("div");
        let text = doc.create_text("gone");
        doc.append(div, text);
        doc.append(doc.body(), div);
        assert_eq!(doc.node_count(), before + 2);

        assert_eq!(doc.release(div), 2);
        assert_eq!(doc.node_count(), before);
        assert_eq!(doc.inner_html(doc.body()), "");
        assert!(!doc.is_live(text));
    }

    #[test]
    fn test_stale_ids_are_inert() {
        let doc = Document::new();
        let old = doc.create_text("old");
        doc.release(old);

        let reused = doc.create_text("new");
        assert_ne!(old, reused);
        assert!(!doc.append(doc.body(), old));
        assert_eq!(doc.text(old), "");
        doc.set_text(old, "ghost");
        assert_eq!(doc.text(reused), "new");
        assert_eq!(doc.kind(old), None);
        assert_eq!(doc.release(old), 0);
    }

    #[test]
    fn test_body_is_never_released() {
        let doc = Document::new();
        assert_eq!(doc.release(doc.body()), 0);
        assert!(doc.is_live(doc.body()));
    }

    #[test]
    fn test_node_count_is_stable_across_churn() {
        let doc = Document::new();
        let baseline = doc.node_count();
        for i in 0..1000 {
            let node = doc.create_element("li");
            doc.append(node, doc.create_text(&i.to_string()));
            doc.append(doc.body(), node);
            doc.release(node);
        }
        assert_eq!(doc.node_count(), baseline);
    }
}
