//! Mount points: named slots holding child components.
//!
//! Each slot has a fixed anchor node. Every occupant is laid out as
//! `[root node, placeholder]`. A single mount point keeps its occupant right
//! before the anchor. List occupants follow the anchor: a new placeholder is
//! inserted after the anchor or after the previous occupant's placeholder,
//! and its root node joins it at the next flush. Positions therefore stay
//! right even while earlier occupants are still waiting for their own patch.
//!
//! Every operation here runs under one scheduler bracket and changes only
//! what it must: occupants that stay are never unmounted. Incoming items are
//! checked before anything is unmounted, so a rejected batch leaves the
//! mount point as it was.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::ast::MountKind;
use crate::component::Component;
use crate::dom::NodeId;
use crate::error::{Error, Result};
use crate::value::Value;

/// Anything a mount point accepts.
pub enum Renderable {
    Component(Component),
    /// A foreign node, wrapped in a component on mount.
    Node(NodeId),
    /// Plain text, wrapped in a text component on mount.
    Text(String),
    /// Clears a single mount point.
    Empty,
}

impl Renderable {
    /// Turn the value into a component, or `None` for [`Renderable::Empty`].
    pub fn coerce(self, owner: &Component) -> Result<Option<Component>> {
        let universe = owner.universe();
        match self {
            Renderable::Component(component) => Ok(Some(component)),
            Renderable::Node(node) => Component::wrap_node(universe, node).map(Some),
            Renderable::Text(text) => Component::text_fragment(universe, &text).map(Some),
            Renderable::Empty => Ok(None),
        }
    }
}

impl fmt::Debug for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Renderable::Component(component) => f.debug_tuple("Component").field(component).finish(),
            Renderable::Node(node) => f.debug_tuple("Node").field(node).finish(),
            Renderable::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Renderable::Empty => f.write_str("Empty"),
        }
    }
}

impl From<Component> for Renderable {
    fn from(component: Component) -> Self {
        Renderable::Component(component)
    }
}

impl From<&Component> for Renderable {
    fn from(component: &Component) -> Self {
        Renderable::Component(component.clone())
    }
}

impl From<Option<Component>> for Renderable {
    fn from(component: Option<Component>) -> Self {
        component.map_or(Renderable::Empty, Renderable::Component)
    }
}

impl From<NodeId> for Renderable {
    fn from(node: NodeId) -> Self {
        Renderable::Node(node)
    }
}

impl From<&str> for Renderable {
    fn from(text: &str) -> Self {
        Renderable::Text(text.to_owned())
    }
}

impl From<String> for Renderable {
    fn from(text: String) -> Self {
        Renderable::Text(text)
    }
}

impl From<Value> for Renderable {
    fn from(value: Value) -> Self {
        match value {
            Value::Unset | Value::Null => Renderable::Empty,
            other => Renderable::Text(other.to_string()),
        }
    }
}

/// State of one mount point.
pub(crate) enum MountSlot {
    Single {
        anchor: NodeId,
        node: Option<Component>,
    },
    List {
        anchor: NodeId,
        items: Vec<Component>,
    },
}

impl MountSlot {
    pub(crate) fn occupants(&self) -> Vec<Component> {
        match self {
            MountSlot::Single { node, .. } => node.iter().cloned().collect(),
            MountSlot::List { items, .. } => items.clone(),
        }
    }

    fn kind(&self) -> MountKind {
        match self {
            MountSlot::Single { .. } => MountKind::Single,
            MountSlot::List { .. } => MountKind::List,
        }
    }

    fn anchor(&self) -> NodeId {
        match self {
            MountSlot::Single { anchor, .. } | MountSlot::List { anchor, .. } => *anchor,
        }
    }
}

impl Component {
    fn slot<R>(&self, name: &str, expected: MountKind, f: impl FnOnce(&mut MountSlot) -> R) -> Result<R> {
        self.with_ctx_mut(|ctx| match ctx.mounts.get_mut(name) {
            None => Err(Error::UnknownMountPoint(name.to_owned())),
            Some(slot) if slot.kind() != expected => Err(Error::WrongMountKind {
                name: name.to_owned(),
                expected,
            }),
            Some(slot) => Ok(f(slot)),
        })?
    }

    fn list_items(&self, name: &str) -> Result<Vec<Component>> {
        self.slot(name, MountKind::List, |slot| slot.occupants())
    }

    fn with_items<R>(&self, name: &str, f: impl FnOnce(&mut Vec<Component>) -> R) -> Result<R> {
        self.slot(name, MountKind::List, |slot| match slot {
            MountSlot::List { items, .. } => Some(f(items)),
            MountSlot::Single { .. } => None,
        })?
        .ok_or_else(|| Error::WrongMountKind {
            name: name.to_owned(),
            expected: MountKind::List,
        })
    }

    /// Whether mounting `child` inside this component would make a component
    /// its own ancestor.
    fn would_cycle(&self, child: &Component) -> bool {
        if self.ptr_eq(child) {
            return true;
        }
        if let (Ok(own), Ok(theirs)) = (self.element(), child.element())
            && self.document().contains(theirs, own)
        {
            return true;
        }
        let mut current = self.slot_parent();
        while let Some(parent) = current {
            if parent.ptr_eq(child) {
                return true;
            }
            current = parent.slot_parent();
        }
        false
    }

    /// Forget `child` in mount point `key`. DOM cleanup is the child's job.
    pub(crate) fn detach_child(&self, key: &str, child: &Component) {
        let _ = self.with_ctx_mut(|ctx| match ctx.mounts.get_mut(key) {
            Some(MountSlot::Single { node, .. }) => {
                if node.as_ref().is_some_and(|n| n.ptr_eq(child)) {
                    *node = None;
                }
            }
            Some(MountSlot::List { items, .. }) => items.retain(|item| !item.ptr_eq(child)),
            None => {}
        });
    }

    // ========================================================================
    // Single mount points
    // ========================================================================

    /// Current occupant of a single mount point.
    pub fn mount_point(&self, name: &str) -> Result<Option<Component>> {
        self.slot(name, MountKind::Single, |slot| slot.occupants().into_iter().next())
    }

    /// Replace the occupant of a single mount point.
    ///
    /// Setting the current occupant again does nothing. Mounting a component
    /// that contains this one is refused with a warning.
    pub fn set_mount(&self, name: &str, value: impl Into<Renderable>) -> Result<()> {
        let (anchor, current) = self.slot(name, MountKind::Single, |slot| {
            (slot.anchor(), slot.occupants().into_iter().next())
        })?;
        let value = value.into();
        if let (Renderable::Component(new), Some(current)) = (&value, &current)
            && new.ptr_eq(current)
        {
            return Ok(());
        }

        self.scheduler().batch(|| {
            let next = value.coerce(self)?;
            if let Some(next) = &next {
                if next.is_destroyed() {
                    return Err(Error::Destroyed);
                }
                if self.would_cycle(next) {
                    tracing::warn!(mount_point = name, "refusing to mount a component inside itself");
                    return Ok(());
                }
            }

            if let Some(current) = current {
                current.unmount()?;
            }
            if let Some(next) = next {
                let placeholder = next.attach(self, name)?;
                self.document().insert_before(anchor, placeholder);
                self.slot(name, MountKind::Single, |slot| {
                    if let MountSlot::Single { node, .. } = slot {
                        *node = Some(next);
                    }
                })?;
            }
            Ok(())
        })
    }

    // ========================================================================
    // List mount points
    // ========================================================================

    /// A handle to a list mount point.
    pub fn list(&self, name: &str) -> Result<MountList> {
        self.list_items(name)?;
        Ok(MountList {
            owner: self.clone(),
            key: name.to_owned(),
        })
    }

    /// Replace the whole content of a list mount point.
    ///
    /// A list identical (by component identity) to the current one does
    /// nothing.
    pub fn set_list<R: Into<Renderable>>(
        &self,
        name: &str,
        items: impl IntoIterator<Item = R>,
    ) -> Result<()> {
        let current = self.list_items(name)?;
        self.scheduler().batch(move || {
            let incoming = self.coerce_all(items)?;
            let unchanged = incoming.len() == current.len()
                && incoming.iter().zip(&current).all(|(a, b)| a.ptr_eq(b));
            if unchanged {
                return Ok(());
            }

            // Dropped here so replaced text items are released by this flush.
            for item in current {
                item.unmount()?;
            }
            self.insert_items(name, 0, incoming)
        })
    }

    /// Turn `items` into components, dropping duplicates and would-be
    /// cycles. Fails without side effects if any item is destroyed.
    fn coerce_all<R: Into<Renderable>>(
        &self,
        items: impl IntoIterator<Item = R>,
    ) -> Result<Vec<Component>> {
        let mut out: Vec<Component> = Vec::new();
        for item in items {
            let Some(component) = item.into().coerce(self)? else {
                continue;
            };
            if component.is_destroyed() {
                return Err(Error::Destroyed);
            }
            if out.iter().any(|c| c.ptr_eq(&component)) {
                continue;
            }
            if self.would_cycle(&component) {
                tracing::warn!("refusing to mount a component inside itself");
                continue;
            }
            out.push(component);
        }
        Ok(out)
    }

    /// Mount `items` into list `name` starting at `index`.
    ///
    /// Items already mounted anywhere, this list included, are unmounted
    /// first. Their placeholders are inserted as one fragment.
    fn insert_items(&self, name: &str, index: usize, items: Vec<Component>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut index = index;
        for item in &items {
            if let Some(position) = self.position_in(name, item)?
                && position < index
            {
                index -= 1;
            }
            if item.is_attached() {
                item.unmount()?;
            }
        }

        let doc = self.document().clone();
        let (anchor, index) = self.slot(name, MountKind::List, |slot| {
            (slot.anchor(), index.min(slot.occupants().len()))
        })?;
        let after = match index {
            0 => anchor,
            i => self.list_items(name)?[i - 1].placeholder()?,
        };

        let fragment = doc.create_fragment();
        for item in &items {
            let placeholder = item.attach(self, name)?;
            doc.append(fragment, placeholder);
        }
        doc.insert_after(after, fragment);
        if doc.first_child(fragment).is_none() {
            doc.release(fragment);
        }

        self.with_items(name, |list| {
            list.splice(index..index, items);
        })
    }

    fn position_in(&self, name: &str, item: &Component) -> Result<Option<usize>> {
        self.with_items(name, |list| list.iter().position(|c| c.ptr_eq(item)))
    }

    /// Lay out the list in `order` without unmounting anything.
    fn reorder(&self, name: &str, order: Vec<Component>) -> Result<()> {
        let anchor = self.slot(name, MountKind::List, |slot| slot.anchor())?;
        let doc = self.document().clone();
        self.scheduler().batch(|| {
            let mut after = anchor;
            for item in &order {
                let placeholder = item.placeholder()?;
                doc.insert_after(after, placeholder);
                item.requeue_placement()?;
                after = placeholder;
            }
            self.with_items(name, |list| *list = order)
        })
    }

    fn requeue_placement(&self) -> Result<()> {
        let patch = self.with_ctx(|ctx| Rc::clone(&ctx.mount_patch))?;
        self.scheduler().queue_dom(&patch);
        Ok(())
    }
}

/// Handle to a list mount point of a component.
///
/// Mirrors the usual ordered-sequence operations; each one mounts and
/// unmounts only the components it adds or removes.
#[derive(Clone)]
pub struct MountList {
    owner: Component,
    key: String,
}

impl MountList {
    pub fn name(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.to_vec()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, index: usize) -> Result<Option<Component>> {
        Ok(self.to_vec()?.into_iter().nth(index))
    }

    pub fn to_vec(&self) -> Result<Vec<Component>> {
        self.owner.list_items(&self.key)
    }

    pub fn index_of(&self, item: &Component) -> Result<Option<usize>> {
        self.owner.position_in(&self.key, item)
    }

    pub fn contains(&self, item: &Component) -> Result<bool> {
        Ok(self.index_of(item)?.is_some())
    }

    /// Replace the whole list.
    pub fn set<R: Into<Renderable>>(&self, items: impl IntoIterator<Item = R>) -> Result<()> {
        self.owner.set_list(&self.key, items)
    }

    /// Append items. Returns the new length.
    pub fn push<R: Into<Renderable>>(&self, items: impl IntoIterator<Item = R>) -> Result<usize> {
        self.owner.scheduler().batch(|| {
            let items = self.owner.coerce_all(items)?;
            let end = self.len()?;
            self.owner.insert_items(&self.key, end, items)?;
            self.len()
        })
    }

    /// Prepend items. Returns the new length.
    pub fn unshift<R: Into<Renderable>>(&self, items: impl IntoIterator<Item = R>) -> Result<usize> {
        self.owner.scheduler().batch(|| {
            let items = self.owner.coerce_all(items)?;
            self.owner.insert_items(&self.key, 0, items)?;
            self.len()
        })
    }

    /// Insert one item at `index` (clamped to the length).
    pub fn insert(&self, index: usize, item: impl Into<Renderable>) -> Result<()> {
        self.owner.scheduler().batch(|| {
            let items = self.owner.coerce_all([item])?;
            self.owner.insert_items(&self.key, index, items)
        })
    }

    /// Unmount and return the last item.
    pub fn pop(&self) -> Result<Option<Component>> {
        let last = self.to_vec()?.pop();
        self.take(last)
    }

    /// Unmount and return the first item.
    pub fn shift(&self) -> Result<Option<Component>> {
        let first = self.get(0)?;
        self.take(first)
    }

    /// Unmount and return the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<Option<Component>> {
        let item = self.get(index)?;
        self.take(item)
    }

    /// Unmount `item` if it is in this list.
    pub fn remove(&self, item: &Component) -> Result<Option<Component>> {
        if !self.contains(item)? {
            return Ok(None);
        }
        self.take(Some(item.clone()))
    }

    fn take(&self, item: Option<Component>) -> Result<Option<Component>> {
        if let Some(item) = &item {
            item.unmount()?;
        }
        Ok(item)
    }

    /// Remove `delete` items starting at `start`, then insert `items` there.
    ///
    /// A negative `start` counts from the end. Returns the removed items,
    /// which are unmounted but not destroyed.
    pub fn splice<R: Into<Renderable>>(
        &self,
        start: isize,
        delete: usize,
        items: impl IntoIterator<Item = R>,
    ) -> Result<Vec<Component>> {
        self.owner.scheduler().batch(|| {
            let current = self.to_vec()?;
            let len = current.len();
            let start = if start < 0 {
                len.saturating_sub(start.unsigned_abs())
            } else {
                start.unsigned_abs().min(len)
            };
            let end = start.saturating_add(delete).min(len);

            let inserts = self.owner.coerce_all(items)?;
            let removed = current[start..end].to_vec();
            for item in &removed {
                item.unmount()?;
            }
            self.owner.insert_items(&self.key, start, inserts)?;
            Ok(removed)
        })
    }

    /// Reverse the order in place.
    pub fn reverse(&self) -> Result<()> {
        let mut order = self.to_vec()?;
        if order.len() < 2 {
            return Ok(());
        }
        order.reverse();
        self.owner.reorder(&self.key, order)
    }

    /// Sort in place with a comparator. The sort is stable.
    pub fn sort_by(&self, mut compare: impl FnMut(&Component, &Component) -> Ordering) -> Result<()> {
        let mut order = self.to_vec()?;
        if order.len() < 2 {
            return Ok(());
        }
        order.sort_by(|a, b| compare(a, b));
        self.owner.reorder(&self.key, order)
    }

    /// Unmount every item. They stay usable.
    pub fn clear(&self) -> Result<()> {
        let items = self.to_vec()?;
        self.owner.scheduler().batch(|| {
            for item in &items {
                item.unmount()?;
            }
            Ok(())
        })
    }

    /// Destroy every item.
    pub fn empty(&self) -> Result<()> {
        let items = self.to_vec()?;
        self.owner.scheduler().batch(|| {
            for item in &items {
                item.destroy()?;
            }
            Ok(())
        })
    }
}

impl fmt::Debug for MountList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountList")
            .field("name", &self.key)
            .field("len", &self.len().unwrap_or(0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ElementSpec, Template};
    use crate::binding::BindSpec;
    use crate::component::MountOption;
    use crate::universe::Universe;

    struct Fixture {
        universe: Universe,
        parent: Component,
        item: Template,
    }

    impl Fixture {
        fn new() -> Self {
            let universe = Universe::new();
            let parent = Component::new(
                &universe,
                &Template::new(
                    ElementSpec::new("section")
                        .mount("header")
                        .child(ElementSpec::new("ul").list("items"))
                        .mount("footer"),
                )
                .unwrap(),
            )
            .unwrap();
            parent
                .mount(universe.document().body(), MountOption::Append)
                .unwrap();
            let item = Template::new(ElementSpec::new("li").bind(BindSpec::new("label"))).unwrap();
            Self {
                universe,
                parent,
                item,
            }
        }

        fn item(&self, label: &str) -> Component {
            let item = Component::new(&self.universe, &self.item).unwrap();
            item.set("label", label).unwrap();
            item
        }

        fn html(&self) -> String {
            let doc = self.universe.document();
            doc.inner_html(doc.body())
        }

        fn list(&self) -> MountList {
            self.parent.list("items").unwrap()
        }

        fn labels(&self) -> Vec<String> {
            self.list()
                .to_vec()
                .unwrap()
                .iter()
                .map(|c| c.get("label").unwrap().to_string())
                .collect()
        }
    }

    fn counts(component: &Component) -> (usize, usize) {
        let info = component.debug_info().unwrap();
        (info.mounts, info.unmounts)
    }

    #[test]
    fn push_then_splice_is_minimal() {
        let fx = Fixture::new();
        let (a, b, c) = (fx.item("a"), fx.item("b"), fx.item("c"));
        let list = fx.list();

        assert_eq!(list.push([&a, &b]).unwrap(), 2);
        let removed = list.splice(1, 1, [&c]).unwrap();

        assert_eq!(removed.len(), 1);
        assert!(removed[0].ptr_eq(&b));
        assert_eq!(fx.labels(), ["a", "c"]);
        assert_eq!(counts(&a), (1, 0));
        assert_eq!(counts(&b), (1, 1));
        assert_eq!(fx.html(), "<section><ul><li>a</li><li>c</li></ul></section>");
        assert!(!b.is_attached());
        assert!(!b.is_destroyed());
    }

    #[test]
    fn setting_identical_list_is_a_no_op() {
        let fx = Fixture::new();
        let (a, b) = (fx.item("a"), fx.item("b"));
        fx.parent.set_list("items", [&a, &b]).unwrap();
        let flushes = fx.universe.scheduler().flush_count();

        fx.parent.set_list("items", [&a, &b]).unwrap();

        assert_eq!(counts(&a), (1, 0));
        assert_eq!(counts(&b), (1, 0));
        assert_eq!(fx.universe.scheduler().flush_count(), flushes + 1);
        assert_eq!(fx.labels(), ["a", "b"]);
    }

    #[test]
    fn set_list_replaces_content_in_order() {
        let fx = Fixture::new();
        let (a, b, c) = (fx.item("a"), fx.item("b"), fx.item("c"));
        fx.parent.set_list("items", [&a, &b]).unwrap();

        fx.parent.set_list("items", [&c, &a]).unwrap();

        assert_eq!(fx.labels(), ["c", "a"]);
        assert_eq!(fx.html(), "<section><ul><li>c</li><li>a</li></ul></section>");
        assert!(!b.is_attached());
    }

    #[test]
    fn single_mount_point_swaps_occupants() {
        let fx = Fixture::new();
        let (a, b) = (fx.item("a"), fx.item("b"));

        fx.parent.set_mount("header", &a).unwrap();
        fx.parent.set_mount("footer", "bye").unwrap();
        assert_eq!(fx.html(), "<section><li>a</li><ul></ul>bye</section>");

        fx.parent.set_mount("header", &a).unwrap();
        assert_eq!(counts(&a), (1, 0));

        fx.parent.set_mount("header", &b).unwrap();
        assert_eq!(fx.html(), "<section><li>b</li><ul></ul>bye</section>");
        assert!(fx.parent.mount_point("header").unwrap().unwrap().ptr_eq(&b));
        assert_eq!(counts(&a), (1, 1));

        fx.parent.set_mount("header", Renderable::Empty).unwrap();
        assert!(fx.parent.mount_point("header").unwrap().is_none());
        assert_eq!(fx.html(), "<section><ul></ul>bye</section>");
    }

    #[test]
    fn mounting_elsewhere_detaches_first() {
        let fx = Fixture::new();
        let a = fx.item("a");
        fx.list().push([&a]).unwrap();

        fx.parent.set_mount("footer", &a).unwrap();

        assert!(fx.list().is_empty().unwrap());
        assert_eq!(fx.html(), "<section><ul></ul><li>a</li></section>");
        assert_eq!(counts(&a), (2, 1));
    }

    #[test]
    fn unmounting_a_child_updates_its_slot() {
        let fx = Fixture::new();
        let (a, b) = (fx.item("a"), fx.item("b"));
        fx.list().push([&a, &b]).unwrap();
        fx.parent.set_mount("header", fx.item("h")).unwrap();

        a.unmount().unwrap();
        let header = fx.parent.mount_point("header").unwrap().unwrap();
        header.unmount().unwrap();

        assert_eq!(fx.labels(), ["b"]);
        assert!(fx.parent.mount_point("header").unwrap().is_none());
        assert_eq!(fx.html(), "<section><ul><li>b</li></ul></section>");
    }

    #[test]
    fn mount_cycles_are_refused() {
        let fx = Fixture::new();
        fx.parent.set_mount("header", &fx.parent).unwrap();
        assert!(fx.parent.mount_point("header").unwrap().is_none());

        let child = Component::new(
            &fx.universe,
            &Template::new(ElementSpec::new("div").mount("inner")).unwrap(),
        )
        .unwrap();
        fx.parent.set_mount("header", &child).unwrap();
        child.set_mount("inner", &fx.parent).unwrap();

        assert!(child.mount_point("inner").unwrap().is_none());
        assert!(fx.parent.is_attached());
    }

    #[test]
    fn ordered_operations() {
        let fx = Fixture::new();
        let list = fx.list();
        let items: Vec<_> = ["a", "b", "c", "d"].iter().map(|l| fx.item(l)).collect();
        list.push(&items).unwrap();

        let popped = list.pop().unwrap().unwrap();
        assert!(popped.ptr_eq(&items[3]));
        let shifted = list.shift().unwrap().unwrap();
        assert!(shifted.ptr_eq(&items[0]));
        assert_eq!(fx.labels(), ["b", "c"]);

        assert_eq!(list.unshift([&items[3]]).unwrap(), 3);
        list.insert(1, &items[0]).unwrap();
        assert_eq!(fx.labels(), ["d", "a", "b", "c"]);

        assert!(list.remove(&items[1]).unwrap().is_some());
        assert!(list.remove(&items[1]).unwrap().is_none());
        assert!(list.remove_at(0).unwrap().unwrap().ptr_eq(&items[3]));
        assert_eq!(fx.labels(), ["a", "c"]);
        assert_eq!(fx.html(), "<section><ul><li>a</li><li>c</li></ul></section>");

        list.push(["text"]).unwrap();
        assert_eq!(fx.html(), "<section><ul><li>a</li><li>c</li>text</ul></section>");
        assert_eq!(list.splice(-1, 5, Vec::<Renderable>::new()).unwrap().len(), 1);
        assert_eq!(list.len().unwrap(), 2);
    }

    #[test]
    fn reorder_keeps_items_mounted() {
        let fx = Fixture::new();
        let list = fx.list();
        let items: Vec<_> = ["b", "c", "a"].iter().map(|l| fx.item(l)).collect();
        list.push(&items).unwrap();

        list.sort_by(|x, y| {
            let x = x.get("label").unwrap().to_string();
            let y = y.get("label").unwrap().to_string();
            x.cmp(&y)
        })
        .unwrap();
        assert_eq!(fx.labels(), ["a", "b", "c"]);
        assert_eq!(fx.html(), "<section><ul><li>a</li><li>b</li><li>c</li></ul></section>");

        list.reverse().unwrap();
        assert_eq!(fx.html(), "<section><ul><li>c</li><li>b</li><li>a</li></ul></section>");
        for item in &items {
            assert_eq!(counts(item), (1, 0));
        }
    }

    #[test]
    fn moving_within_the_same_list() {
        let fx = Fixture::new();
        let list = fx.list();
        let items: Vec<_> = ["a", "b", "c"].iter().map(|l| fx.item(l)).collect();
        list.push(&items).unwrap();

        list.push([&items[0]]).unwrap();

        assert_eq!(fx.labels(), ["b", "c", "a"]);
        assert_eq!(fx.html(), "<section><ul><li>b</li><li>c</li><li>a</li></ul></section>");
    }

    #[test]
    fn clear_keeps_items_and_empty_destroys_them() {
        let fx = Fixture::new();
        let list = fx.list();
        let (a, b) = (fx.item("a"), fx.item("b"));
        list.push([&a, &b]).unwrap();

        list.clear().unwrap();
        assert!(list.is_empty().unwrap());
        assert!(!a.is_destroyed());
        assert_eq!(fx.html(), "<section><ul></ul></section>");

        list.push([&a, &b]).unwrap();
        list.empty().unwrap();
        assert!(list.is_empty().unwrap());
        assert!(a.is_destroyed() && b.is_destroyed());
        assert_eq!(fx.html(), "<section><ul></ul></section>");
    }

    #[test]
    fn destroying_the_parent_releases_children() {
        let fx = Fixture::new();
        let a = fx.item("a");
        fx.list().push([&a]).unwrap();

        fx.parent.destroy().unwrap();

        assert!(!a.is_attached());
        assert!(!a.is_destroyed());
        assert_eq!(fx.html(), "");
        a.mount(fx.universe.document().body(), MountOption::Append)
            .unwrap();
        assert_eq!(fx.html(), "<li>a</li>");
    }

    #[test]
    fn push_with_a_destroyed_item_changes_nothing() {
        let fx = Fixture::new();
        let (a, dead) = (fx.item("a"), fx.item("dead"));
        dead.destroy().unwrap();
        let before = fx.html();

        assert!(matches!(fx.list().push([&a, &dead]), Err(Error::Destroyed)));

        assert!(!a.is_attached());
        assert_eq!(counts(&a), (0, 0));
        assert!(fx.list().is_empty().unwrap());
        assert_eq!(fx.html(), before);
    }

    #[test]
    fn set_list_with_a_destroyed_item_keeps_the_old_list() {
        let fx = Fixture::new();
        let (a, b, dead) = (fx.item("a"), fx.item("b"), fx.item("dead"));
        fx.list().push([&a]).unwrap();
        dead.destroy().unwrap();

        assert!(matches!(
            fx.parent.set_list("items", [&b, &dead]),
            Err(Error::Destroyed)
        ));
        assert!(matches!(fx.list().splice(0, 1, [&dead]), Err(Error::Destroyed)));

        assert_eq!(fx.labels(), ["a"]);
        assert_eq!(counts(&a), (1, 0));
        assert!(!b.is_attached());
        assert_eq!(fx.html(), "<section><ul><li>a</li></ul></section>");
    }

    #[test]
    fn set_mount_with_a_destroyed_component_keeps_the_occupant() {
        let fx = Fixture::new();
        let (a, dead) = (fx.item("a"), fx.item("dead"));
        fx.parent.set_mount("header", &a).unwrap();
        dead.destroy().unwrap();

        assert!(matches!(fx.parent.set_mount("header", &dead), Err(Error::Destroyed)));

        assert!(fx.parent.mount_point("header").unwrap().unwrap().ptr_eq(&a));
        assert!(a.is_attached());
        assert_eq!(fx.html(), "<section><li>a</li><ul></ul></section>");
    }

    #[test]
    fn single_occupant_sits_before_the_anchor_and_lists_after_it() {
        let fx = Fixture::new();
        let doc = fx.universe.document();
        let (a, b) = (fx.item("a"), fx.item("b"));
        fx.parent.set_mount("header", &a).unwrap();
        fx.list().push([&b]).unwrap();

        let header = fx.parent.slot("header", MountKind::Single, |s| s.anchor()).unwrap();
        let placeholder = a.placeholder().unwrap();
        assert_eq!(doc.next_sibling(a.element().unwrap()), Some(placeholder));
        assert_eq!(doc.next_sibling(placeholder), Some(header));

        let items = fx.parent.slot("items", MountKind::List, |s| s.anchor()).unwrap();
        assert_eq!(doc.next_sibling(items), Some(b.element().unwrap()));
    }

    #[test]
    fn replacing_text_items_does_not_grow_the_document() {
        let fx = Fixture::new();
        let doc = fx.universe.document();
        fx.parent.set_list("items", ["warm up"]).unwrap();
        let baseline = doc.node_count();

        for i in 0..200 {
            fx.parent.set_list("items", [i.to_string()]).unwrap();
        }

        assert_eq!(doc.node_count(), baseline);
        assert_eq!(fx.html(), "<section><ul>199</ul></section>");
    }

    #[test]
    fn wrong_slot_kind_is_an_error() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.parent.set_mount("items", "x"),
            Err(Error::WrongMountKind { .. })
        ));
        assert!(matches!(fx.parent.list("header"), Err(Error::WrongMountKind { .. })));
        assert!(matches!(fx.parent.list("nope"), Err(Error::UnknownMountPoint(_))));
    }
}
