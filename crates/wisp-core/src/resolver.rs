//! Path resolution over a component's data tree.
//!
//! The tree is an arena of path nodes. Interior nodes are containers keyed
//! by [`Key`]; a node that has ever been resolved as a leaf carries a
//! [`ReactiveCell`]. Resolution creates missing nodes on the way down, so
//! binding `user.name` works before anything has been written under `user`.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::binding::{BindSpec, ReactiveCell};
use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use crate::value::{Key, Path, Value};

/// Index of a node in a [`Store`]'s path tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathNodeId(usize);

const ROOT: PathNodeId = PathNodeId(0);

#[derive(Default)]
struct PathNode {
    children: BTreeMap<Key, PathNodeId>,
    cell: Option<ReactiveCell>,
}

#[derive(Default)]
struct PathTree {
    nodes: Vec<PathNode>,
}

impl PathTree {
    fn new() -> Self {
        Self {
            nodes: vec![PathNode::default()],
        }
    }

    fn child(&self, parent: PathNodeId, key: &Key) -> Option<PathNodeId> {
        self.nodes[parent.0].children.get(key).copied()
    }

    fn child_or_insert(&mut self, parent: PathNodeId, key: &Key) -> PathNodeId {
        if let Some(id) = self.child(parent, key) {
            return id;
        }
        let id = PathNodeId(self.nodes.len());
        self.nodes.push(PathNode::default());
        self.nodes[parent.0].children.insert(key.clone(), id);
        id
    }

    fn find(&self, keys: &[Key]) -> Option<PathNodeId> {
        keys.iter()
            .try_fold(ROOT, |node, key| self.child(node, key))
    }
}

/// The outcome of resolving a path.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Container holding the terminal key.
    pub parent: PathNodeId,
    /// Node of the terminal key.
    pub node: PathNodeId,
    pub key: Key,
    pub cell: ReactiveCell,
}

/// Reactive data store of one component.
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct Store {
    tree: Rc<RefCell<PathTree>>,
    scheduler: Scheduler,
    closed: Rc<Cell<bool>>,
}

impl Store {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            tree: Rc::new(RefCell::new(PathTree::new())),
            scheduler,
            closed: Rc::new(Cell::new(false)),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Walk `path`, creating containers and the terminal cell as needed.
    ///
    /// Fails with [`Error::Destroyed`] once the store is closed.
    pub fn resolve(&self, path: &Path) -> Result<Resolved> {
        if self.closed.get() {
            return Err(Error::Destroyed);
        }
        let (parents, key) = path.split_last()?;
        let mut tree = self.tree.borrow_mut();

        let parent = parents
            .iter()
            .fold(ROOT, |node, segment| tree.child_or_insert(node, segment));
        let node = tree.child_or_insert(parent, key);

        let cell = tree.nodes[node.0]
            .cell
            .get_or_insert_with(|| ReactiveCell::new(path.clone(), self.scheduler.clone()))
            .clone();

        Ok(Resolved {
            parent,
            node,
            key: key.clone(),
            cell,
        })
    }

    /// Resolve a binding and apply its default if the cell was never written.
    ///
    /// The default goes through the regular write path, so handlers and
    /// subscribers see it like any other change.
    pub fn bind(&self, spec: &BindSpec) -> Result<ReactiveCell> {
        let cell = self.resolve(&spec.path)?.cell;
        if let Some(default) = &spec.default
            && cell.with(Value::is_unset)
        {
            cell.set(default.clone());
        }
        Ok(cell)
    }

    /// The cell at `path`, created if missing.
    pub fn cell(&self, path: &Path) -> Result<ReactiveCell> {
        Ok(self.resolve(path)?.cell)
    }

    /// Read a value without creating anything. Missing paths read as `Unset`.
    pub fn get(&self, path: &Path) -> Value {
        let tree = self.tree.borrow();
        tree.find(path.keys())
            .and_then(|node| tree.nodes[node.0].cell.as_ref())
            .map(ReactiveCell::get)
            .unwrap_or_default()
    }

    /// Write one value. Returns whether it changed.
    pub fn set(&self, path: &Path, value: impl Into<Value>) -> Result<bool> {
        let cell = self.cell(path)?;
        Ok(cell.set(value))
    }

    /// Write several values under a single bracket.
    ///
    /// Stops at the first invalid path; writes made before it are kept.
    pub fn assign<P, V>(&self, entries: impl IntoIterator<Item = (P, V)>) -> Result<()>
    where
        P: Into<Path>,
        V: Into<Value>,
    {
        self.scheduler.batch(|| {
            for (path, value) in entries {
                self.set(&path.into(), value)?;
            }
            Ok(())
        })
    }

    /// Whether any node exists at `path`.
    pub fn contains(&self, path: &Path) -> bool {
        self.tree.borrow().find(path.keys()).is_some()
    }

    /// Child keys of the container at `path`, in key order.
    pub fn keys(&self, path: &Path) -> Vec<Key> {
        let tree = self.tree.borrow();
        tree.find(path.keys())
            .map(|node| tree.nodes[node.0].children.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every cell created so far.
    pub fn cells(&self) -> Vec<ReactiveCell> {
        self.tree
            .borrow()
            .nodes
            .iter()
            .filter_map(|node| node.cell.clone())
            .collect()
    }

    /// Drop all data and observers. Cells handed out earlier become inert.
    pub fn clear(&self) {
        let cells = self.cells();
        for cell in &cells {
            cell.clear();
        }
        *self.tree.borrow_mut() = PathTree::new();
    }

    /// Clear the store and refuse every later write or binding, including
    /// through handles cloned earlier. Reads return `Unset`.
    pub fn close(&self) {
        self.closed.set(true);
        self.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("nodes", &self.tree.borrow().nodes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::Error;

    #[test]
    fn default_applies_once_then_writes_take_over() {
        let store = Store::new(Scheduler::new());
        let cell = store
            .bind(&BindSpec::new("user.name").with_default("Bob"))
            .unwrap();
        assert_eq!(store.get(&Path::parse("user.name")), Value::from("Bob"));

        let runs = Rc::new(RefCell::new(Vec::new()));
        let runs_clone = Rc::clone(&runs);
        let reader = cell.downgrade();
        cell.on_change(Rc::new(move || {
            if let Some(cell) = reader.upgrade() {
                runs_clone.borrow_mut().push(cell.get());
            }
        }));

        store.set(&Path::parse("user.name"), "Alice").unwrap();
        store.set(&Path::parse("user.name"), "Alice").unwrap();
        assert_eq!(*runs.borrow(), vec![Value::from("Alice")]);

        store
            .bind(&BindSpec::new("user.name").with_default("Carol"))
            .unwrap();
        assert_eq!(store.get(&Path::parse("user.name")), Value::from("Alice"));
    }

    #[test]
    fn resolve_reuses_cells_and_creates_containers() {
        let store = Store::new(Scheduler::new());
        let first = store.resolve(&Path::parse("a.b.c")).unwrap();
        let second = store.resolve(&Path::from(["a", "b", "c"])).unwrap();

        assert!(first.cell.ptr_eq(&second.cell));
        assert_eq!(first.node, second.node);
        assert_eq!(first.key, Key::Name("c".into()));
        assert!(store.contains(&Path::parse("a.b")));
        assert_eq!(store.keys(&Path::parse("a")), vec![Key::Name("b".into())]);
    }

    #[test]
    fn reads_do_not_create_nodes() {
        let store = Store::new(Scheduler::new());
        assert!(store.get(&Path::parse("missing.leaf")).is_unset());
        assert!(!store.contains(&Path::parse("missing")));
    }

    #[test]
    fn empty_path_is_rejected() {
        let store = Store::new(Scheduler::new());
        assert!(matches!(store.resolve(&Path::default()), Err(Error::EmptyPath)));
    }

    #[test]
    fn assign_flushes_once() {
        let scheduler = Scheduler::new();
        let store = Store::new(scheduler.clone());
        let runs = Rc::new(Cell::new(0));
        let handler: crate::Handler = {
            let runs = Rc::clone(&runs);
            Rc::new(move || runs.set(runs.get() + 1))
        };
        store.cell(&Path::parse("a")).unwrap().on_change(handler.clone());
        store.cell(&Path::parse("b")).unwrap().on_change(handler);

        store.assign([("a", 1), ("b", 2)]).unwrap();

        assert_eq!(runs.get(), 1);
        assert_eq!(scheduler.flush_count(), 1);
    }

    #[test]
    fn clear_drops_observers() {
        let store = Store::new(Scheduler::new());
        let cell = store.cell(&Path::parse("x")).unwrap();
        cell.subscribe(Rc::new(|_: &crate::Change<'_>| {}));
        store.set(&Path::parse("x"), 3).unwrap();

        store.clear();

        assert_eq!(cell.subscriber_count(), 0);
        assert!(store.get(&Path::parse("x")).is_unset());
        assert!(!store.contains(&Path::parse("x")));
    }

    #[test]
    fn closed_store_rejects_writes_through_old_handles() {
        let store = Store::new(Scheduler::new());
        let handle = store.clone();
        store.set(&Path::parse("x"), 1).unwrap();

        store.close();

        assert!(handle.is_closed());
        assert!(matches!(handle.set(&Path::parse("x"), 2), Err(Error::Destroyed)));
        assert!(matches!(
            handle.bind(&BindSpec::new("y").with_default(1)),
            Err(Error::Destroyed)
        ));
        assert!(matches!(handle.resolve(&Path::parse("x")), Err(Error::Destroyed)));
        assert!(matches!(handle.assign([("z", 3)]), Err(Error::Destroyed)));
        assert!(handle.get(&Path::parse("x")).is_unset());
        assert!(handle.cells().is_empty());
    }
}
