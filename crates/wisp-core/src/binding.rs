//! Reactive cells: one observable leaf of a component's data tree.
//!
//! A [`ReactiveCell`] stores the shadow value for a path together with two
//! observer lists:
//!
//! - **handlers** are zero-argument callbacks that refresh output derived
//!   from the cell. A write queues them on the scheduler, so they run at
//!   the next flush and at most once per flush.
//! - **subscribers** are user callbacks that receive a [`Change`]. They run
//!   synchronously during the write, inside their own bracket.
//!
//! Keeping all three in one cell means the shadow, handler and subscriber
//! trees cannot drift apart in shape.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::scheduler::{Handler, Scheduler, contain};
use crate::value::{Path, Value};

/// A binding declaration: the path to observe and an optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct BindSpec {
    pub path: Path,
    pub default: Option<Value>,
}

impl BindSpec {
    pub fn new(path: impl Into<Path>) -> Self {
        Self {
            path: path.into(),
            default: None,
        }
    }

    /// Value applied on first bind when the cell has never been written.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

impl From<&str> for BindSpec {
    fn from(path: &str) -> Self {
        BindSpec::new(path)
    }
}

/// What a subscriber sees when a cell changes.
#[derive(Debug)]
pub struct Change<'a> {
    pub path: &'a Path,
    pub value: &'a Value,
    pub old_value: &'a Value,
}

/// Callback notified synchronously after a cell changes.
pub type Subscriber = Rc<dyn Fn(&Change<'_>)>;

/// Unique identifier for a subscriber registration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct SubscriberId(pub usize);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_SUBSCRIBER_ID: AtomicUsize = AtomicUsize::new(0);

fn next_subscriber_id() -> SubscriberId {
    SubscriberId(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
}

/// A reactive cell.
///
/// Cloning yields another handle to the same cell.
#[derive(Clone)]
pub struct ReactiveCell {
    inner: Rc<CellInner>,
}

/// A non-owning handle to a [`ReactiveCell`], for use inside handlers the
/// cell itself owns.
#[derive(Clone)]
pub struct WeakCell {
    inner: Weak<CellInner>,
}

struct CellInner {
    path: Path,
    value: RefCell<Value>,
    handlers: RefCell<Vec<Handler>>,
    subscribers: RefCell<Vec<(SubscriberId, Subscriber)>>,
    /// Set while a write is propagating; writes arriving meanwhile are dropped.
    setting: Cell<bool>,
    scheduler: Scheduler,
}

impl ReactiveCell {
    pub fn new(path: Path, scheduler: Scheduler) -> Self {
        Self {
            inner: Rc::new(CellInner {
                path,
                value: RefCell::new(Value::Unset),
                handlers: RefCell::new(Vec::new()),
                subscribers: RefCell::new(Vec::new()),
                setting: Cell::new(false),
                scheduler,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Current shadow value.
    pub fn get(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Run `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Write a new value.
    ///
    /// Returns `false`, with no side effects, when the value is the same as
    /// the current one (NaN included) or when this cell is already in the
    /// middle of propagating a write.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        let inner = &self.inner;
        if inner.setting.get() || inner.value.borrow().same(&value) {
            return false;
        }

        inner.setting.set(true);
        let old_value = inner.value.replace(value.clone());

        let scheduler = &inner.scheduler;
        scheduler.inform();
        let handlers = inner.handlers.borrow().clone();
        scheduler.queue(&handlers);
        scheduler.exec();

        let subscribers: Vec<Subscriber> = inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, subscriber)| Rc::clone(subscriber))
            .collect();
        if !subscribers.is_empty() {
            scheduler.inform();
            let change = Change {
                path: &inner.path,
                value: &value,
                old_value: &old_value,
            };
            for subscriber in subscribers {
                contain("subscriber", || subscriber(&change));
            }
            scheduler.exec();
        }

        inner.setting.set(false);
        true
    }

    /// Register a handler to be queued on every change.
    ///
    /// Registering the same handler twice has no effect.
    pub fn on_change(&self, handler: Handler) {
        let mut handlers = self.inner.handlers.borrow_mut();
        if !handlers.iter().any(|h| Rc::ptr_eq(h, &handler)) {
            handlers.push(handler);
        }
    }

    /// Remove a previously registered handler. Returns whether it was found.
    pub fn remove_handler(&self, handler: &Handler) -> bool {
        let mut handlers = self.inner.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|h| !Rc::ptr_eq(h, handler));
        handlers.len() != before
    }

    /// Register a subscriber. It is not called until the next change.
    pub fn subscribe(&self, subscriber: Subscriber) -> SubscriberId {
        let id = next_subscriber_id();
        self.inner.subscribers.borrow_mut().push((id, subscriber));
        id
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.borrow().len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    pub fn downgrade(&self) -> WeakCell {
        WeakCell {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &ReactiveCell) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Drop every observer and forget the value, without notifying anyone.
    ///
    /// Observers are dropped after the borrows end, since they may own
    /// components of their own.
    pub(crate) fn clear(&self) {
        let handlers = self.inner.handlers.take();
        let subscribers = self.inner.subscribers.take();
        self.inner.value.replace(Value::Unset);
        drop((handlers, subscribers));
    }
}

impl fmt::Debug for ReactiveCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveCell")
            .field("path", &self.inner.path)
            .field("value", &*self.inner.value.borrow())
            .field("handlers", &self.handler_count())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl WeakCell {
    pub fn upgrade(&self) -> Option<ReactiveCell> {
        self.inner.upgrade().map(|inner| ReactiveCell { inner })
    }
}
