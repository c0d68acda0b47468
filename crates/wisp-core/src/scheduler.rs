//! Render scheduling: the reentrant inform/exec counter and its queues.
//!
//! Every mutation in the engine is bracketed by one [`Scheduler::inform`] /
//! [`Scheduler::exec`] pair. Brackets nest freely; only the `exec` that brings
//! the counter back to zero flushes. A flush runs, in order:
//!
//! 1. the data-handler queue (callbacks that refresh output bound to a cell),
//! 2. the DOM-patch queue (node placement queued by mount/unmount),
//! 3. the user queue, handed to a [`Defer`] strategy so it runs after the
//!    current synchronous turn.
//!
//! Within each queue a callback queued several times runs once, at the
//! position it was first queued.
//!
//! # Example
//!
//! ```ignore
//! let scheduler = Scheduler::new();
//!
//! scheduler.inform();
//! scheduler.inform();
//! cell_a.set(1);
//! cell_b.set(2);
//! scheduler.exec(); // still pending, nothing ran
//! scheduler.exec(); // flush: each handler of a and b runs once
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{Error, Result};

/// A zero-argument callback queued for a flush.
pub type Handler = Rc<dyn Fn()>;

/// A one-shot callback run after a flush.
pub type Task = Box<dyn FnOnce()>;

// ============================================================================
// Deferral
// ============================================================================

/// Strategy for running the post-flush user queue outside the current turn.
pub trait Defer {
    /// Run `task` later, after the current synchronous call stack unwinds.
    fn defer(&self, task: Task);
}

/// Default [`Defer`] strategy: tasks wait until someone calls
/// [`DeferQueue::run_pending`].
#[derive(Default)]
pub struct DeferQueue {
    tasks: RefCell<VecDeque<Task>>,
}

impl DeferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every waiting task, including tasks queued while running.
    ///
    /// Returns how many tasks ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.tasks.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

impl Defer for DeferQueue {
    fn defer(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

// ============================================================================
// Queues
// ============================================================================

/// Insertion-ordered set of handlers, keyed by `Rc` identity.
#[derive(Default)]
struct HandlerQueue {
    order: Vec<Handler>,
    seen: HashSet<usize>,
}

impl HandlerQueue {
    fn push(&mut self, handler: &Handler) {
        if self.seen.insert(handler_id(handler)) {
            self.order.push(Rc::clone(handler));
        }
    }

    fn take(&mut self) -> Vec<Handler> {
        self.seen.clear();
        mem::take(&mut self.order)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

fn handler_id(handler: &Handler) -> usize {
    Rc::as_ptr(handler).cast::<()>() as usize
}

// ============================================================================
// Scheduler
// ============================================================================

/// The render scheduler of one universe.
///
/// Cloning is cheap and yields a handle to the same counter and queues.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

struct SchedulerInner {
    count: Cell<usize>,
    flushing: Cell<bool>,
    data_queue: RefCell<HandlerQueue>,
    dom_queue: RefCell<HandlerQueue>,
    user_queue: RefCell<Vec<Task>>,
    defer: Rc<dyn Defer>,
    local: Option<Rc<DeferQueue>>,
    flushes: Cell<u64>,
}

impl Scheduler {
    /// Create a scheduler whose user queue waits for [`Scheduler::run_deferred`].
    pub fn new() -> Self {
        let local = Rc::new(DeferQueue::new());
        Self::build(local.clone(), Some(local))
    }

    /// Create a scheduler that hands post-flush batches to `defer`.
    pub fn with_defer(defer: Rc<dyn Defer>) -> Self {
        Self::build(defer, None)
    }

    fn build(defer: Rc<dyn Defer>, local: Option<Rc<DeferQueue>>) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                count: Cell::new(0),
                flushing: Cell::new(false),
                data_queue: RefCell::new(HandlerQueue::default()),
                dom_queue: RefCell::new(HandlerQueue::default()),
                user_queue: RefCell::new(Vec::new()),
                defer,
                local,
                flushes: Cell::new(0),
            }),
        }
    }

    /// Open a bracket. Returns the new counter value.
    pub fn inform(&self) -> usize {
        let count = self.inner.count.get() + 1;
        self.inner.count.set(count);
        count
    }

    /// Close a bracket, flushing when the counter reaches zero.
    ///
    /// Returns the counter after the call. Closing more brackets than were
    /// opened is harmless: the counter saturates at zero and flushes.
    pub fn exec(&self) -> usize {
        let count = self.inner.count.get().saturating_sub(1);
        self.inner.count.set(count);
        if count > 0 {
            return count;
        }
        self.flush();
        self.inner.count.get()
    }

    /// Force the counter to zero and flush now.
    pub fn exec_immediate(&self) -> usize {
        self.inner.count.set(0);
        self.flush();
        self.inner.count.get()
    }

    /// Whether a bracket is currently open.
    pub fn is_paused(&self) -> bool {
        self.inner.count.get() > 0
    }

    /// Current counter value.
    pub fn pending(&self) -> usize {
        self.inner.count.get()
    }

    /// Number of completed flushes (for debugging).
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.get()
    }

    /// Queue data handlers for the next flush.
    pub fn queue(&self, handlers: &[Handler]) {
        let mut queue = self.inner.data_queue.borrow_mut();
        for handler in handlers {
            queue.push(handler);
        }
    }

    /// Queue a DOM patch for the next flush.
    pub fn queue_dom(&self, patch: &Handler) {
        self.inner.dom_queue.borrow_mut().push(patch);
    }

    /// Queue a one-shot callback to run after the next flush has patched
    /// the document.
    pub fn on_next_render(&self, callback: impl FnOnce() + 'static) {
        self.inner.user_queue.borrow_mut().push(Box::new(callback));
    }

    /// Run `f` inside one bracket and return its result.
    ///
    /// Effects of every write made by `f` are flushed once, after `f` returns.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inform();
        let result = f();
        self.exec();
        result
    }

    /// Run `f` inside one bracket, converting a panic into an error.
    ///
    /// Brackets that `f` left open when it panicked are closed before the
    /// outer bracket, so the scheduler is never left paused.
    pub fn bundle<R>(&self, f: impl FnOnce(&Scheduler) -> R) -> Result<R> {
        let depth = self.inform();
        match panic::catch_unwind(AssertUnwindSafe(|| f(self))) {
            Ok(result) => {
                self.exec();
                Ok(result)
            }
            Err(payload) => {
                self.inner.count.set(depth);
                self.exec();
                Err(Error::Panicked(panic_message(payload.as_ref())))
            }
        }
    }

    /// Run tasks waiting in the built-in deferred queue.
    ///
    /// Returns how many tasks ran. Always zero when a custom [`Defer`]
    /// strategy is installed.
    pub fn run_deferred(&self) -> usize {
        self.inner
            .local
            .as_ref()
            .map_or(0, |local| local.run_pending())
    }

    fn flush(&self) {
        // A flush requested from inside a running flush is folded into it.
        if self.inner.flushing.replace(true) {
            return;
        }

        loop {
            let handlers = self.inner.data_queue.borrow_mut().take();
            if !handlers.is_empty() {
                for handler in handlers {
                    contain("data handler", || handler());
                }
                continue;
            }

            let patches = self.inner.dom_queue.borrow_mut().take();
            if patches.is_empty() {
                break;
            }
            for patch in patches {
                contain("DOM patch", || patch());
            }
        }

        self.inner.flushing.set(false);
        self.inner.flushes.set(self.inner.flushes.get() + 1);

        let callbacks = mem::take(&mut *self.inner.user_queue.borrow_mut());
        if !callbacks.is_empty() {
            tracing::trace!(count = callbacks.len(), "deferring after-render callbacks");
            self.inner.defer.defer(Box::new(move || {
                for callback in callbacks {
                    contain("after-render callback", callback);
                }
            }));
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("count", &self.inner.count.get())
            .field("data_queue", &self.inner.data_queue.borrow().len())
            .field("dom_queue", &self.inner.dom_queue.borrow().len())
            .field("user_queue", &self.inner.user_queue.borrow().len())
            .finish()
    }
}

// ============================================================================
// Callback containment
// ============================================================================

/// Run a user-supplied callback, logging instead of unwinding if it panics.
///
/// Returns `true` when the callback completed.
pub(crate) fn contain(what: &str, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!("{what} panicked: {}", panic_message(payload.as_ref()));
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Handler {
        let log = Rc::clone(log);
        Rc::new(move || log.borrow_mut().push(name))
    }

    #[test]
    fn nested_brackets_flush_once_at_outermost_exec() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recorder(&log, "a");
        let b = recorder(&log, "b");

        scheduler.inform();
        scheduler.inform();
        scheduler.queue(&[a.clone()]);
        scheduler.queue(&[b.clone(), a.clone()]);
        assert_eq!(scheduler.exec(), 1);
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.exec(), 0);

        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(scheduler.flush_count(), 1);
    }

    #[test]
    fn data_handlers_drain_before_dom_patches() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.batch(|| {
            scheduler.queue_dom(&recorder(&log, "dom"));
            scheduler.queue(&[recorder(&log, "data")]);
        });

        assert_eq!(*log.borrow(), vec!["data", "dom"]);
    }

    #[test]
    fn work_queued_during_flush_runs_in_the_same_flush() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let late = recorder(&log, "late");

        let inner = scheduler.clone();
        let log_early = Rc::clone(&log);
        let early: Handler = Rc::new(move || {
            log_early.borrow_mut().push("early");
            inner.batch(|| inner.queue(&[late.clone()]));
        });

        scheduler.batch(|| scheduler.queue_dom(&early));

        assert_eq!(*log.borrow(), vec!["early", "late"]);
        assert_eq!(scheduler.flush_count(), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn user_queue_is_deferred_and_emptied() {
        let scheduler = Scheduler::new();
        let ran = Rc::new(Cell::new(0));

        let ran_clone = Rc::clone(&ran);
        scheduler.batch(|| scheduler.on_next_render(move || ran_clone.set(ran_clone.get() + 1)));
        assert_eq!(ran.get(), 0);

        assert_eq!(scheduler.run_deferred(), 1);
        assert_eq!(ran.get(), 1);

        scheduler.batch(|| {});
        assert_eq!(scheduler.run_deferred(), 0);
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn exec_without_inform_saturates() {
        let scheduler = Scheduler::new();
        assert_eq!(scheduler.exec(), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn exec_immediate_forces_flush() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.inform();
        scheduler.inform();
        scheduler.queue(&[recorder(&log, "a")]);
        assert_eq!(scheduler.exec_immediate(), 0);
        assert_eq!(*log.borrow(), vec!["a"]);
        assert!(!scheduler.is_paused());
    }

    #[test]
    fn panicking_handler_does_not_block_siblings() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let bad: Handler = Rc::new(|| panic!("handler failure"));

        scheduler.batch(|| scheduler.queue(&[bad, recorder(&log, "good")]));

        assert_eq!(*log.borrow(), vec!["good"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn bundle_reports_panics_and_restores_counter() {
        let scheduler = Scheduler::new();
        let result: Result<()> = scheduler.bundle(|s| {
            s.inform();
            s.inform();
            panic!("boom");
        });

        assert!(matches!(result, Err(Error::Panicked(message)) if message == "boom"));
        assert_eq!(scheduler.pending(), 0);
        assert!(!scheduler.is_paused());

        assert_eq!(scheduler.bundle(|_| 7).unwrap(), 7);
    }

    #[test]
    fn custom_defer_receives_one_batch_per_flush() {
        let queue = Rc::new(DeferQueue::new());
        let scheduler = Scheduler::with_defer(queue.clone());
        let ran = Rc::new(Cell::new(0));

        scheduler.batch(|| {
            for _ in 0..3 {
                let ran = Rc::clone(&ran);
                scheduler.on_next_render(move || ran.set(ran.get() + 1));
            }
        });

        assert_eq!(queue.len(), 1);
        assert_eq!(scheduler.run_deferred(), 0);
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(ran.get(), 3);
    }
}
