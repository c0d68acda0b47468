//! Runtime - drives after-render callbacks on a single-threaded tokio loop.
//!
//! Components are `!Send`, so everything lives on one thread: a
//! current-thread runtime polling a [`LocalSet`]. The universe's
//! after-render queue is spawned onto that set, which gives callbacks the
//! "next turn" semantics they need.

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;

use tokio::task::LocalSet;
use wisp_core::{Config, Defer, Task, Universe};

/// Errors raised while starting or running an application.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to build async runtime: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] wisp_core::Error),
}

/// [`Defer`] strategy that spawns tasks onto a [`LocalSet`].
pub struct LocalSpawner {
    local: Rc<LocalSet>,
    pending: Rc<Cell<usize>>,
}

impl LocalSpawner {
    pub fn new(local: Rc<LocalSet>) -> Self {
        Self {
            local,
            pending: Rc::new(Cell::new(0)),
        }
    }

    /// Tasks spawned but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.get()
    }
}

/// Decrements the pending count even when the task panics.
struct PendingGuard(Rc<Cell<usize>>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl Defer for LocalSpawner {
    fn defer(&self, task: Task) {
        self.pending.set(self.pending.get() + 1);
        let guard = PendingGuard(Rc::clone(&self.pending));
        self.local.spawn_local(async move {
            let _guard = guard;
            task();
        });
    }
}

/// A universe bound to a single-threaded async runtime.
pub struct Runtime {
    rt: tokio::runtime::Runtime,
    local: Rc<LocalSet>,
    spawner: Rc<LocalSpawner>,
    universe: Universe,
}

impl Runtime {
    pub fn new(config: Config) -> Result<Self, RuntimeError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let local = Rc::new(LocalSet::new());
        let spawner = Rc::new(LocalSpawner::new(Rc::clone(&local)));
        let universe = Universe::with_defer(config, spawner.clone());

        tracing::debug!("runtime ready");

        Ok(Self {
            rt,
            local,
            spawner,
            universe,
        })
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// Run `future` to completion on the local set.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.local.block_on(&self.rt, future)
    }

    /// Poll until every after-render callback, including ones queued by
    /// other callbacks, has run.
    pub fn settle(&self) {
        let spawner = Rc::clone(&self.spawner);
        self.block_on(async move {
            while spawner.pending() > 0 {
                tokio::task::yield_now().await;
            }
        });
    }

    /// Callbacks spawned but not yet run.
    pub fn pending(&self) -> usize {
        self.spawner.pending()
    }
}

/// Build a runtime, hand its universe to `app`, then settle.
///
/// Returns the runtime so the caller can keep driving it.
pub fn run<F>(config: Config, app: F) -> Result<Runtime, RuntimeError>
where
    F: FnOnce(&Universe) -> wisp_core::Result<()>,
{
    crate::init_tracing();

    let runtime = Runtime::new(config)?;
    if let Err(e) = app(runtime.universe()) {
        tracing::error!("application setup failed: {}", e);
        return Err(e.into());
    }
    runtime.settle();
    Ok(runtime)
}
