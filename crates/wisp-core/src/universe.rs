//! A render universe: one scheduler, one document, one configuration.
//!
//! Components created in different universes never share queues or the
//! bracket counter, so independent roots (and tests) cannot interfere.

use std::rc::Rc;

use crate::config::Config;
use crate::dom::Document;
use crate::scheduler::{Defer, Scheduler};

#[derive(Clone, Debug)]
pub struct Universe {
    scheduler: Scheduler,
    document: Document,
    config: Rc<Config>,
}

impl Universe {
    /// A universe with default configuration and a manual deferred queue.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::assemble(Scheduler::new(), config)
    }

    /// A universe whose after-render callbacks are handed to `defer`.
    pub fn with_defer(config: Config, defer: Rc<dyn Defer>) -> Self {
        Self::assemble(Scheduler::with_defer(defer), config)
    }

    fn assemble(scheduler: Scheduler, config: Config) -> Self {
        tracing::debug!(
            warnings = config.warnings,
            debug_markers = config.debug_markers,
            "creating render universe"
        );
        Self {
            scheduler,
            document: Document::new(),
            config: Rc::new(config),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run after-render callbacks waiting in the manual deferred queue.
    pub fn run_deferred(&self) -> usize {
        self.scheduler.run_deferred()
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::scheduler::DeferQueue;

    #[test]
    fn universes_do_not_share_counters() {
        let a = Universe::new();
        let b = Universe::new();
        a.scheduler().inform();
        assert!(a.scheduler().is_paused());
        assert!(!b.scheduler().is_paused());
        assert!(!a.document().ptr_eq(b.document()));
        a.scheduler().exec();
    }

    #[test]
    fn custom_defer_is_used() {
        let queue = Rc::new(DeferQueue::new());
        let universe = Universe::with_defer(Config::default(), queue.clone());
        let ran = Rc::new(Cell::new(false));

        let ran_clone = Rc::clone(&ran);
        universe
            .scheduler()
            .batch(|| universe.scheduler().on_next_render(move || ran_clone.set(true)));

        assert_eq!(universe.run_deferred(), 0);
        assert_eq!(queue.run_pending(), 1);
        assert!(ran.get());
    }
}
