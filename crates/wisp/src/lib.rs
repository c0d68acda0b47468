//! Wisp - a fine-grained reactive component engine for Rust.
//!
//! Components render a [`Template`] once. After that, writing a value to a
//! component's data updates exactly the text, attributes and properties
//! bound to it, and child components move in and out of named mount points
//! without re-rendering their parent.
//!
//! # Quick Start
//!
//! ```ignore
//! use wisp::prelude::*;
//!
//! fn main() -> Result<(), wisp::RuntimeError> {
//!     let template = Template::new(
//!         ElementSpec::new("p").text("Hello, ").bind(BindSpec::new("name").with_default("World")),
//!     )?;
//!
//!     let runtime = wisp::run(Config::default(), |universe| {
//!         let greeting = Component::new(universe, &template)?;
//!         greeting.mount(universe.document().body(), MountOption::Append)?;
//!         greeting.set("name", "Wisp")?;
//!         Ok(())
//!     })?;
//!
//!     let document = runtime.universe().document();
//!     println!("{}", document.inner_html(document.body()));
//!     Ok(())
//! }
//! ```
//!
//! # Batching
//!
//! Every public operation on a component is wrapped in a scheduler bracket,
//! so a burst of writes refreshes the output once. Wrap your own bursts in
//! [`Scheduler::batch`] to get the same effect across several calls.

mod runtime;

pub use runtime::{run, LocalSpawner, Runtime, RuntimeError};

pub mod prelude {
    //! Common imports for wisp applications.
    pub use crate::runtime::{run, Runtime};
    pub use wisp_core::{
        Ast, AttrValue, BindSpec, Change, Component, Config, ElementSpec, MountKind, MountList,
        MountOption, Renderable, Template, TemplatePart, Universe, Update, Value, WeakComponent,
    };
}

// Re-export core types at crate root
pub use wisp_core::{
    Component, Config, Document, Error, MountList, MountOption, Scheduler, Template, Universe,
    Value,
};

pub use wisp_core as core;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the default `tracing` subscriber.
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}
