//! Core engine for wisp: fine-grained reactive components.
//!
//! Data lives in per-component [`Store`]s of [`ReactiveCell`]s. Writing a
//! cell queues the handlers that refresh output derived from it; the
//! [`Scheduler`] runs them once the outermost bracket closes. Components
//! expose named mount points that hold child components, reconciled with
//! minimal mount/unmount work.

pub mod ast;
pub mod binding;
pub mod component;
pub mod config;
mod creator;
pub mod dom;
pub mod error;
pub mod mount;
pub mod resolver;
pub mod scheduler;
pub mod universe;
pub mod value;

pub use ast::{Ast, AttrValue, ElementSpec, EventSpec, MountKind, MountPointSpec, PropSpec, Template, TemplatePart};
pub use binding::{BindSpec, Change, ReactiveCell, Subscriber, SubscriberId, WeakCell};
pub use component::{Component, DebugInfo, Method, MethodArgs, MountOption, Update, WeakComponent};
pub use config::Config;
pub use dom::{Document, Event, ListenerId, NodeId, NodeKind};
pub use error::{Error, Result};
pub use mount::{MountList, Renderable};
pub use resolver::{Resolved, Store};
pub use scheduler::{Defer, DeferQueue, Handler, Scheduler, Task};
pub use universe::Universe;
pub use value::{Key, Path, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
