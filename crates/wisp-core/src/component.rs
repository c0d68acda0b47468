//! Component instances and their lifecycle.
//!
//! A component moves through `constructed -> mounted <-> unmounted ->
//! destroyed`. Its rendered output is one root node followed by a
//! placeholder. The placeholder is what gets positioned; a queued DOM patch
//! then moves the root node in front of it. While unmounted, both live in a
//! private fragment (the safe zone) so the output survives until reused.
//!
//! # Example
//!
//! ```ignore
//! let universe = Universe::new();
//! let template = Template::new(ElementSpec::new("p").bind("greeting"))?;
//! let hello = Component::new(&universe, &template)?;
//!
//! hello.set("greeting", "hello")?;
//! hello.mount(universe.document().body(), MountOption::Append)?;
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::ast::{Ast, Template};
use crate::binding::{Change, SubscriberId};
use crate::creator::{Creator, Root};
use crate::dom::{Document, Event, ListenerId, NodeId};
use crate::error::{Error, Result};
use crate::mount::{MountSlot, Renderable};
use crate::resolver::Store;
use crate::scheduler::{Handler, Scheduler, contain};
use crate::universe::Universe;
use crate::value::{Path, Value};

/// A component method, invoked by template events or [`Component::call`].
pub type Method = Rc<dyn Fn(&MethodArgs)>;

/// What a method receives.
pub struct MethodArgs {
    pub component: Component,
    /// The triggering event, if any.
    pub event: Option<Event>,
    /// The value declared with the event binding, or passed to `call`.
    pub value: Value,
}

/// Where [`Component::mount`] places output relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MountOption {
    Before,
    After,
    #[default]
    Append,
    /// Insert before the target, then remove the target.
    Replace,
}

/// A component instance.
///
/// Cloning yields another handle to the same instance.
#[derive(Clone)]
pub struct Component {
    pub(crate) inner: Rc<ComponentInner>,
}

pub(crate) struct ComponentInner {
    universe: Universe,
    /// `None` once destroyed.
    ctx: RefCell<Option<Context>>,
    mounts: Cell<usize>,
    unmounts: Cell<usize>,
}

/// Non-owning handle to a [`Component`], for callbacks the component
/// itself keeps alive.
#[derive(Clone)]
pub struct WeakComponent {
    inner: Weak<ComponentInner>,
}

impl WeakComponent {
    pub fn upgrade(&self) -> Option<Component> {
        self.inner.upgrade().map(|inner| Component { inner })
    }
}

pub(crate) struct Context {
    pub(crate) template: Option<Template>,
    pub(crate) store: Store,
    pub(crate) methods: HashMap<String, Method>,
    pub(crate) refs: HashMap<String, NodeId>,
    pub(crate) mounts: HashMap<String, MountSlot>,
    pub(crate) node: NodeInfo,
    pub(crate) listeners: Vec<ListenerId>,
    pub(crate) mount_patch: Handler,
}

pub(crate) struct NodeInfo {
    pub(crate) element: NodeId,
    pub(crate) placeholder: NodeId,
    pub(crate) safe_zone: NodeId,
    /// False for a wrapped node, which belongs to whoever created it.
    pub(crate) owns_element: bool,
    pub(crate) attachment: Option<Attachment>,
    /// Targets of a `Replace` mount, removed by the next mount patch.
    pub(crate) replace: Vec<NodeId>,
}

/// Who placed a mounted component.
pub(crate) enum Attachment {
    /// A mount point of another component, which tracks it.
    Slot { parent: WeakComponent, key: String },
    /// Placed by the caller; nobody else tracks it.
    Direct,
}

/// Devtools-style snapshot of a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugInfo {
    pub attached: bool,
    /// Times the component was attached somewhere.
    pub mounts: usize,
    /// Times it was detached.
    pub unmounts: usize,
    pub mount_points: Vec<String>,
    pub listeners: usize,
    pub cells: usize,
}

impl Component {
    /// Render `template` into a new, unmounted component.
    pub fn new(universe: &Universe, template: &Template) -> Result<Self> {
        Self::build(universe, Some(template.clone()), Root::Ast(template.root()))
    }

    /// Construct and apply `state` under one bracket.
    pub fn with_state(universe: &Universe, template: &Template, state: Update) -> Result<Self> {
        universe.scheduler().batch(|| {
            let component = Self::new(universe, template)?;
            component.update(state)?;
            Ok(component)
        })
    }

    /// A component rendering a single text node.
    pub fn text_fragment(universe: &Universe, text: &str) -> Result<Self> {
        Self::build(universe, None, Root::Ast(&Ast::Text(text.to_owned())))
    }

    /// A component whose output is an existing node.
    pub fn wrap_node(universe: &Universe, node: NodeId) -> Result<Self> {
        Self::build(universe, None, Root::Node(node))
    }

    fn build(universe: &Universe, template: Option<Template>, root: Root<'_>) -> Result<Self> {
        let scheduler = universe.scheduler().clone();
        scheduler.batch(|| {
            let inner = Rc::new(ComponentInner {
                universe: universe.clone(),
                ctx: RefCell::new(None),
                mounts: Cell::new(0),
                unmounts: Cell::new(0),
            });
            let owner = WeakComponent {
                inner: Rc::downgrade(&inner),
            };

            let owns_element = matches!(root, Root::Ast(_));
            let store = Store::new(scheduler.clone());
            let rendered = Creator::render(owner.clone(), &store, universe, root)?;

            let doc = universe.document();
            let placeholder = if universe.config().debug_markers {
                doc.create_comment("component placeholder")
            } else {
                doc.create_text("")
            };
            let safe_zone = doc.create_fragment();
            doc.append(safe_zone, placeholder);

            let mount_patch: Handler = Rc::new(move || {
                if let Some(component) = owner.upgrade() {
                    component.place_element();
                }
            });

            *inner.ctx.borrow_mut() = Some(Context {
                template,
                store,
                methods: HashMap::new(),
                refs: rendered.refs,
                mounts: rendered.mounts,
                node: NodeInfo {
                    element: rendered.element,
                    placeholder,
                    safe_zone,
                    owns_element,
                    attachment: None,
                    replace: Vec::new(),
                },
                listeners: rendered.listeners,
                mount_patch: Rc::clone(&mount_patch),
            });
            scheduler.queue_dom(&mount_patch);

            Ok(Component { inner })
        })
    }

    // ========================================================================
    // Context access
    // ========================================================================

    pub(crate) fn with_ctx<R>(&self, f: impl FnOnce(&Context) -> R) -> Result<R> {
        self.inner.ctx.borrow().as_ref().map(f).ok_or(Error::Destroyed)
    }

    pub(crate) fn with_ctx_mut<R>(&self, f: impl FnOnce(&mut Context) -> R) -> Result<R> {
        self.inner
            .ctx
            .borrow_mut()
            .as_mut()
            .map(f)
            .ok_or(Error::Destroyed)
    }

    pub fn downgrade(&self) -> WeakComponent {
        WeakComponent {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn universe(&self) -> &Universe {
        &self.inner.universe
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        self.inner.universe.scheduler()
    }

    pub(crate) fn document(&self) -> &Document {
        self.inner.universe.document()
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.ctx.borrow().is_none()
    }

    /// Whether the component is currently mounted somewhere.
    pub fn is_attached(&self) -> bool {
        self.with_ctx(|ctx| ctx.node.attachment.is_some())
            .unwrap_or(false)
    }

    /// Root node of the rendered output.
    pub fn element(&self) -> Result<NodeId> {
        self.with_ctx(|ctx| ctx.node.element)
    }

    pub fn placeholder(&self) -> Result<NodeId> {
        self.with_ctx(|ctx| ctx.node.placeholder)
    }

    /// Mount point slot owning this component, if any.
    pub(crate) fn slot_parent(&self) -> Option<Component> {
        self.with_ctx(|ctx| match &ctx.node.attachment {
            Some(Attachment::Slot { parent, .. }) => parent.upgrade(),
            _ => None,
        })
        .ok()
        .flatten()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Insert the output at `target` according to `option`.
    ///
    /// A component that is already mounted is unmounted first. Returns the
    /// scheduler's bracket counter after the call.
    pub fn mount(&self, target: NodeId, option: MountOption) -> Result<usize> {
        let placeholder = self.placeholder()?;
        let scheduler = self.scheduler().clone();
        scheduler.batch(|| -> Result<()> {
            self.release_previous()?;

            let doc = self.document();
            let placed = match option {
                MountOption::Before => doc.insert_before(target, placeholder),
                MountOption::After => doc.insert_after(target, placeholder),
                MountOption::Append => doc.append(target, placeholder),
                MountOption::Replace => doc.insert_before(target, placeholder),
            };
            if !placed {
                tracing::warn!(%target, ?option, "mount target cannot hold this component");
                return Ok(());
            }

            self.with_ctx_mut(|ctx| {
                if option == MountOption::Replace {
                    ctx.node.replace.push(target);
                }
                ctx.node.attachment = Some(Attachment::Direct);
            })?;
            self.record_attach();
            Ok(())
        })?;
        Ok(scheduler.pending())
    }

    /// Mark the component as mounted and return its placeholder for the
    /// caller to position. The root node follows at the next flush.
    pub fn mount_detached(&self) -> Result<NodeId> {
        let placeholder = self.placeholder()?;
        self.scheduler().batch(|| {
            self.release_previous()?;
            self.with_ctx_mut(|ctx| ctx.node.attachment = Some(Attachment::Direct))?;
            self.record_attach();
            Ok(placeholder)
        })
    }

    /// Attach to a mount point of `parent`. Returns the placeholder, which
    /// the caller must insert.
    pub(crate) fn attach(&self, parent: &Component, key: &str) -> Result<NodeId> {
        let placeholder = self.placeholder()?;
        self.scheduler().batch(|| {
            self.release_previous()?;
            self.with_ctx_mut(|ctx| {
                ctx.node.attachment = Some(Attachment::Slot {
                    parent: parent.downgrade(),
                    key: key.to_owned(),
                });
            })?;
            self.record_attach();
            Ok(placeholder)
        })
    }

    fn release_previous(&self) -> Result<()> {
        if self.is_attached() {
            if self.universe().config().warnings {
                tracing::warn!("component detached from its previous mount point");
            }
            self.unmount()?;
        }
        Ok(())
    }

    fn record_attach(&self) {
        self.inner.mounts.set(self.inner.mounts.get() + 1);
        if let Ok(patch) = self.with_ctx(|ctx| Rc::clone(&ctx.mount_patch)) {
            self.scheduler().queue_dom(&patch);
        }
    }

    /// Detach from wherever the component is mounted.
    ///
    /// The owning mount point, if any, forgets the component. State is kept;
    /// the component can be mounted again. Returns the bracket counter.
    pub fn unmount(&self) -> Result<usize> {
        let (attachment, placeholder, safe_zone, patch) = self.with_ctx_mut(|ctx| {
            (
                ctx.node.attachment.take(),
                ctx.node.placeholder,
                ctx.node.safe_zone,
                Rc::clone(&ctx.mount_patch),
            )
        })?;
        let Some(attachment) = attachment else {
            return Ok(self.scheduler().pending());
        };

        let scheduler = self.scheduler();
        scheduler.inform();
        if let Attachment::Slot { parent, key } = attachment
            && let Some(parent) = parent.upgrade()
        {
            parent.detach_child(&key, self);
        }
        self.document().append(safe_zone, placeholder);
        scheduler.queue_dom(&patch);
        self.inner.unmounts.set(self.inner.unmounts.get() + 1);
        Ok(scheduler.exec())
    }

    /// Unmount, release every occupant of this component's mount points,
    /// and drop all state. Every later call returns [`Error::Destroyed`].
    pub fn destroy(&self) -> Result<usize> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }
        let scheduler = self.scheduler().clone();
        scheduler.batch(|| -> Result<()> {
            self.unmount()?;

            let occupants: Vec<Component> = self.with_ctx(|ctx| {
                ctx.mounts.values().flat_map(MountSlot::occupants).collect()
            })?;
            for occupant in occupants {
                occupant.unmount()?;
            }

            let ctx = self.inner.ctx.borrow_mut().take();
            if let Some(ctx) = ctx {
                ctx.store.close();
                let doc = self.document();
                for id in &ctx.listeners {
                    doc.remove_listener(*id);
                }
                let release = release_patch(doc, &ctx.node, Vec::new());
                scheduler.queue_dom(&release);
            }
            tracing::trace!("component destroyed");
            Ok(())
        })?;
        Ok(scheduler.pending())
    }

    /// The queued DOM patch: bring the root node in front of the placeholder.
    fn place_element(&self) {
        let Ok((element, placeholder, replaced)) = self.with_ctx_mut(|ctx| {
            (
                ctx.node.element,
                ctx.node.placeholder,
                std::mem::take(&mut ctx.node.replace),
            )
        }) else {
            return;
        };
        let doc = self.document();
        for node in replaced {
            doc.remove(node);
        }
        doc.insert_before(placeholder, element);
    }

    // ========================================================================
    // Data
    // ========================================================================

    /// The component's reactive data store.
    pub fn data(&self) -> Result<Store> {
        self.with_ctx(|ctx| ctx.store.clone())
    }

    pub fn get(&self, path: impl Into<Path>) -> Result<Value> {
        Ok(self.data()?.get(&path.into()))
    }

    /// Write one value. Returns whether it changed.
    pub fn set(&self, path: impl Into<Path>, value: impl Into<Value>) -> Result<bool> {
        self.data()?.set(&path.into(), value)
    }

    /// Write several values under one bracket.
    pub fn assign<P, V>(&self, entries: impl IntoIterator<Item = (P, V)>) -> Result<()>
    where
        P: Into<Path>,
        V: Into<Value>,
    {
        self.data()?.assign(entries)
    }

    /// Observe `path`. `f` runs once immediately with the current value,
    /// then after every change.
    ///
    /// If the initial call panics, the panic is logged and the observer is
    /// not registered (`Ok(None)`).
    pub fn subscribe(
        &self,
        path: impl Into<Path>,
        f: impl Fn(&Component, &Change<'_>) + 'static,
    ) -> Result<Option<SubscriberId>> {
        let path = path.into();
        let cell = self.data()?.cell(&path)?;
        let f = Rc::new(f);

        Ok(self.scheduler().batch(|| {
            let value = cell.get();
            let initial = Change {
                path: &path,
                value: &value,
                old_value: &Value::Unset,
            };
            if !contain("subscriber", || f(self, &initial)) {
                tracing::error!(%path, "subscriber failed during registration");
                return None;
            }

            let owner = self.downgrade();
            Some(cell.subscribe(Rc::new(move |change: &Change<'_>| {
                if let Some(component) = owner.upgrade() {
                    f(&component, change);
                }
            })))
        }))
    }

    pub fn unsubscribe(&self, path: impl Into<Path>, id: SubscriberId) -> Result<bool> {
        let cell = self.data()?.cell(&path.into())?;
        Ok(cell.unsubscribe(id))
    }

    // ========================================================================
    // Methods and references
    // ========================================================================

    pub fn set_method(&self, name: impl Into<String>, f: impl Fn(&MethodArgs) + 'static) -> Result<()> {
        self.insert_method(name.into(), Rc::new(f))
    }

    fn insert_method(&self, name: String, method: Method) -> Result<()> {
        self.with_ctx_mut(|ctx| {
            ctx.methods.insert(name, method);
        })
    }

    pub fn method(&self, name: &str) -> Result<Option<Method>> {
        self.with_ctx(|ctx| ctx.methods.get(name).cloned())
    }

    /// Invoke a method by name under one bracket.
    ///
    /// Returns `Ok(false)` when no such method exists. A panicking method
    /// is reported as [`Error::Panicked`].
    pub fn call(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        let Some(method) = self.method(name)? else {
            return Ok(false);
        };
        let args = MethodArgs {
            component: self.clone(),
            event: None,
            value: value.into(),
        };
        self.scheduler().bundle(|_| method(&args))?;
        Ok(true)
    }

    /// Elements registered by name in the template.
    pub fn refs(&self) -> Result<HashMap<String, NodeId>> {
        self.with_ctx(|ctx| ctx.refs.clone())
    }

    pub fn node_ref(&self, name: &str) -> Result<Option<NodeId>> {
        self.with_ctx(|ctx| ctx.refs.get(name).copied())
    }

    // ========================================================================
    // Props
    // ========================================================================

    /// Read a prop registered on the template.
    pub fn prop(&self, name: &str) -> Result<Value> {
        let (store, spec) = self.prop_spec(name)?;
        let value = store.get(&spec.path);
        Ok(match spec.toggle {
            Some((on, _)) => Value::Bool(value.same(&on)),
            None => value,
        })
    }

    /// Write a prop registered on the template.
    pub fn set_prop(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        let (store, spec) = self.prop_spec(name)?;
        let value = value.into();
        let value = match spec.toggle {
            Some((on, off)) => {
                if value.is_truthy() {
                    on
                } else {
                    off
                }
            }
            None => value,
        };
        store.set(&spec.path, value)
    }

    fn prop_spec(&self, name: &str) -> Result<(Store, crate::ast::PropSpec)> {
        self.with_ctx(|ctx| {
            let spec = ctx.template.as_ref().and_then(|t| t.prop(name)).cloned();
            (ctx.store.clone(), spec)
        })
        .and_then(|(store, spec)| {
            spec.map(|spec| (store, spec))
                .ok_or_else(|| Error::UnknownProp(name.to_owned()))
        })
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Apply a batch of changes under one bracket.
    pub fn update(&self, update: Update) -> Result<()> {
        self.with_ctx(|_| ())?;
        self.scheduler().batch(|| {
            self.assign(update.data)?;
            for (name, method) in update.methods {
                self.insert_method(name, method)?;
            }
            for (name, value) in update.props {
                self.set_prop(&name, value)?;
            }
            for (name, value) in update.mounts {
                self.set_mount(&name, value)?;
            }
            for (name, items) in update.lists {
                self.set_list(&name, items)?;
            }
            Ok(())
        })
    }

    pub fn debug_info(&self) -> Result<DebugInfo> {
        let mut info = self.with_ctx(|ctx| DebugInfo {
            attached: ctx.node.attachment.is_some(),
            mounts: 0,
            unmounts: 0,
            mount_points: ctx
                .template
                .as_ref()
                .map(|t| t.mount_points().iter().map(|p| p.name.clone()).collect())
                .unwrap_or_default(),
            listeners: ctx.listeners.len(),
            cells: ctx.store.cells().len(),
        })?;
        info.mounts = self.inner.mounts.get();
        info.unmounts = self.inner.unmounts.get();
        Ok(info)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Component");
        match self.with_ctx(|ctx| (ctx.node.element, ctx.node.attachment.is_some())) {
            Ok((element, attached)) => s
                .field("element", &element)
                .field("attached", &attached),
            Err(_) => s.field("destroyed", &true),
        };
        s.finish()
    }
}

impl Drop for ComponentInner {
    /// An unplaced component's output can never be reached again, so its
    /// nodes go back to the document at the next flush. Output that is
    /// still in place stays where it is.
    fn drop(&mut self) {
        let Some(ctx) = self.ctx.get_mut().take() else {
            return;
        };
        let placed = match &ctx.node.attachment {
            Some(Attachment::Direct) => true,
            Some(Attachment::Slot { parent, .. }) => parent.upgrade().is_some(),
            None => false,
        };
        if placed {
            return;
        }

        ctx.store.close();
        let occupants = ctx
            .mounts
            .values()
            .flat_map(MountSlot::occupants)
            .map(|occupant| occupant.downgrade())
            .collect();
        let release = release_patch(self.universe.document(), &ctx.node, occupants);
        drop(ctx);
        self.universe.scheduler().queue_dom(&release);
    }
}

/// DOM patch freeing a dead component's nodes.
///
/// `survivors` are occupants other handles may still hold; they are moved
/// to their own safe zones first so the release does not take them along.
fn release_patch(doc: &Document, node: &NodeInfo, survivors: Vec<WeakComponent>) -> Handler {
    let weak_doc = doc.downgrade();
    let (element, owned) = (node.element, node.owns_element);
    let (placeholder, safe_zone) = (node.placeholder, node.safe_zone);
    Rc::new(move || {
        for survivor in survivors.iter().filter_map(WeakComponent::upgrade) {
            if survivor.unmount().is_ok() {
                survivor.place_element();
            }
        }
        let Some(doc) = weak_doc.upgrade() else {
            return;
        };
        if owned {
            doc.release(element);
        } else {
            doc.remove(element);
        }
        doc.release(placeholder);
        doc.release(safe_zone);
    })
}

/// A set of changes applied together by [`Component::update`].
#[derive(Default)]
pub struct Update {
    data: Vec<(Path, Value)>,
    methods: Vec<(String, Method)>,
    props: Vec<(String, Value)>,
    mounts: Vec<(String, Renderable)>,
    lists: Vec<(String, Vec<Renderable>)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(mut self, path: impl Into<Path>, value: impl Into<Value>) -> Self {
        self.data.push((path.into(), value.into()));
        self
    }

    pub fn method(mut self, name: impl Into<String>, f: impl Fn(&MethodArgs) + 'static) -> Self {
        self.methods.push((name.into(), Rc::new(f)));
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.push((name.into(), value.into()));
        self
    }

    pub fn mount(mut self, name: impl Into<String>, value: impl Into<Renderable>) -> Self {
        self.mounts.push((name.into(), value.into()));
        self
    }

    pub fn list<R: Into<Renderable>>(
        mut self,
        name: impl Into<String>,
        items: impl IntoIterator<Item = R>,
    ) -> Self {
        self.lists
            .push((name.into(), items.into_iter().map(Into::into).collect()));
        self
    }
}
