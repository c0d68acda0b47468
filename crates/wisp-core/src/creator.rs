//! Turning a template into document nodes wired to a component's data.
//!
//! Every piece of bound output gets one handler registered on each cell it
//! reads. Handlers are queued once at creation, so initial content appears
//! at the flush that ends the component's constructor, and again whenever a
//! cell they read changes.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Ast, AttrValue, ElementSpec, EventSpec, MountKind, MountPointSpec, TemplatePart};
use crate::binding::{BindSpec, WeakCell};
use crate::component::{MethodArgs, WeakComponent};
use crate::dom::{Document, ListenerId, NodeId, WeakDocument};
use crate::error::Result;
use crate::mount::MountSlot;
use crate::resolver::Store;
use crate::scheduler::Handler;
use crate::universe::Universe;
use crate::value::Value;

/// Properties that write user input back into their binding.
const SYNCED_PROPERTIES: [&str; 2] = ["value", "checked"];
const SYNC_EVENTS: [&str; 2] = ["input", "change"];

pub(crate) enum Root<'a> {
    Ast(&'a Ast),
    /// An existing node adopted as the component's output.
    Node(NodeId),
}

/// What rendering produced, handed to the component context.
pub(crate) struct Rendered {
    pub(crate) element: NodeId,
    pub(crate) refs: HashMap<String, NodeId>,
    pub(crate) mounts: HashMap<String, MountSlot>,
    pub(crate) listeners: Vec<ListenerId>,
}

pub(crate) struct Creator<'a> {
    owner: WeakComponent,
    store: &'a Store,
    universe: &'a Universe,
    refs: HashMap<String, NodeId>,
    mounts: HashMap<String, MountSlot>,
    listeners: Vec<ListenerId>,
}

/// A rendered piece of an attribute template.
enum Segment {
    Literal(String),
    Cell(WeakCell),
    /// A typed constant, kept as is when it stands alone.
    Value(Value),
}

impl<'a> Creator<'a> {
    pub(crate) fn render(
        owner: WeakComponent,
        store: &'a Store,
        universe: &'a Universe,
        root: Root<'_>,
    ) -> Result<Rendered> {
        let mut creator = Creator {
            owner,
            store,
            universe,
            refs: HashMap::new(),
            mounts: HashMap::new(),
            listeners: Vec::new(),
        };
        let element = match root {
            Root::Ast(ast) => creator.node(ast)?,
            Root::Node(node) => node,
        };
        Ok(Rendered {
            element,
            refs: creator.refs,
            mounts: creator.mounts,
            listeners: creator.listeners,
        })
    }

    fn doc(&self) -> &Document {
        self.universe.document()
    }

    fn node(&mut self, ast: &Ast) -> Result<NodeId> {
        match ast {
            Ast::Element(spec) => self.element(spec),
            Ast::Text(text) => Ok(self.doc().create_text(text)),
            Ast::Bound(spec) => self.bound_text(spec),
            // Only reachable through an element's children, see `element`.
            Ast::MountPoint(_) => Ok(self.doc().create_text("")),
        }
    }

    fn element(&mut self, spec: &ElementSpec) -> Result<NodeId> {
        let node = self.doc().create_element(&spec.tag);

        for (name, value) in &spec.attrs {
            self.attribute(node, name, value)?;
        }
        for (name, value) in &spec.props {
            self.property(node, name, value)?;
        }
        for event in &spec.events {
            self.event(node, event)?;
        }
        if let Some(name) = &spec.reference {
            self.refs.insert(name.clone(), node);
        }

        for child in &spec.children {
            match child {
                Ast::MountPoint(point) => self.mount_point(node, point),
                _ => {
                    let child = self.node(child)?;
                    self.doc().append(node, child);
                }
            }
        }
        Ok(node)
    }

    fn bound_text(&mut self, spec: &BindSpec) -> Result<NodeId> {
        let cell = self.store.bind(spec)?;
        let node = self.doc().create_text("");

        let doc = self.doc().downgrade();
        let reader = cell.downgrade();
        let handler: Handler = Rc::new(move || {
            if let (Some(doc), Some(cell)) = (doc.upgrade(), reader.upgrade()) {
                doc.set_text(node, &cell.get().to_string());
            }
        });
        cell.on_change(Rc::clone(&handler));
        self.store.scheduler().queue(&[handler]);
        Ok(node)
    }

    fn segments(&self, parts: &[TemplatePart]) -> Result<Vec<Segment>> {
        parts
            .iter()
            .map(|part| match part {
                TemplatePart::Literal(text) => Ok(Segment::Literal(text.clone())),
                TemplatePart::Bind(spec) => Ok(Segment::Cell(self.store.bind(spec)?.downgrade())),
            })
            .collect()
    }

    /// Register `handler` on every cell in `segments` and queue it once.
    fn watch(&self, segments: &[Segment], handler: Handler) {
        for segment in segments {
            if let Segment::Cell(cell) = segment
                && let Some(cell) = cell.upgrade()
            {
                cell.on_change(Rc::clone(&handler));
            }
        }
        self.store.scheduler().queue(&[handler]);
    }

    fn attribute(&mut self, node: NodeId, name: &str, value: &AttrValue) -> Result<()> {
        let is_class = name == "class";
        match value {
            AttrValue::Static(value) => {
                write_attribute(self.doc(), node, name, value.to_string(), is_class);
            }
            AttrValue::Template(parts) => {
                let segments = Rc::new(self.segments(parts)?);
                let doc = self.doc().downgrade();
                let name = name.to_owned();
                let rendered = Rc::clone(&segments);
                let handler: Handler = Rc::new(move || {
                    if let Some(doc) = doc.upgrade() {
                        write_attribute(&doc, node, &name, render(&rendered), is_class);
                    }
                });
                self.watch(&segments, handler);
            }
        }
        Ok(())
    }

    fn property(&mut self, node: NodeId, name: &str, value: &AttrValue) -> Result<()> {
        let parts = match value {
            AttrValue::Static(value) => {
                self.doc().set_property(node, name, value.clone());
                return Ok(());
            }
            AttrValue::Template(parts) => parts,
        };

        let segments = Rc::new(self.segments(parts)?);
        let doc = self.doc().downgrade();
        let prop = name.to_owned();
        let rendered = Rc::clone(&segments);
        let handler: Handler = Rc::new(move || {
            if let Some(doc) = doc.upgrade() {
                doc.set_property(node, &prop, evaluate(&rendered));
            }
        });
        self.watch(&segments, Rc::clone(&handler));

        if SYNCED_PROPERTIES.contains(&name)
            && let Some(spec) = value.sole_binding()
        {
            let cell = self.store.bind(spec)?.downgrade();
            self.sync_back(node, name, cell, handler);
        }
        Ok(())
    }

    /// Write the element's property back into its cell on user input.
    ///
    /// The element's own handler is unregistered during the write so the
    /// element is not re-rendered with the value it just produced.
    fn sync_back(&mut self, node: NodeId, name: &str, cell: WeakCell, handler: Handler) {
        for event in SYNC_EVENTS {
            let doc = self.doc().downgrade();
            let cell = cell.clone();
            let handler = Rc::clone(&handler);
            let prop = name.to_owned();
            let id = self.doc().add_listener(node, event, move |_| {
                let (Some(doc), Some(cell)) = (doc.upgrade(), cell.upgrade()) else {
                    return;
                };
                let value = doc.property(node, &prop);
                cell.scheduler().batch(|| {
                    cell.remove_handler(&handler);
                    cell.set(value);
                    cell.on_change(Rc::clone(&handler));
                });
            });
            self.listeners.push(id);
        }
    }

    fn event(&mut self, node: NodeId, spec: &EventSpec) -> Result<()> {
        let owner = self.owner.clone();
        let method = spec.method.clone();
        let value = match &spec.value {
            AttrValue::Static(value) => vec![Segment::Value(value.clone())],
            AttrValue::Template(parts) => self.segments(parts)?,
        };
        let warnings = self.universe.config().warnings;

        let id = self.doc().add_listener(node, &spec.event, move |event| {
            let Some(component) = owner.upgrade() else {
                return;
            };
            let Ok(Some(handler)) = component.method(&method) else {
                if warnings {
                    tracing::warn!(method = %method, event = %event.name, "method not defined");
                }
                return;
            };
            let args = MethodArgs {
                component: component.clone(),
                event: Some(event.clone()),
                value: evaluate(&value),
            };
            if let Err(error) = component.scheduler().bundle(|_| handler(&args)) {
                tracing::error!(method = %method, "error in event handler: {error}");
            }
        });
        self.listeners.push(id);
        Ok(())
    }

    fn mount_point(&mut self, parent: NodeId, spec: &MountPointSpec) {
        let doc = self.universe.document().clone();
        let markers = self.universe.config().debug_markers;

        if markers {
            doc.append(parent, doc.create_comment(&format!("mount point: {}", spec.name)));
        }
        let anchor = doc.create_text("");
        doc.append(parent, anchor);
        if markers {
            doc.append(parent, doc.create_comment(&format!("end of {}", spec.name)));
        }

        let slot = match spec.kind {
            MountKind::Single => MountSlot::Single { anchor, node: None },
            MountKind::List => MountSlot::List {
                anchor,
                items: Vec::new(),
            },
        };
        self.mounts.insert(spec.name.clone(), slot);
    }
}

fn render(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Cell(cell) => {
                if let Some(cell) = cell.upgrade() {
                    out.push_str(&cell.get().to_string());
                }
            }
            Segment::Value(value) => out.push_str(&value.to_string()),
        }
    }
    out
}

/// Current value of `segments`: typed when it is a single cell or
/// constant, concatenated text otherwise.
fn evaluate(segments: &[Segment]) -> Value {
    match segments {
        [Segment::Cell(cell)] => cell.upgrade().map(|c| c.get()).unwrap_or_default(),
        [Segment::Value(value)] => value.clone(),
        _ => Value::Text(render(segments)),
    }
}

fn write_attribute(doc: &Document, node: NodeId, name: &str, value: String, is_class: bool) {
    let value = if is_class {
        value.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        value
    };
    if value.is_empty() {
        doc.remove_attribute(node, name);
    } else {
        doc.set_attribute(node, name, &value);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::ast::Template;
    use crate::component::{Component, MountOption};
    use crate::config::Config;

    fn mounted(universe: &Universe, root: ElementSpec) -> Component {
        let template = Template::new(root).unwrap();
        let component = Component::new(universe, &template).unwrap();
        component
            .mount(universe.document().body(), MountOption::Append)
            .unwrap();
        component
    }

    #[test]
    fn attribute_templates_follow_data() {
        let universe = Universe::new();
        let component = mounted(
            &universe,
            ElementSpec::new("div")
                .attr("id", "static")
                .attr(
                    "class",
                    vec![
                        TemplatePart::literal("  item  "),
                        TemplatePart::bind("state"),
                        TemplatePart::literal(" "),
                    ],
                )
                .attr("title", BindSpec::new("title")),
        );
        let doc = universe.document();

        assert_eq!(doc.inner_html(doc.body()), "<div id=\"static\" class=\"item\"></div>");

        component.set("state", "active").unwrap();
        component.set("title", "hello").unwrap();
        assert_eq!(
            doc.inner_html(doc.body()),
            "<div id=\"static\" class=\"item active\" title=\"hello\"></div>"
        );

        component.set("title", "").unwrap();
        let element = component.element().unwrap();
        assert_eq!(doc.attribute(element, "title"), None);
    }

    #[test]
    fn bound_text_handler_runs_once_per_flush() {
        let universe = Universe::new();
        let component = mounted(
            &universe,
            ElementSpec::new("span")
                .bind("first")
                .text(" ")
                .bind("first"),
        );
        let doc = universe.document();

        universe.scheduler().batch(|| {
            component.set("first", "a").unwrap();
            component.set("first", "b").unwrap();
        });

        assert_eq!(doc.text_content(doc.body()), "b b");
    }

    #[test]
    fn value_property_syncs_both_ways() {
        let universe = Universe::new();
        let component = mounted(
            &universe,
            ElementSpec::new("input")
                .prop("value", BindSpec::new("text").with_default("start"))
                .reference("field"),
        );
        let doc = universe.document();
        let input = component.node_ref("field").unwrap().unwrap();

        assert_eq!(doc.property(input, "value"), Value::from("start"));

        doc.set_property(input, "value", Value::from("typed"));
        doc.dispatch(input, "input", Value::Unset);
        assert_eq!(component.get("text").unwrap(), Value::from("typed"));

        component.set("text", "reset").unwrap();
        assert_eq!(doc.property(input, "value"), Value::from("reset"));
    }

    #[test]
    fn events_call_methods_with_declared_value() {
        let universe = Universe::with_config(Config::default().with_warnings(true));
        let component = mounted(
            &universe,
            ElementSpec::new("button")
                .on_with("click", "pick", 7)
                .on("dblclick", "missing")
                .on("focus", "broken")
                .reference("button"),
        );
        let picked = Rc::new(RefCell::new(Vec::new()));
        let picked_clone = Rc::clone(&picked);
        component
            .set_method("pick", move |args| {
                picked_clone.borrow_mut().push(args.value.clone());
            })
            .unwrap();
        let broken_calls = Rc::new(Cell::new(0));
        let broken_clone = Rc::clone(&broken_calls);
        component
            .set_method("broken", move |_| {
                broken_clone.set(broken_clone.get() + 1);
                panic!("method failure");
            })
            .unwrap();

        let doc = universe.document();
        let button = component.node_ref("button").unwrap().unwrap();
        doc.dispatch(button, "click", Value::Unset);
        doc.dispatch(button, "dblclick", Value::Unset);
        doc.dispatch(button, "focus", Value::Unset);

        assert_eq!(*picked.borrow(), vec![Value::from(7)]);
        assert_eq!(broken_calls.get(), 1);
        assert_eq!(universe.scheduler().pending(), 0);
    }

    #[test]
    fn event_value_is_read_when_the_event_fires() {
        let universe = Universe::new();
        let component = mounted(
            &universe,
            ElementSpec::new("button")
                .on_with("click", "pick", BindSpec::new("selected").with_default(1))
                .on_with(
                    "dblclick",
                    "pick",
                    vec![TemplatePart::literal("row-"), TemplatePart::bind("selected")],
                )
                .reference("button"),
        );
        let picked = Rc::new(RefCell::new(Vec::new()));
        let picked_clone = Rc::clone(&picked);
        component
            .set_method("pick", move |args| {
                picked_clone.borrow_mut().push(args.value.clone());
            })
            .unwrap();
        let doc = universe.document();
        let button = component.node_ref("button").unwrap().unwrap();

        doc.dispatch(button, "click", Value::Unset);
        component.set("selected", 4).unwrap();
        doc.dispatch(button, "click", Value::Unset);
        doc.dispatch(button, "dblclick", Value::Unset);

        assert_eq!(
            *picked.borrow(),
            vec![Value::from(1), Value::from(4), Value::from("row-4")]
        );
    }

    #[test]
    fn debug_markers_wrap_mount_points() {
        let universe = Universe::with_config(Config::default().with_debug_markers(true));
        let component = mounted(&universe, ElementSpec::new("div").list("items"));
        let doc = universe.document();
        let element = component.element().unwrap();

        assert_eq!(
            doc.to_html(element),
            "<div><!--mount point: items--><!--end of items--></div>"
        );
    }

    #[test]
    fn destroy_removes_listeners() {
        let universe = Universe::new();
        let component = mounted(&universe, ElementSpec::new("button").on("click", "noop"));
        let doc = universe.document();
        let before = doc.total_listeners();
        assert!(before >= 1);

        component.destroy().unwrap();
        assert_eq!(doc.total_listeners(), before - 1);
    }
}
