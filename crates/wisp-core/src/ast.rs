//! Template AST: the tree a component renders from.
//!
//! A template is built once with the [`ElementSpec`] builder and shared by
//! every component created from it.
//!
//! # Example
//!
//! ```ignore
//! let template = Template::new(
//!     ElementSpec::new("li")
//!         .attr("class", vec![TemplatePart::literal("item "), TemplatePart::bind("state")])
//!         .on("click", "select")
//!         .bind(BindSpec::new("title").with_default("untitled"))
//!         .list("children"),
//! )?;
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::binding::BindSpec;
use crate::error::{Error, Result};
use crate::value::{Path, Value};

/// A node in a template.
#[derive(Debug, Clone)]
pub enum Ast {
    /// An element with attributes, properties, events and children.
    Element(ElementSpec),
    /// Static text.
    Text(String),
    /// Text kept in sync with a data path.
    Bound(BindSpec),
    /// A named slot for child components.
    MountPoint(MountPointSpec),
}

impl Ast {
    pub fn text(text: impl Into<String>) -> Self {
        Ast::Text(text.into())
    }

    pub fn bound(spec: impl Into<BindSpec>) -> Self {
        Ast::Bound(spec.into())
    }
}

impl From<ElementSpec> for Ast {
    fn from(spec: ElementSpec) -> Self {
        Ast::Element(spec)
    }
}

impl From<BindSpec> for Ast {
    fn from(spec: BindSpec) -> Self {
        Ast::Bound(spec)
    }
}

impl From<MountPointSpec> for Ast {
    fn from(spec: MountPointSpec) -> Self {
        Ast::MountPoint(spec)
    }
}

/// Whether a mount point holds one component or an ordered list of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Single,
    List,
}

impl fmt::Display for MountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountKind::Single => f.write_str("single"),
            MountKind::List => f.write_str("list"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPointSpec {
    pub name: String,
    pub kind: MountKind,
}

/// One piece of an attribute or property template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Bind(BindSpec),
}

impl TemplatePart {
    pub fn literal(text: impl Into<String>) -> Self {
        TemplatePart::Literal(text.into())
    }

    pub fn bind(spec: impl Into<BindSpec>) -> Self {
        TemplatePart::Bind(spec.into())
    }
}

/// Value of an attribute or property.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Static(Value),
    /// Literals and bindings concatenated, re-rendered when a binding changes.
    Template(Vec<TemplatePart>),
}

impl AttrValue {
    /// The single path this value is bound to, if it is exactly one binding.
    pub fn sole_binding(&self) -> Option<&BindSpec> {
        match self {
            AttrValue::Template(parts) => match parts.as_slice() {
                [TemplatePart::Bind(spec)] => Some(spec),
                _ => None,
            },
            AttrValue::Static(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Static(Value::from(value))
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Static(Value::from(value))
    }
}

impl From<Value> for AttrValue {
    fn from(value: Value) -> Self {
        AttrValue::Static(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Static(Value::from(value))
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Static(Value::from(value))
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Static(Value::from(value))
    }
}

impl From<BindSpec> for AttrValue {
    fn from(spec: BindSpec) -> Self {
        AttrValue::Template(vec![TemplatePart::Bind(spec)])
    }
}

impl From<Vec<TemplatePart>> for AttrValue {
    fn from(parts: Vec<TemplatePart>) -> Self {
        AttrValue::Template(parts)
    }
}

/// An event wired to a component method.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSpec {
    pub event: String,
    pub method: String,
    /// Extra value passed to the method. Bindings are read when the event
    /// fires, not when the element is rendered.
    pub value: AttrValue,
}

/// Properties of an element node.
#[derive(Debug, Clone, Default)]
pub struct ElementSpec {
    pub tag: String,
    pub attrs: Vec<(String, AttrValue)>,
    pub props: Vec<(String, AttrValue)>,
    pub events: Vec<EventSpec>,
    /// Name under which the element is exposed in the component's refs.
    pub reference: Option<String>,
    pub children: Vec<Ast>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.props.push((name.into(), value.into()));
        self
    }

    pub fn on(self, event: impl Into<String>, method: impl Into<String>) -> Self {
        self.on_with(event, method, Value::Unset)
    }

    pub fn on_with(
        mut self,
        event: impl Into<String>,
        method: impl Into<String>,
        value: impl Into<AttrValue>,
    ) -> Self {
        self.events.push(EventSpec {
            event: event.into(),
            method: method.into(),
            value: value.into(),
        });
        self
    }

    pub fn reference(mut self, name: impl Into<String>) -> Self {
        self.reference = Some(name.into());
        self
    }

    pub fn child(mut self, child: impl Into<Ast>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(Ast::Text(text.into()))
    }

    pub fn bind(self, spec: impl Into<BindSpec>) -> Self {
        self.child(Ast::Bound(spec.into()))
    }

    /// Add a single-component mount point.
    pub fn mount(self, name: impl Into<String>) -> Self {
        self.child(MountPointSpec {
            name: name.into(),
            kind: MountKind::Single,
        })
    }

    /// Add a list mount point.
    pub fn list(self, name: impl Into<String>) -> Self {
        self.child(MountPointSpec {
            name: name.into(),
            kind: MountKind::List,
        })
    }
}

/// A named accessor exposed on components, backed by a data path.
#[derive(Debug, Clone, PartialEq)]
pub struct PropSpec {
    pub path: Path,
    /// In toggle mode, `true` writes the first value and `false` the second;
    /// reading yields whether the data equals the first.
    pub toggle: Option<(Value, Value)>,
}

/// A validated template.
///
/// Cloning is cheap; clones share the tree.
#[derive(Debug, Clone)]
pub struct Template {
    inner: Rc<TemplateInner>,
}

#[derive(Debug, Clone)]
struct TemplateInner {
    root: Ast,
    mount_points: Vec<MountPointSpec>,
    props: HashMap<String, PropSpec>,
}

impl Template {
    /// Validate `root` and record its mount points.
    pub fn new(root: impl Into<Ast>) -> Result<Self> {
        let root = root.into();
        if matches!(root, Ast::MountPoint(_)) {
            return Err(Error::MountPointAtRoot);
        }

        let mut mount_points = Vec::new();
        collect_mount_points(&root, &mut mount_points);
        let mut seen = HashSet::new();
        for point in &mount_points {
            if !seen.insert(point.name.as_str()) {
                return Err(Error::DuplicateMountPoint(point.name.clone()));
            }
        }

        Ok(Self {
            inner: Rc::new(TemplateInner {
                root,
                mount_points,
                props: HashMap::new(),
            }),
        })
    }

    /// Register a prop reading and writing `path`.
    pub fn with_prop(mut self, name: impl Into<String>, path: impl Into<Path>) -> Self {
        Rc::make_mut(&mut self.inner).props.insert(
            name.into(),
            PropSpec {
                path: path.into(),
                toggle: None,
            },
        );
        self
    }

    /// Register a boolean prop that maps `true`/`false` onto two data values.
    pub fn with_toggle_prop(
        mut self,
        name: impl Into<String>,
        path: impl Into<Path>,
        on: impl Into<Value>,
        off: impl Into<Value>,
    ) -> Self {
        Rc::make_mut(&mut self.inner).props.insert(
            name.into(),
            PropSpec {
                path: path.into(),
                toggle: Some((on.into(), off.into())),
            },
        );
        self
    }

    pub fn root(&self) -> &Ast {
        &self.inner.root
    }

    pub fn mount_points(&self) -> &[MountPointSpec] {
        &self.inner.mount_points
    }

    pub fn mount_kind(&self, name: &str) -> Option<MountKind> {
        self.inner
            .mount_points
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.kind)
    }

    pub fn prop(&self, name: &str) -> Option<&PropSpec> {
        self.inner.props.get(name)
    }
}

fn collect_mount_points(ast: &Ast, out: &mut Vec<MountPointSpec>) {
    match ast {
        Ast::MountPoint(spec) => out.push(spec.clone()),
        Ast::Element(element) => {
            for child in &element.children {
                collect_mount_points(child, out);
            }
        }
        Ast::Text(_) | Ast::Bound(_) => {}
    }
}
