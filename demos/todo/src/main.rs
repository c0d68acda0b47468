//! todo - a todo list built with wisp.
//!
//! This demo shows:
//! - Two-way binding of an input's `value`
//! - Event bindings that call component methods
//! - A list mount point holding one component per entry
//!
//! There is no browser here, so user input is simulated by writing DOM
//! properties and dispatching events on the document.

use wisp::prelude::*;

fn app_template() -> Result<Template, wisp::Error> {
    Template::new(
        ElementSpec::new("section")
            .attr("class", "todo")
            .child(
                ElementSpec::new("h1")
                    .bind("title")
                    .text(" (")
                    .bind(BindSpec::new("remaining").with_default(0))
                    .text(")"),
            )
            .child(
                ElementSpec::new("input")
                    .reference("draft")
                    .prop("value", BindSpec::new("draft").with_default("")),
            )
            .child(ElementSpec::new("button").reference("add").on("click", "add").text("Add"))
            .child(ElementSpec::new("ul").list("items")),
    )
}

fn item_template() -> Result<Template, wisp::Error> {
    Template::new(
        ElementSpec::new("li")
            .bind("label")
            .child(
                ElementSpec::new("button")
                    .reference("remove")
                    .on("click", "remove")
                    .text("x"),
            ),
    )
}

fn refresh_remaining(app: &Component) -> Result<(), wisp::Error> {
    let count = app.list("items")?.len()?;
    app.set("remaining", count)?;
    Ok(())
}

fn build(universe: &Universe) -> Result<Component, wisp::Error> {
    let item_template = item_template()?;
    let app = Component::with_state(
        universe,
        &app_template()?,
        Update::new().data("title", "Things to do"),
    )?;

    app.set_method("add", move |args| {
        let app = &args.component;
        let result = (|| -> Result<(), wisp::Error> {
            let label = app.get("draft")?;
            if label.as_str().is_none_or(|s| s.trim().is_empty()) {
                return Ok(());
            }

            let item = Component::with_state(
                app.universe(),
                &item_template,
                Update::new().data("label", label.clone()),
            )?;
            let owner = app.downgrade();
            item.set_method("remove", move |args| {
                let Some(owner) = owner.upgrade() else { return };
                if let Err(e) = args
                    .component
                    .destroy()
                    .and_then(|_| refresh_remaining(&owner))
                {
                    tracing::error!("failed to remove entry: {}", e);
                }
            })?;

            app.list("items")?.push([item])?;
            app.set("draft", "")?;
            tracing::info!(label = %label, "added entry");
            refresh_remaining(app)
        })();
        if let Err(e) = result {
            tracing::error!("failed to add entry: {}", e);
        }
    })?;

    app.mount(universe.document().body(), MountOption::Append)?;
    Ok(app)
}

/// Type `text` into the draft input and press "Add".
fn add_entry(app: &Component, text: &str) -> Result<(), wisp::Error> {
    let document = app.universe().document();
    if let (Some(input), Some(button)) = (app.node_ref("draft")?, app.node_ref("add")?) {
        document.set_property(input, "value", Value::from(text));
        document.dispatch(input, "input", Value::Unset);
        document.dispatch(button, "click", Value::Unset);
    }
    Ok(())
}

fn main() -> Result<(), wisp::RuntimeError> {
    let mut app = None;
    let runtime = wisp::run(Config::default(), |universe| {
        app = Some(build(universe)?);
        Ok(())
    })?;
    let Some(app) = app else {
        return Ok(());
    };

    for text in ["write docs", "fix the flaky test", "ship it"] {
        add_entry(&app, text)?;
    }

    let items = app.list("items")?;
    if let Some(first) = items.get(0)?
        && let Some(remove) = first.node_ref("remove")?
    {
        app.universe().document().dispatch(remove, "click", Value::Unset);
    }
    runtime.settle();

    let document = runtime.universe().document();
    println!("{}", document.inner_html(document.body()));
    Ok(())
}
