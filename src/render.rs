use indexmap::IndexMap;

use crate::compose::{self, Passdown, Rendered};
use crate::engine::Engine;
use crate::error::{TreelateError, TreelateResult};
use crate::node::{Node, NodeKind, Tree};
use crate::printer::{Event, Printer};
use crate::text;
use crate::traverse::SiblingPass;
use crate::value::{Context, Value};

/// Per-render mutable state: the scope stack routing slot lookups and
/// the printer accumulating output. One is created per top-level render
/// call and discarded with it; nothing ambient survives between calls.
pub(crate) struct RenderState<'r> {
    pub(crate) engine: &'r Engine,
    pub(crate) printer: Printer,
    scopes: Vec<SlotBus<'r>>,
}

/// Caller-supplied content for one slot name: the caller's preserved
/// context, the optional prop-injection name, and the content subtree.
struct SlotEntry<'r> {
    ctx: Context,
    props_name: Option<String>,
    body: &'r Tree,
}

type SlotBus<'r> = IndexMap<String, SlotEntry<'r>>;

impl<'r> RenderState<'r> {
    pub(crate) fn new(engine: &'r Engine, printer: Printer) -> Self {
        Self {
            engine,
            printer,
            scopes: Vec::new(),
        }
    }
}

pub(crate) fn render_subtree<'r>(
    state: &mut RenderState<'r>,
    tree: &'r Tree,
    ctx: &Context,
    passdown: Option<&Passdown>,
) -> TreelateResult<()> {
    match tree {
        Tree::Empty => Ok(()),
        Tree::Text(src) => {
            let (open, close) = state.engine.delimiters();
            let template = text::compile_cached(open, close, src)?;
            let rendered = template.eval(ctx)?;
            if !rendered.is_empty() {
                state.printer.handle(Event::Text(rendered));
            }
            Ok(())
        }
        Tree::Nodes(children) => render_siblings(state, children, ctx, passdown),
        Tree::Branches(_) => Err(TreelateError::Structure {
            message: "branch mapping outside a variant selector".to_string(),
        }),
    }
}

fn render_siblings<'r>(
    state: &mut RenderState<'r>,
    siblings: &'r [(Node, Tree)],
    ctx: &Context,
    passdown: Option<&Passdown>,
) -> TreelateResult<()> {
    // The pass stays lazy, so a failing sibling stops the walk with the
    // partial output intact.
    for triple in SiblingPass::new(siblings, ctx) {
        let (child_ctx, node, subtree) = triple?;
        render_node(state, node, subtree, &child_ctx, passdown)?;
    }
    Ok(())
}

/// Renders one collected (node, subtree) pair. Failures bubbling out of
/// the node's own evaluation are wrapped with the node exactly once; the
/// driver attaches the partial output at the top.
fn render_node<'r>(
    state: &mut RenderState<'r>,
    node: &'r Node,
    body: &'r Tree,
    ctx: &Context,
    passdown: Option<&Passdown>,
) -> TreelateResult<()> {
    dispatch(state, node, body, ctx, passdown).map_err(|e| match e {
        TreelateError::Render { .. } => e,
        other => TreelateError::Render {
            node: node.label().to_string(),
            partial: String::new(),
            source: Box::new(other),
        },
    })
}

fn dispatch<'r>(
    state: &mut RenderState<'r>,
    node: &'r Node,
    body: &'r Tree,
    ctx: &Context,
    passdown: Option<&Passdown>,
) -> TreelateResult<()> {
    match &node.kind {
        NodeKind::Tag {
            name,
            body_allowed,
            ..
        } => {
            let attrs = compose::compose(node, ctx, passdown)?;
            state.printer.handle(Event::Open {
                tag: name.clone(),
                attrs,
                body_allowed: *body_allowed,
                structural: false,
            });
            if *body_allowed {
                render_subtree(state, body, ctx, None)?;
            }
            state.printer.handle(Event::Close);
            Ok(())
        }
        NodeKind::Text => {
            let attrs = compose::compose(node, ctx, passdown)?;
            state.printer.handle(Event::Open {
                tag: "Text".to_string(),
                attrs,
                body_allowed: true,
                structural: true,
            });
            render_subtree(state, body, ctx, None)?;
            state.printer.handle(Event::Close);
            Ok(())
        }
        NodeKind::Component(name) => render_component(state, node, name, body, ctx, passdown),
        NodeKind::Slot => render_slot(state, node, body, ctx),
        NodeKind::SlotTemplate => Err(TreelateError::Structure {
            message: "SlotTemplate outside a component invocation body".to_string(),
        }),
        NodeKind::Switch => render_switch(state, node, body, ctx),
    }
}

/// Variant selector: picks the branch keyed by the discriminant value
/// and hands its own resolved attributes down as defaults to the
/// branch's direct children. No matching branch renders nothing.
fn render_switch<'r>(
    state: &mut RenderState<'r>,
    node: &'r Node,
    body: &'r Tree,
    ctx: &Context,
) -> TreelateResult<()> {
    let discriminant = node
        .switch_on
        .as_ref()
        .ok_or_else(|| TreelateError::Structure {
            message: "variant selector is missing its discriminant".to_string(),
        })?
        .get(ctx)?;
    let Tree::Branches(arms) = body else {
        return Err(TreelateError::Structure {
            message: "variant selector body must be a branch mapping".to_string(),
        });
    };
    let attrs = compose::compose(node, ctx, None)?;
    state.printer.handle(Event::Open {
        tag: "Switch".to_string(),
        attrs: attrs.clone(),
        body_allowed: true,
        structural: true,
    });
    if let Some((_, subtree)) = arms.iter().find(|(key, _)| key.loose_eq(&discriminant)) {
        let defaults = Passdown {
            values: attrs,
            explicit: false,
        };
        render_subtree(state, subtree, ctx, Some(&defaults))?;
    }
    state.printer.handle(Event::Close);
    Ok(())
}

/// Slot placeholder: pops the innermost slot bus, resolves the slot
/// name, and renders either the caller-supplied content (under the
/// caller's preserved context) or its own body as default content. The
/// bus is pushed back in every case so sibling slots see the same map.
fn render_slot<'r>(
    state: &mut RenderState<'r>,
    node: &'r Node,
    body: &'r Tree,
    ctx: &Context,
) -> TreelateResult<()> {
    let name = match &node.slot_name {
        Some(getter) => getter.get(ctx)?.to_text(),
        None => "default".to_string(),
    };
    let attrs = compose::compose(node, ctx, None)?;
    let Some(bus) = state.scopes.pop() else {
        return Err(TreelateError::Structure {
            message: "Slot outside a component template".to_string(),
        });
    };

    state.printer.handle(Event::Open {
        tag: "Slot".to_string(),
        attrs: attrs.clone(),
        body_allowed: true,
        structural: true,
    });
    let result = match bus.get(&name) {
        // No caller content for this name: defined fallback, not an error.
        None => render_subtree(state, body, ctx, None),
        Some(entry) => {
            let content_ctx = match &entry.props_name {
                Some(props_name) => {
                    let mut injected = Context::new();
                    injected.insert(props_name, Value::Map(attrs));
                    entry.ctx.extended(&injected)
                }
                None => entry.ctx.clone(),
            };
            render_subtree(state, entry.body, &content_ctx, None)
        }
    };
    // The bus goes back on regardless of outcome so sibling slots keep
    // resolving against the same map.
    state.scopes.push(bus);
    if result.is_ok() {
        state.printer.handle(Event::Close);
    }
    result
}

/// The component invocation protocol: resolve declared properties from
/// their override sources in fixed precedence order, build the
/// name-keyed slot-content map from the caller body, and traverse the
/// component's own template under a context built strictly from the
/// resolved properties (plus engine globals and the context hook).
fn render_component<'r>(
    state: &mut RenderState<'r>,
    node: &'r Node,
    name: &str,
    body: &'r Tree,
    ctx: &Context,
    passdown: Option<&Passdown>,
) -> TreelateResult<()> {
    let engine = state.engine;
    let component =
        engine
            .component(name)
            .ok_or_else(|| TreelateError::MissingComponent {
                component_name: name.to_string(),
            })?;

    let mut bind = compose::evaluate_bind(node.bind.as_ref(), ctx)?;
    let mut explicit = compose::evaluate_attrs(&node.attrs, ctx)?;
    let mut caller_passed: Rendered = passdown
        .filter(|p| p.explicit)
        .map(|p| p.values.clone())
        .unwrap_or_default();
    let mut selector_defaults: Rendered = passdown
        .filter(|p| !p.explicit)
        .map(|p| p.values.clone())
        .unwrap_or_default();

    // Fixed precedence ladder: dynamic assignment, then caller-supplied
    // values, then defaults handed down by an enclosing variant selector,
    // then the declared default. A resolved property is consumed out of
    // every source so it never leaks into the pass-through attributes.
    let mut props_ctx = Context::new();
    for (prop, default) in &component.props {
        let from_bind = bind.shift_remove(prop);
        let from_explicit = explicit.shift_remove(prop);
        let from_caller = caller_passed.shift_remove(prop);
        let from_selector = selector_defaults.shift_remove(prop);
        let resolved = match from_bind.or(from_explicit).or(from_caller).or(from_selector) {
            Some(value) => value,
            None => default.get(ctx)?,
        };
        props_ctx.insert(prop, resolved);
    }

    // Whatever was not consumed as a property is merged for pass-through
    // to a single template root.
    let mut leftover = selector_defaults;
    compose::merge_layer(&mut leftover, explicit);
    compose::merge_layer(&mut leftover, bind);
    compose::merge_layer(&mut leftover, caller_passed);
    let pass_through = match &component.template {
        Tree::Nodes(children) if children.len() == 1 && !leftover.is_empty() => Some(Passdown {
            values: leftover,
            explicit: true,
        }),
        _ => None,
    };

    // The slot-content map is built against the caller's context, so
    // slot inclusion (If/For on a SlotTemplate) follows caller-side
    // data.
    let bus = build_slot_bus(body, ctx)?;

    if let Some(hook) = component.context_hook {
        hook(&mut props_ctx);
    }
    let own_ctx = engine.globals().extended(&props_ctx);

    let mut marker_attrs = Rendered::new();
    for (prop, value) in props_ctx.iter() {
        marker_attrs.insert(prop.to_string(), value.clone());
    }
    state.printer.handle(Event::Open {
        tag: component.name.clone(),
        attrs: marker_attrs,
        body_allowed: true,
        structural: true,
    });
    state.scopes.push(bus);
    let result = render_subtree(state, &component.template, &own_ctx, pass_through.as_ref());
    // Popped on completion, error included.
    state.scopes.pop();
    if result.is_ok() {
        state.printer.handle(Event::Close);
    }
    result
}

fn build_slot_bus<'r>(body: &'r Tree, ctx: &Context) -> TreelateResult<SlotBus<'r>> {
    let mut bus = SlotBus::new();
    match body {
        Tree::Empty => {}
        Tree::Text(src) if src.is_empty() => {}
        Tree::Text(_) => {
            bus.insert(
                "default".to_string(),
                SlotEntry {
                    ctx: ctx.clone(),
                    props_name: None,
                    body,
                },
            );
        }
        Tree::Nodes(children) => {
            let named = children
                .first()
                .is_some_and(|(n, _)| matches!(n.kind, NodeKind::SlotTemplate));
            if named {
                for triple in SiblingPass::new(children, ctx) {
                    let (t_ctx, t_node, t_body) = triple?;
                    if !matches!(t_node.kind, NodeKind::SlotTemplate) {
                        return Err(TreelateError::Structure {
                            message: "component body mixes SlotTemplate and other siblings"
                                .to_string(),
                        });
                    }
                    let name = match &t_node.slot_name {
                        Some(getter) => getter.get(&t_ctx)?.to_text(),
                        None => "default".to_string(),
                    };
                    bus.insert(
                        name,
                        SlotEntry {
                            ctx: t_ctx.into_owned(),
                            props_name: t_node.slot_props.clone(),
                            body: t_body,
                        },
                    );
                }
            } else {
                // A bare body is implicitly the "default" slot.
                bus.insert(
                    "default".to_string(),
                    SlotEntry {
                        ctx: ctx.clone(),
                        props_name: None,
                        body,
                    },
                );
            }
        }
        Tree::Branches(_) => {
            return Err(TreelateError::Structure {
                message: "branch mapping outside a variant selector".to_string(),
            });
        }
    }
    Ok(bus)
}
