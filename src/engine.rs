use std::collections::HashMap;

use crate::error::{TreelateError, TreelateResult};
use crate::node::{Component, Tree};
use crate::printer::Printer;
use crate::render::{RenderState, render_subtree};
use crate::value::Context;

/// Options for one render call.
///
/// `indent` is the pretty-printing width (`0` emits no added
/// whitespace), `debug` forces structural nodes to emit visible markers
/// instead of being elided, and a non-empty `doctype` prefixes a doctype
/// declaration.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub indent: usize,
    pub debug: bool,
    pub doctype: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            indent: 2,
            debug: false,
            doctype: String::new(),
        }
    }
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indent(mut self, width: usize) -> Self {
        self.indent = width;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn doctype<S: Into<String>>(mut self, doctype: S) -> Self {
        self.doctype = doctype.into();
        self
    }
}

/// The render engine: a component registry, a global context merged at
/// lowest precedence into every call, and the text-expression delimiter
/// pair.
///
/// An engine is immutable during rendering; independent renders may run
/// on separate threads over the same engine, each owning its own scope
/// stack and output buffer.
///
/// # Examples
///
/// ```
/// use treelate::{Context, Engine, Node, RenderOptions, Tree};
///
/// let engine = Engine::new();
///
/// let tree = Tree::nodes([(Node::tag("p"), Tree::text("Hello [[ name ]]!"))]);
///
/// let mut context = Context::new();
/// context.insert("name", "World");
///
/// let output = engine
///     .render(&tree, &context, &RenderOptions::new().indent(0))
///     .unwrap();
/// assert_eq!(output, "<p>Hello World!</p>");
/// ```
pub struct Engine {
    globals: Context,
    components: HashMap<String, Component>,
    delimiters: (String, String),
}

impl Engine {
    /// Creates an engine with an empty global context.
    pub fn new() -> Self {
        Self::with_globals(Context::new())
    }

    /// Creates an engine whose globals are merged below the call-time
    /// context of every render. The place for values components should
    /// see without receiving them as properties.
    pub fn with_globals(globals: Context) -> Self {
        Self {
            globals,
            components: HashMap::new(),
            delimiters: ("[[".to_string(), "]]".to_string()),
        }
    }

    /// Overrides the text-body expression delimiters (default `[[ ]]`).
    pub fn set_delimiters<S: Into<String>>(&mut self, open: S, close: S) -> &mut Self {
        self.delimiters = (open.into(), close.into());
        self
    }

    pub(crate) fn delimiters(&self) -> (&str, &str) {
        (&self.delimiters.0, &self.delimiters.1)
    }

    pub(crate) fn globals(&self) -> &Context {
        &self.globals
    }

    /// Registers a component under its declared name.
    ///
    /// # Errors
    ///
    /// * `Err(TreelateError::ComponentExists)` if the name is taken.
    ///
    /// # Examples
    ///
    /// ```
    /// use treelate::{Component, Engine, Node, Tree};
    ///
    /// let mut engine = Engine::new();
    /// engine
    ///     .register(Component::new(
    ///         "Badge",
    ///         Tree::nodes([(Node::tag("span").identity_class("badge"), Tree::text("[[ label ]]"))]),
    ///     ).prop("label", ""))
    ///     .unwrap();
    /// ```
    pub fn register(&mut self, component: Component) -> TreelateResult<()> {
        if self.components.contains_key(component.name()) {
            return Err(TreelateError::ComponentExists {
                component_name: component.name().to_string(),
            });
        }
        self.components
            .insert(component.name().to_string(), component);
        Ok(())
    }

    pub(crate) fn component(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    /// Renders a template tree against a context.
    ///
    /// The engine's globals merge in at lowest precedence; the call
    /// context wins on collision. Rendering is a one-shot, synchronous
    /// tree-to-text pass: the same (template, context) pair always
    /// yields byte-identical output.
    ///
    /// # Errors
    ///
    /// Any node-level failure is wrapped once in
    /// [`TreelateError::Render`], carrying the offending node and the
    /// partial output accumulated up to the failure point. Errors are
    /// never swallowed and nothing is retried.
    pub fn render(
        &self,
        tree: &Tree,
        ctx: &Context,
        options: &RenderOptions,
    ) -> TreelateResult<String> {
        let base = self.globals.extended(ctx);
        let mut state = RenderState::new(self, Printer::new(options.indent, options.debug));
        if !options.doctype.is_empty() {
            state.printer.doctype(&options.doctype);
        }
        match render_subtree(&mut state, tree, &base, None) {
            Ok(()) => Ok(state.printer.take()),
            Err(error) => {
                let partial = state.printer.take();
                Err(match error {
                    TreelateError::Render { node, source, .. } => TreelateError::Render {
                        node,
                        partial,
                        source,
                    },
                    other => TreelateError::Render {
                        node: "template".to_string(),
                        partial,
                        source: Box::new(other),
                    },
                })
            }
        }
    }
}

impl Default for Engine {
    /// Creates a default `Engine` instance by calling `new()`.
    fn default() -> Self {
        Self::new()
    }
}
