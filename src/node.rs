use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{SyntaxError, SyntaxErrorKind, TreelateResult};
use crate::expr::Expr;
use crate::text::FormatTemplate;
use crate::value::{Context, Value};

/// A resolved-value getter: wraps a raw attribute source into a uniform
/// `(context) -> value` accessor, classified as static
/// (context-independent) or dynamic.
///
/// # Examples
///
/// ```
/// use treelate::{Context, Value, ValueGetter};
///
/// let literal = ValueGetter::from("submit");
/// assert!(literal.is_static());
///
/// let formatted = ValueGetter::text("{name}.html").unwrap();
/// assert!(!formatted.is_static());
///
/// let mut ctx = Context::new();
/// ctx.insert("name", "index");
/// assert_eq!(formatted.get(&ctx).unwrap(), Value::from("index.html"));
/// ```
#[derive(Debug, Clone)]
pub struct ValueGetter {
    kind: GetterKind,
}

#[derive(Debug, Clone)]
enum GetterKind {
    Static(Value),
    Format(Arc<FormatTemplate>),
    Expr(Arc<Expr>),
    /// A mapping of per-entry getters; evaluates to a `Value::Map`. Used
    /// for the extensible attribute families (class flag sets, style
    /// property maps, data maps).
    MapOf(IndexMap<String, ValueGetter>),
}

impl ValueGetter {
    /// A verbatim static string, exempt from format classification. The
    /// escape hatch for text that contains literal braces.
    pub fn raw<S: Into<String>>(text: S) -> Self {
        Self {
            kind: GetterKind::Static(Value::Str(text.into())),
        }
    }

    /// Classifies a text source: with `{name}` placeholders it becomes a
    /// format-against-context getter, otherwise it is static.
    ///
    /// # Errors
    ///
    /// Fails at compile time on unbalanced braces or an empty field.
    pub fn text(src: &str) -> Result<Self, SyntaxError> {
        let template = FormatTemplate::compile(src)?;
        if template.is_static() {
            Ok(Self {
                kind: GetterKind::Static(Value::Str(template.literal_text())),
            })
        } else {
            Ok(Self {
                kind: GetterKind::Format(Arc::new(template)),
            })
        }
    }

    /// Compiles an expression source into a dynamic getter.
    ///
    /// # Errors
    ///
    /// Malformed expressions fail here, at template-construction time,
    /// never at render time.
    pub fn expr(src: &str) -> Result<Self, SyntaxError> {
        Ok(Self {
            kind: GetterKind::Expr(Arc::new(Expr::compile(src)?)),
        })
    }

    /// A static literal value.
    pub fn value<V: Into<Value>>(v: V) -> Self {
        Self {
            kind: GetterKind::Static(v.into()),
        }
    }

    /// A mapping of per-entry getters, as used by the `Class`/`Style`/
    /// `Data` attribute families.
    pub fn map<K: Into<String>, V: Into<ValueGetter>, I: IntoIterator<Item = (K, V)>>(
        entries: I,
    ) -> Self {
        Self {
            kind: GetterKind::MapOf(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// True when evaluation ignores the context entirely. Static getters
    /// can be resolved early; dynamic ones need the full merged context.
    pub fn is_static(&self) -> bool {
        match &self.kind {
            GetterKind::Static(_) => true,
            GetterKind::Format(_) | GetterKind::Expr(_) => false,
            GetterKind::MapOf(entries) => entries.values().all(Self::is_static),
        }
    }

    pub fn get(&self, ctx: &Context) -> TreelateResult<Value> {
        match &self.kind {
            GetterKind::Static(value) => Ok(value.clone()),
            GetterKind::Format(template) => Ok(Value::Str(template.format(ctx)?)),
            GetterKind::Expr(expr) => expr.eval(ctx),
            GetterKind::MapOf(entries) => {
                let mut rendered = IndexMap::with_capacity(entries.len());
                for (name, getter) in entries {
                    rendered.insert(name.clone(), getter.get(ctx)?);
                }
                Ok(Value::Map(rendered))
            }
        }
    }
}

impl From<Value> for ValueGetter {
    fn from(v: Value) -> Self {
        Self::value(v)
    }
}

impl From<&str> for ValueGetter {
    fn from(v: &str) -> Self {
        Self::value(v)
    }
}

impl From<String> for ValueGetter {
    fn from(v: String) -> Self {
        Self::value(v)
    }
}

impl From<bool> for ValueGetter {
    fn from(v: bool) -> Self {
        Self::value(v)
    }
}

impl From<i64> for ValueGetter {
    fn from(v: i64) -> Self {
        Self::value(v)
    }
}

impl From<i32> for ValueGetter {
    fn from(v: i32) -> Self {
        Self::value(v)
    }
}

impl From<f64> for ValueGetter {
    fn from(v: f64) -> Self {
        Self::value(v)
    }
}

/// A for-loop descriptor parsed from `"item in items"` /
/// `"key, value in entries"` source: bound variable names plus the
/// compiled iterable expression.
#[derive(Debug, Clone)]
pub struct ForLoop {
    pub(crate) vars: Vec<String>,
    pub(crate) iterable: Arc<Expr>,
}

impl ForLoop {
    /// # Errors
    ///
    /// Fails when the source has no `in` separator, no loop variables, or
    /// a malformed iterable expression.
    pub fn new(src: &str) -> Result<Self, SyntaxError> {
        let Some((vars_part, iter_part)) = src.split_once(" in ") else {
            return Err(SyntaxError {
                position: 0,
                kind: SyntaxErrorKind::Expected {
                    description: "'<vars> in <iterable>' loop source".to_string(),
                },
            });
        };
        let vars: Vec<String> = vars_part
            .chars()
            .filter(|c| !matches!(c, '(' | ')' | '[' | ']'))
            .collect::<String>()
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if vars.is_empty() {
            return Err(SyntaxError {
                position: 0,
                kind: SyntaxErrorKind::Expected {
                    description: "at least one loop variable".to_string(),
                },
            });
        }
        let iterable = Expr::compile(iter_part.trim())?;
        Ok(Self {
            vars,
            iterable: Arc::new(iterable),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CondKind {
    If,
    Elif,
    Else,
}

/// A conditional marker on a sibling node: `If`/`Elif` carry a compiled
/// test, `Else` carries none.
#[derive(Debug, Clone)]
pub struct Cond {
    pub(crate) kind: CondKind,
    pub(crate) test: Option<ValueGetter>,
}

impl Cond {
    /// # Errors
    ///
    /// Fails on a malformed test expression.
    pub fn if_(src: &str) -> Result<Self, SyntaxError> {
        Ok(Self {
            kind: CondKind::If,
            test: Some(ValueGetter::expr(src)?),
        })
    }

    /// # Errors
    ///
    /// Fails on a malformed test expression.
    pub fn elif(src: &str) -> Result<Self, SyntaxError> {
        Ok(Self {
            kind: CondKind::Elif,
            test: Some(ValueGetter::expr(src)?),
        })
    }

    pub fn else_() -> Self {
        Self {
            kind: CondKind::Else,
            test: None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    /// A content-emitting markup tag.
    Tag {
        name: String,
        body_allowed: bool,
        identity_class: Option<String>,
    },
    /// Structural text emitter: never serialized itself, only its body.
    Text,
    /// Invocation of a component registered on the engine.
    Component(String),
    Slot,
    SlotTemplate,
    /// Variant selector: picks one subtree of a `Tree::Branches` body by
    /// a runtime discriminant.
    Switch,
}

impl NodeKind {
    pub(crate) fn label(&self) -> &str {
        match self {
            Self::Tag { name, .. } => name,
            Self::Text => "Text",
            Self::Component(name) => name,
            Self::Slot => "Slot",
            Self::SlotTemplate => "SlotTemplate",
            Self::Switch => "Switch",
        }
    }
}

/// A vertex of the template tree.
///
/// Nodes are immutable templates: built once, reused across renders.
/// Rendering produces a transient (tag name, final attribute map)
/// projection consumed only by the printer, never a mutated node.
///
/// # Examples
///
/// ```
/// use treelate::{Node, Tree, ValueGetter};
///
/// let tree = Tree::nodes([(
///     Node::tag("a").attr("href", ValueGetter::text("{url}").unwrap()),
///     Tree::text("docs"),
/// )]);
/// # let _ = tree;
/// ```
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) attrs: IndexMap<String, ValueGetter>,
    /// Dynamic attribute-assignment source; must evaluate to a map.
    pub(crate) bind: Option<ValueGetter>,
    pub(crate) for_loop: Option<ForLoop>,
    pub(crate) cond: Option<Cond>,
    /// Slot / SlotTemplate target name; defaults to "default".
    pub(crate) slot_name: Option<ValueGetter>,
    /// SlotTemplate prop-injection name.
    pub(crate) slot_props: Option<String>,
    /// Switch discriminant.
    pub(crate) switch_on: Option<ValueGetter>,
}

impl Node {
    fn with_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            attrs: IndexMap::new(),
            bind: None,
            for_loop: None,
            cond: None,
            slot_name: None,
            slot_props: None,
            switch_on: None,
        }
    }

    /// A markup tag with a body and a closing tag.
    pub fn tag<S: Into<String>>(name: S) -> Self {
        Self::with_kind(NodeKind::Tag {
            name: name.into(),
            body_allowed: true,
            identity_class: None,
        })
    }

    /// A void markup tag: self-closing, no body.
    pub fn void_tag<S: Into<String>>(name: S) -> Self {
        Self::with_kind(NodeKind::Tag {
            name: name.into(),
            body_allowed: false,
            identity_class: None,
        })
    }

    /// Structural text node: emits only its body.
    pub fn text() -> Self {
        Self::with_kind(NodeKind::Text)
    }

    /// Invocation of the component registered under `name`.
    pub fn component<S: Into<String>>(name: S) -> Self {
        Self::with_kind(NodeKind::Component(name.into()))
    }

    /// A slot placeholder inside a component's own template.
    pub fn slot<G: Into<ValueGetter>>(name: G) -> Self {
        let mut node = Self::with_kind(NodeKind::Slot);
        node.slot_name = Some(name.into());
        node
    }

    /// Caller-supplied content targeting the named slot.
    pub fn slot_template<G: Into<ValueGetter>>(name: G) -> Self {
        let mut node = Self::with_kind(NodeKind::SlotTemplate);
        node.slot_name = Some(name.into());
        node
    }

    /// A variant selector; the body must be [`Tree::Branches`] and the
    /// discriminant getter picks the branch.
    pub fn switch<G: Into<ValueGetter>>(discriminant: G) -> Self {
        let mut node = Self::with_kind(NodeKind::Switch);
        node.switch_on = Some(discriminant.into());
        node
    }

    /// A class name this tag always emits, surviving every override
    /// layer.
    pub fn identity_class<S: Into<String>>(mut self, class: S) -> Self {
        if let NodeKind::Tag { identity_class, .. } = &mut self.kind {
            *identity_class = Some(class.into());
        }
        self
    }

    pub fn attr<N: Into<String>, G: Into<ValueGetter>>(mut self, name: N, getter: G) -> Self {
        self.attrs.insert(name.into(), getter.into());
        self
    }

    /// Attaches a dynamic attribute-assignment source: an expression
    /// evaluating to a map whose entries are merged over the declared
    /// attributes (and consume component properties by name).
    pub fn bind<G: Into<ValueGetter>>(mut self, getter: G) -> Self {
        self.bind = Some(getter.into());
        self
    }

    pub fn when(mut self, cond: Cond) -> Self {
        self.cond = Some(cond);
        self
    }

    pub fn repeat(mut self, for_loop: ForLoop) -> Self {
        self.for_loop = Some(for_loop);
        self
    }

    /// SlotTemplate only: the context name under which the matched slot's
    /// rendered attributes are injected into the caller content.
    pub fn slot_props<S: Into<String>>(mut self, name: S) -> Self {
        self.slot_props = Some(name.into());
        self
    }

    pub(crate) fn label(&self) -> &str {
        self.kind.label()
    }
}

/// A subtree payload: nothing, a text body, an ordered sequence of
/// (node, subtree) siblings, or the branch mapping of a variant
/// selector. Sibling order is always significant.
#[derive(Debug, Clone)]
pub enum Tree {
    Empty,
    Text(String),
    Nodes(Vec<(Node, Tree)>),
    Branches(Vec<(Value, Tree)>),
}

impl Tree {
    pub fn text<S: Into<String>>(src: S) -> Self {
        Self::Text(src.into())
    }

    pub fn nodes<I: IntoIterator<Item = (Node, Tree)>>(children: I) -> Self {
        Self::Nodes(children.into_iter().collect())
    }

    pub fn branches<K: Into<Value>, I: IntoIterator<Item = (K, Tree)>>(arms: I) -> Self {
        Self::Branches(arms.into_iter().map(|(k, t)| (k.into(), t)).collect())
    }
}

/// A reusable template function: a declared property schema, a private
/// template, and an optional context hook.
///
/// Components are registered on an [`Engine`](crate::Engine) by name and
/// invoked with [`Node::component`]. The template is supplied eagerly at
/// construction; the slot inventory is collected in one top-down pass at
/// that point.
///
/// # Examples
///
/// ```
/// use treelate::{Component, Node, Tree};
///
/// let card = Component::new(
///     "Card",
///     Tree::nodes([(
///         Node::tag("div").identity_class("card"),
///         Tree::nodes([(Node::slot("default"), Tree::text("empty card"))]),
///     )]),
/// )
/// .prop("title", "Untitled");
///
/// assert_eq!(card.slot_names(), ["default"]);
/// ```
#[derive(Debug, Clone)]
pub struct Component {
    pub(crate) name: String,
    pub(crate) props: IndexMap<String, ValueGetter>,
    pub(crate) template: Tree,
    pub(crate) context_hook: Option<fn(&mut Context)>,
    slot_names: Vec<String>,
}

impl Component {
    pub fn new<S: Into<String>>(name: S, template: Tree) -> Self {
        let mut slot_names = Vec::new();
        collect_slot_names(&template, &mut slot_names);
        Self {
            name: name.into(),
            props: IndexMap::new(),
            template,
            context_hook: None,
            slot_names,
        }
    }

    /// Declares a property with its default getter.
    pub fn prop<N: Into<String>, G: Into<ValueGetter>>(mut self, name: N, default: G) -> Self {
        self.props.insert(name.into(), default.into());
        self
    }

    /// A hook run over the resolved properties before the component's own
    /// template renders; lets a component derive extra context entries.
    pub fn context_hook(mut self, hook: fn(&mut Context)) -> Self {
        self.context_hook = Some(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the statically-named slots declared in the template, in
    /// first-appearance order.
    pub fn slot_names(&self) -> &[String] {
        &self.slot_names
    }
}

fn collect_slot_names(tree: &Tree, out: &mut Vec<String>) {
    match tree {
        Tree::Empty | Tree::Text(_) => {}
        Tree::Nodes(children) => {
            for (node, subtree) in children {
                if matches!(node.kind, NodeKind::Slot) {
                    if let Some(getter) = &node.slot_name {
                        if let Ok(Value::Str(name)) = getter.get(&Context::new()) {
                            if !out.contains(&name) {
                                out.push(name);
                            }
                        }
                    }
                }
                collect_slot_names(subtree, out);
            }
        }
        Tree::Branches(arms) => {
            for (_, subtree) in arms {
                collect_slot_names(subtree, out);
            }
        }
    }
}
