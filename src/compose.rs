use indexmap::IndexMap;

use crate::error::{TreelateError, TreelateResult};
use crate::node::{Node, NodeKind, ValueGetter};
use crate::value::{Context, Value};

/// A rendered attribute map: the transient projection the printer
/// consumes.
pub(crate) type Rendered = IndexMap<String, Value>;

/// Attribute values handed down to the direct children of a node:
/// `explicit` for caller pass-through (overrides), otherwise
/// variant-selector defaults (lowest precedence, fill-in only).
#[derive(Debug, Clone)]
pub(crate) struct Passdown {
    pub(crate) values: Rendered,
    pub(crate) explicit: bool,
}

/// The extensible attribute families and their extension counterparts.
const FAMILY_KEYS: [&str; 6] = ["Class", "xClass", "Style", "xStyle", "Data", "xData"];

fn is_family_key(name: &str) -> bool {
    FAMILY_KEYS.contains(&name)
}

pub(crate) fn evaluate_attrs(
    attrs: &IndexMap<String, ValueGetter>,
    ctx: &Context,
) -> TreelateResult<Rendered> {
    let mut rendered = IndexMap::with_capacity(attrs.len());
    for (name, getter) in attrs {
        rendered.insert(name.clone(), getter.get(ctx)?);
    }
    Ok(rendered)
}

/// Evaluates a dynamic attribute-assignment source. Absent or `Null`
/// yields an empty map; anything other than a map is a type error.
pub(crate) fn evaluate_bind(
    bind: Option<&ValueGetter>,
    ctx: &Context,
) -> TreelateResult<Rendered> {
    match bind {
        None => Ok(Rendered::new()),
        Some(getter) => match getter.get(ctx)? {
            Value::Null => Ok(Rendered::new()),
            Value::Map(entries) => Ok(entries),
            other => Err(TreelateError::TypeMismatch {
                expected: "map from attribute-assignment source".to_string(),
                found: other.type_name().to_string(),
            }),
        },
    }
}

/// Merges `incoming` over `base`, incoming winning per key. When both
/// sides of an extensible-family key are maps the maps merge instead of
/// replacing, incoming entries winning on collision.
pub(crate) fn merge_layer(base: &mut Rendered, incoming: Rendered) {
    for (name, value) in incoming {
        if is_family_key(&name) {
            if let (Some(Value::Map(existing)), Value::Map(new_entries)) =
                (base.get_mut(&name), &value)
            {
                for (k, v) in new_entries {
                    existing.insert(k.clone(), v.clone());
                }
                continue;
            }
        }
        base.insert(name, value);
    }
}

/// Fills in `incoming` entries `base` does not already carry. Family
/// maps merge with the existing entries winning.
pub(crate) fn merge_defaults(base: &mut Rendered, incoming: &Rendered) {
    for (name, value) in incoming {
        if is_family_key(name) {
            if let (Some(Value::Map(existing)), Value::Map(defaults)) =
                (base.get_mut(name), value)
            {
                for (k, v) in defaults {
                    if !existing.contains_key(k) {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                continue;
            }
        }
        if !base.contains_key(name) {
            base.insert(name.clone(), value.clone());
        }
    }
}

fn non_null(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !matches!(v, Value::Null))
}

/// Pulls a family (base + extension) out of the attribute map and
/// renders map forms: merged when both are maps (extension winning),
/// otherwise each mapped independently, base falling back to the
/// extension when absent.
fn take_family(
    attrs: &mut Rendered,
    name: &str,
    xname: &str,
    mapper: impl Fn(&IndexMap<String, Value>) -> Value,
) -> (Option<Value>, Option<Value>) {
    let mut extra = non_null(attrs.shift_remove(xname));
    let mut base = non_null(attrs.shift_remove(name));

    if let Some(Value::Map(base_entries)) = &base {
        if let Some(Value::Map(extra_entries)) = &extra {
            let mut merged = base_entries.clone();
            for (k, v) in extra_entries {
                merged.insert(k.clone(), v.clone());
            }
            base = Some(mapper(&merged));
            extra = None;
        } else {
            base = Some(mapper(base_entries));
        }
    }
    if let Some(Value::Map(extra_entries)) = &extra {
        extra = Some(mapper(extra_entries));
    }
    if base.is_none() {
        base = extra.take();
    }
    (base, extra)
}

fn render_class(entries: &IndexMap<String, Value>) -> Value {
    Value::List(
        entries
            .iter()
            .filter(|(_, enabled)| enabled.is_truthy())
            .map(|(name, _)| Value::Str(name.clone()))
            .collect(),
    )
}

fn render_style(entries: &IndexMap<String, Value>) -> Value {
    Value::List(
        entries
            .iter()
            .filter(|(_, value)| value.is_truthy())
            .map(|(prop, value)| Value::Str(format!("{}:{}", prop, value.to_text())))
            .collect(),
    )
}

fn render_data(entries: &IndexMap<String, Value>) -> Value {
    Value::Map(
        entries
            .iter()
            .filter(|(_, value)| !matches!(value, Value::Null))
            .map(|(key, value)| (format!("data-{}", key), value.clone()))
            .collect(),
    )
}

fn joined_text(value: &Value, sep: &str) -> String {
    match value {
        Value::List(items) => items
            .iter()
            .map(Value::to_text)
            .collect::<Vec<_>>()
            .join(sep),
        other => other.to_text(),
    }
}

/// Merges the extensible families into their serialized forms and
/// applies the identity class.
pub(crate) fn finalize(mut attrs: Rendered, identity: Option<&str>) -> TreelateResult<Rendered> {
    // Class / xClass -> space-joined enabled names under "class".
    let (base, extra) = take_family(&mut attrs, "Class", "xClass", render_class);
    let mut class_text = base.map(|v| joined_text(&v, " "));
    if let Some(extra) = extra {
        let extra_text = joined_text(&extra, " ");
        class_text = Some(match class_text {
            Some(text) if !text.is_empty() => format!("{} {}", text, extra_text),
            _ => extra_text,
        });
    }
    if let Some(identity) = identity {
        class_text = Some(match class_text {
            Some(text)
                if !text.is_empty()
                    && !text.split_ascii_whitespace().any(|token| token == identity) =>
            {
                format!("{} {}", identity, text)
            }
            Some(text) if text.split_ascii_whitespace().any(|token| token == identity) => text,
            _ => identity.to_string(),
        });
    }
    if let Some(text) = class_text {
        if !text.is_empty() {
            attrs.insert("class".to_string(), Value::Str(text));
        }
    }

    // Style / xStyle -> semicolon-joined prop:value pairs under "style".
    let (base, extra) = take_family(&mut attrs, "Style", "xStyle", render_style);
    let mut style_text = base.map(|v| joined_text(&v, ";"));
    if let Some(extra) = extra {
        let extra_text = joined_text(&extra, ";");
        style_text = Some(match style_text {
            Some(text) if !text.is_empty() => format!("{};{}", text, extra_text),
            _ => extra_text,
        });
    }
    if let Some(text) = style_text {
        if !text.is_empty() {
            attrs.insert("style".to_string(), Value::Str(text));
        }
    }

    // Data / xData -> data-<key> attributes copied verbatim.
    let (base, extra) = take_family(&mut attrs, "Data", "xData", render_data);
    if let Some(extra) = extra {
        return Err(TreelateError::TypeMismatch {
            expected: "map for Data/xData attributes".to_string(),
            found: extra.type_name().to_string(),
        });
    }
    match base {
        None => {}
        Some(Value::Map(entries)) => {
            for (key, value) in entries {
                attrs.insert(key, value);
            }
        }
        Some(other) => {
            return Err(TreelateError::TypeMismatch {
                expected: "map for Data/xData attributes".to_string(),
                found: other.type_name().to_string(),
            });
        }
    }

    Ok(attrs)
}

/// Full composition for one node render: declared attributes, then the
/// dynamic assignment map, then caller pass-through overrides (or
/// selector defaults below everything), then the family merge and the
/// identity class.
pub(crate) fn compose(
    node: &Node,
    ctx: &Context,
    passdown: Option<&Passdown>,
) -> TreelateResult<Rendered> {
    let mut attrs = evaluate_attrs(&node.attrs, ctx)?;
    merge_layer(&mut attrs, evaluate_bind(node.bind.as_ref(), ctx)?);
    if let Some(passdown) = passdown {
        if passdown.explicit {
            merge_layer(&mut attrs, passdown.values.clone());
        } else {
            merge_defaults(&mut attrs, &passdown.values);
        }
    }
    let identity = match &node.kind {
        NodeKind::Tag { identity_class, .. } => identity_class.as_deref(),
        NodeKind::Text
        | NodeKind::Component(_)
        | NodeKind::Slot
        | NodeKind::SlotTemplate
        | NodeKind::Switch => None,
    };
    finalize(attrs, identity)
}
