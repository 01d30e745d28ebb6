use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::error::{SyntaxError, SyntaxErrorKind, TreelateError, TreelateResult};
use crate::expr::Expr;
use crate::value::{Context, Value};

/// Process-wide compiled-template cache, keyed by (open delimiter, close
/// delimiter, source). Entries are write-once and shared across renders;
/// population is serialized, which is all the concurrency the engine
/// needs.
static TEXT_CACHE: Lazy<Mutex<HashMap<(String, String, String), Arc<TextTemplate>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub(crate) fn compile_cached(
    open: &str,
    close: &str,
    src: &str,
) -> Result<Arc<TextTemplate>, SyntaxError> {
    let key = (open.to_string(), close.to_string(), src.to_string());
    let mut cache = TEXT_CACHE
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(compiled) = cache.get(&key) {
        return Ok(Arc::clone(compiled));
    }
    let compiled = Arc::new(TextTemplate::compile(src, open, close)?);
    cache.insert(key, Arc::clone(&compiled));
    Ok(compiled)
}

#[cfg(test)]
pub(crate) fn cached_entry(open: &str, close: &str, src: &str) -> Option<Arc<TextTemplate>> {
    let key = (open.to_string(), close.to_string(), src.to_string());
    TEXT_CACHE
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .get(&key)
        .map(Arc::clone)
}

#[derive(Debug)]
enum Segment {
    Lit(String),
    Expr(Expr),
}

/// A text body compiled against a delimiter pair: literal runs
/// interleaved with embedded expressions (`Hello [[ name ]]!`).
#[derive(Debug)]
pub(crate) struct TextTemplate {
    segments: Vec<Segment>,
}

impl TextTemplate {
    fn compile(src: &str, open: &str, close: &str) -> Result<Self, SyntaxError> {
        let mut segments = Vec::new();
        let mut rest = src;
        let mut offset = 0;

        while let Some(start) = rest.find(open) {
            let (lit, after) = rest.split_at(start);
            if !lit.is_empty() {
                segments.push(Segment::Lit(lit.to_string()));
            }
            let body = after.get(open.len()..).unwrap_or("");
            let Some(end) = body.find(close) else {
                return Err(SyntaxError {
                    position: offset + start,
                    kind: SyntaxErrorKind::unexpected_eof(Some(close.to_string())),
                });
            };
            let expr_src = body.get(..end).unwrap_or("");
            let expr = Expr::compile(expr_src).map_err(|mut e| {
                e.position += offset + start + open.len();
                e
            })?;
            segments.push(Segment::Expr(expr));
            let consumed = start + open.len() + end + close.len();
            offset += consumed;
            rest = after
                .get(open.len() + end + close.len()..)
                .unwrap_or("");
        }
        if !rest.is_empty() {
            segments.push(Segment::Lit(rest.to_string()));
        }

        Ok(Self { segments })
    }

    pub(crate) fn eval(&self, ctx: &Context) -> TreelateResult<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Lit(lit) => out.push_str(lit),
                Segment::Expr(expr) => out.push_str(&expr.eval(ctx)?.to_text()),
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FormatPart {
    Lit(String),
    Field(FieldPath),
}

/// One `{...}` placeholder: a root name plus lookup steps, so `{user}`,
/// `{user.name}` and `{row[title]}` all resolve by walking the context.
#[derive(Debug, Clone, PartialEq)]
struct FieldPath {
    root: String,
    steps: Vec<String>,
}

impl FieldPath {
    fn parse(field: &str, position: usize) -> Result<Self, SyntaxError> {
        let mut steps = Vec::new();
        let mut root = None;
        let mut current = String::new();
        let mut chars = field.chars().peekable();

        let mut flush = |current: &mut String, root: &mut Option<String>, steps: &mut Vec<String>| {
            if !current.is_empty() {
                if root.is_none() {
                    *root = Some(std::mem::take(current));
                } else {
                    steps.push(std::mem::take(current));
                }
            }
        };

        while let Some(ch) = chars.next() {
            match ch {
                '.' => flush(&mut current, &mut root, &mut steps),
                '[' => {
                    flush(&mut current, &mut root, &mut steps);
                    let mut key = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == ']' {
                            closed = true;
                            break;
                        }
                        key.push(inner);
                    }
                    if !closed {
                        return Err(SyntaxError {
                            position,
                            kind: SyntaxErrorKind::unexpected_eof(Some("]".to_string())),
                        });
                    }
                    steps.push(key);
                }
                other => current.push(other),
            }
        }
        flush(&mut current, &mut root, &mut steps);

        match root {
            Some(root) => Ok(Self { root, steps }),
            None => Err(SyntaxError {
                position,
                kind: SyntaxErrorKind::Expected {
                    description: "field name inside '{}'".to_string(),
                },
            }),
        }
    }

    fn resolve(&self, ctx: &Context) -> TreelateResult<Value> {
        let mut value = ctx
            .get(&self.root)
            .cloned()
            .ok_or_else(|| TreelateError::MissingVariable {
                variable_name: self.root.clone(),
            })?;
        for step in &self.steps {
            value = match value {
                Value::Map(entries) => {
                    entries
                        .get(step)
                        .cloned()
                        .ok_or_else(|| TreelateError::MissingKey { key: step.clone() })?
                }
                Value::List(items) => {
                    let idx: usize = step.parse().map_err(|_| TreelateError::TypeMismatch {
                        expected: "integer list index".to_string(),
                        found: format!("'{}'", step),
                    })?;
                    items
                        .get(idx)
                        .cloned()
                        .ok_or_else(|| TreelateError::MissingKey { key: step.clone() })?
                }
                other => {
                    return Err(TreelateError::TypeMismatch {
                        expected: "map or list".to_string(),
                        found: other.type_name().to_string(),
                    });
                }
            };
        }
        Ok(value)
    }
}

/// An attribute value in `{name}` format style. `{{`/`}}` escape literal
/// braces; a template with no placeholders is static.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FormatTemplate {
    parts: Vec<FormatPart>,
}

impl FormatTemplate {
    pub(crate) fn compile(src: &str) -> Result<Self, SyntaxError> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        let mut chars = src.char_indices().peekable();

        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' => {
                    if chars.peek().is_some_and(|&(_, c)| c == '{') {
                        chars.next();
                        lit.push('{');
                        continue;
                    }
                    if !lit.is_empty() {
                        parts.push(FormatPart::Lit(std::mem::take(&mut lit)));
                    }
                    let mut field = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        field.push(inner);
                    }
                    if !closed {
                        return Err(SyntaxError {
                            position: pos,
                            kind: SyntaxErrorKind::UnbalancedBrace,
                        });
                    }
                    parts.push(FormatPart::Field(FieldPath::parse(field.trim(), pos)?));
                }
                '}' => {
                    if chars.peek().is_some_and(|&(_, c)| c == '}') {
                        chars.next();
                        lit.push('}');
                    } else {
                        return Err(SyntaxError {
                            position: pos,
                            kind: SyntaxErrorKind::UnbalancedBrace,
                        });
                    }
                }
                other => lit.push(other),
            }
        }
        if !lit.is_empty() {
            parts.push(FormatPart::Lit(lit));
        }

        Ok(Self { parts })
    }

    /// True when no placeholder needs a context.
    pub(crate) fn is_static(&self) -> bool {
        self.parts
            .iter()
            .all(|p| matches!(p, FormatPart::Lit(_)))
    }

    /// The literal text of a static template.
    pub(crate) fn literal_text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let FormatPart::Lit(lit) = part {
                out.push_str(lit);
            }
        }
        out
    }

    pub(crate) fn format(&self, ctx: &Context) -> TreelateResult<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                FormatPart::Lit(lit) => out.push_str(lit),
                FormatPart::Field(path) => out.push_str(&path.resolve(ctx)?.to_text()),
            }
        }
        Ok(out)
    }
}
