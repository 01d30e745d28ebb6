use std::borrow::Cow;
use std::collections::VecDeque;

use crate::error::{TreelateError, TreelateResult};
use crate::node::{CondKind, ForLoop, Node, Tree};
use crate::value::{Context, Value};

/// One pass over an ordered sibling list: applies If/Elif/Else chain
/// semantics and expands for-loops, yielding the effective
/// (context, node, subtree) triples to descend into.
///
/// The sequence is finite and non-restartable; every render takes a
/// fresh pass.
pub(crate) struct SiblingPass<'t, 'c> {
    siblings: std::slice::Iter<'t, (Node, Tree)>,
    ctx: &'c Context,
    /// Derived contexts for the loop currently being expanded.
    pending: VecDeque<Context>,
    current: Option<(&'t Node, &'t Tree)>,
    in_if_block: bool,
    skip_rest: bool,
}

impl<'t, 'c> SiblingPass<'t, 'c> {
    pub(crate) fn new(siblings: &'t [(Node, Tree)], ctx: &'c Context) -> Self {
        Self {
            siblings: siblings.iter(),
            ctx,
            pending: VecDeque::new(),
            current: None,
            in_if_block: false,
            skip_rest: false,
        }
    }

    fn test_truthy(&self, node: &Node) -> TreelateResult<bool> {
        match &node.cond {
            Some(cond) => match &cond.test {
                Some(getter) => Ok(getter.get(self.ctx)?.is_truthy()),
                None => Ok(true),
            },
            None => Ok(true),
        }
    }

    /// Runs the iterable once and derives one extended context per
    /// element, destructuring positionally across multiple loop vars.
    fn expand(&self, for_loop: &ForLoop) -> TreelateResult<VecDeque<Context>> {
        let items: Vec<Value> = match for_loop.iterable.eval(self.ctx)? {
            Value::List(items) => items,
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Value::List(vec![Value::Str(k), v]))
                .collect(),
            Value::Str(text) => text
                .chars()
                .map(|c| Value::Str(c.to_string()))
                .collect(),
            other => {
                return Err(TreelateError::NotIterable {
                    type_name: other.type_name().to_string(),
                });
            }
        };

        let mut contexts = VecDeque::with_capacity(items.len());
        for item in items {
            let mut overrides = Context::new();
            if for_loop.vars.len() == 1 {
                overrides.insert(&for_loop.vars[0], item);
            } else {
                let Value::List(parts) = item else {
                    return Err(TreelateError::TypeMismatch {
                        expected: format!("{}-element sequence to destructure", for_loop.vars.len()),
                        found: item.type_name().to_string(),
                    });
                };
                if parts.len() != for_loop.vars.len() {
                    return Err(TreelateError::TypeMismatch {
                        expected: format!("{}-element sequence to destructure", for_loop.vars.len()),
                        found: format!("{}-element sequence", parts.len()),
                    });
                }
                for (var, part) in for_loop.vars.iter().zip(parts) {
                    overrides.insert(var, part);
                }
            }
            contexts.push_back(self.ctx.extended(&overrides));
        }
        Ok(contexts)
    }
}

impl<'t, 'c> Iterator for SiblingPass<'t, 'c> {
    type Item = TreelateResult<(Cow<'c, Context>, &'t Node, &'t Tree)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(loop_ctx) = self.pending.pop_front() {
                let (node, tree) = self.current?;
                return Some(Ok((Cow::Owned(loop_ctx), node, tree)));
            }
            self.current = None;

            let (node, tree) = self.siblings.next()?;

            let collect = match &node.cond {
                None => {
                    self.in_if_block = false;
                    true
                }
                Some(cond) => match cond.kind {
                    CondKind::If => {
                        self.in_if_block = true;
                        match self.test_truthy(node) {
                            Ok(truthy) => {
                                self.skip_rest = truthy;
                                truthy
                            }
                            Err(e) => return Some(Err(e)),
                        }
                    }
                    CondKind::Elif => {
                        if !self.in_if_block {
                            return Some(Err(TreelateError::Structure {
                                message: "Elif without a preceding If".to_string(),
                            }));
                        }
                        if self.skip_rest {
                            false
                        } else {
                            match self.test_truthy(node) {
                                Ok(truthy) => {
                                    if truthy {
                                        self.skip_rest = true;
                                    }
                                    truthy
                                }
                                Err(e) => return Some(Err(e)),
                            }
                        }
                    }
                    CondKind::Else => {
                        if !self.in_if_block {
                            return Some(Err(TreelateError::Structure {
                                message: "Else without a preceding If".to_string(),
                            }));
                        }
                        !self.skip_rest
                    }
                },
            };

            if !collect {
                continue;
            }

            if let Some(for_loop) = &node.for_loop {
                match self.expand(for_loop) {
                    Ok(contexts) => {
                        // N = 0 yields no passes for this sibling.
                        if contexts.is_empty() {
                            continue;
                        }
                        self.pending = contexts;
                        self.current = Some((node, tree));
                        continue;
                    }
                    Err(e) => return Some(Err(e)),
                }
            }

            return Some(Ok((Cow::Borrowed(self.ctx), node, tree)));
        }
    }
}
