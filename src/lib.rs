mod compose;
mod engine;
mod error;
mod expr;
mod node;
mod printer;
mod render;
mod text;
mod traverse;
mod value;

// Public exports.
pub use engine::{Engine, RenderOptions};
pub use error::{SyntaxError, SyntaxErrorKind, TreelateError, TreelateResult};
pub use expr::{BinOp, Expr};
pub use node::{Component, Cond, ForLoop, Node, Tree, ValueGetter};
pub use value::{Context, Value};
