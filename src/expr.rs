use crate::error::{SyntaxError, SyntaxErrorKind, TreelateError, TreelateResult};
use crate::value::{Context, Value};

type ParseResult<T> = Result<T, SyntaxError>;

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    If,
    Else,
    Not,
    And,
    Or,
    In,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{}'", name),
            Self::Int(i) => format!("number '{}'", i),
            Self::Float(f) => format!("number '{}'", f),
            Self::Str(s) => format!("string '{}'", s),
            Self::True => "'true'".to_string(),
            Self::False => "'false'".to_string(),
            Self::Null => "'none'".to_string(),
            Self::If => "'if'".to_string(),
            Self::Else => "'else'".to_string(),
            Self::Not => "'not'".to_string(),
            Self::And => "'and'".to_string(),
            Self::Or => "'or'".to_string(),
            Self::In => "'in'".to_string(),
            Self::EqEq => "'=='".to_string(),
            Self::NotEq => "'!='".to_string(),
            Self::Lt => "'<'".to_string(),
            Self::Le => "'<='".to_string(),
            Self::Gt => "'>'".to_string(),
            Self::Ge => "'>='".to_string(),
            Self::Plus => "'+'".to_string(),
            Self::Minus => "'-'".to_string(),
            Self::Dot => "'.'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn scan(input: &str) -> ParseResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = match ch {
            '(' => {
                chars.next();
                TokenKind::LParen
            }
            ')' => {
                chars.next();
                TokenKind::RParen
            }
            '[' => {
                chars.next();
                TokenKind::LBracket
            }
            ']' => {
                chars.next();
                TokenKind::RBracket
            }
            '.' => {
                chars.next();
                TokenKind::Dot
            }
            '+' => {
                chars.next();
                TokenKind::Plus
            }
            '-' => {
                chars.next();
                TokenKind::Minus
            }
            '=' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, c)| c == '=') {
                    chars.next();
                    TokenKind::EqEq
                } else {
                    return Err(SyntaxError {
                        position: pos,
                        kind: SyntaxErrorKind::Expected {
                            description: "'==' (assignment is not supported)".to_string(),
                        },
                    });
                }
            }
            '!' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, c)| c == '=') {
                    chars.next();
                    TokenKind::NotEq
                } else {
                    return Err(SyntaxError {
                        position: pos,
                        kind: SyntaxErrorKind::Expected {
                            description: "'!='".to_string(),
                        },
                    });
                }
            }
            '<' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, c)| c == '=') {
                    chars.next();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, c)| c == '=') {
                    chars.next();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    if c == '\\' {
                        match chars.next() {
                            Some((_, 'n')) => text.push('\n'),
                            Some((_, 't')) => text.push('\t'),
                            Some((_, esc)) => text.push(esc),
                            None => break,
                        }
                    } else {
                        text.push(c);
                    }
                }
                if !closed {
                    return Err(SyntaxError {
                        position: pos,
                        kind: SyntaxErrorKind::UnterminatedString,
                    });
                }
                TokenKind::Str(text)
            }
            c if c.is_ascii_digit() => {
                let mut literal = String::new();
                let mut is_float = false;
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        literal.push(c);
                        chars.next();
                    } else if c == '.' && !is_float {
                        // Lookahead: `1.x` is attribute access on an int,
                        // `1.5` is a float literal.
                        let mut ahead = chars.clone();
                        ahead.next();
                        if ahead.peek().is_some_and(|&(_, d)| d.is_ascii_digit()) {
                            is_float = true;
                            literal.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                if is_float {
                    TokenKind::Float(literal.parse().map_err(|_| SyntaxError {
                        position: pos,
                        kind: SyntaxErrorKind::InvalidNumber {
                            literal: literal.clone(),
                        },
                    })?)
                } else {
                    TokenKind::Int(literal.parse().map_err(|_| SyntaxError {
                        position: pos,
                        kind: SyntaxErrorKind::InvalidNumber {
                            literal: literal.clone(),
                        },
                    })?)
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match name.as_str() {
                    "true" | "True" => TokenKind::True,
                    "false" | "False" => TokenKind::False,
                    "none" | "None" => TokenKind::Null,
                    "if" => TokenKind::If,
                    "else" => TokenKind::Else,
                    "not" => TokenKind::Not,
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "in" => TokenKind::In,
                    _ => TokenKind::Ident(name),
                }
            }
            other => {
                return Err(SyntaxError {
                    position: pos,
                    kind: SyntaxErrorKind::Message(format!("Unexpected character '{}'", other)),
                });
            }
        };

        tokens.push(Token { kind, pos });
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Add,
    Sub,
}

/// A compiled expression over a [`Context`].
///
/// The grammar is deliberately small: context lookups (`user`,
/// `user.name`, `options[0]`), comparisons, membership tests, `not` /
/// `and` / `or`, `+` / `-`, and a conditional of the form
/// `a if cond else b`. Compilation happens once; evaluation is a pure
/// function of the context.
///
/// # Examples
///
/// ```
/// use treelate::{Context, Expr, Value};
///
/// let expr = Expr::compile("'admin' if user.role == 'admin' else 'guest'").unwrap();
///
/// let mut context = Context::new();
/// context.insert("user", Value::from([("role", "admin")]));
///
/// assert_eq!(expr.eval(&context).unwrap(), Value::from("admin"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    Var(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Ternary {
        then: Box<Expr>,
        cond: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.idx).map_or(self.len, |t| t.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.idx).cloned();
        if token.is_some() {
            self.idx += 1;
        }
        token
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<()> {
        match self.advance() {
            Some(t) if t.kind == *kind => Ok(()),
            Some(t) => Err(SyntaxError {
                position: t.pos,
                kind: SyntaxErrorKind::UnexpectedToken {
                    expected: kind.describe(),
                    found: t.kind.describe(),
                },
            }),
            None => Err(SyntaxError {
                position: self.len,
                kind: SyntaxErrorKind::unexpected_eof(Some(kind.describe())),
            }),
        }
    }

    fn parse_ternary(&mut self) -> ParseResult<Expr> {
        let value = self.parse_or()?;
        if self.peek() == Some(&TokenKind::If) {
            self.advance();
            let cond = self.parse_or()?;
            self.expect(&TokenKind::Else)?;
            let otherwise = self.parse_ternary()?;
            return Ok(Expr::Ternary {
                then: Box::new(value),
                cond: Box::new(cond),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(value)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&TokenKind::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&TokenKind::And) {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.peek() == Some(&TokenKind::Not) {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(TokenKind::EqEq) => BinOp::Eq,
            Some(TokenKind::NotEq) => BinOp::NotEq,
            Some(TokenKind::Lt) => BinOp::Lt,
            Some(TokenKind::Le) => BinOp::Le,
            Some(TokenKind::Gt) => BinOp::Gt,
            Some(TokenKind::Ge) => BinOp::Ge,
            Some(TokenKind::In) => BinOp::In,
            Some(TokenKind::Not) => {
                // `not` mid-expression only forms `not in`.
                self.advance();
                self.expect(&TokenKind::In)?;
                let rhs = self.parse_additive()?;
                return Ok(Expr::Binary(
                    Box::new(lhs),
                    BinOp::NotIn,
                    Box::new(rhs),
                ));
            }
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary(Box::new(lhs), op, Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.peek() == Some(&TokenKind::Minus) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(TokenKind::Dot) => {
                    self.advance();
                    match self.advance() {
                        Some(Token {
                            kind: TokenKind::Ident(attr),
                            ..
                        }) => {
                            expr = Expr::Attr(Box::new(expr), attr);
                        }
                        Some(t) => {
                            return Err(SyntaxError {
                                position: t.pos,
                                kind: SyntaxErrorKind::UnexpectedToken {
                                    expected: "identifier after '.'".to_string(),
                                    found: t.kind.describe(),
                                },
                            });
                        }
                        None => {
                            return Err(SyntaxError {
                                position: self.len,
                                kind: SyntaxErrorKind::unexpected_eof(Some(
                                    "identifier after '.'".to_string(),
                                )),
                            });
                        }
                    }
                }
                Some(TokenKind::LBracket) => {
                    self.advance();
                    let index = self.parse_ternary()?;
                    self.expect(&TokenKind::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let pos = self.pos();
        match self.advance() {
            Some(token) => match token.kind {
                TokenKind::Str(s) => Ok(Expr::Lit(Value::Str(s))),
                TokenKind::Int(i) => Ok(Expr::Lit(Value::Int(i))),
                TokenKind::Float(f) => Ok(Expr::Lit(Value::Float(f))),
                TokenKind::True => Ok(Expr::Lit(Value::Bool(true))),
                TokenKind::False => Ok(Expr::Lit(Value::Bool(false))),
                TokenKind::Null => Ok(Expr::Lit(Value::Null)),
                TokenKind::Ident(name) => Ok(Expr::Var(name)),
                TokenKind::LParen => {
                    let inner = self.parse_ternary()?;
                    self.expect(&TokenKind::RParen)?;
                    Ok(inner)
                }
                other => Err(SyntaxError {
                    position: pos,
                    kind: SyntaxErrorKind::UnexpectedToken {
                        expected: "expression".to_string(),
                        found: other.describe(),
                    },
                }),
            },
            None => Err(SyntaxError {
                position: self.len,
                kind: SyntaxErrorKind::unexpected_eof(Some("expression".to_string())),
            }),
        }
    }
}

impl Expr {
    /// Compiles an expression source into a reusable evaluator.
    ///
    /// # Errors
    ///
    /// Returns a [`SyntaxError`] with the offending position when the
    /// source is malformed. Compilation never touches a context; all
    /// lookups happen at [`eval`](Expr::eval) time.
    pub fn compile(src: &str) -> Result<Self, SyntaxError> {
        let tokens = scan(src)?;
        let mut parser = Parser {
            tokens,
            idx: 0,
            len: src.len(),
        };
        let expr = parser.parse_ternary()?;
        if let Some(extra) = parser.peek() {
            return Err(SyntaxError {
                position: parser.pos(),
                kind: SyntaxErrorKind::UnexpectedToken {
                    expected: "end of expression".to_string(),
                    found: extra.describe(),
                },
            });
        }
        Ok(expr)
    }

    /// Evaluates against an explicit context. Deterministic: the same
    /// (expression, context) pair always produces the same result.
    pub fn eval(&self, ctx: &Context) -> TreelateResult<Value> {
        match self {
            Self::Lit(value) => Ok(value.clone()),
            Self::Var(name) => {
                ctx.get(name)
                    .cloned()
                    .ok_or_else(|| TreelateError::MissingVariable {
                        variable_name: name.clone(),
                    })
            }
            Self::Attr(base, attr) => match base.eval(ctx)? {
                Value::Map(entries) => {
                    entries
                        .get(attr)
                        .cloned()
                        .ok_or_else(|| TreelateError::MissingKey { key: attr.clone() })
                }
                other => Err(TreelateError::TypeMismatch {
                    expected: "map".to_string(),
                    found: other.type_name().to_string(),
                }),
            },
            Self::Index(base, index) => {
                let base = base.eval(ctx)?;
                let index = index.eval(ctx)?;
                match (base, index) {
                    (Value::Map(entries), Value::Str(key)) => entries
                        .get(&key)
                        .cloned()
                        .ok_or(TreelateError::MissingKey { key }),
                    (Value::List(items), Value::Int(i)) => {
                        let idx = if i < 0 { i + items.len() as i64 } else { i };
                        usize::try_from(idx)
                            .ok()
                            .and_then(|idx| items.get(idx).cloned())
                            .ok_or_else(|| TreelateError::MissingKey { key: i.to_string() })
                    }
                    (base, index) => Err(TreelateError::TypeMismatch {
                        expected: "map[str] or list[int]".to_string(),
                        found: format!("{}[{}]", base.type_name(), index.type_name()),
                    }),
                }
            }
            Self::Not(operand) => Ok(Value::Bool(!operand.eval(ctx)?.is_truthy())),
            Self::Neg(operand) => match operand.eval(ctx)? {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(TreelateError::TypeMismatch {
                    expected: "number".to_string(),
                    found: other.type_name().to_string(),
                }),
            },
            // `and`/`or` yield the deciding operand, so `x or 'fallback'`
            // works as a defaulting idiom.
            Self::And(lhs, rhs) => {
                let left = lhs.eval(ctx)?;
                if left.is_truthy() { rhs.eval(ctx) } else { Ok(left) }
            }
            Self::Or(lhs, rhs) => {
                let left = lhs.eval(ctx)?;
                if left.is_truthy() { Ok(left) } else { rhs.eval(ctx) }
            }
            Self::Binary(lhs, op, rhs) => {
                let left = lhs.eval(ctx)?;
                let right = rhs.eval(ctx)?;
                eval_binary(&left, *op, &right)
            }
            Self::Ternary {
                then,
                cond,
                otherwise,
            } => {
                if cond.eval(ctx)?.is_truthy() {
                    then.eval(ctx)
                } else {
                    otherwise.eval(ctx)
                }
            }
        }
    }
}

fn eval_binary(left: &Value, op: BinOp, right: &Value) -> TreelateResult<Value> {
    let ordering = |op: BinOp, left: &Value, right: &Value| {
        left.try_cmp(right)
            .map(|ord| {
                Value::Bool(match op {
                    BinOp::Lt => ord.is_lt(),
                    BinOp::Le => ord.is_le(),
                    BinOp::Gt => ord.is_gt(),
                    BinOp::Ge => ord.is_ge(),
                    _ => unreachable!("ordering is only called for comparison operators"),
                })
            })
            .ok_or_else(|| TreelateError::TypeMismatch {
                expected: "comparable values".to_string(),
                found: format!("{} and {}", left.type_name(), right.type_name()),
            })
    };

    match op {
        BinOp::Eq => Ok(Value::Bool(left.loose_eq(right))),
        BinOp::NotEq => Ok(Value::Bool(!left.loose_eq(right))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => ordering(op, left, right),
        BinOp::In | BinOp::NotIn => {
            let contained = match right {
                Value::Str(haystack) => match left {
                    Value::Str(needle) => haystack.contains(needle.as_str()),
                    other => {
                        return Err(TreelateError::TypeMismatch {
                            expected: "str needle for str haystack".to_string(),
                            found: other.type_name().to_string(),
                        });
                    }
                },
                Value::List(items) => items.iter().any(|item| item.loose_eq(left)),
                Value::Map(entries) => match left {
                    Value::Str(key) => entries.contains_key(key),
                    other => {
                        return Err(TreelateError::TypeMismatch {
                            expected: "str key for map membership".to_string(),
                            found: other.type_name().to_string(),
                        });
                    }
                },
                other => {
                    return Err(TreelateError::NotIterable {
                        type_name: other.type_name().to_string(),
                    });
                }
            };
            Ok(Value::Bool(contained != (op == BinOp::NotIn)))
        }
        BinOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (Value::List(a), Value::List(b)) => {
                let mut joined = a.clone();
                joined.extend(b.iter().cloned());
                Ok(Value::List(joined))
            }
            (left, right) => Err(TreelateError::TypeMismatch {
                expected: "matching addable values".to_string(),
                found: format!("{} and {}", left.type_name(), right.type_name()),
            }),
        },
        BinOp::Sub => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 - b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a - *b as f64)),
            (left, right) => Err(TreelateError::TypeMismatch {
                expected: "numbers".to_string(),
                found: format!("{} and {}", left.type_name(), right.type_name()),
            }),
        },
    }
}
