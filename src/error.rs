pub type TreelateResult<T> = std::result::Result<T, TreelateError>;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyntaxErrorKind {
    UnexpectedToken {
        expected: String,
        found: String,
    },
    UnexpectedEOF {
        /// Describes what was expected, e.g., "(expected ']]')"
        expected_what: String,
    },
    InvalidNumber {
        literal: String,
    },
    UnterminatedString,
    UnbalancedBrace,
    Expected {
        description: String,
    },
    Message(String),
}

impl std::fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedToken { expected, found } => {
                write!(f, "Expected {}, found {}", expected, found)
            }
            Self::UnexpectedEOF { expected_what } => {
                write!(f, "Unexpected end of expression{}", expected_what)
            }
            Self::InvalidNumber { literal } => {
                write!(f, "Invalid numeric literal '{}'", literal)
            }
            Self::UnterminatedString => {
                write!(f, "Unterminated string literal")
            }
            Self::UnbalancedBrace => {
                write!(f, "Unbalanced '{{' in format text")
            }
            Self::Expected { description } => {
                write!(f, "Expected {}", description)
            }
            Self::Message(msg) => {
                write!(f, "Syntax error: {}", msg)
            }
        }
    }
}

impl std::error::Error for SyntaxErrorKind {}

impl SyntaxErrorKind {
    pub fn unexpected_eof(expected: Option<String>) -> Self {
        Self::UnexpectedEOF {
            expected_what: expected.map_or_else(String::new, |e| format!(" (expected '{}')", e)),
        }
    }
}

/// A compile-time failure in an embedded expression or interpolation
/// snippet, with the byte position inside the offending source text.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyntaxError {
    pub position: usize,
    pub kind: SyntaxErrorKind,
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Syntax error at offset {}: {}", self.position, self.kind)
    }
}

impl std::error::Error for SyntaxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TreelateError {
    ComponentExists {
        component_name: String,
    },
    MissingComponent {
        component_name: String,
    },
    MissingVariable {
        variable_name: String,
    },
    MissingKey {
        key: String,
    },
    TypeMismatch {
        expected: String,
        found: String,
    },
    NotIterable {
        type_name: String,
    },
    /// A malformed template: `Elif`/`Else` outside an open conditional
    /// chain, slot content outside a component body, and the like. Always
    /// fatal, never recovered.
    Structure {
        message: String,
    },
    Syntax(SyntaxError),
    /// Wrapper attached once per failed render, carrying the offending
    /// node and the partial output accumulated up to the failure point.
    Render {
        node: String,
        partial: String,
        source: Box<TreelateError>,
    },
}

impl std::fmt::Display for TreelateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ComponentExists { component_name } => {
                write!(f, "Component already registered: {}", component_name)
            }
            Self::MissingComponent { component_name } => {
                write!(f, "Component not found: {}", component_name)
            }
            Self::MissingVariable { variable_name } => {
                write!(f, "Variable not found: {}", variable_name)
            }
            Self::MissingKey { key } => {
                write!(f, "Key not found: {}", key)
            }
            Self::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {}, found {}", expected, found)
            }
            Self::NotIterable { type_name } => {
                write!(f, "Value of type {} is not iterable", type_name)
            }
            Self::Structure { message } => {
                write!(f, "Malformed template: {}", message)
            }
            Self::Syntax(syntax_error) => {
                write!(f, "{}", syntax_error)
            }
            Self::Render { node, source, .. } => {
                write!(f, "Render failed at {}: {}", node, source)
            }
        }
    }
}

impl std::error::Error for TreelateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Syntax(syntax_error) => Some(syntax_error),
            Self::Render { source, .. } => Some(source.as_ref()),
            Self::ComponentExists { .. }
            | Self::MissingComponent { .. }
            | Self::MissingVariable { .. }
            | Self::MissingKey { .. }
            | Self::TypeMismatch { .. }
            | Self::NotIterable { .. }
            | Self::Structure { .. } => None,
        }
    }
}

impl From<SyntaxError> for TreelateError {
    fn from(error: SyntaxError) -> Self {
        Self::Syntax(error)
    }
}

impl TreelateError {
    /// The partial serialized output accumulated before the failure, when
    /// this error was raised by a render call.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            Self::Render { partial, .. } => Some(partial),
            Self::ComponentExists { .. }
            | Self::MissingComponent { .. }
            | Self::MissingVariable { .. }
            | Self::MissingKey { .. }
            | Self::TypeMismatch { .. }
            | Self::NotIterable { .. }
            | Self::Structure { .. }
            | Self::Syntax(_) => None,
        }
    }

    /// The node a failed render stopped at, when known.
    pub fn offending_node(&self) -> Option<&str> {
        match self {
            Self::Render { node, .. } => Some(node),
            Self::ComponentExists { .. }
            | Self::MissingComponent { .. }
            | Self::MissingVariable { .. }
            | Self::MissingKey { .. }
            | Self::TypeMismatch { .. }
            | Self::NotIterable { .. }
            | Self::Structure { .. }
            | Self::Syntax(_) => None,
        }
    }
}
