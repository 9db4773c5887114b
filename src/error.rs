use crate::token::{token_to_string, Span, Token};
use std::fmt;
use std::ops::Range;

/// Any reason a snippet failed to become a sample function.
#[derive(Debug)]
pub enum CompileError {
    Lex(LexError),
    Parse(ParseError),
    Resolve(ResolveError),
}

#[derive(Debug)]
pub enum LexError {
    UnexpectedChar { ch: char, pos: usize },
    UnterminatedString { pos: usize },
    UnterminatedComment { pos: usize },
    InvalidNumber { text: String, pos: usize },
}

#[derive(Debug)]
pub enum ParseError {
    UnexpectedToken {
        expected: String,
        found: Token,
        span: Span,
    },
    UnexpectedEOF {
        expected: String,
        pos: usize,
    },
    InvalidAssignmentTarget {
        span: Span,
    },
    NestingTooDeep {
        span: Span,
    },
}

/// Name-resolution failures found while compiling the AST.
#[derive(Debug)]
pub enum ResolveError {
    UnknownIdentifier { name: String, span: Span },
    AssignToConstant { name: String, span: Span },
    ReadOnly { name: String, span: Span },
    DynamicName { object: String, span: Span },
    UnknownMember { object: String, property: String, span: Span },
    InvalidUse { name: String, span: Span },
    NotCallable { name: String, span: Span },
    Redeclared { name: String, span: Span },
    NestedFunction { name: String, span: Span },
    OutsideLoop { keyword: &'static str, span: Span },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex(e) => write!(f, "Syntax error: {e}"),
            CompileError::Parse(e) => write!(f, "Syntax error: {e}"),
            CompileError::Resolve(e) => write!(f, "Compile error: {e}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnexpectedChar { ch, pos } => write!(f, "Unexpected char '{ch}' at pos {pos}"),
            LexError::UnterminatedString { pos } => write!(f, "Unterminated string at pos {pos}"),
            LexError::UnterminatedComment { pos } => write!(f, "Unterminated comment at pos {pos}"),
            LexError::InvalidNumber { text, pos } => write!(f, "Invalid number '{text}' at pos {pos}"),
        }
    }
}

impl std::error::Error for LexError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken { expected, found, span } => {
                write!(f, "Expected {expected}, found '{}' at pos {}", token_to_string(found), span.start)
            }
            ParseError::UnexpectedEOF { expected, .. } => {
                write!(f, "Unexpected end of input, expected {expected}")
            }
            ParseError::InvalidAssignmentTarget { span } => {
                write!(f, "Invalid assignment target at pos {}", span.start)
            }
            ParseError::NestingTooDeep { span } => {
                write!(f, "Expression nested too deeply at pos {}", span.start)
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::UnknownIdentifier { name, .. } => write!(f, "{name} is not defined"),
            ResolveError::AssignToConstant { name, .. } => {
                write!(f, "Assignment to constant variable '{name}'")
            }
            ResolveError::ReadOnly { name, .. } => write!(f, "'{name}' is read-only"),
            ResolveError::DynamicName { object, .. } => {
                write!(f, "Properties of '{object}' must be accessed by a fixed name")
            }
            ResolveError::UnknownMember { object, property, .. } => {
                write!(f, "'{object}.{property}' is not supported")
            }
            ResolveError::InvalidUse { name, .. } => {
                write!(f, "'{name}' cannot be used as a value here")
            }
            ResolveError::NotCallable { name, .. } => write!(f, "{name} is not a function"),
            ResolveError::Redeclared { name, .. } => {
                write!(f, "Identifier '{name}' has already been declared")
            }
            ResolveError::NestedFunction { name, .. } => {
                write!(f, "Function '{name}' must be declared at the top level")
            }
            ResolveError::OutsideLoop { keyword, .. } => write!(f, "'{keyword}' outside of a loop"),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

impl From<ResolveError> for CompileError {
    fn from(e: ResolveError) -> Self {
        CompileError::Resolve(e)
    }
}

impl LexError {
    pub fn pos(&self) -> usize {
        match self {
            LexError::UnexpectedChar { pos, .. }
            | LexError::UnterminatedString { pos }
            | LexError::UnterminatedComment { pos }
            | LexError::InvalidNumber { pos, .. } => *pos,
        }
    }
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::InvalidAssignmentTarget { span }
            | ParseError::NestingTooDeep { span } => *span,
            ParseError::UnexpectedEOF { pos, .. } => Span::new(*pos, *pos),
        }
    }
}

impl ResolveError {
    pub fn span(&self) -> Span {
        match self {
            ResolveError::UnknownIdentifier { span, .. }
            | ResolveError::AssignToConstant { span, .. }
            | ResolveError::ReadOnly { span, .. }
            | ResolveError::DynamicName { span, .. }
            | ResolveError::UnknownMember { span, .. }
            | ResolveError::InvalidUse { span, .. }
            | ResolveError::NotCallable { span, .. }
            | ResolveError::Redeclared { span, .. }
            | ResolveError::NestedFunction { span, .. }
            | ResolveError::OutsideLoop { span, .. } => *span,
        }
    }
}

impl CompileError {
    /// Source byte range the error points at.
    pub fn span(&self) -> Span {
        match self {
            CompileError::Lex(e) => Span::new(e.pos(), e.pos()),
            CompileError::Parse(e) => e.span(),
            CompileError::Resolve(e) => e.span(),
        }
    }

    /// Render a caret diagnostic against `source`, suitable for the editor's error field.
    pub fn render(&self, source: &str) -> String {
        use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};

        let Some(range) = label_range(source, self.span()) else {
            return self.to_string();
        };
        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, ("snippet", range.clone()))
            .with_config(Config::default().with_color(false).with_index_type(IndexType::Byte))
            .with_message(self.to_string())
            .with_label(Label::new(("snippet", range)).with_message("here"))
            .finish()
            .write(("snippet", Source::from(source)), &mut buf);
        match written {
            Ok(()) => String::from_utf8(buf).unwrap_or_else(|_| self.to_string()),
            Err(_) => self.to_string(),
        }
    }
}

/// Clamp a span to a non-empty, char-aligned range inside `source`.
fn label_range(source: &str, span: Span) -> Option<Range<usize>> {
    let (last_start, last_ch) = source.char_indices().last()?;
    let start = if span.start >= source.len() || !source.is_char_boundary(span.start) {
        last_start
    } else {
        span.start
    };
    let mut end = span.end.min(source.len());
    if end <= start || !source.is_char_boundary(end) {
        end = source[start..]
            .chars()
            .next()
            .map_or(last_start + last_ch.len_utf8(), |c| start + c.len_utf8());
    }
    Some(start..end)
}

/// Classification of a fault raised while a sample function runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// User code executed `throw`.
    Thrown,
    /// The call exceeded its per-sample step budget.
    StepBudget,
    /// Function calls nested deeper than the configured limit.
    CallDepth,
}

/// A fault raised by a single sample call. Isolated to that frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeFault {
    pub kind: FaultKind,
    pub message: String,
}

impl RuntimeFault {
    pub fn thrown(message: impl Into<String>) -> Self {
        RuntimeFault { kind: FaultKind::Thrown, message: message.into() }
    }
}

impl fmt::Display for RuntimeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FaultKind::Thrown => write!(f, "Uncaught {}", self.message),
            FaultKind::StepBudget | FaultKind::CallDepth => {
                write!(f, "RangeError: {}", self.message)
            }
        }
    }
}

impl std::error::Error for RuntimeFault {}

/// A malformed or unexpected control-plane message. Logged and ignored.
#[derive(Debug)]
pub enum ProtocolError {
    Json(serde_json::Error),
    Decode(String),
    InvalidKnobValue { name: String, value: f64 },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Json(e) => write!(f, "Malformed message: {e}"),
            ProtocolError::Decode(e) => write!(f, "Malformed message: {e}"),
            ProtocolError::InvalidKnobValue { name, value } => {
                write!(f, "Invalid value {value} for knob '{name}'")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Json(e)
    }
}

/// Failure of an offline render.
#[derive(Debug)]
pub enum RenderError {
    Compile(CompileError),
    InvalidDuration(f64),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Compile(e) => write!(f, "{e}"),
            RenderError::InvalidDuration(seconds) => write!(f, "Invalid render duration: {seconds} seconds"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<CompileError> for RenderError {
    fn from(e: CompileError) -> Self {
        RenderError::Compile(e)
    }
}

impl RenderError {
    /// Like [`CompileError::render`], with a plain message for everything else.
    pub fn render(&self, source: &str) -> String {
        match self {
            RenderError::Compile(e) => e.render(source),
            RenderError::InvalidDuration(_) => self.to_string(),
        }
    }
}
