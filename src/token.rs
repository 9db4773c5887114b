use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    StringLit(String),
    Ident(String),

    // Keywords
    Const,
    Let,
    Var,
    Function,
    Return,
    If,
    Else,
    For,
    While,
    Break,
    Continue,
    Throw,
    New,
    This,
    True,
    False,
    Null,

    // Arithmetic
    Plus,       // +
    Minus,      // -
    Star,       // *
    StarStar,   // **
    Slash,      // /
    Percent,    // %
    PlusPlus,   // ++
    MinusMinus, // --

    // Bitwise
    Amp,      // &
    Pipe,     // |
    Caret,    // ^
    Tilde,    // ~
    LtLt,     // <<
    GtGt,     // >>
    GtGtGt,   // >>>

    // Logical / comparison
    AmpAmp,   // &&
    PipePipe, // ||
    Bang,     // !
    EqEq,     // ==
    EqEqEq,   // ===
    NotEq,    // !=
    NotEqEq,  // !==
    Lt,       // <
    Gt,       // >
    LtEq,     // <=
    GtEq,     // >=

    // Assignment
    Eq,         // =
    PlusEq,     // +=
    MinusEq,    // -=
    StarEq,     // *=
    StarStarEq, // **=
    SlashEq,    // /=
    PercentEq,  // %=
    AmpEq,      // &=
    PipeEq,     // |=
    CaretEq,    // ^=
    LtLtEq,     // <<=
    GtGtEq,     // >>=

    // Punctuation
    Dot,       // .
    Comma,     // ,
    Semicolon, // ;
    Colon,     // :
    Question,  // ?
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    LBrace,    // {
    RBrace,    // }

    // Structural
    EOF,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span { start: self.start.min(other.start), end: self.end.max(other.end) }
    }
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
    /// True when at least one line break separates this token from the previous one.
    /// Drives automatic semicolon insertion in the parser.
    pub line_break: bool,
}

/// Convert a token back to its approximate source representation.
pub fn token_to_string(token: &Token) -> String {
    match token {
        Token::Number(n) => {
            if *n == (*n as i64) as f64 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }
        }
        Token::StringLit(s) => format!("\"{s}\""),
        Token::Ident(s) => s.clone(),
        Token::Const => "const".into(),
        Token::Let => "let".into(),
        Token::Var => "var".into(),
        Token::Function => "function".into(),
        Token::Return => "return".into(),
        Token::If => "if".into(),
        Token::Else => "else".into(),
        Token::For => "for".into(),
        Token::While => "while".into(),
        Token::Break => "break".into(),
        Token::Continue => "continue".into(),
        Token::Throw => "throw".into(),
        Token::New => "new".into(),
        Token::This => "this".into(),
        Token::True => "true".into(),
        Token::False => "false".into(),
        Token::Null => "null".into(),
        Token::Plus => "+".into(),
        Token::Minus => "-".into(),
        Token::Star => "*".into(),
        Token::StarStar => "**".into(),
        Token::Slash => "/".into(),
        Token::Percent => "%".into(),
        Token::PlusPlus => "++".into(),
        Token::MinusMinus => "--".into(),
        Token::Amp => "&".into(),
        Token::Pipe => "|".into(),
        Token::Caret => "^".into(),
        Token::Tilde => "~".into(),
        Token::LtLt => "<<".into(),
        Token::GtGt => ">>".into(),
        Token::GtGtGt => ">>>".into(),
        Token::AmpAmp => "&&".into(),
        Token::PipePipe => "||".into(),
        Token::Bang => "!".into(),
        Token::EqEq => "==".into(),
        Token::EqEqEq => "===".into(),
        Token::NotEq => "!=".into(),
        Token::NotEqEq => "!==".into(),
        Token::Lt => "<".into(),
        Token::Gt => ">".into(),
        Token::LtEq => "<=".into(),
        Token::GtEq => ">=".into(),
        Token::Eq => "=".into(),
        Token::PlusEq => "+=".into(),
        Token::MinusEq => "-=".into(),
        Token::StarEq => "*=".into(),
        Token::StarStarEq => "**=".into(),
        Token::SlashEq => "/=".into(),
        Token::PercentEq => "%=".into(),
        Token::AmpEq => "&=".into(),
        Token::PipeEq => "|=".into(),
        Token::CaretEq => "^=".into(),
        Token::LtLtEq => "<<=".into(),
        Token::GtGtEq => ">>=".into(),
        Token::Dot => ".".into(),
        Token::Comma => ",".into(),
        Token::Semicolon => ";".into(),
        Token::Colon => ":".into(),
        Token::Question => "?".into(),
        Token::LParen => "(".into(),
        Token::RParen => ")".into(),
        Token::LBracket => "[".into(),
        Token::RBracket => "]".into(),
        Token::LBrace => "{".into(),
        Token::RBrace => "}".into(),
        Token::EOF => "end of input".into(),
    }
}
