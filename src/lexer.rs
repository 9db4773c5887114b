use crate::error::LexError;
use crate::token::{Span, Spanned, Token};

pub struct Lexer {
    chars: Vec<char>,
    /// Precomputed byte offset for each char index.
    /// `byte_offsets[i]` = byte offset of `chars[i]` in the original `&str`.
    /// `byte_offsets[chars.len()]` = total byte length (sentinel for EOF).
    byte_offsets: Vec<usize>,
    pos: usize,
    /// Set when whitespace or a comment since the last token contained a line break.
    saw_line_break: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        // Build a lookup table: char index → byte offset.
        let mut byte_offsets = Vec::with_capacity(chars.len() + 1);
        let mut offset = 0;
        for ch in &chars {
            byte_offsets.push(offset);
            offset += ch.len_utf8();
        }
        byte_offsets.push(offset); // sentinel for EOF
        Lexer {
            chars,
            byte_offsets,
            pos: 0,
            saw_line_break: false,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let is_eof = spanned.token == Token::EOF;
            tokens.push(spanned);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// Skip whitespace and comments, remembering whether a line break was crossed.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        while let Some(ch) = self.peek_at(0) {
            match ch {
                '\n' => {
                    self.saw_line_break = true;
                    self.pos += 1;
                }
                c if c.is_whitespace() => self.pos += 1,
                '/' if self.peek_at(1) == Some('/') => {
                    while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
                        self.pos += 1;
                    }
                }
                '/' if self.peek_at(1) == Some('*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match self.advance() {
                            Some('*') if self.peek_at(0) == Some('/') => {
                                self.pos += 1;
                                break;
                            }
                            Some('\n') => self.saw_line_break = true,
                            Some(_) => {}
                            None => {
                                return Err(LexError::UnterminatedComment {
                                    pos: self.byte_pos_of(start),
                                });
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Convert a char index to a byte offset.
    fn byte_pos_of(&self, char_idx: usize) -> usize {
        self.byte_offsets[char_idx.min(self.chars.len())]
    }

    fn spanned(&mut self, token: Token, start: usize) -> Spanned {
        let line_break = std::mem::replace(&mut self.saw_line_break, false);
        Spanned {
            token,
            span: Span {
                start: self.byte_pos_of(start),
                end: self.byte_pos_of(self.pos),
            },
            line_break,
        }
    }

    /// Consume `len` chars and produce `token`.
    fn punct(&mut self, token: Token, start: usize, len: usize) -> Result<Spanned, LexError> {
        self.pos += len;
        Ok(self.spanned(token, start))
    }

    fn next_token(&mut self) -> Result<Spanned, LexError> {
        self.skip_trivia()?;

        let start = self.pos;
        let Some(ch) = self.peek_at(0) else {
            return Ok(self.spanned(Token::EOF, start));
        };
        let next = self.peek_at(1);
        let third = self.peek_at(2);
        let fourth = self.peek_at(3);

        match ch {
            '.' if next.is_some_and(|c| c.is_ascii_digit()) => self.lex_number(start),
            '.' => self.punct(Token::Dot, start, 1),
            ',' => self.punct(Token::Comma, start, 1),
            ';' => self.punct(Token::Semicolon, start, 1),
            ':' => self.punct(Token::Colon, start, 1),
            '?' => self.punct(Token::Question, start, 1),
            '(' => self.punct(Token::LParen, start, 1),
            ')' => self.punct(Token::RParen, start, 1),
            '[' => self.punct(Token::LBracket, start, 1),
            ']' => self.punct(Token::RBracket, start, 1),
            '{' => self.punct(Token::LBrace, start, 1),
            '}' => self.punct(Token::RBrace, start, 1),
            '~' => self.punct(Token::Tilde, start, 1),
            '+' => match next {
                Some('+') => self.punct(Token::PlusPlus, start, 2),
                Some('=') => self.punct(Token::PlusEq, start, 2),
                _ => self.punct(Token::Plus, start, 1),
            },
            '-' => match next {
                Some('-') => self.punct(Token::MinusMinus, start, 2),
                Some('=') => self.punct(Token::MinusEq, start, 2),
                _ => self.punct(Token::Minus, start, 1),
            },
            '*' => match (next, third) {
                (Some('*'), Some('=')) => self.punct(Token::StarStarEq, start, 3),
                (Some('*'), _) => self.punct(Token::StarStar, start, 2),
                (Some('='), _) => self.punct(Token::StarEq, start, 2),
                _ => self.punct(Token::Star, start, 1),
            },
            '/' => match next {
                Some('=') => self.punct(Token::SlashEq, start, 2),
                _ => self.punct(Token::Slash, start, 1),
            },
            '%' => match next {
                Some('=') => self.punct(Token::PercentEq, start, 2),
                _ => self.punct(Token::Percent, start, 1),
            },
            '&' => match next {
                Some('&') => self.punct(Token::AmpAmp, start, 2),
                Some('=') => self.punct(Token::AmpEq, start, 2),
                _ => self.punct(Token::Amp, start, 1),
            },
            '|' => match next {
                Some('|') => self.punct(Token::PipePipe, start, 2),
                Some('=') => self.punct(Token::PipeEq, start, 2),
                _ => self.punct(Token::Pipe, start, 1),
            },
            '^' => match next {
                Some('=') => self.punct(Token::CaretEq, start, 2),
                _ => self.punct(Token::Caret, start, 1),
            },
            '=' => match (next, third) {
                (Some('='), Some('=')) => self.punct(Token::EqEqEq, start, 3),
                (Some('='), _) => self.punct(Token::EqEq, start, 2),
                _ => self.punct(Token::Eq, start, 1),
            },
            '!' => match (next, third) {
                (Some('='), Some('=')) => self.punct(Token::NotEqEq, start, 3),
                (Some('='), _) => self.punct(Token::NotEq, start, 2),
                _ => self.punct(Token::Bang, start, 1),
            },
            '<' => match (next, third) {
                (Some('<'), Some('=')) => self.punct(Token::LtLtEq, start, 3),
                (Some('<'), _) => self.punct(Token::LtLt, start, 2),
                (Some('='), _) => self.punct(Token::LtEq, start, 2),
                _ => self.punct(Token::Lt, start, 1),
            },
            '>' => match (next, third, fourth) {
                (Some('>'), Some('>'), _) => self.punct(Token::GtGtGt, start, 3),
                (Some('>'), Some('='), _) => self.punct(Token::GtGtEq, start, 3),
                (Some('>'), _, _) => self.punct(Token::GtGt, start, 2),
                (Some('='), _, _) => self.punct(Token::GtEq, start, 2),
                _ => self.punct(Token::Gt, start, 1),
            },
            '"' | '\'' => self.lex_string(start),
            c if c.is_ascii_digit() => self.lex_number(start),
            c if c.is_alphabetic() || c == '_' || c == '$' => self.lex_ident(start),
            _ => Err(LexError::UnexpectedChar { ch, pos: self.byte_pos_of(start) }),
        }
    }

    fn lex_string(&mut self, start: usize) -> Result<Spanned, LexError> {
        let Some(quote) = self.advance() else {
            return Err(LexError::UnterminatedString { pos: self.byte_pos_of(start) });
        };
        let mut s = String::new();
        loop {
            match self.advance() {
                Some(c) if c == quote => break,
                Some('\n') | None => {
                    return Err(LexError::UnterminatedString { pos: self.byte_pos_of(start) });
                }
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('0') => s.push('\0'),
                    Some(c) => s.push(c),
                    None => return Err(LexError::UnterminatedString { pos: self.byte_pos_of(start) }),
                },
                Some(c) => s.push(c),
            }
        }
        Ok(self.spanned(Token::StringLit(s), start))
    }

    fn lex_number(&mut self, start: usize) -> Result<Spanned, LexError> {
        if self.peek_at(0) == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek_at(0).is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos].iter().collect();
            let value = u64::from_str_radix(&digits, 16).map_err(|_| LexError::InvalidNumber {
                text: self.chars[start..self.pos].iter().collect(),
                pos: self.byte_pos_of(start),
            })?;
            return Ok(self.spanned(Token::Number(value as f64), start));
        }

        let mut seen_dot = false;
        while let Some(ch) = self.peek_at(0) {
            if ch.is_ascii_digit() {
                self.pos += 1;
            } else if ch == '.' && !seen_dot {
                // `4.` is still a number in JS, but `4..toString` style chains are not supported.
                seen_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        if matches!(self.peek_at(0), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1 + sign;
                while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let num: f64 = text.parse().map_err(|_| LexError::InvalidNumber {
            text: text.clone(),
            pos: self.byte_pos_of(start),
        })?;
        if self.peek_at(0).is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(LexError::InvalidNumber { text, pos: self.byte_pos_of(start) });
        }
        Ok(self.spanned(Token::Number(num), start))
    }

    fn lex_ident(&mut self, start: usize) -> Result<Spanned, LexError> {
        while self
            .peek_at(0)
            .is_some_and(|ch| ch.is_alphanumeric() || ch == '_' || ch == '$')
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let token = match text.as_str() {
            "const" => Token::Const,
            "let" => Token::Let,
            "var" => Token::Var,
            "function" => Token::Function,
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "for" => Token::For,
            "while" => Token::While,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "throw" => Token::Throw,
            "new" => Token::New,
            "this" => Token::This,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Ident(text),
        };
        Ok(self.spanned(token, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .filter(|t| !matches!(t, Token::EOF))
            .collect()
    }

    #[test]
    fn test_state_field_update() {
        let tokens = lex("this.t += 1 / 44100");
        assert_eq!(
            tokens,
            vec![
                Token::This,
                Token::Dot,
                Token::Ident("t".into()),
                Token::PlusEq,
                Token::Number(1.0),
                Token::Slash,
                Token::Number(44100.0),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = lex("// leading\nreturn /* inline */ 1");
        assert_eq!(tokens, vec![Token::Return, Token::Number(1.0)]);
    }

    #[test]
    fn test_line_break_flag() {
        let spanned = Lexer::new("a\nb /* x\n */ c d").tokenize().unwrap();
        let flags: Vec<bool> = spanned.iter().map(|s| s.line_break).collect();
        // a, b, c, d, EOF
        assert_eq!(flags, vec![false, true, true, false, false]);
    }

    #[test]
    fn test_compound_operators() {
        let tokens = lex("a **= b >>> c !== d <<= e");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::StarStarEq,
                Token::Ident("b".into()),
                Token::GtGtGt,
                Token::Ident("c".into()),
                Token::NotEqEq,
                Token::Ident("d".into()),
                Token::LtLtEq,
                Token::Ident("e".into()),
            ]
        );
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(lex("0.4"), vec![Token::Number(0.4)]);
        assert_eq!(lex(".5"), vec![Token::Number(0.5)]);
        assert_eq!(lex("1e-3"), vec![Token::Number(0.001)]);
        assert_eq!(lex("0xff"), vec![Token::Number(255.0)]);
    }

    #[test]
    fn test_member_after_number_literal_dot() {
        // `4.` is a complete number literal
        assert_eq!(lex("4."), vec![Token::Number(4.0)]);
    }

    #[test]
    fn test_string_literal() {
        let tokens = lex(r#"throw "bad \"knob\"""#);
        assert_eq!(tokens, vec![Token::Throw, Token::StringLit("bad \"knob\"".into())]);
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("'abc").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { pos: 0 }));
    }

    #[test]
    fn test_unterminated_comment() {
        let err = Lexer::new("1 /* never closed").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnterminatedComment { pos: 2 }));
    }

    #[test]
    fn test_unexpected_char_reports_byte_offset() {
        let err = Lexer::new("é #").tokenize().unwrap_err();
        match err {
            LexError::UnexpectedChar { ch, pos } => {
                assert_eq!(ch, '#');
                assert_eq!(pos, 3);
            }
            other => panic!("Expected UnexpectedChar, got {other:?}"),
        }
    }

    #[test]
    fn test_identifier_glued_to_number_is_rejected() {
        assert!(Lexer::new("12abc").tokenize().is_err());
    }
}
