use crate::ast::*;
use crate::error::ParseError;
use crate::token::{token_to_string, Span, Spanned, Token};

/// Maximum nesting of expressions and blocks before the parser bails out.
const MAX_DEPTH: usize = 200;

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

/// A binary-level operator recognised by the precedence climber.
#[derive(Clone, Copy)]
enum InfixOp {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser { tokens, pos: 0, depth: 0 }
    }

    // ── Helpers ──────────────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map_or(&Token::EOF, |s| &s.token)
    }

    fn span(&self) -> Span {
        self.tokens[self.pos].span
    }

    /// End offset of the most recently consumed token.
    fn prev_end(&self) -> usize {
        self.tokens[self.pos.saturating_sub(1)].span.end
    }

    fn advance(&mut self) -> Spanned {
        let s = self.tokens[self.pos].clone();
        if s.token != Token::EOF {
            self.pos += 1;
        }
        s
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::EOF)
    }

    fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let current = &self.tokens[self.pos];
        if current.token == Token::EOF {
            ParseError::UnexpectedEOF { expected: expected.into(), pos: current.span.start }
        } else {
            ParseError::UnexpectedToken {
                expected: expected.into(),
                found: current.token.clone(),
                span: current.span,
            }
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<Spanned, ParseError> {
        if self.check(expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("'{}'", token_to_string(expected))))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::NestingTooDeep { span: self.span() });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// A statement ends at `;`, before `}`, at end of input, or at a line break.
    fn consume_terminator(&mut self) -> Result<(), ParseError> {
        if self.eat(&Token::Semicolon) {
            return Ok(());
        }
        if matches!(self.peek(), Token::RBrace | Token::EOF) || self.tokens[self.pos].line_break {
            return Ok(());
        }
        Err(self.unexpected("';'"))
    }

    // ── Snippet ──────────────────────────────────────────────

    /// Parse either a bare body or a `(function(knobs, keys) { ... })` wrapper.
    pub fn parse_snippet(&mut self) -> Result<Snippet, ParseError> {
        let wrapped = matches!(
            (self.peek(), self.peek_at(1)),
            (Token::LParen, Token::Function) | (Token::Function, Token::LParen)
        );
        if wrapped {
            return self.parse_function_wrapper();
        }

        let mut body = Vec::new();
        while !self.is_at_end() {
            body.push(self.parse_statement()?);
        }
        Ok(Snippet {
            knobs_param: Some("knobs".into()),
            keys_param: Some("keys".into()),
            body,
        })
    }

    fn parse_function_wrapper(&mut self) -> Result<Snippet, ParseError> {
        let parenthesized = self.eat(&Token::LParen);
        self.expect(&Token::Function)?;
        if parenthesized && matches!(self.peek(), Token::Ident(_)) {
            self.advance();
        }
        self.expect(&Token::LParen)?;
        let params = self.parse_param_list()?;
        self.expect(&Token::RParen)?;
        let body = self.parse_block_body()?;
        if parenthesized {
            self.expect(&Token::RParen)?;
        }
        self.eat(&Token::Semicolon);
        if !self.is_at_end() {
            return Err(self.unexpected("end of input after the function"));
        }

        let mut params = params.into_iter();
        Ok(Snippet {
            knobs_param: params.next(),
            keys_param: params.next(),
            body,
        })
    }

    fn parse_param_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            params.push(self.expect_ident()?);
            while self.eat(&Token::Comma) {
                params.push(self.expect_ident()?);
            }
        }
        Ok(params)
    }

    /// `{ stmt* }`
    fn parse_block_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&Token::LBrace)?;
        self.enter()?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.is_at_end() {
                return Err(self.unexpected("'}'"));
            }
            stmts.push(self.parse_statement()?);
        }
        self.leave();
        self.expect(&Token::RBrace)?;
        Ok(stmts)
    }

    // ── Statements ──────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let start = self.span();
        let kind = match self.peek() {
            Token::LBrace => StmtKind::Block(self.parse_block_body()?),
            Token::Semicolon => {
                self.advance();
                StmtKind::Empty
            }
            Token::Const | Token::Let | Token::Var => {
                let kind = self.parse_declaration()?;
                self.consume_terminator()?;
                kind
            }
            Token::Function => StmtKind::Function(self.parse_function_decl()?),
            Token::If => self.parse_if()?,
            Token::For => self.parse_for()?,
            Token::While => {
                self.advance();
                self.expect(&Token::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                let body = Box::new(self.parse_nested_statement()?);
                StmtKind::While { cond, body }
            }
            Token::Return => {
                self.advance();
                let ends_here = matches!(self.peek(), Token::Semicolon | Token::RBrace | Token::EOF)
                    || self.tokens[self.pos].line_break;
                let value = if ends_here { None } else { Some(self.parse_expr()?) };
                self.consume_terminator()?;
                StmtKind::Return(value)
            }
            Token::Break => {
                self.advance();
                self.consume_terminator()?;
                StmtKind::Break
            }
            Token::Continue => {
                self.advance();
                self.consume_terminator()?;
                StmtKind::Continue
            }
            Token::Throw => {
                self.advance();
                let value = self.parse_expr()?;
                self.consume_terminator()?;
                StmtKind::Throw(value)
            }
            _ => {
                let stmt = self.parse_simple_statement()?;
                self.consume_terminator()?;
                return Ok(stmt);
            }
        };
        Ok(Stmt::new(kind, Span::new(start.start, self.prev_end())))
    }

    fn parse_nested_statement(&mut self) -> Result<Stmt, ParseError> {
        self.enter()?;
        let stmt = self.parse_statement()?;
        self.leave();
        Ok(stmt)
    }

    /// `const a = 1, b = 2` without the terminator.
    fn parse_declaration(&mut self) -> Result<StmtKind, ParseError> {
        let kind = match self.advance().token {
            Token::Const => DeclKind::Const,
            Token::Let => DeclKind::Let,
            _ => DeclKind::Var,
        };
        let mut declarations = Vec::new();
        loop {
            let start = self.span().start;
            let name = self.expect_ident()?;
            let init = if self.eat(&Token::Eq) {
                Some(self.parse_expr()?)
            } else if kind == DeclKind::Const {
                return Err(self.unexpected("'=' (const declarations need a value)"));
            } else {
                None
            };
            declarations.push(Declarator { name, init, span: Span::new(start, self.prev_end()) });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(StmtKind::Declare { kind, declarations })
    }

    fn parse_function_decl(&mut self) -> Result<FunctionDecl, ParseError> {
        self.expect(&Token::Function)?;
        let name = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let params = self.parse_param_list()?;
        self.expect(&Token::RParen)?;
        let body = self.parse_block_body()?;
        Ok(FunctionDecl { name, params, body })
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(&Token::If)?;
        self.expect(&Token::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        let then = Box::new(self.parse_nested_statement()?);
        let otherwise = if self.eat(&Token::Else) {
            Some(Box::new(self.parse_nested_statement()?))
        } else {
            None
        };
        Ok(StmtKind::If { cond, then, otherwise })
    }

    fn parse_for(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(&Token::For)?;
        self.expect(&Token::LParen)?;

        let is_for_of = matches!(self.peek(), Token::Const | Token::Let | Token::Var)
            && matches!(self.peek_at(1), Token::Ident(_))
            && matches!(self.peek_at(2), Token::Ident(word) if word == "of");
        if is_for_of {
            let kind = match self.advance().token {
                Token::Const => DeclKind::Const,
                Token::Let => DeclKind::Let,
                _ => DeclKind::Var,
            };
            let name = self.expect_ident()?;
            self.advance(); // `of`
            let iterable = self.parse_expr()?;
            self.expect(&Token::RParen)?;
            let body = Box::new(self.parse_nested_statement()?);
            return Ok(StmtKind::ForOf { kind, name, iterable, body });
        }

        let init = if self.check(&Token::Semicolon) {
            None
        } else {
            let start = self.span().start;
            let kind = if matches!(self.peek(), Token::Const | Token::Let | Token::Var) {
                self.parse_declaration()?
            } else {
                self.parse_simple_statement()?.kind
            };
            Some(Box::new(Stmt::new(kind, Span::new(start, self.prev_end()))))
        };
        self.expect(&Token::Semicolon)?;
        let cond = if self.check(&Token::Semicolon) { None } else { Some(self.parse_expr()?) };
        self.expect(&Token::Semicolon)?;
        let update = if self.check(&Token::RParen) {
            None
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };
        self.expect(&Token::RParen)?;
        let body = Box::new(self.parse_nested_statement()?);
        Ok(StmtKind::For { init, cond, update, body })
    }

    /// Expression, assignment or `++`/`--` statement, without its terminator.
    fn parse_simple_statement(&mut self) -> Result<Stmt, ParseError> {
        let start = self.span();

        if matches!(self.peek(), Token::PlusPlus | Token::MinusMinus) {
            let increment = self.advance().token == Token::PlusPlus;
            let target = self.parse_postfix()?;
            check_assignable(&target)?;
            let span = Span::new(start.start, self.prev_end());
            return Ok(Stmt::new(StmtKind::Update { target, increment }, span));
        }

        let expr = self.parse_expr()?;
        let compound = match self.peek() {
            Token::Eq => Some(None),
            Token::PlusEq => Some(Some(BinaryOp::Add)),
            Token::MinusEq => Some(Some(BinaryOp::Sub)),
            Token::StarEq => Some(Some(BinaryOp::Mul)),
            Token::StarStarEq => Some(Some(BinaryOp::Pow)),
            Token::SlashEq => Some(Some(BinaryOp::Div)),
            Token::PercentEq => Some(Some(BinaryOp::Rem)),
            Token::AmpEq => Some(Some(BinaryOp::BitAnd)),
            Token::PipeEq => Some(Some(BinaryOp::BitOr)),
            Token::CaretEq => Some(Some(BinaryOp::BitXor)),
            Token::LtLtEq => Some(Some(BinaryOp::Shl)),
            Token::GtGtEq => Some(Some(BinaryOp::Shr)),
            _ => None,
        };

        let kind = if let Some(op) = compound {
            check_assignable(&expr)?;
            self.advance();
            let value = self.parse_expr()?;
            StmtKind::Assign { target: expr, op, value }
        } else if matches!(self.peek(), Token::PlusPlus | Token::MinusMinus)
            && !self.tokens[self.pos].line_break
        {
            check_assignable(&expr)?;
            let increment = self.advance().token == Token::PlusPlus;
            StmtKind::Update { target: expr, increment }
        } else {
            StmtKind::Expr(expr)
        };
        Ok(Stmt::new(kind, Span::new(start.start, self.prev_end())))
    }

    // ── Expressions ─────────────────────────────────────────

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let expr = self.parse_conditional();
        self.leave();
        expr
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_binary(1)?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let then = self.parse_expr()?;
        self.expect(&Token::Colon)?;
        let otherwise = self.parse_expr()?;
        let span = cond.span.to(otherwise.span);
        Ok(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            span,
        ))
    }

    fn infix_op(&self) -> Option<(u8, InfixOp)> {
        let op = match self.peek() {
            Token::PipePipe => (1, InfixOp::Logical(LogicalOp::Or)),
            Token::AmpAmp => (2, InfixOp::Logical(LogicalOp::And)),
            Token::Pipe => (3, InfixOp::Binary(BinaryOp::BitOr)),
            Token::Caret => (4, InfixOp::Binary(BinaryOp::BitXor)),
            Token::Amp => (5, InfixOp::Binary(BinaryOp::BitAnd)),
            Token::EqEq => (6, InfixOp::Binary(BinaryOp::Eq)),
            Token::NotEq => (6, InfixOp::Binary(BinaryOp::NotEq)),
            Token::EqEqEq => (6, InfixOp::Binary(BinaryOp::StrictEq)),
            Token::NotEqEq => (6, InfixOp::Binary(BinaryOp::StrictNotEq)),
            Token::Lt => (7, InfixOp::Binary(BinaryOp::Lt)),
            Token::Gt => (7, InfixOp::Binary(BinaryOp::Gt)),
            Token::LtEq => (7, InfixOp::Binary(BinaryOp::LtEq)),
            Token::GtEq => (7, InfixOp::Binary(BinaryOp::GtEq)),
            Token::LtLt => (8, InfixOp::Binary(BinaryOp::Shl)),
            Token::GtGt => (8, InfixOp::Binary(BinaryOp::Shr)),
            Token::GtGtGt => (8, InfixOp::Binary(BinaryOp::UShr)),
            Token::Plus => (9, InfixOp::Binary(BinaryOp::Add)),
            Token::Minus => (9, InfixOp::Binary(BinaryOp::Sub)),
            Token::Star => (10, InfixOp::Binary(BinaryOp::Mul)),
            Token::Slash => (10, InfixOp::Binary(BinaryOp::Div)),
            Token::Percent => (10, InfixOp::Binary(BinaryOp::Rem)),
            Token::StarStar => (11, InfixOp::Binary(BinaryOp::Pow)),
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing. `**` is the only right-associative operator.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut chained = 0;
        let parsed = self.parse_binary_chain(min_prec, &mut chained);
        self.depth -= chained;
        parsed
    }

    /// Every operator folded into `left` deepens the tree, so each one counts
    /// against the nesting limit.
    fn parse_binary_chain(&mut self, min_prec: u8, chained: &mut usize) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some((prec, op)) = self.infix_op() {
            if prec < min_prec {
                break;
            }
            self.enter()?;
            *chained += 1;
            self.advance();
            let right_assoc = matches!(op, InfixOp::Binary(BinaryOp::Pow));
            let right = self.parse_binary(if right_assoc { prec } else { prec + 1 })?;
            let span = left.span.to(right.span);
            let (left_box, right_box) = (Box::new(left), Box::new(right));
            let kind = match op {
                InfixOp::Binary(op) => ExprKind::Binary { op, left: left_box, right: right_box },
                InfixOp::Logical(op) => ExprKind::Logical { op, left: left_box, right: right_box },
            };
            left = Expr::new(kind, span);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Bang => UnaryOp::Not,
            Token::Tilde => UnaryOp::BitNot,
            _ => return self.parse_postfix(),
        };
        let start = self.advance().span;
        self.enter()?;
        let operand = self.parse_unary();
        self.leave();
        let operand = operand?;
        let span = start.to(operand.span);
        Ok(Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, span))
    }

    /// Primary expression followed by `.name`, `[index]` and `(args)` suffixes.
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut chained = 0;
        let parsed = self.parse_postfix_chain(&mut chained);
        self.depth -= chained;
        parsed
    }

    fn parse_postfix_chain(&mut self, chained: &mut usize) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if matches!(self.peek(), Token::Dot | Token::LBracket | Token::LParen) {
                self.enter()?;
                *chained += 1;
            }
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let property = self.expect_ident()?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = Expr::new(ExprKind::Member { object: Box::new(expr), property }, span);
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket)?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = Expr::new(
                        ExprKind::Index { object: Box::new(expr), index: Box::new(index) },
                        span,
                    );
                }
                Token::LParen => {
                    let args = self.parse_call_args()?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = Expr::new(ExprKind::Call { callee: Box::new(expr), args }, span);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            args.push(self.parse_expr()?);
            while self.eat(&Token::Comma) {
                args.push(self.parse_expr()?);
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let span = self.span();
        let kind = match self.peek().clone() {
            Token::Number(n) => ExprKind::Number(n),
            Token::StringLit(s) => ExprKind::Str(s),
            Token::True => ExprKind::Bool(true),
            Token::False => ExprKind::Bool(false),
            Token::Null => ExprKind::Null,
            Token::This => ExprKind::This,
            Token::Ident(name) => ExprKind::Ident(name),
            Token::LParen => {
                self.advance();
                let mut inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                inner.span = Span::new(span.start, self.prev_end());
                return Ok(inner);
            }
            Token::New => {
                self.advance();
                let class = self.expect_ident()?;
                let args = if self.check(&Token::LParen) { self.parse_call_args()? } else { Vec::new() };
                return Ok(Expr::new(
                    ExprKind::New { class, args },
                    Span::new(span.start, self.prev_end()),
                ));
            }
            _ => return Err(self.unexpected("expression")),
        };
        self.advance();
        Ok(Expr::new(kind, span))
    }
}

fn check_assignable(expr: &Expr) -> Result<(), ParseError> {
    match expr.kind {
        ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => Ok(()),
        _ => Err(ParseError::InvalidAssignmentTarget { span: expr.span }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(input: &str) -> Result<Snippet, Box<dyn std::error::Error>> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Parser::new(tokens);
        Ok(parser.parse_snippet()?)
    }

    const SINE_TUTORIAL: &str = r#"
// This code is called 44100 times a second.
this.t += 1 / 44100

function sin(phi) {
  return Math.sin(2 * Math.PI * phi)
}

return 1 * sin(440 * this.t)
"#;

    #[test]
    fn test_parse_sine_tutorial() {
        let snippet = parse(SINE_TUTORIAL).unwrap();
        assert_eq!(snippet.knobs_param.as_deref(), Some("knobs"));
        assert_eq!(snippet.keys_param.as_deref(), Some("keys"));
        assert_eq!(snippet.body.len(), 3);

        match &snippet.body[0].kind {
            StmtKind::Assign { target, op, .. } => {
                assert!(matches!(target.kind, ExprKind::Member { ref property, .. } if property == "t"));
                assert_eq!(*op, Some(BinaryOp::Add));
            }
            other => panic!("Expected Assign, got {other:?}"),
        }
        match &snippet.body[1].kind {
            StmtKind::Function(decl) => {
                assert_eq!(decl.name, "sin");
                assert_eq!(decl.params, vec!["phi".to_string()]);
                assert_eq!(decl.body.len(), 1);
            }
            other => panic!("Expected Function, got {other:?}"),
        }
        assert!(matches!(snippet.body[2].kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn test_parse_function_wrapper() {
        let snippet = parse("(\n  function(k, notes) {\n    return k.volume\n  }\n)").unwrap();
        assert_eq!(snippet.knobs_param.as_deref(), Some("k"));
        assert_eq!(snippet.keys_param.as_deref(), Some("notes"));
        assert_eq!(snippet.body.len(), 1);
    }

    #[test]
    fn test_parse_anonymous_wrapper_without_parens() {
        let snippet = parse("function (knobs) { return 0 }").unwrap();
        assert_eq!(snippet.knobs_param.as_deref(), Some("knobs"));
        assert_eq!(snippet.keys_param, None);
    }

    #[test]
    fn test_wrapper_rejects_trailing_code() {
        assert!(parse("(function(knobs, keys) { return 0 }) + 1").is_err());
    }

    #[test]
    fn test_parse_precedence() {
        let snippet = parse("return 1 + 2 * 3 ** 2 ** 2").unwrap();
        let StmtKind::Return(Some(expr)) = &snippet.body[0].kind else {
            panic!("Expected return");
        };
        match &expr.kind {
            ExprKind::Binary { op: BinaryOp::Add, right, .. } => match &right.kind {
                ExprKind::Binary { op: BinaryOp::Mul, right, .. } => match &right.kind {
                    // right-associative: 3 ** (2 ** 2)
                    ExprKind::Binary { op: BinaryOp::Pow, right, .. } => {
                        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Pow, .. }));
                    }
                    other => panic!("Expected Pow, got {other:?}"),
                },
                other => panic!("Expected Mul, got {other:?}"),
            },
            other => panic!("Expected Add, got {other:?}"),
        }
    }

    #[test]
    fn test_return_followed_by_line_break_returns_nothing() {
        let snippet = parse("return\n42").unwrap();
        assert!(matches!(snippet.body[0].kind, StmtKind::Return(None)));
        assert!(matches!(snippet.body[1].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn test_missing_terminator_on_same_line() {
        let err = parse("const a = 1 const b = 2").unwrap_err();
        assert!(err.to_string().contains("Expected ';'"), "got: {err}");
    }

    #[test]
    fn test_parse_for_loops() {
        let snippet = parse(
            r#"
let sum = 0
for (let i = 0; i < keys.length; i++) { sum += keys[i] }
for (const key of keys) sum -= key
"#,
        )
        .unwrap();
        assert_eq!(snippet.body.len(), 3);
        match &snippet.body[1].kind {
            StmtKind::For { init, cond, update, .. } => {
                assert!(matches!(init.as_deref(), Some(Stmt { kind: StmtKind::Declare { .. }, .. })));
                assert!(cond.is_some());
                assert!(matches!(
                    update.as_deref(),
                    Some(Stmt { kind: StmtKind::Update { increment: true, .. }, .. })
                ));
            }
            other => panic!("Expected For, got {other:?}"),
        }
        match &snippet.body[2].kind {
            StmtKind::ForOf { kind, name, iterable, .. } => {
                assert_eq!(*kind, DeclKind::Const);
                assert_eq!(name, "key");
                assert_eq!(iterable.as_ident(), Some("keys"));
            }
            other => panic!("Expected ForOf, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_if_else_chain() {
        let snippet =
            parse("if (knobs.mode < 0.3) return 0\nelse if (knobs.mode < 0.6) return 1\nelse return 2")
                .unwrap();
        match &snippet.body[0].kind {
            StmtKind::If { otherwise: Some(otherwise), .. } => {
                assert!(matches!(otherwise.kind, StmtKind::If { otherwise: Some(_), .. }));
            }
            other => panic!("Expected If/else, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_throw_new_error() {
        let snippet = parse("throw new Error('bad')").unwrap();
        match &snippet.body[0].kind {
            StmtKind::Throw(Expr { kind: ExprKind::New { class, args }, .. }) => {
                assert_eq!(class, "Error");
                assert_eq!(args.len(), 1);
            }
            other => panic!("Expected Throw, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse("1 + 2 = 3").unwrap_err();
        assert!(err.to_string().contains("Invalid assignment target"), "got: {err}");
    }

    #[test]
    fn test_unclosed_block_is_eof_error() {
        let err = parse("if (1) { return 2").unwrap_err();
        assert!(err.to_string().contains("Unexpected end of input"), "got: {err}");
    }

    #[test]
    fn test_const_requires_initializer() {
        assert!(parse("const a;").is_err());
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let source = format!("return {}this.x", "this.x + ".repeat(1000));
        let err = parse(&source).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"), "got: {err}");
    }

    #[test]
    fn test_long_postfix_chain_is_rejected() {
        let source = format!("return f{}", "()".repeat(1000));
        assert!(parse(&source).unwrap_err().to_string().contains("nested too deeply"));
    }

    #[test]
    fn test_moderate_chain_still_parses() {
        let source = format!("return {}1", "1 + ".repeat(100));
        assert!(parse(&source).is_ok());
        // The counter unwinds after each chain, so siblings do not accumulate.
        let source = format!("let a = {0}1\nlet b = {0}1\nreturn a + b", "1 * ".repeat(150));
        assert!(parse(&source).is_ok());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("return {}1{}", "(".repeat(500), ")".repeat(500));
        let err = parse(&source).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"), "got: {err}");
    }
}
