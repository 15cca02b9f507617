use tarn_ast::{Arm, BinOp, Def, ExprId, ExprKind, Module, Param, TypeAnn};
use tarn_lexer::{Builtins, Name, Position, Span, Token};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.span.begin, self.message)
    }
}

/// Parse a token stream into an untyped module. Parsing is tolerant:
/// errors are collected and the parser resynchronizes at the next
/// top-level newline.
pub fn parse(tokens: &[(Token, Span)], builtins: &Builtins) -> (Module, Vec<ParseError>) {
    let mut parser = Parser::new(tokens, builtins);
    parser.parse_module();
    (parser.module, parser.errors)
}

struct Parser<'t> {
    tokens: &'t [(Token, Span)],
    builtins: &'t Builtins,
    pos: usize,
    module: Module,
    errors: Vec<ParseError>,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [(Token, Span)], builtins: &'t Builtins) -> Self {
        Self {
            tokens,
            builtins,
            pos: 0,
            module: Module::new(),
            errors: Vec::new(),
        }
    }

    // ── Token helpers ─────────────────────────────────────────────

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|&(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<Token> {
        self.tokens.get(self.pos + offset).map(|&(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens.get(self.pos).map(|&(_, s)| s).unwrap_or_else(|| {
            self.tokens
                .last()
                .map(|&(_, s)| Span::new(s.end, s.end))
                .unwrap_or(Span::new(Position::new(1, 1), Position::new(1, 1)))
        })
    }

    fn advance(&mut self) -> (Token, Span) {
        let tok = self.tokens[self.pos];
        self.pos += 1;
        tok
    }

    fn check(&self, expected: Token) -> bool {
        self.peek() == Some(expected)
    }

    fn eat(&mut self, expected: Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Option<Span> {
        if self.check(expected) {
            let (_, span) = self.advance();
            Some(span)
        } else {
            let span = self.peek_span();
            self.error(
                format!("expected {:?}, found {:?}", expected, self.peek()),
                span,
            );
            None
        }
    }

    fn expect_symbol(&mut self) -> Option<(Name, Span)> {
        if let Some(Token::Symbol(name)) = self.peek() {
            let (_, span) = self.advance();
            return Some((name, span));
        }
        let span = self.peek_span();
        self.error(format!("expected symbol, found {:?}", self.peek()), span);
        None
    }

    fn skip_newlines(&mut self) {
        while self.check(Token::NewLine) {
            self.advance();
        }
    }

    fn error(&mut self, message: String, span: Span) {
        self.errors.push(ParseError { message, span });
    }

    /// Skip to the next newline outside any open delimiter, consuming it.
    fn recover_to_newline(&mut self) {
        let mut depth = 0i32;
        while !self.at_end() {
            match self.peek() {
                Some(Token::LParen | Token::LBrace) => depth += 1,
                Some(Token::RParen | Token::RBrace) => depth -= 1,
                Some(Token::NewLine) if depth <= 0 => {
                    self.advance();
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn span_of(&self, expr: ExprId) -> Span {
        self.module.exprs[expr].span
    }

    fn alloc(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.module.alloc(kind, span)
    }

    // ── Module ────────────────────────────────────────────────────

    fn parse_module(&mut self) {
        self.skip_newlines();
        while !self.at_end() {
            if self.parse_def().is_none() {
                self.recover_to_newline();
            } else if !self.at_end() && !self.check(Token::NewLine) {
                let span = self.peek_span();
                self.error("expected newline after definition".into(), span);
                self.recover_to_newline();
            }
            self.skip_newlines();
        }
    }

    /// Top-level definition: `name = value`.
    fn parse_def(&mut self) -> Option<()> {
        let (name, name_span) = self.expect_symbol()?;
        self.expect(Token::Equal)?;
        let value = self.parse_expr()?;
        let span = name_span.merge(self.span_of(value));
        self.module.defs.push(Def {
            name,
            name_span,
            value,
            span,
        });
        Some(())
    }

    // ── Expressions ───────────────────────────────────────────────

    fn parse_expr(&mut self) -> Option<ExprId> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqualEqual) => BinOp::Eq,
                Some(Token::Greater) => BinOp::Gt,
                Some(Token::Less) => BinOp::Lt,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = self.binary(op, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_additive(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = self.binary(op, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_multiplicative(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_xor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Times) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_xor()?;
            lhs = self.binary(op, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_xor(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_postfix()?;
        while self.eat(Token::Caret) {
            let rhs = self.parse_postfix()?;
            lhs = self.binary(BinOp::Xor, lhs, rhs);
        }
        Some(lhs)
    }

    fn binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let span = self.span_of(lhs).merge(self.span_of(rhs));
        self.alloc(ExprKind::Binary { op, lhs, rhs }, span)
    }

    fn parse_postfix(&mut self) -> Option<ExprId> {
        let mut expr = self.parse_primary()?;
        while self.check(Token::LParen) {
            expr = self.parse_call(expr)?;
        }
        Some(expr)
    }

    fn parse_call(&mut self, callee: ExprId) -> Option<ExprId> {
        self.expect(Token::LParen)?;
        self.skip_newlines();
        let mut args = Vec::new();
        if !self.check(Token::RParen) {
            loop {
                args.push(self.parse_expr()?);
                self.skip_newlines();
                if !self.eat(Token::Comma) {
                    break;
                }
                self.skip_newlines();
            }
        }
        let rparen = self.expect(Token::RParen)?;
        let span = self.span_of(callee).merge(rparen);

        // A call to a builtin type name is a numeric conversion.
        if let ExprKind::Symbol(name) = self.module.exprs[callee].kind {
            if self.builtins.is_conversion(name) {
                if args.len() != 1 {
                    self.error("conversion takes exactly one argument".into(), span);
                    return Some(self.alloc(ExprKind::Undefined, span));
                }
                let arg = args[0];
                let arg_span = self.span_of(arg);
                let convert = self.alloc(ExprKind::Convert(arg), arg_span);
                return Some(self.alloc(
                    ExprKind::Intrinsic {
                        name,
                        args: vec![convert],
                    },
                    span,
                ));
            }
        }

        Some(self.alloc(ExprKind::Call { callee, args }, span))
    }

    fn parse_primary(&mut self) -> Option<ExprId> {
        match self.peek() {
            Some(Token::Int(name)) => {
                let (_, span) = self.advance();
                Some(self.alloc(ExprKind::Int(name), span))
            }
            Some(Token::Float(name)) => {
                let (_, span) = self.advance();
                Some(self.alloc(ExprKind::Float(name), span))
            }
            Some(Token::Str(name)) => {
                let (_, span) = self.advance();
                Some(self.alloc(ExprKind::Str(name), span))
            }
            Some(Token::True) => {
                let (_, span) = self.advance();
                Some(self.alloc(ExprKind::Bool(true), span))
            }
            Some(Token::False) => {
                let (_, span) = self.advance();
                Some(self.alloc(ExprKind::Bool(false), span))
            }
            Some(Token::Symbol(module)) => {
                let (_, span) = self.advance();
                // `module.name` reaches a host function
                if self.check(Token::Dot) {
                    if let Some(Token::Symbol(_)) = self.peek_at(1) {
                        self.advance();
                        let (name, name_span) = self.expect_symbol()?;
                        return Some(self.alloc(
                            ExprKind::ForeignImport { module, name },
                            span.merge(name_span),
                        ));
                    }
                }
                Some(self.alloc(ExprKind::Symbol(module), span))
            }
            Some(Token::Fn) => self.parse_function(),
            Some(Token::If) => self.parse_branch(),
            Some(Token::LParen) => self.parse_group(),
            Some(Token::LBrace) => self.parse_block(),
            other => {
                let span = self.peek_span();
                self.error(format!("expected expression, found {:?}", other), span);
                None
            }
        }
    }

    fn parse_group(&mut self) -> Option<ExprId> {
        let lparen = self.expect(Token::LParen)?;
        self.skip_newlines();
        let mut exprs = Vec::new();
        while !self.check(Token::RParen) && !self.at_end() {
            exprs.push(self.parse_statement()?);
            self.skip_newlines();
        }
        let rparen = self.expect(Token::RParen)?;
        self.wrap_drops(&mut exprs);
        Some(self.alloc(ExprKind::Group(exprs), lparen.merge(rparen)))
    }

    fn parse_function(&mut self) -> Option<ExprId> {
        let (_, fn_span) = self.advance();
        self.expect(Token::LParen)?;
        self.skip_newlines();
        let mut params = Vec::new();
        if !self.check(Token::RParen) {
            loop {
                let (name, name_span) = self.expect_symbol()?;
                let ann = self.parse_type_ann();
                params.push(Param {
                    name,
                    name_span,
                    ann,
                });
                self.skip_newlines();
                if !self.eat(Token::Comma) {
                    break;
                }
                self.skip_newlines();
            }
        }
        self.expect(Token::RParen)?;
        let return_ann = self.parse_type_ann();
        let body = self.parse_block()?;
        let span = fn_span.merge(self.span_of(body));
        Some(self.alloc(
            ExprKind::Function {
                params,
                return_ann,
                body,
            },
            span,
        ))
    }

    fn parse_type_ann(&mut self) -> Option<TypeAnn> {
        if let Some(Token::Symbol(name)) = self.peek() {
            let (_, span) = self.advance();
            Some(TypeAnn { name, span })
        } else {
            None
        }
    }

    fn parse_branch(&mut self) -> Option<ExprId> {
        let (_, if_span) = self.advance();
        let mut arms = Vec::new();
        let condition = self.parse_expr()?;
        let body = self.parse_block()?;
        let mut end_span = self.span_of(body);
        arms.push(Arm { condition, body });

        let else_body = loop {
            if self.eat(Token::Or) {
                let condition = self.parse_expr()?;
                let body = self.parse_block()?;
                end_span = self.span_of(body);
                arms.push(Arm { condition, body });
            } else if self.eat(Token::Else) {
                let body = self.parse_block()?;
                end_span = self.span_of(body);
                break body;
            } else {
                // no else: an empty, void-valued block
                let span = Span::new(end_span.end, end_span.end);
                break self.alloc(ExprKind::Block(Vec::new()), span);
            }
        };

        Some(self.alloc(
            ExprKind::Branch { arms, else_body },
            if_span.merge(end_span),
        ))
    }

    fn parse_block(&mut self) -> Option<ExprId> {
        let lbrace = self.expect(Token::LBrace)?;
        self.skip_newlines();
        let mut stmts = Vec::new();
        while !self.check(Token::RBrace) && !self.at_end() {
            stmts.push(self.parse_statement()?);
            if self.check(Token::RBrace) {
                break;
            }
            if self.check(Token::NewLine) {
                self.skip_newlines();
            } else {
                let span = self.peek_span();
                self.error("expected newline between statements".into(), span);
                break;
            }
        }
        let rbrace = self.expect(Token::RBrace)?;
        self.wrap_drops(&mut stmts);
        Some(self.alloc(ExprKind::Block(stmts), lbrace.merge(rbrace)))
    }

    /// One statement: a definition, an assignment, or an expression.
    fn parse_statement(&mut self) -> Option<ExprId> {
        match (self.peek(), self.peek_at(1), self.peek_at(2)) {
            (Some(Token::Symbol(_)), Some(Token::Equal), _) => self.parse_define(),
            (Some(Token::Symbol(_)), Some(Token::Plus), Some(Token::Equal)) => {
                self.parse_assign(false)
            }
            (Some(Token::Symbol(_)), Some(Token::Times), Some(Token::Equal)) => {
                self.parse_assign(true)
            }
            _ => self.parse_expr(),
        }
    }

    fn parse_define(&mut self) -> Option<ExprId> {
        let (name, name_span) = self.expect_symbol()?;
        self.expect(Token::Equal)?;
        let value = self.parse_expr()?;
        let span = name_span.merge(self.span_of(value));
        Some(self.alloc(
            ExprKind::Define {
                name,
                name_span,
                value,
                mutable: true,
            },
            span,
        ))
    }

    fn parse_assign(&mut self, times: bool) -> Option<ExprId> {
        let (name, name_span) = self.expect_symbol()?;
        self.advance(); // + or *
        self.expect(Token::Equal)?;
        let value = self.parse_expr()?;
        let span = name_span.merge(self.span_of(value));
        let kind = if times {
            ExprKind::TimesEqual {
                name,
                name_span,
                value,
            }
        } else {
            ExprKind::PlusEqual {
                name,
                name_span,
                value,
            }
        };
        Some(self.alloc(kind, span))
    }

    /// Wrap every non-final expression statement in `drop` so its value is
    /// discarded.
    fn wrap_drops(&mut self, stmts: &mut [ExprId]) {
        let Some((_, rest)) = stmts.split_last_mut() else {
            return;
        };
        for stmt in rest {
            let keep = matches!(
                self.module.exprs[*stmt].kind,
                ExprKind::Define { .. }
                    | ExprKind::PlusEqual { .. }
                    | ExprKind::TimesEqual { .. }
                    | ExprKind::Drop(_)
            );
            if !keep {
                let span = self.span_of(*stmt);
                *stmt = self.alloc(ExprKind::Drop(*stmt), span);
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
