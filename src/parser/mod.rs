//! Pratt parser for StolasScript.
//!
//! Two-token lookahead over the lexer. Statements are block-structured and
//! terminated by `end`; newlines separate statements. Errors are collected
//! as `[Line N]`-prefixed strings and never abort the parse: the parser
//! returns a best-effort program and the caller checks the error count.

use crate::ast::{Block, Expr, FunctionDecl, Program, Stmt};
use crate::lexer::{Lexer, Token, TokenKind};

/// Binding powers, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Or,
    And,
    Equals,
    LessGreater,
    Sum,
    Product,
    Power,
    Prefix,
    Call,
    Index,
}

fn precedence_of(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        TokenKind::Equals | TokenKind::NotEquals => Precedence::Equals,
        TokenKind::LessThan
        | TokenKind::GreaterThan
        | TokenKind::LessOrEquals
        | TokenKind::GreaterOrEquals => Precedence::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Times | TokenKind::DividedBy | TokenKind::Modulo => Precedence::Product,
        TokenKind::Power => Precedence::Power,
        TokenKind::LParen => Precedence::Call,
        TokenKind::LBracket | TokenKind::Dot | TokenKind::At => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    peek: Token,
    pub errors: Vec<String>,
}

impl<'a> Parser<'a> {
    pub fn new(mut lexer: Lexer<'a>) -> Self {
        let current = lexer.next_token();
        let peek = lexer.next_token();
        Self {
            lexer,
            current,
            peek,
            errors: vec![],
        }
    }

    /// Convenience constructor straight from source text.
    pub fn from_source(source: &'a str) -> Self {
        Self::new(Lexer::new(source))
    }

    fn next_token(&mut self) {
        self.current = std::mem::replace(&mut self.peek, self.lexer.next_token());
    }

    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn current_is(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek.kind == kind
    }

    fn expect_peek(&mut self, kind: TokenKind) -> bool {
        if self.peek_is(kind) {
            self.next_token();
            true
        } else {
            let msg = format!(
                "[Line {}] Expected token {}, got {}",
                self.current.line, kind, self.peek.kind
            );
            self.add_error(msg);
            false
        }
    }

    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::default();

        while !self.current_is(TokenKind::Eof) {
            while self.current_is(TokenKind::Newline) {
                self.next_token();
            }
            if self.current_is(TokenKind::Eof) {
                break;
            }

            match self.parse_statement() {
                Some(stmt) => program.statements.push(stmt),
                None => {
                    // Error recovery: guarantee forward progress.
                    if !self.current_is(TokenKind::Newline) && !self.current_is(TokenKind::Eof) {
                        self.next_token();
                    }
                }
            }
        }

        program
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        match self.current.kind {
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::Loop => self.parse_loop_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Match => self.parse_match_statement(),
            TokenKind::Struct => self.parse_struct_decl(),
            TokenKind::Function => self.parse_function_decl(false).map(Stmt::FunctionDecl),
            TokenKind::Interrupt => self.parse_interrupt_function(),
            TokenKind::Class => self.parse_class_decl(),
            TokenKind::Try => self.parse_try_statement(),
            TokenKind::Throw => self.parse_throw_statement(),
            TokenKind::Import => self.parse_import_statement(),
            TokenKind::ImportNative => self.parse_import_native(),
            TokenKind::CFunction => self.parse_c_function_decl(),
            TokenKind::Break => self.parse_simple_statement(Stmt::Break),
            TokenKind::Continue => self.parse_simple_statement(Stmt::Continue),
            TokenKind::Asm => {
                let code = self.current.literal.clone();
                self.next_token();
                if self.current_is(TokenKind::Newline) {
                    self.next_token();
                }
                Some(Stmt::AsmBlock { code })
            }
            // Do NOT consume the newline here; the statement loops own it.
            TokenKind::Newline => None,
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_simple_statement(&mut self, stmt: Stmt) -> Option<Stmt> {
        self.next_token();
        if self.current_is(TokenKind::Newline) {
            self.next_token();
        }
        Some(stmt)
    }

    // ------ expressions ------

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expr> {
        let mut left = match self.parse_prefix() {
            Some(expr) => expr,
            None => {
                let msg = format!(
                    "[Line {}] No prefix parse function for {} (peek: {})",
                    self.current.line, self.current.kind, self.peek.kind
                );
                self.add_error(msg);
                return None;
            }
        };

        while !self.peek_is(TokenKind::Newline)
            && !self.peek_is(TokenKind::Eof)
            && precedence < precedence_of(self.peek.kind)
        {
            if !self.has_infix(self.peek.kind) {
                return Some(left);
            }
            self.next_token();
            left = self.parse_infix(left)?;
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expr> {
        match self.current.kind {
            TokenKind::Identifier => Some(Expr::Identifier(self.current.literal.clone())),
            TokenKind::Number => Some(Expr::Number(self.current.literal.clone())),
            TokenKind::String => Some(Expr::Str(self.current.literal.clone())),
            TokenKind::True => Some(Expr::Boolean(true)),
            TokenKind::False => Some(Expr::Boolean(false)),
            TokenKind::Null => Some(Expr::Null),
            TokenKind::This => Some(Expr::This),
            TokenKind::Minus | TokenKind::Not => {
                let op = self.current.clone();
                self.next_token();
                let right = self.parse_expression(Precedence::Prefix)?;
                Some(Expr::Unary {
                    op,
                    right: Box::new(right),
                })
            }
            TokenKind::LParen => {
                self.next_token();
                let expr = self.parse_expression(Precedence::Lowest)?;
                if !self.expect_peek(TokenKind::RParen) {
                    return None;
                }
                Some(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_dict_literal(),
            TokenKind::New => self.parse_new_expression(),
            _ => None,
        }
    }

    fn has_infix(&self, kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Times
                | TokenKind::DividedBy
                | TokenKind::Modulo
                | TokenKind::Power
                | TokenKind::Equals
                | TokenKind::NotEquals
                | TokenKind::LessThan
                | TokenKind::GreaterThan
                | TokenKind::LessOrEquals
                | TokenKind::GreaterOrEquals
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Dot
                | TokenKind::At
        )
    }

    fn parse_infix(&mut self, left: Expr) -> Option<Expr> {
        match self.current.kind {
            TokenKind::LParen => self.parse_call_expression(left),
            TokenKind::LBracket => self.parse_index_access(left),
            TokenKind::Dot => self.parse_member_access(left),
            TokenKind::At => self.parse_at_index(left),
            _ => {
                let op = self.current.clone();
                let precedence = precedence_of(op.kind);
                self.next_token();
                let right = self.parse_expression(precedence)?;
                Some(Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
        }
    }

    fn parse_call_arguments(&mut self) -> Option<Vec<Expr>> {
        let mut args = vec![];

        if self.peek_is(TokenKind::RParen) {
            self.next_token();
            return Some(args);
        }

        self.next_token();
        args.push(self.parse_expression(Precedence::Lowest)?);

        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            args.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }

        Some(args)
    }

    fn parse_call_expression(&mut self, function: Expr) -> Option<Expr> {
        let args = self.parse_call_arguments()?;
        Some(Expr::Call {
            function: Box::new(function),
            args,
        })
    }

    fn parse_array_literal(&mut self) -> Option<Expr> {
        let mut elements = vec![];

        if self.peek_is(TokenKind::RBracket) {
            self.next_token();
            return Some(Expr::Array(elements));
        }

        self.next_token();
        elements.push(self.parse_expression(Precedence::Lowest)?);

        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            elements.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(TokenKind::RBracket) {
            return None;
        }

        Some(Expr::Array(elements))
    }

    fn parse_dict_literal(&mut self) -> Option<Expr> {
        let mut pairs = vec![];

        if self.peek_is(TokenKind::RBrace) {
            self.next_token();
            return Some(Expr::Dict(pairs));
        }

        self.next_token();

        loop {
            if self.current_is(TokenKind::RBrace) || self.current_is(TokenKind::Eof) {
                break;
            }

            let key = match self.current.kind {
                TokenKind::Identifier => Expr::Identifier(self.current.literal.clone()),
                TokenKind::String => Expr::Str(self.current.literal.clone()),
                _ => {
                    let msg = format!(
                        "[Line {}] Expected identifier or string as dict key, got {}",
                        self.current.line, self.current.kind
                    );
                    self.add_error(msg);
                    return None;
                }
            };

            if !self.expect_peek(TokenKind::Colon) {
                return None;
            }
            self.next_token();

            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if self.peek_is(TokenKind::Comma) {
                self.next_token();
                self.next_token();
            } else if self.peek_is(TokenKind::RBrace) {
                self.next_token();
                break;
            } else {
                let msg = format!(
                    "[Line {}] Expected ',' or '}}' in dictionary, got {}",
                    self.current.line, self.peek.kind
                );
                self.add_error(msg);
                return None;
            }
        }

        Some(Expr::Dict(pairs))
    }

    fn parse_index_access(&mut self, left: Expr) -> Option<Expr> {
        self.next_token();
        let index = self.parse_expression(Precedence::Lowest)?;

        if !self.expect_peek(TokenKind::RBracket) {
            return None;
        }

        Some(Expr::Member {
            object: Box::new(left),
            property: Box::new(index),
            is_computed: true,
        })
    }

    /// `arr at i` is the keyword spelling of `arr[i]`.
    fn parse_at_index(&mut self, left: Expr) -> Option<Expr> {
        self.next_token();
        let index = self.parse_expression(Precedence::Index)?;
        Some(Expr::Member {
            object: Box::new(left),
            property: Box::new(index),
            is_computed: true,
        })
    }

    fn parse_member_access(&mut self, left: Expr) -> Option<Expr> {
        self.next_token();
        // A dot property is always a plain identifier. Running the Pratt loop
        // here would swallow tokens like '=' that belong to the enclosing
        // assignment.
        if !self.current_is(TokenKind::Identifier) {
            let msg = format!(
                "[Line {}] Expected identifier after '.', got {}",
                self.current.line, self.current.kind
            );
            self.add_error(msg);
            return Some(left);
        }
        Some(Expr::Member {
            object: Box::new(left),
            property: Box::new(Expr::Identifier(self.current.literal.clone())),
            is_computed: false,
        })
    }

    fn parse_new_expression(&mut self) -> Option<Expr> {
        if !self.expect_peek(TokenKind::Identifier) {
            return None;
        }
        let class_name = self.current.literal.clone();

        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        let args = self.parse_call_arguments()?;

        Some(Expr::New { class_name, args })
    }

    // ------ statements ------

    fn parse_return_statement(&mut self) -> Option<Stmt> {
        self.next_token();

        let mut value = None;
        if !self.current_is(TokenKind::Newline) && !self.current_is(TokenKind::Eof) {
            value = Some(self.parse_expression(Precedence::Lowest)?);
        }

        if self.peek_is(TokenKind::Newline) {
            self.next_token();
        }

        Some(Stmt::Return(value))
    }

    /// Expression statement or assignment; which one is only known after the
    /// target expression has been parsed (`arr at 0 = 5` is an assignment).
    fn parse_expression_statement(&mut self) -> Option<Stmt> {
        let target = self.parse_expression(Precedence::Lowest)?;

        let mut type_annotation = String::from("any");
        if self.peek_is(TokenKind::Colon) {
            self.next_token();
            if !self.expect_peek(TokenKind::Identifier) {
                return None;
            }
            type_annotation = self.current.literal.clone();
        }

        if self.peek_is(TokenKind::Assign) {
            self.next_token();
            self.next_token();

            let value = self.parse_expression(Precedence::Lowest)?;

            if self.peek_is(TokenKind::Newline) {
                self.next_token();
            }

            return Some(Stmt::Assignment {
                target,
                value,
                type_annotation,
            });
        }

        if self.peek_is(TokenKind::Newline) {
            self.next_token();
            return Some(Stmt::Expression(target));
        } else if self.peek_is(TokenKind::Eof) {
            return Some(Stmt::Expression(target));
        }

        let msg = format!(
            "[Line {}] Expected newline after expression, got {}",
            self.current.line, self.peek.kind
        );
        self.add_error(msg);
        None
    }

    fn parse_block(&mut self) -> Block {
        let mut block = Block::default();

        while self.current_is(TokenKind::Newline) {
            self.next_token();
        }

        while !self.current_is(TokenKind::End)
            && !self.current_is(TokenKind::Eof)
            && !self.current_is(TokenKind::Else)
            && !self.current_is(TokenKind::Elif)
            && !self.current_is(TokenKind::Case)
            && !self.current_is(TokenKind::Default)
            && !self.current_is(TokenKind::Catch)
        {
            match self.parse_statement() {
                Some(stmt) => block.statements.push(stmt),
                None => {
                    if !self.current_is(TokenKind::Newline) && !self.current_is(TokenKind::Eof) {
                        self.next_token();
                    }
                }
            }

            while self.current_is(TokenKind::Newline) {
                self.next_token();
            }
        }

        block
    }

    fn finish_block_statement(&mut self, construct: &str) -> bool {
        if !self.current_is(TokenKind::End) {
            let msg = format!(
                "[Line {}] Expected 'end' at end of {construct}",
                self.current.line
            );
            self.add_error(msg);
            return false;
        }
        self.next_token();
        if self.current_is(TokenKind::Newline) {
            self.next_token();
        }
        true
    }

    fn parse_if_statement(&mut self) -> Option<Stmt> {
        self.next_token();

        let condition = self.parse_expression(Precedence::Lowest)?;

        if !self.expect_peek(TokenKind::Newline) {
            return None;
        }
        self.next_token();

        let consequence = self.parse_block();
        let mut elif_branches = vec![];
        let mut alternative = None;

        while self.current_is(TokenKind::Elif) {
            self.next_token();
            let elif_condition = self.parse_expression(Precedence::Lowest)?;
            if !self.expect_peek(TokenKind::Newline) {
                return None;
            }
            self.next_token();
            elif_branches.push((elif_condition, self.parse_block()));
        }

        if self.current_is(TokenKind::Else) {
            if !self.expect_peek(TokenKind::Newline) {
                return None;
            }
            self.next_token();
            alternative = Some(self.parse_block());
        }

        if !self.finish_block_statement("if statement") {
            return None;
        }

        Some(Stmt::If {
            condition,
            consequence,
            elif_branches,
            alternative,
        })
    }

    fn parse_while_statement(&mut self) -> Option<Stmt> {
        self.next_token();

        let condition = self.parse_expression(Precedence::Lowest)?;

        if !self.expect_peek(TokenKind::Newline) {
            return None;
        }
        self.next_token();

        let body = self.parse_block();

        if !self.finish_block_statement("while statement") {
            return None;
        }

        Some(Stmt::While { condition, body })
    }

    fn parse_loop_statement(&mut self) -> Option<Stmt> {
        self.next_token();

        if !self.current_is(TokenKind::Identifier) {
            let msg = format!("[Line {}] Expected identifier after loop", self.current.line);
            self.add_error(msg);
            return None;
        }
        let iterator = self.current.literal.clone();
        self.next_token();

        if !self.current_is(TokenKind::From) {
            let msg = format!(
                "[Line {}] Expected 'from' in loop statement",
                self.current.line
            );
            self.add_error(msg);
            return None;
        }
        self.next_token();

        let start = self.parse_expression(Precedence::Lowest)?;

        if !self.expect_peek(TokenKind::To) {
            return None;
        }
        self.next_token();

        let end = self.parse_expression(Precedence::Lowest)?;

        let mut step = None;
        if self.peek_is(TokenKind::Step) {
            self.next_token();
            self.next_token();
            step = Some(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(TokenKind::Newline) {
            return None;
        }
        self.next_token();

        let body = self.parse_block();

        self.finish_block_statement("loop statement");

        Some(Stmt::Loop {
            iterator,
            start,
            end,
            step,
            body,
        })
    }

    fn parse_for_statement(&mut self) -> Option<Stmt> {
        self.next_token();

        if !self.current_is(TokenKind::Identifier) {
            let msg = format!("[Line {}] Expected identifier after for", self.current.line);
            self.add_error(msg);
            return None;
        }
        let iterator = self.current.literal.clone();
        self.next_token();

        if !self.current_is(TokenKind::In) {
            let msg = format!(
                "[Line {}] Expected 'in' in for statement",
                self.current.line
            );
            self.add_error(msg);
            return None;
        }
        self.next_token();

        let iterable = self.parse_expression(Precedence::Lowest)?;

        if !self.expect_peek(TokenKind::Newline) {
            return None;
        }
        self.next_token();

        let body = self.parse_block();

        self.finish_block_statement("for statement");

        Some(Stmt::ForIn {
            iterator,
            iterable,
            body,
        })
    }

    fn parse_match_statement(&mut self) -> Option<Stmt> {
        self.next_token();

        let subject = self.parse_expression(Precedence::Lowest)?;

        if !self.expect_peek(TokenKind::Newline) {
            return None;
        }
        self.next_token();

        let mut cases = vec![];
        let mut default = None;

        while self.current_is(TokenKind::Newline) {
            self.next_token();
        }

        while self.current_is(TokenKind::Case) {
            self.next_token();
            let case_expr = self.parse_expression(Precedence::Lowest)?;

            if !self.expect_peek(TokenKind::Newline) {
                return Some(Stmt::Match {
                    subject,
                    cases,
                    default,
                });
            }
            self.next_token();

            cases.push((case_expr, self.parse_block()));

            while self.current_is(TokenKind::Newline) {
                self.next_token();
            }
        }

        if self.current_is(TokenKind::Default) {
            if !self.expect_peek(TokenKind::Newline) {
                return Some(Stmt::Match {
                    subject,
                    cases,
                    default,
                });
            }
            self.next_token();
            default = Some(self.parse_block());
        }

        self.finish_block_statement("match statement");

        Some(Stmt::Match {
            subject,
            cases,
            default,
        })
    }

    fn parse_struct_decl(&mut self) -> Option<Stmt> {
        self.next_token();

        if !self.current_is(TokenKind::Identifier) {
            let msg = format!("[Line {}] Expected struct name", self.current.line);
            self.add_error(msg);
            return None;
        }
        let name = self.current.literal.clone();
        let mut fields = vec![];

        if !self.expect_peek(TokenKind::Newline) {
            return Some(Stmt::StructDecl { name, fields });
        }
        self.next_token();

        while !self.current_is(TokenKind::End) && !self.current_is(TokenKind::Eof) {
            if self.current_is(TokenKind::Newline) {
                self.next_token();
                continue;
            }
            if self.current_is(TokenKind::Identifier) {
                fields.push(self.current.literal.clone());
                self.next_token();
            } else {
                let msg = format!(
                    "[Line {}] Expected identifier for struct field",
                    self.current.line
                );
                self.add_error(msg);
                break;
            }
        }

        if self.current_is(TokenKind::End) {
            self.next_token();
        }
        if self.current_is(TokenKind::Newline) {
            self.next_token();
        }

        Some(Stmt::StructDecl { name, fields })
    }

    fn parse_function_parameters(&mut self) -> Option<(Vec<String>, Vec<String>)> {
        let mut parameters = vec![];
        let mut param_types = vec![];

        if self.peek_is(TokenKind::RParen) {
            self.next_token();
            return Some((parameters, param_types));
        }

        self.next_token();
        loop {
            if !self.current_is(TokenKind::Identifier) {
                let msg = format!(
                    "[Line {}] Expected identifier for parameter",
                    self.current.line
                );
                self.add_error(msg);
                return None;
            }
            parameters.push(self.current.literal.clone());

            if self.peek_is(TokenKind::Colon) {
                self.next_token();
                if !self.expect_peek(TokenKind::Identifier) {
                    return None;
                }
                param_types.push(self.current.literal.clone());
            } else {
                param_types.push("any".to_string());
            }

            if self.peek_is(TokenKind::Comma) {
                self.next_token();
                self.next_token();
            } else {
                break;
            }
        }

        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }

        Some((parameters, param_types))
    }

    fn parse_function_decl(&mut self, is_interrupt: bool) -> Option<FunctionDecl> {
        self.next_token();

        if !self.current_is(TokenKind::Identifier) {
            let msg = format!("[Line {}] Expected function name", self.current.line);
            self.add_error(msg);
            return None;
        }
        let name = self.current.literal.clone();

        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }

        let (parameters, param_types) = self.parse_function_parameters()?;

        let mut return_type = String::from("any");
        if self.peek_is(TokenKind::Arrow) {
            self.next_token();
            if !self.expect_peek(TokenKind::Identifier) {
                return None;
            }
            return_type = self.current.literal.clone();
        }

        if !self.expect_peek(TokenKind::Newline) {
            return None;
        }
        self.next_token();

        let body = self.parse_block();

        if !self.current_is(TokenKind::End) {
            let msg = format!(
                "[Line {}] Expected 'end' at end of function declaration",
                self.current.line
            );
            self.add_error(msg);
        }
        self.next_token();
        if self.current_is(TokenKind::Newline) {
            self.next_token();
        }

        Some(FunctionDecl {
            name,
            parameters,
            param_types,
            return_type,
            body,
            is_interrupt,
        })
    }

    fn parse_interrupt_function(&mut self) -> Option<Stmt> {
        if !self.expect_peek(TokenKind::Function) {
            return None;
        }
        self.parse_function_decl(true).map(Stmt::FunctionDecl)
    }

    fn parse_class_decl(&mut self) -> Option<Stmt> {
        self.next_token();

        if !self.current_is(TokenKind::Identifier) {
            let msg = format!("[Line {}] Expected class name", self.current.line);
            self.add_error(msg);
            return None;
        }
        let name = self.current.literal.clone();
        let mut methods = vec![];

        if !self.expect_peek(TokenKind::Newline) {
            return None;
        }
        self.next_token();

        loop {
            while self.current_is(TokenKind::Newline) {
                self.next_token();
            }
            if self.current_is(TokenKind::End) || self.current_is(TokenKind::Eof) {
                break;
            }
            if self.current_is(TokenKind::Function) {
                match self.parse_function_decl(false) {
                    Some(method) => methods.push(method),
                    None => return None,
                }
            } else {
                let msg = format!(
                    "[Line {}] Expected method declaration in class body, got {}",
                    self.current.line, self.current.kind
                );
                self.add_error(msg);
                return None;
            }
        }

        self.finish_block_statement("class declaration");

        Some(Stmt::ClassDecl { name, methods })
    }

    fn parse_try_statement(&mut self) -> Option<Stmt> {
        if !self.expect_peek(TokenKind::Newline) {
            return None;
        }
        self.next_token();

        let try_block = self.parse_block();

        if !self.current_is(TokenKind::Catch) {
            let msg = format!(
                "[Line {}] Expected 'catch' after try block",
                self.current.line
            );
            self.add_error(msg);
            return None;
        }

        if !self.expect_peek(TokenKind::Identifier) {
            return None;
        }
        let catch_var = self.current.literal.clone();

        if !self.expect_peek(TokenKind::Newline) {
            return None;
        }
        self.next_token();

        let catch_block = self.parse_block();

        self.finish_block_statement("try statement");

        Some(Stmt::TryCatch {
            try_block,
            catch_var,
            catch_block,
        })
    }

    fn parse_throw_statement(&mut self) -> Option<Stmt> {
        self.next_token();

        let value = self.parse_expression(Precedence::Lowest)?;

        if self.peek_is(TokenKind::Newline) {
            self.next_token();
        }

        Some(Stmt::Throw(value))
    }

    fn parse_import_statement(&mut self) -> Option<Stmt> {
        self.next_token();
        if !self.current_is(TokenKind::Identifier) {
            let msg = format!(
                "[Line {}] Expected module name after 'import'",
                self.current.line
            );
            self.add_error(msg);
            return None;
        }
        let module = self.current.literal.clone();
        self.next_token();
        if self.current_is(TokenKind::Newline) {
            self.next_token();
        }
        Some(Stmt::Import { module })
    }

    fn parse_import_native(&mut self) -> Option<Stmt> {
        if !self.expect_peek(TokenKind::String) {
            return None;
        }
        let library = self.current.literal.clone();
        self.next_token();
        if self.current_is(TokenKind::Newline) {
            self.next_token();
        }
        Some(Stmt::ImportNative { library })
    }

    /// `c_function name(type, type) -> type`; the parameters are type names.
    fn parse_c_function_decl(&mut self) -> Option<Stmt> {
        if !self.expect_peek(TokenKind::Identifier) {
            return None;
        }
        let name = self.current.literal.clone();

        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }

        let mut param_types = vec![];
        if !self.peek_is(TokenKind::RParen) {
            self.next_token();
            loop {
                if !self.current_is(TokenKind::Identifier) {
                    let msg = format!(
                        "[Line {}] Expected type name in c_function parameter list",
                        self.current.line
                    );
                    self.add_error(msg);
                    return None;
                }
                param_types.push(self.current.literal.clone());
                if self.peek_is(TokenKind::Comma) {
                    self.next_token();
                    self.next_token();
                } else {
                    break;
                }
            }
        }
        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }

        let mut return_type = String::from("any");
        if self.peek_is(TokenKind::Arrow) {
            self.next_token();
            if !self.expect_peek(TokenKind::Identifier) {
                return None;
            }
            return_type = self.current.literal.clone();
        }

        self.next_token();
        if self.current_is(TokenKind::Newline) {
            self.next_token();
        }

        Some(Stmt::CFunctionDecl {
            name,
            param_types,
            return_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TokenKind;

    fn parse(source: &str) -> (Program, Vec<String>) {
        let mut parser = Parser::from_source(source);
        let program = parser.parse_program();
        (program, parser.errors)
    }

    fn parse_ok(source: &str) -> Program {
        let (program, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
        program
    }

    #[test]
    fn parses_assignment_and_expression_statement() {
        let program = parse_ok("x = 1\nprint(x)\n");
        assert_eq!(program.statements.len(), 2);
        assert!(matches!(program.statements[0], Stmt::Assignment { .. }));
        assert!(matches!(program.statements[1], Stmt::Expression(_)));
    }

    #[test]
    fn precedence_builds_expected_tree() {
        let program = parse_ok("x = 1 + 2 * 3");
        let Stmt::Assignment { value, .. } = &program.statements[0] else {
            panic!("expected assignment");
        };
        let Expr::Binary { op, right, .. } = value else {
            panic!("expected binary expression");
        };
        assert_eq!(op.kind, TokenKind::Plus);
        assert!(matches!(
            right.as_ref(),
            Expr::Binary { op, .. } if op.kind == TokenKind::Times
        ));
    }

    #[test]
    fn word_operators_parse_like_symbols() {
        let symbolic = parse_ok("y = a < b");
        let worded = parse_ok("y = a less than b");
        let get = |p: &Program| match &p.statements[0] {
            Stmt::Assignment { value, .. } => match value {
                Expr::Binary { op, .. } => op.kind,
                _ => panic!("expected binary"),
            },
            _ => panic!("expected assignment"),
        };
        assert_eq!(get(&symbolic), get(&worded));
    }

    #[test]
    fn at_and_brackets_are_equivalent() {
        let a = parse_ok("x = arr at 0");
        let b = parse_ok("x = arr[0]");
        assert_eq!(a.statements, b.statements);
    }

    #[test]
    fn parses_if_elif_else() {
        let program = parse_ok("if a\nprint(1)\nelif b\nprint(2)\nelse\nprint(3)\nend\n");
        let Stmt::If {
            elif_branches,
            alternative,
            ..
        } = &program.statements[0]
        else {
            panic!("expected if");
        };
        assert_eq!(elif_branches.len(), 1);
        assert!(alternative.is_some());
    }

    #[test]
    fn parses_loop_with_step() {
        let program = parse_ok("loop i from 0 to 10 step 2\nprint(i)\nend\n");
        let Stmt::Loop { iterator, step, .. } = &program.statements[0] else {
            panic!("expected loop");
        };
        assert_eq!(iterator, "i");
        assert!(step.is_some());
    }

    #[test]
    fn parses_match_with_default() {
        let program = parse_ok("match x\ncase 1\nprint(1)\ncase 2\nprint(2)\ndefault\nprint(0)\nend\n");
        let Stmt::Match { cases, default, .. } = &program.statements[0] else {
            panic!("expected match");
        };
        assert_eq!(cases.len(), 2);
        assert!(default.is_some());
    }

    #[test]
    fn parses_function_and_struct() {
        let program = parse_ok("function add(a, b)\nreturn a + b\nend\nstruct Point\nx\ny\nend\n");
        assert!(matches!(program.statements[0], Stmt::FunctionDecl(_)));
        let Stmt::StructDecl { fields, .. } = &program.statements[1] else {
            panic!("expected struct");
        };
        assert_eq!(fields, &["x", "y"]);
    }

    #[test]
    fn parses_class_with_methods() {
        let program =
            parse_ok("class Counter\nfunction init()\nthis.n = 0\nend\nfunction get()\nreturn this.n\nend\nend\n");
        let Stmt::ClassDecl { name, methods } = &program.statements[0] else {
            panic!("expected class");
        };
        assert_eq!(name, "Counter");
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].name, "init");
    }

    #[test]
    fn parses_try_catch_and_throw() {
        let program = parse_ok("try\nthrow 'boom'\ncatch e\nprint(e)\nend\n");
        let Stmt::TryCatch {
            try_block,
            catch_var,
            ..
        } = &program.statements[0]
        else {
            panic!("expected try/catch");
        };
        assert_eq!(catch_var, "e");
        assert!(matches!(try_block.statements[0], Stmt::Throw(_)));
    }

    #[test]
    fn parses_dict_and_array_literals() {
        let program = parse_ok("d = { name: 'ada', \"age\": 36 }\na = [1, 2, 3]\n");
        let Stmt::Assignment { value, .. } = &program.statements[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(value, Expr::Dict(pairs) if pairs.len() == 2));
        let Stmt::Assignment { value, .. } = &program.statements[1] else {
            panic!("expected assignment");
        };
        assert!(matches!(value, Expr::Array(items) if items.len() == 3));
    }

    #[test]
    fn parses_member_assignment() {
        let program = parse_ok("p.age = 26\narr[0] = 5\n");
        for stmt in &program.statements {
            let Stmt::Assignment { target, .. } = stmt else {
                panic!("expected assignment");
            };
            assert!(matches!(target, Expr::Member { .. }));
        }
    }

    #[test]
    fn parses_new_expression() {
        let program = parse_ok("o = new Counter()\np = new Pair(1, 2)\n");
        let Stmt::Assignment { value, .. } = &program.statements[1] else {
            panic!("expected assignment");
        };
        assert!(matches!(value, Expr::New { args, .. } if args.len() == 2));
    }

    #[test]
    fn parses_imports_and_ffi_decls() {
        let program = parse_ok("import math\nimport_native \"libm\"\nc_function sqrt(number) -> number\n");
        assert!(matches!(&program.statements[0], Stmt::Import { module } if module == "math"));
        assert!(
            matches!(&program.statements[1], Stmt::ImportNative { library } if library == "libm")
        );
        let Stmt::CFunctionDecl {
            param_types,
            return_type,
            ..
        } = &program.statements[2]
        else {
            panic!("expected c_function");
        };
        assert_eq!(param_types.len(), 1);
        assert_eq!(return_type, "number");
    }

    #[test]
    fn parses_interrupt_function_and_asm_block() {
        let program = parse_ok("interrupt function isr()\nx = 1\nend\nasm {\nhlt\n}\n");
        let Stmt::FunctionDecl(decl) = &program.statements[0] else {
            panic!("expected function");
        };
        assert!(decl.is_interrupt);
        assert!(matches!(&program.statements[1], Stmt::AsmBlock { code } if code.contains("hlt")));
    }

    #[test]
    fn errors_are_collected_not_raised() {
        let (program, errors) = parse("x = = 3\ny = 4\n");
        assert!(!errors.is_empty());
        assert!(errors[0].starts_with("[Line 1]"));
        // Best-effort: the second statement still parses.
        assert!(program
            .statements
            .iter()
            .any(|s| matches!(s, Stmt::Assignment { .. })));
    }

    #[test]
    fn recovery_makes_forward_progress() {
        // A pile of garbage must terminate with errors rather than loop.
        let (_, errors) = parse("@ @ @\n)\n");
        assert!(!errors.is_empty());
    }

    #[test]
    fn unary_operators() {
        let program = parse_ok("x = -5\ny = not true\n");
        for stmt in &program.statements {
            let Stmt::Assignment { value, .. } = stmt else {
                panic!("expected assignment");
            };
            assert!(matches!(value, Expr::Unary { .. }));
        }
    }

    #[test]
    fn method_call_parses_as_call_on_member() {
        let program = parse_ok("o.push(1)\n");
        let Stmt::Expression(Expr::Call { function, .. }) = &program.statements[0] else {
            panic!("expected call statement");
        };
        assert!(matches!(function.as_ref(), Expr::Member { is_computed, .. } if !is_computed));
    }
}
