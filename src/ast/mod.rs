//! AST for StolasScript.
//!
//! Two sum types, statements and expressions, with exclusively-owned
//! children. The parser produces a [`Program`]; every later stage borrows
//! it.

use crate::lexer::Token;

/// A parsed source file: a sequence of top-level statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// A `... end`-delimited statement sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    /// Parameter names; `param_types` is kept in lockstep (same length).
    pub parameters: Vec<String>,
    pub param_types: Vec<String>,
    pub return_type: String,
    pub body: Block,
    pub is_interrupt: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expression(Expr),
    Assignment {
        /// Identifier or member access.
        target: Expr,
        value: Expr,
        type_annotation: String,
    },
    If {
        condition: Expr,
        consequence: Block,
        /// Elif conditions and consequences, pairwise.
        elif_branches: Vec<(Expr, Block)>,
        alternative: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    Loop {
        iterator: String,
        start: Expr,
        end: Expr,
        /// Defaults to 1 when absent.
        step: Option<Expr>,
        body: Block,
    },
    ForIn {
        iterator: String,
        iterable: Expr,
        body: Block,
    },
    Match {
        subject: Expr,
        /// Case expressions and consequences, pairwise.
        cases: Vec<(Expr, Block)>,
        default: Option<Block>,
    },
    Return(Option<Expr>),
    FunctionDecl(FunctionDecl),
    StructDecl {
        name: String,
        fields: Vec<String>,
    },
    ClassDecl {
        name: String,
        methods: Vec<FunctionDecl>,
    },
    Break,
    Continue,
    Import {
        module: String,
    },
    ImportNative {
        library: String,
    },
    CFunctionDecl {
        name: String,
        param_types: Vec<String>,
        return_type: String,
    },
    TryCatch {
        try_block: Block,
        catch_var: String,
        catch_block: Block,
    },
    Throw(Expr),
    AsmBlock {
        code: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier(String),
    /// Numeric literals keep their source text; numeric typing is decided
    /// during code generation.
    Number(String),
    Str(String),
    Boolean(bool),
    Null,
    Binary {
        op: Token,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: Token,
        right: Box<Expr>,
    },
    Call {
        function: Box<Expr>,
        args: Vec<Expr>,
    },
    Array(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Member {
        object: Box<Expr>,
        /// Identifier for dot access, arbitrary expression when computed.
        property: Box<Expr>,
        is_computed: bool,
    },
    New {
        class_name: String,
        args: Vec<Expr>,
    },
    This,
}

impl Expr {
    /// Numeric value of a number literal: longest valid decimal prefix,
    /// truncated toward zero. `1.2.3` parses as 1.
    pub fn number_value(text: &str) -> i64 {
        if let Ok(n) = text.parse::<i64>() {
            return n;
        }
        let prefix = match text.match_indices('.').nth(1) {
            Some((idx, _)) => &text[..idx],
            None => text,
        };
        prefix.parse::<f64>().map(|f| f.trunc() as i64).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_value_handles_ints_decimals_and_junk() {
        assert_eq!(Expr::number_value("42"), 42);
        assert_eq!(Expr::number_value("3.99"), 3);
        assert_eq!(Expr::number_value("1.2.3"), 1);
        assert_eq!(Expr::number_value("."), 0);
    }
}
