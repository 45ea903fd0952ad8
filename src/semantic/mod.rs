//! Semantic analysis for StolasScript.
//!
//! Resolves identifiers through lexically nested symbol tables, hoists
//! top-level function and class names, checks struct constructor arity and
//! `this` usage, and enforces the freestanding-mode subset. Errors are
//! accumulated; analysis succeeds iff none were recorded. The language is
//! dynamic, so most type tension is a warning at best.

mod symbol;

pub use symbol::*;

use log::warn;

use crate::ast::{Block, Expr, FunctionDecl, Program, Stmt};

/// Built-in functions visible to hosted programs: name, arity, result type.
pub const BUILTINS: &[(&str, usize, &str)] = &[
    ("print", 1, "any"),
    ("len", 1, "number"),
    ("length", 1, "number"),
    ("push", 2, "any"),
    ("pop", 1, "any"),
    ("shift", 1, "any"),
    ("unshift", 2, "any"),
    ("to_string", 1, "string"),
    ("to_number", 1, "number"),
    ("string_split", 2, "array"),
    ("string_starts_with", 2, "bool"),
    ("string_ends_with", 2, "bool"),
    ("string_contains", 2, "bool"),
    ("string_substring", 3, "string"),
    ("string_index_of", 2, "number"),
    ("string_replace", 3, "string"),
    ("string_trim", 1, "string"),
    ("uppercase", 1, "string"),
    ("lowercase", 1, "string"),
    ("socket_connect", 2, "number"),
    ("socket_send", 2, "number"),
    ("socket_receive", 1, "string"),
    ("socket_close", 1, "any"),
    ("ws_connect", 1, "number"),
    ("ws_send", 2, "number"),
    ("ws_receive", 1, "string"),
    ("ws_close", 1, "any"),
    ("ws_server_create", 1, "number"),
    ("ws_server_accept", 1, "number"),
    ("ws_server_close", 1, "any"),
    ("ws_select", 2, "any"),
    ("json_encode", 1, "string"),
    ("json_decode", 1, "any"),
    ("current_time", 0, "number"),
    ("sleep", 1, "any"),
    ("random", 0, "number"),
    ("floor", 1, "number"),
    ("ceil", 1, "number"),
    ("round", 1, "number"),
    ("read_file", 1, "string"),
    ("write_file", 2, "bool"),
    ("append_file", 2, "bool"),
    ("file_exists", 1, "bool"),
    ("http_fetch", 1, "any"),
    ("thread_spawn", 2, "number"),
    ("thread_join", 1, "any"),
    ("mutex_create", 0, "number"),
    ("mutex_lock", 1, "any"),
    ("mutex_unlock", 1, "any"),
];

/// Raw memory accessors, only meaningful without a runtime.
const FREESTANDING_BUILTINS: &[(&str, usize, &str)] = &[
    ("memory_read", 1, "number"),
    ("memory_write", 2, "number"),
    ("memory_write_byte", 2, "number"),
];

pub struct SemanticAnalyzer {
    scopes: Vec<SymbolTable>,
    pub errors: Vec<String>,
    in_class: usize,
    freestanding: bool,
}

impl SemanticAnalyzer {
    pub fn new(freestanding: bool) -> Self {
        let mut analyzer = Self {
            scopes: vec![SymbolTable {
                is_function_scope: true,
                ..SymbolTable::default()
            }],
            errors: vec![],
            in_class: 0,
            freestanding,
        };

        let builtins = if freestanding {
            FREESTANDING_BUILTINS
        } else {
            BUILTINS
        };
        for (name, arity, result) in builtins {
            analyzer.define(*name, SymbolKind::Function, *arity, *result);
        }

        analyzer
    }

    /// Analyze a whole program. Returns true iff no errors were recorded.
    pub fn analyze(&mut self, program: &Program) -> bool {
        // Pre-pass: hoist every top-level function and class name so that
        // functions can call each other regardless of declaration order.
        // This must stay a separate pass over the statement list.
        for stmt in &program.statements {
            match stmt {
                Stmt::FunctionDecl(decl) => {
                    if self.resolve(&decl.name).is_none() {
                        self.define(
                            &decl.name,
                            SymbolKind::Function,
                            decl.parameters.len(),
                            "any",
                        );
                    }
                }
                Stmt::ClassDecl { name, .. } => {
                    if self.resolve(name).is_none() {
                        self.define(name, SymbolKind::Class, 0, name.clone());
                    }
                }
                _ => {}
            }
        }

        for stmt in &program.statements {
            self.analyze_stmt(stmt);
        }

        self.errors.is_empty()
    }

    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn define(
        &mut self,
        name: impl Into<String>,
        kind: SymbolKind,
        arity: usize,
        value_type: impl Into<String>,
    ) -> usize {
        let Some(scope) = self.scopes.last_mut() else {
            return 0;
        };
        let index = if kind == SymbolKind::Local {
            let index = scope.local_count;
            scope.local_count += 1;
            index
        } else {
            0
        };

        scope.symbols.push(Symbol {
            name: name.into(),
            kind,
            index,
            arity,
            value_type: value_type.into(),
            return_type: "any".to_string(),
            param_types: vec![],
        });
        index
    }

    fn resolve(&self, name: &str) -> Option<Symbol> {
        for scope in self.scopes.iter().rev() {
            if let Some(sym) = scope.symbols.iter().rev().find(|s| s.name == name) {
                return Some(sym.clone());
            }
        }
        None
    }

    fn enter_scope(&mut self, is_function: bool) {
        let local_count = if is_function {
            0
        } else {
            self.scopes.last().map(|s| s.local_count).unwrap_or(0)
        };
        self.scopes.push(SymbolTable {
            symbols: vec![],
            local_count,
            is_function_scope: is_function,
        });
    }

    fn leave_scope(&mut self) {
        if let Some(old) = self.scopes.pop() {
            // Blocks hand their local count back to the enclosing scope so
            // sibling blocks keep distinct slots.
            if !old.is_function_scope {
                if let Some(outer) = self.scopes.last_mut() {
                    outer.local_count = old.local_count;
                }
            }
        }
    }

    fn at_top_level(&self) -> bool {
        self.scopes.len() == 1
    }

    fn analyze_block(&mut self, block: &Block) {
        self.enter_scope(false);
        for stmt in &block.statements {
            self.analyze_stmt(stmt);
        }
        self.leave_scope();
    }

    fn analyze_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(expr) => self.analyze_expr(expr),

            Stmt::Assignment {
                target,
                value,
                type_annotation,
            } => {
                self.analyze_expr(value);

                if let Expr::Identifier(name) = target {
                    match self.resolve(name) {
                        None => {
                            // Implicit declaration, dynamic-language style.
                            let kind = if self.at_top_level() {
                                SymbolKind::Global
                            } else {
                                SymbolKind::Local
                            };
                            self.define(name, kind, 0, type_annotation.clone());
                        }
                        Some(sym) => {
                            if type_annotation != "any"
                                && sym.value_type != "any"
                                && sym.value_type != *type_annotation
                            {
                                warn!(
                                    "Dynamic type relaxation: variable '{name}' was typed \
                                     '{}', but is assigned '{type_annotation}'",
                                    sym.value_type
                                );
                            }
                        }
                    }
                } else {
                    self.analyze_expr(target);
                }
            }

            Stmt::If {
                condition,
                consequence,
                elif_branches,
                alternative,
            } => {
                self.analyze_expr(condition);
                self.analyze_block(consequence);
                for (elif_condition, elif_block) in elif_branches {
                    self.analyze_expr(elif_condition);
                    self.analyze_block(elif_block);
                }
                if let Some(alt) = alternative {
                    self.analyze_block(alt);
                }
            }

            Stmt::While { condition, body } => {
                self.analyze_expr(condition);
                self.analyze_block(body);
            }

            Stmt::Loop {
                iterator,
                start,
                end,
                step,
                body,
            } => {
                self.analyze_expr(start);
                self.analyze_expr(end);
                if let Some(step) = step {
                    self.analyze_expr(step);
                }
                self.enter_scope(false);
                self.define(iterator, SymbolKind::Local, 0, "number");
                self.analyze_block(body);
                self.leave_scope();
            }

            Stmt::ForIn {
                iterator,
                iterable,
                body,
            } => {
                if self.freestanding {
                    self.add_error("'for ... in' is not supported in freestanding mode.");
                }
                self.analyze_expr(iterable);
                self.enter_scope(false);
                self.define(iterator, SymbolKind::Local, 0, "any");
                self.analyze_block(body);
                self.leave_scope();
            }

            Stmt::Match {
                subject,
                cases,
                default,
            } => {
                self.analyze_expr(subject);
                for (case_expr, consequence) in cases {
                    self.analyze_expr(case_expr);
                    self.analyze_block(consequence);
                }
                if let Some(default) = default {
                    self.analyze_block(default);
                }
            }

            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.analyze_expr(value);
                }
            }

            Stmt::FunctionDecl(decl) => self.analyze_function_decl(decl),

            Stmt::StructDecl { name, fields } => {
                if self.freestanding {
                    self.add_error("Structs are not supported in freestanding mode.");
                }
                self.define(name, SymbolKind::Struct, fields.len(), "struct");
            }

            Stmt::ClassDecl { name, methods } => {
                if self.freestanding {
                    self.add_error("Classes are not supported in freestanding mode.");
                }
                self.define(name, SymbolKind::Class, methods.len(), "class");

                self.in_class += 1;
                for method in methods {
                    self.analyze_function_decl(method);
                }
                self.in_class -= 1;
            }

            Stmt::Break | Stmt::Continue => {}

            Stmt::Import { .. } => {
                if self.freestanding {
                    self.add_error("'import' is not supported in freestanding mode.");
                }
            }

            Stmt::ImportNative { .. } => {
                if self.freestanding {
                    self.add_error("'import_native' is not supported in freestanding mode.");
                }
            }

            Stmt::CFunctionDecl {
                name, param_types, ..
            } => {
                if self.freestanding {
                    self.add_error("'c_function' is not supported in freestanding mode.");
                }
                let arity = param_types.len();
                self.define(name, SymbolKind::CFunction, arity, "any");
            }

            Stmt::TryCatch {
                try_block,
                catch_var,
                catch_block,
            } => {
                if self.freestanding {
                    self.add_error("Exception handling is not supported in freestanding mode.");
                }
                self.analyze_block(try_block);
                self.enter_scope(false);
                self.define(catch_var, SymbolKind::Local, 0, "any");
                self.analyze_block(catch_block);
                self.leave_scope();
            }

            Stmt::Throw(value) => {
                if self.freestanding {
                    self.add_error("Exception handling is not supported in freestanding mode.");
                }
                self.analyze_expr(value);
            }

            Stmt::AsmBlock { code } => {
                if !self.freestanding {
                    const PRIVILEGED: &[&str] = &["hlt", "lgdt", "lidt", "in ", "out "];
                    if PRIVILEGED.iter().any(|instr| code.contains(instr)) {
                        warn!(
                            "Privileged instruction(s) in 'asm {{}}' block outside \
                             --freestanding mode."
                        );
                    }
                }
            }
        }
    }

    fn analyze_function_decl(&mut self, decl: &FunctionDecl) {
        if decl.is_interrupt && !self.freestanding {
            warn!(
                "'interrupt function {}' should be used with --freestanding \
                 (kernel/bare-metal context).",
                decl.name
            );
        }

        // Registered before the body so the function can recurse.
        self.define(&decl.name, SymbolKind::Function, decl.parameters.len(), "any");
        if let Some(sym) = self
            .scopes
            .last_mut()
            .and_then(|s| s.symbols.last_mut())
        {
            sym.param_types = decl.param_types.clone();
            sym.return_type = decl.return_type.clone();
        }

        self.enter_scope(true);
        if self.in_class > 0 {
            self.define("this", SymbolKind::Local, 0, "any");
        }
        for (param, param_type) in decl.parameters.iter().zip(&decl.param_types) {
            self.define(param, SymbolKind::Local, 0, param_type.clone());
        }
        self.analyze_block(&decl.body);
        self.leave_scope();
    }

    fn analyze_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Identifier(name) => {
                if self.resolve(name).is_none() {
                    self.add_error(format!("Undefined variable or function '{name}'"));
                }
            }

            Expr::Number(_) | Expr::Boolean(_) | Expr::Null => {}

            Expr::Str(_) => {
                if self.freestanding {
                    self.add_error("String literals are not supported in freestanding mode.");
                }
            }

            Expr::Binary { left, right, .. } => {
                self.analyze_expr(left);
                self.analyze_expr(right);
            }

            Expr::Unary { right, .. } => self.analyze_expr(right),

            Expr::Call { function, args } => {
                self.analyze_expr(function);

                // Arity is only enforced for struct constructors; ordinary
                // calls stay dynamic.
                if let Expr::Identifier(name) = function.as_ref() {
                    if let Some(sym) = self.resolve(name) {
                        if sym.kind == SymbolKind::Struct && sym.arity != args.len() {
                            self.add_error(format!(
                                "Struct '{}' constructor expects {} arguments, got {}",
                                sym.name,
                                sym.arity,
                                args.len()
                            ));
                        }
                    }
                }

                for arg in args {
                    self.analyze_expr(arg);
                }
            }

            Expr::Array(elements) => {
                if self.freestanding {
                    self.add_error("Array literals are not supported in freestanding mode.");
                }
                for element in elements {
                    self.analyze_expr(element);
                }
            }

            Expr::Dict(pairs) => {
                if self.freestanding {
                    self.add_error("Dict literals are not supported in freestanding mode.");
                }
                // Keys are field labels, not variable references.
                for (_, value) in pairs {
                    self.analyze_expr(value);
                }
            }

            Expr::Member {
                object,
                property,
                is_computed,
            } => {
                self.analyze_expr(object);
                if *is_computed {
                    self.analyze_expr(property);
                }
            }

            Expr::New { class_name, args } => {
                match self.resolve(class_name) {
                    Some(sym) if sym.kind == SymbolKind::Class => {}
                    _ => {
                        self.add_error(format!("Cannot instantiate non-class '{class_name}'"));
                    }
                }
                for arg in args {
                    self.analyze_expr(arg);
                }
            }

            Expr::This => {
                if self.in_class == 0 {
                    self.add_error("'this' can only be used inside a class method");
                }
            }
        }
    }

}
