//! Code generation: AST → x86-64 assembly in GNU-assembler Intel syntax.
//!
//! The generator is stack-oriented: every expression leaves its result on
//! the hardware stack as a `value*` and every operator pops its operands.
//! In hosted mode all values flow through the runtime; in freestanding mode
//! values are raw 64-bit integers, arithmetic compiles to native
//! instructions and no runtime symbol is referenced.
//!
//! Every external call goes through one aligned-call helper that realigns
//! rsp to 16 bytes and spills the original rsp so it can be restored after
//! the call returns. The single exception is `stola_setjmp`, which must be
//! called directly: a wrapping thunk's ephemeral frame would be overwritten
//! by try-body stack traffic and corrupt the rsp it restores on longjmp.

mod abi;
mod builtins;
mod frame;

pub use frame::{Frame, Location, LOCAL_REGS, SPILL_AREA};

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use log::{error, warn};

use crate::ast::{Block, Expr, FunctionDecl, Program, Stmt};
use crate::lexer::TokenKind;

use abi::{ARG_REGS, CALL_FRAME, FIFTH_ARG_REG, SAVED_RSP_OFFSET, STACK_ARG_OFFSET};

/// Caller-saved registers an interrupt handler must preserve on top of the
/// normal frame, in push order.
const INTERRUPT_SAVED: [&str; 9] = ["rax", "rcx", "rdx", "r8", "r9", "r10", "r11", "rsi", "rdi"];

pub struct Codegen {
    freestanding: bool,
    /// Current emission target; swapped while compiling a function body.
    out: String,
    /// Finished function bodies, emitted before `main`.
    functions: String,
    data: Vec<String>,
    strings: HashMap<String, usize>,
    externs: BTreeSet<String>,
    globals: BTreeSet<String>,
    global_order: Vec<String>,
    fn_labels: Vec<String>,
    label_counter: usize,
    /// (continue target, break target) for each enclosing loop.
    loop_stack: Vec<(String, String)>,
    frame: Option<Frame>,
    user_functions: HashMap<String, String>,
    class_methods: HashMap<String, Vec<String>>,
    struct_fields: HashMap<String, Vec<String>>,
    c_functions: BTreeSet<String>,
}

/// Generate the complete assembly text for a program.
pub fn generate(program: &Program, freestanding: bool) -> String {
    let mut codegen = Codegen::new(freestanding);
    codegen.compile_program(program);
    codegen.assemble()
}

/// Generate and write the assembly file. Logs and reports failure; the
/// driver decides the exit code.
pub fn generate_to_file(program: &Program, output: &Path, freestanding: bool) -> bool {
    let asm = generate(program, freestanding);
    match fs::write(output, asm) {
        Ok(()) => true,
        Err(err) => {
            error!("Could not write output file '{}': {err}", output.display());
            false
        }
    }
}

impl Codegen {
    pub fn new(freestanding: bool) -> Self {
        Self {
            freestanding,
            out: String::new(),
            functions: String::new(),
            data: vec![],
            strings: HashMap::new(),
            externs: BTreeSet::new(),
            globals: BTreeSet::new(),
            global_order: vec![],
            fn_labels: vec![],
            label_counter: 0,
            loop_stack: vec![],
            frame: None,
            user_functions: HashMap::new(),
            class_methods: HashMap::new(),
            struct_fields: HashMap::new(),
            c_functions: BTreeSet::new(),
        }
    }

    // ------ emission primitives ------

    fn ins(&mut self, instruction: impl AsRef<str>) {
        self.out.push_str("    ");
        self.out.push_str(instruction.as_ref());
        self.out.push('\n');
    }

    fn label(&mut self, label: &str) {
        self.out.push_str(label);
        self.out.push_str(":\n");
    }

    fn new_label(&mut self, stem: &str) -> String {
        let label = format!(".L{stem}_{}", self.label_counter);
        self.label_counter += 1;
        label
    }

    /// Deduplicated `.data` label for a string literal.
    fn string_label(&mut self, text: &str) -> String {
        if let Some(id) = self.strings.get(text) {
            return format!(".str{id}");
        }
        let id = self.strings.len();
        self.strings.insert(text.to_string(), id);
        self.data
            .push(format!(".str{id}: .asciz \"{}\"", escape_asciz(text)));
        format!(".str{id}")
    }

    fn mark_extern(&mut self, symbol: &str) {
        if !self.freestanding {
            self.externs.insert(symbol.to_string());
        }
    }

    /// The canonical aligned external call: realign rsp, spill the original
    /// rsp into the call frame (below the Windows shadow space), restore it
    /// after the call. Argument registers must already be loaded.
    fn aligned_call(&mut self, entry: &str) {
        self.ins("mov r11, rsp");
        self.ins("and rsp, -16");
        self.ins(format!("sub rsp, {CALL_FRAME}"));
        self.ins(format!("mov [rsp + {SAVED_RSP_OFFSET}], r11"));
        self.ins(format!("call {entry}"));
        self.ins(format!("mov rsp, [rsp + {SAVED_RSP_OFFSET}]"));
    }

    /// Pop `nargs` operands (pushed left to right) into argument registers
    /// and call a runtime entry point.
    fn runtime_call(&mut self, entry: &str, nargs: usize, push_result: bool) {
        for i in (0..nargs).rev() {
            self.ins(format!("pop {}", ARG_REGS[i]));
        }
        self.mark_extern(entry);
        self.aligned_call(entry);
        if push_result {
            self.ins("push rax");
        }
    }

    /// Pop the top of the value stack and jump to `target` when it is not
    /// truthy.
    fn jump_unless_truthy(&mut self, target: &str) {
        if self.freestanding {
            self.ins("pop rax");
            self.ins("cmp rax, 0");
            self.ins(format!("je {target}"));
        } else {
            self.ins(format!("pop {}", ARG_REGS[0]));
            self.mark_extern("is_truthy");
            self.aligned_call("is_truthy");
            self.ins("cmp rax, 0");
            self.ins(format!("je {target}"));
        }
    }

    fn push_null(&mut self) {
        if self.freestanding {
            self.ins("mov rax, 0");
            self.ins("push rax");
        } else {
            self.runtime_call("new_null", 0, true);
        }
    }

    // ------ program ------

    fn compile_program(&mut self, program: &Program) {
        self.collect_declarations(program);

        // The top level is itself a frame: loop iterators, catch variables
        // and block-scoped assignments become locals of main, while direct
        // top-level assignments become globals.
        let mut seen_globals = BTreeSet::new();
        let mut main_locals = vec![];
        for stmt in &program.statements {
            match stmt {
                Stmt::Assignment { target, .. } => {
                    if let Expr::Identifier(name) = target {
                        seen_globals.insert(name.clone());
                    }
                }
                Stmt::FunctionDecl(_)
                | Stmt::ClassDecl { .. }
                | Stmt::StructDecl { .. }
                | Stmt::Import { .. }
                | Stmt::ImportNative { .. }
                | Stmt::CFunctionDecl { .. } => {}
                other => frame::collect_stmt_locals(other, &seen_globals, &mut main_locals),
            }
        }

        let main_frame = Frame::new(main_locals, ".Lmain_epilogue".to_string());
        let saved: Vec<&str> = main_frame.saved_regs().to_vec();
        self.frame = Some(main_frame);

        self.label("main");
        self.ins("push rbp");
        self.ins("mov rbp, rsp");
        for reg in &saved {
            self.ins(format!("push {reg}"));
        }
        self.ins(format!("sub rsp, {SPILL_AREA}"));

        if !self.freestanding {
            // Wire the exception machinery and the method registry before
            // any user code runs.
            self.mark_extern("register_longjmp");
            self.ins(format!("lea {}, [rip + stola_longjmp]", ARG_REGS[0]));
            self.aligned_call("register_longjmp");
            self.register_methods(program);
        }

        for stmt in &program.statements {
            match stmt {
                Stmt::FunctionDecl(decl) => {
                    let label = self.function_label(decl);
                    self.compile_function(decl, &label, false);
                }
                Stmt::ClassDecl { name, methods } => {
                    for method in methods {
                        let label = format!("method_{name}_{}", method.name);
                        self.compile_function(method, &label, true);
                    }
                }
                Stmt::StructDecl { .. } | Stmt::Import { .. } => {}
                Stmt::ImportNative { library } => {
                    let label = self.string_label(library);
                    self.ins(format!("lea {}, [rip + {label}]", ARG_REGS[0]));
                    self.mark_extern("load_dll");
                    self.aligned_call("load_dll");
                }
                Stmt::CFunctionDecl { name, .. } => {
                    let label = self.string_label(name);
                    self.ins(format!("lea {}, [rip + {label}]", ARG_REGS[0]));
                    self.mark_extern("bind_c_function");
                    self.aligned_call("bind_c_function");
                }
                other => self.compile_stmt(other),
            }
        }

        self.ins("mov rax, 0");
        self.label(".Lmain_epilogue");
        self.ins(format!("lea rsp, [rbp - {}]", 8 * saved.len()));
        for reg in saved.iter().rev() {
            self.ins(format!("pop {reg}"));
        }
        self.ins("pop rbp");
        self.ins("ret");

        self.frame = None;
    }

    fn collect_declarations(&mut self, program: &Program) {
        for stmt in &program.statements {
            match stmt {
                Stmt::FunctionDecl(decl) => {
                    let label = self.function_label(decl);
                    self.user_functions.insert(decl.name.clone(), label);
                }
                Stmt::ClassDecl { name, methods } => {
                    self.class_methods.insert(
                        name.clone(),
                        methods.iter().map(|m| m.name.clone()).collect(),
                    );
                }
                Stmt::StructDecl { name, fields } => {
                    self.struct_fields.insert(name.clone(), fields.clone());
                }
                Stmt::CFunctionDecl { name, .. } => {
                    self.c_functions.insert(name.clone());
                }
                _ => {}
            }
        }
    }

    fn function_label(&self, decl: &FunctionDecl) -> String {
        // Interrupt handlers keep their source name so they can be wired
        // into descriptor tables from inline assembly; everything else is
        // prefixed to stay clear of runtime symbols.
        if decl.is_interrupt {
            decl.name.clone()
        } else {
            format!("fn_{}", decl.name)
        }
    }

    fn register_methods(&mut self, program: &Program) {
        for stmt in &program.statements {
            let Stmt::ClassDecl { name, methods } = stmt else {
                continue;
            };
            for method in methods {
                let class_label = self.string_label(name);
                let method_label = self.string_label(&method.name);
                self.ins(format!("lea {}, [rip + {class_label}]", ARG_REGS[0]));
                self.ins(format!("lea {}, [rip + {method_label}]", ARG_REGS[1]));
                self.ins(format!(
                    "lea {}, [rip + method_{name}_{}]",
                    ARG_REGS[2], method.name
                ));
                self.mark_extern("register_method");
                self.aligned_call("register_method");
            }
        }
    }

    // ------ functions ------

    fn compile_function(&mut self, decl: &FunctionDecl, label: &str, is_method: bool) {
        let mut locals = vec![];
        if is_method {
            locals.push("this".to_string());
        }
        locals.extend(decl.parameters.iter().cloned());
        frame::collect_locals(&decl.body, &self.globals, &mut locals);

        let epilogue = format!(".L{}_epilogue", label.replace('.', "_"));
        let new_frame = Frame::new(locals, epilogue.clone());
        let saved: Vec<&str> = new_frame.saved_regs().to_vec();

        let outer_out = std::mem::take(&mut self.out);
        let outer_frame = self.frame.replace(new_frame);
        let outer_loops = std::mem::take(&mut self.loop_stack);

        self.fn_labels.push(label.to_string());
        self.label(label);

        if decl.is_interrupt {
            for reg in INTERRUPT_SAVED {
                self.ins(format!("push {reg}"));
            }
        }

        self.ins("push rbp");
        self.ins("mov rbp, rsp");
        for reg in &saved {
            self.ins(format!("push {reg}"));
        }
        self.ins(format!("sub rsp, {SPILL_AREA}"));

        // Move incoming arguments into their slots. Methods receive `this`
        // as the hidden first argument.
        let mut incoming: Vec<&str> = vec![];
        if is_method {
            incoming.push("this");
        }
        incoming.extend(decl.parameters.iter().map(|p| p.as_str()));
        for (i, name) in incoming.iter().enumerate().take(ARG_REGS.len()) {
            match self.local_location(name) {
                Some(Location::Register(reg)) => self.ins(format!("mov {reg}, {}", ARG_REGS[i])),
                Some(Location::Spill(offset)) => {
                    self.ins(format!("mov [rbp - {offset}], {}", ARG_REGS[i]))
                }
                None => {}
            }
        }

        for stmt in &decl.body.statements {
            self.compile_stmt(stmt);
        }

        // Fall-through returns null.
        if self.freestanding {
            self.ins("mov rax, 0");
        } else {
            self.mark_extern("new_null");
            self.aligned_call("new_null");
        }

        self.label(&epilogue);
        self.ins(format!("lea rsp, [rbp - {}]", 8 * saved.len()));
        for reg in saved.iter().rev() {
            self.ins(format!("pop {reg}"));
        }
        self.ins("pop rbp");
        if decl.is_interrupt {
            for reg in INTERRUPT_SAVED.iter().rev() {
                self.ins(format!("pop {reg}"));
            }
            self.ins("iretq");
        } else {
            self.ins("ret");
        }
        self.out.push('\n');

        let body = std::mem::replace(&mut self.out, outer_out);
        self.functions.push_str(&body);
        self.frame = outer_frame;
        self.loop_stack = outer_loops;
    }

    fn local_location(&self, name: &str) -> Option<Location> {
        self.frame.as_ref().and_then(|f| f.location(name))
    }

    // ------ statements ------

    fn compile_block(&mut self, block: &Block) {
        for stmt in &block.statements {
            self.compile_stmt(stmt);
        }
    }

    fn compile_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(expr) => {
                self.compile_expr(expr);
                self.ins("add rsp, 8");
            }

            Stmt::Assignment { target, value, .. } => self.compile_assignment(target, value),

            Stmt::If {
                condition,
                consequence,
                elif_branches,
                alternative,
            } => self.compile_if(condition, consequence, elif_branches, alternative.as_ref()),

            Stmt::While { condition, body } => self.compile_while(condition, body),

            Stmt::Loop {
                iterator,
                start,
                end,
                step,
                body,
            } => self.compile_loop(iterator, start, end, step.as_ref(), body),

            Stmt::ForIn {
                iterator,
                iterable,
                body,
            } => self.compile_for_in(iterator, iterable, body),

            Stmt::Match {
                subject,
                cases,
                default,
            } => self.compile_match(subject, cases, default.as_ref()),

            Stmt::Return(value) => {
                match value {
                    Some(expr) => {
                        self.compile_expr(expr);
                        self.ins("pop rax");
                    }
                    None => {
                        if self.freestanding {
                            self.ins("mov rax, 0");
                        } else {
                            self.mark_extern("new_null");
                            self.aligned_call("new_null");
                        }
                    }
                }
                let epilogue = self
                    .frame
                    .as_ref()
                    .map(|f| f.epilogue.clone())
                    .unwrap_or_else(|| ".Lmain_epilogue".to_string());
                self.ins(format!("jmp {epilogue}"));
            }

            Stmt::Break => match self.loop_stack.last().cloned() {
                Some((_, break_target)) => self.ins(format!("jmp {break_target}")),
                None => warn!("'break' outside of a loop is ignored"),
            },

            Stmt::Continue => match self.loop_stack.last().cloned() {
                Some((continue_target, _)) => self.ins(format!("jmp {continue_target}")),
                None => warn!("'continue' outside of a loop is ignored"),
            },

            Stmt::TryCatch {
                try_block,
                catch_var,
                catch_block,
            } => self.compile_try_catch(try_block, catch_var, catch_block),

            Stmt::Throw(value) => {
                self.compile_expr(value);
                self.ins(format!("pop {}", ARG_REGS[0]));
                self.mark_extern("throw");
                self.aligned_call("throw");
            }

            Stmt::AsmBlock { code } => {
                for line in code.lines() {
                    let line = line.trim();
                    if !line.is_empty() {
                        self.ins(line);
                    }
                }
            }

            Stmt::FunctionDecl(decl) => {
                // Only top-level functions and class methods are lowered.
                warn!(
                    "Nested function '{}' is not supported and was skipped",
                    decl.name
                );
            }

            Stmt::StructDecl { .. }
            | Stmt::ClassDecl { .. }
            | Stmt::Import { .. }
            | Stmt::ImportNative { .. }
            | Stmt::CFunctionDecl { .. } => {}
        }
    }

    fn store_rax_into(&mut self, name: &str) {
        match self.local_location(name) {
            Some(Location::Register(reg)) => self.ins(format!("mov {reg}, rax")),
            Some(Location::Spill(offset)) => self.ins(format!("mov [rbp - {offset}], rax")),
            None => {
                if !self.globals.contains(name) {
                    self.globals.insert(name.to_string());
                    self.global_order.push(name.to_string());
                }
                self.ins(format!("mov [rip + g_{name}], rax"));
            }
        }
    }

    fn compile_assignment(&mut self, target: &Expr, value: &Expr) {
        match target {
            Expr::Identifier(name) => {
                let name = name.clone();
                self.compile_expr(value);
                self.ins("pop rax");
                self.store_rax_into(&name);
            }
            Expr::Member {
                object,
                property,
                is_computed,
            } => {
                self.compile_expr(object);
                if *is_computed {
                    self.compile_expr(property);
                } else {
                    self.push_property_name(property);
                }
                self.compile_expr(value);
                let entry = if *is_computed { "array_set" } else { "struct_set" };
                self.runtime_call(entry, 3, false);
            }
            other => {
                warn!("Invalid assignment target {other:?}; statement skipped");
            }
        }
    }

    /// Push the dot-property name as a string value.
    fn push_property_name(&mut self, property: &Expr) {
        let name = match property {
            Expr::Identifier(name) => name.clone(),
            Expr::Str(text) => text.clone(),
            other => {
                warn!("Unsupported property expression {other:?}");
                String::new()
            }
        };
        let label = self.string_label(&name);
        self.ins(format!("lea {}, [rip + {label}]", ARG_REGS[0]));
        self.runtime_call("new_string", 0, true);
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        consequence: &Block,
        elif_branches: &[(Expr, Block)],
        alternative: Option<&Block>,
    ) {
        let end = self.new_label("if_end");

        let mut next = self.new_label("if_else");
        self.compile_expr(condition);
        self.jump_unless_truthy(&next);
        self.compile_block(consequence);
        self.ins(format!("jmp {end}"));

        for (elif_condition, elif_block) in elif_branches {
            self.label(&next);
            next = self.new_label("if_else");
            self.compile_expr(elif_condition);
            self.jump_unless_truthy(&next);
            self.compile_block(elif_block);
            self.ins(format!("jmp {end}"));
        }

        self.label(&next);
        if let Some(alternative) = alternative {
            self.compile_block(alternative);
        }
        self.label(&end);
    }

    fn compile_while(&mut self, condition: &Expr, body: &Block) {
        let head = self.new_label("while_head");
        let end = self.new_label("while_end");

        self.label(&head);
        self.compile_expr(condition);
        self.jump_unless_truthy(&end);

        self.loop_stack.push((head.clone(), end.clone()));
        self.compile_block(body);
        self.loop_stack.pop();

        self.ins(format!("jmp {head}"));
        self.label(&end);
    }

    fn load_local(&mut self, name: &str) {
        match self.local_location(name) {
            Some(Location::Register(reg)) => self.ins(format!("push {reg}")),
            Some(Location::Spill(offset)) => {
                self.ins(format!("mov rax, [rbp - {offset}]"));
                self.ins("push rax");
            }
            None => {
                self.ins(format!("mov rax, [rip + g_{name}]"));
                self.ins("push rax");
            }
        }
    }

    fn compile_loop(
        &mut self,
        iterator: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &Block,
    ) {
        let head = self.new_label("loop_head");
        let increment = self.new_label("loop_inc");
        let end_label = self.new_label("loop_end");

        self.compile_expr(start);
        self.ins("pop rax");
        self.store_rax_into(iterator);

        self.label(&head);
        self.load_local(iterator);
        self.compile_expr(end);
        if self.freestanding {
            self.ins("pop rcx");
            self.ins("pop rax");
            self.ins("cmp rax, rcx");
            self.ins(format!("jge {end_label}"));
        } else {
            self.runtime_call("lt", 2, true);
            self.jump_unless_truthy(&end_label);
        }

        self.loop_stack.push((increment.clone(), end_label.clone()));
        self.compile_block(body);
        self.loop_stack.pop();

        self.label(&increment);
        self.load_local(iterator);
        match step {
            Some(step) => self.compile_expr(step),
            None => {
                if self.freestanding {
                    self.ins("mov rax, 1");
                    self.ins("push rax");
                } else {
                    self.ins(format!("mov {}, 1", ARG_REGS[0]));
                    self.runtime_call("new_int", 0, true);
                }
            }
        }
        if self.freestanding {
            self.ins("pop rcx");
            self.ins("pop rax");
            self.ins("add rax, rcx");
        } else {
            self.runtime_call("add", 2, true);
            self.ins("pop rax");
        }
        self.store_rax_into(iterator);
        self.ins(format!("jmp {head}"));

        self.label(&end_label);
    }

    /// `for x in it` drives the runtime iteration protocol: `length` bounds
    /// the loop, `array_get` yields elements (dict keys, string chars). The
    /// iterable and the index value live on the machine stack for the
    /// duration of the loop.
    fn compile_for_in(&mut self, iterator: &str, iterable: &Expr, body: &Block) {
        let head = self.new_label("for_head");
        let increment = self.new_label("for_inc");
        let cleanup = self.new_label("for_cleanup");
        let end = self.new_label("for_end");

        self.compile_expr(iterable);
        self.ins(format!("mov {}, 0", ARG_REGS[0]));
        self.runtime_call("new_int", 0, true);

        // Stack: [iterable, index]
        self.label(&head);
        self.ins("mov rax, [rsp]");
        self.ins("push rax");
        self.ins("mov rax, [rsp + 16]");
        self.ins("push rax");
        self.runtime_call("length", 1, true);
        self.runtime_call("lt", 2, true);
        self.jump_unless_truthy(&cleanup);

        self.ins("mov rax, [rsp + 8]");
        self.ins("push rax");
        self.ins("mov rax, [rsp + 8]");
        self.ins("push rax");
        self.runtime_call("array_get", 2, true);
        self.ins("pop rax");
        self.store_rax_into(iterator);

        self.loop_stack.push((increment.clone(), cleanup.clone()));
        self.compile_block(body);
        self.loop_stack.pop();

        self.label(&increment);
        self.ins("mov rax, [rsp]");
        self.ins("push rax");
        self.ins(format!("mov {}, 1", ARG_REGS[0]));
        self.runtime_call("new_int", 0, true);
        self.runtime_call("add", 2, true);
        self.ins("pop rax");
        self.ins("mov [rsp], rax");
        self.ins(format!("jmp {head}"));

        self.label(&cleanup);
        self.ins("add rsp, 16");
        self.label(&end);
    }

    fn compile_match(&mut self, subject: &Expr, cases: &[(Expr, Block)], default: Option<&Block>) {
        let end = self.new_label("match_end");
        let case_labels: Vec<String> = (0..cases.len())
            .map(|_| self.new_label("match_case"))
            .collect();

        self.compile_expr(subject);

        // Dispatch chain; the subject stays on the stack until a branch is
        // chosen.
        for (i, (case_expr, _)) in cases.iter().enumerate() {
            self.ins("mov rax, [rsp]");
            self.ins("push rax");
            self.compile_expr(case_expr);
            if self.freestanding {
                self.ins("pop rcx");
                self.ins("pop rax");
                self.ins("cmp rax, rcx");
                self.ins(format!("je {}", case_labels[i]));
            } else {
                self.runtime_call("eq", 2, true);
                self.ins(format!("pop {}", ARG_REGS[0]));
                self.mark_extern("is_truthy");
                self.aligned_call("is_truthy");
                self.ins("cmp rax, 0");
                self.ins(format!("jne {}", case_labels[i]));
            }
        }

        self.ins("add rsp, 8");
        if let Some(default) = default {
            self.compile_block(default);
        }
        self.ins(format!("jmp {end}"));

        for (i, (_, consequence)) in cases.iter().enumerate() {
            self.label(&case_labels[i]);
            self.ins("add rsp, 8");
            self.compile_block(consequence);
            self.ins(format!("jmp {end}"));
        }

        self.label(&end);
    }

    fn compile_try_catch(&mut self, try_block: &Block, catch_var: &str, catch_block: &Block) {
        let catch_label = self.new_label("catch");
        let end = self.new_label("try_end");

        self.mark_extern("push_try");
        self.aligned_call("push_try");
        self.ins(format!("mov {}, rax", ARG_REGS[0]));
        // Deliberately not routed through the aligned-call helper: the
        // helper's spill slot would be clobbered by try-body stack traffic
        // before longjmp restores rsp through the saved frame.
        self.ins("call stola_setjmp");
        self.ins("cmp rax, 0");
        self.ins(format!("jne {catch_label}"));

        self.compile_block(try_block);
        self.mark_extern("pop_try");
        self.aligned_call("pop_try");
        self.ins(format!("jmp {end}"));

        self.label(&catch_label);
        self.mark_extern("get_error");
        self.aligned_call("get_error");
        self.store_rax_into(catch_var);
        self.compile_block(catch_block);

        self.label(&end);
    }

    // ------ expressions ------

    fn compile_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Number(text) => {
                let value = Expr::number_value(text);
                if self.freestanding {
                    self.ins(format!("mov rax, {value}"));
                    self.ins("push rax");
                } else {
                    self.ins(format!("mov {}, {value}", ARG_REGS[0]));
                    self.runtime_call("new_int", 0, true);
                }
            }

            Expr::Str(text) => {
                let text = text.clone();
                if self.freestanding {
                    warn!("String literals are unsupported in freestanding mode");
                    self.ins("push 0");
                    return;
                }
                let label = self.string_label(&text);
                self.ins(format!("lea {}, [rip + {label}]", ARG_REGS[0]));
                self.runtime_call("new_string", 0, true);
            }

            Expr::Boolean(value) => {
                let value = i64::from(*value);
                if self.freestanding {
                    self.ins(format!("mov rax, {value}"));
                    self.ins("push rax");
                } else {
                    self.ins(format!("mov {}, {value}", ARG_REGS[0]));
                    self.runtime_call("new_bool", 0, true);
                }
            }

            Expr::Null => self.push_null(),

            Expr::Identifier(name) => self.compile_identifier(name),

            Expr::This => self.compile_identifier("this"),

            Expr::Unary { op, right } => {
                self.compile_expr(right);
                if self.freestanding {
                    match op.kind {
                        TokenKind::Minus => {
                            self.ins("pop rax");
                            self.ins("neg rax");
                            self.ins("push rax");
                        }
                        _ => {
                            self.ins("pop rax");
                            self.ins("cmp rax, 0");
                            self.ins("sete al");
                            self.ins("movzx rax, al");
                            self.ins("push rax");
                        }
                    }
                } else {
                    let entry = match op.kind {
                        TokenKind::Minus => "neg",
                        _ => "not",
                    };
                    self.runtime_call(entry, 1, true);
                }
            }

            Expr::Binary { op, left, right } => {
                self.compile_expr(left);
                self.compile_expr(right);
                if self.freestanding {
                    self.compile_native_binary(op.kind);
                } else {
                    let entry = match op.kind {
                        TokenKind::Plus => "add",
                        TokenKind::Minus => "sub",
                        TokenKind::Times => "mul",
                        TokenKind::DividedBy => "div",
                        TokenKind::Modulo => "mod",
                        TokenKind::Power => "pow",
                        TokenKind::Equals => "eq",
                        TokenKind::NotEquals => "neq",
                        TokenKind::LessThan => "lt",
                        TokenKind::GreaterThan => "gt",
                        TokenKind::LessOrEquals => "le",
                        TokenKind::GreaterOrEquals => "ge",
                        TokenKind::And => "and",
                        TokenKind::Or => "or",
                        other => {
                            warn!("Unknown binary operator {other}; using add");
                            "add"
                        }
                    };
                    self.runtime_call(entry, 2, true);
                }
            }

            Expr::Call { function, args } => self.compile_call(function, args),

            Expr::Array(elements) => {
                self.runtime_call("new_array", 0, true);
                for element in elements {
                    self.ins("mov rax, [rsp]");
                    self.ins("push rax");
                    self.compile_expr(element);
                    self.runtime_call("push", 2, false);
                }
            }

            Expr::Dict(pairs) => {
                self.runtime_call("new_dict", 0, true);
                for (key, value) in pairs {
                    self.ins("mov rax, [rsp]");
                    self.ins("push rax");
                    self.push_property_name(key);
                    self.compile_expr(value);
                    self.runtime_call("dict_set", 3, false);
                }
            }

            Expr::Member {
                object,
                property,
                is_computed,
            } => {
                self.compile_expr(object);
                if *is_computed {
                    self.compile_expr(property);
                    self.runtime_call("array_get", 2, true);
                } else {
                    self.push_property_name(property);
                    self.runtime_call("struct_get", 2, true);
                }
            }

            Expr::New { class_name, args } => self.compile_new(class_name, args),
        }
    }

    fn compile_identifier(&mut self, name: &str) {
        if self.local_location(name).is_some() {
            self.load_local(name);
            return;
        }
        if self.globals.contains(name) {
            self.ins(format!("mov rax, [rip + g_{name}]"));
            self.ins("push rax");
            return;
        }
        if let Some(label) = self.user_functions.get(name).cloned() {
            // Function referenced as a value: push the raw code pointer
            // (consumed by thread_spawn).
            self.ins(format!("lea rax, [rip + {label}]"));
            self.ins("push rax");
            return;
        }
        if let Some(builtin) = builtins::lookup(name) {
            self.mark_extern(builtin.entry);
            self.ins(format!("lea rax, [rip + {}]", builtin.entry));
            self.ins("push rax");
            return;
        }
        // Unresolved after analysis; keep the stack balanced.
        warn!("Unresolved identifier '{name}' at code generation");
        self.ins("push 0");
    }

    fn compile_native_binary(&mut self, op: TokenKind) {
        match op {
            TokenKind::Plus => {
                self.ins("pop rcx");
                self.ins("pop rax");
                self.ins("add rax, rcx");
                self.ins("push rax");
            }
            TokenKind::Minus => {
                self.ins("pop rcx");
                self.ins("pop rax");
                self.ins("sub rax, rcx");
                self.ins("push rax");
            }
            TokenKind::Times => {
                self.ins("pop rcx");
                self.ins("pop rax");
                self.ins("imul rax, rcx");
                self.ins("push rax");
            }
            TokenKind::DividedBy | TokenKind::Modulo => {
                self.ins("pop rcx");
                self.ins("pop rax");
                self.ins("cqo");
                self.ins("idiv rcx");
                if op == TokenKind::Modulo {
                    self.ins("push rdx");
                } else {
                    self.ins("push rax");
                }
            }
            TokenKind::Power => {
                let head = self.new_label("pow_head");
                let end = self.new_label("pow_end");
                self.ins("pop rcx");
                self.ins("pop rax");
                self.ins("mov r10, rax");
                self.ins("mov rax, 1");
                self.label(&head);
                self.ins("cmp rcx, 0");
                self.ins(format!("jle {end}"));
                self.ins("imul rax, r10");
                self.ins("dec rcx");
                self.ins(format!("jmp {head}"));
                self.label(&end);
                self.ins("push rax");
            }
            TokenKind::Equals
            | TokenKind::NotEquals
            | TokenKind::LessThan
            | TokenKind::GreaterThan
            | TokenKind::LessOrEquals
            | TokenKind::GreaterOrEquals => {
                let set = match op {
                    TokenKind::Equals => "sete",
                    TokenKind::NotEquals => "setne",
                    TokenKind::LessThan => "setl",
                    TokenKind::GreaterThan => "setg",
                    TokenKind::LessOrEquals => "setle",
                    _ => "setge",
                };
                self.ins("pop rcx");
                self.ins("pop rax");
                self.ins("cmp rax, rcx");
                self.ins(format!("{set} al"));
                self.ins("movzx rax, al");
                self.ins("push rax");
            }
            TokenKind::And | TokenKind::Or => {
                let combine = if op == TokenKind::And { "and" } else { "or" };
                self.ins("pop rcx");
                self.ins("pop rax");
                self.ins("test rax, rax");
                self.ins("setne al");
                self.ins("test rcx, rcx");
                self.ins("setne cl");
                self.ins(format!("{combine} al, cl"));
                self.ins("movzx rax, al");
                self.ins("push rax");
            }
            other => warn!("Unknown native binary operator {other}"),
        }
    }

    fn compile_call(&mut self, function: &Expr, args: &[Expr]) {
        // obj.method(a, b) dispatches through the runtime method registry.
        if let Expr::Member {
            object,
            property,
            is_computed: false,
        } = function
        {
            let method = match property.as_ref() {
                Expr::Identifier(name) => name.clone(),
                _ => String::new(),
            };
            self.compile_expr(object);
            for i in 0..2 {
                match args.get(i) {
                    Some(arg) => self.compile_expr(arg),
                    None => self.push_null(),
                }
            }
            self.ins(format!("pop {}", ARG_REGS[3]));
            self.ins(format!("pop {}", ARG_REGS[2]));
            self.ins(format!("pop {}", ARG_REGS[0]));
            let label = self.string_label(&method);
            self.ins(format!("lea {}, [rip + {label}]", ARG_REGS[1]));
            self.mark_extern("invoke_method");
            self.aligned_call("invoke_method");
            self.ins("push rax");
            return;
        }

        let Expr::Identifier(name) = function else {
            warn!("Unsupported call target {function:?}");
            self.push_null();
            return;
        };
        let name = name.clone();

        if self.freestanding {
            match name.as_str() {
                "memory_read" => {
                    self.compile_arg_or_zero(args, 0);
                    self.ins("pop rax");
                    self.ins("mov rax, [rax]");
                    self.ins("push rax");
                    return;
                }
                "memory_write" => {
                    self.compile_arg_or_zero(args, 0);
                    self.compile_arg_or_zero(args, 1);
                    self.ins("pop rcx");
                    self.ins("pop rax");
                    self.ins("mov [rax], rcx");
                    self.ins("push rcx");
                    return;
                }
                "memory_write_byte" => {
                    self.compile_arg_or_zero(args, 0);
                    self.compile_arg_or_zero(args, 1);
                    self.ins("pop rcx");
                    self.ins("pop rax");
                    self.ins("mov [rax], cl");
                    self.ins("push rcx");
                    return;
                }
                _ => {}
            }

            if let Some(label) = self.user_functions.get(&name).cloned() {
                let count = args.len().min(ARG_REGS.len());
                for arg in args.iter().take(count) {
                    self.compile_expr(arg);
                }
                for i in (0..count).rev() {
                    self.ins(format!("pop {}", ARG_REGS[i]));
                }
                self.ins(format!("call {label}"));
                self.ins("push rax");
                return;
            }

            warn!("Call to '{name}' cannot be lowered in freestanding mode");
            self.ins("push 0");
            return;
        }

        // Struct constructors allocate and fill field by field.
        if let Some(fields) = self.struct_fields.get(&name).cloned() {
            let type_label = self.string_label(&name);
            self.ins(format!("lea {}, [rip + {type_label}]", ARG_REGS[0]));
            self.runtime_call("new_struct", 0, true);
            for (field, arg) in fields.iter().zip(args) {
                self.ins("mov rax, [rsp]");
                self.ins("push rax");
                let field_label = self.string_label(field);
                self.ins(format!("lea {}, [rip + {field_label}]", ARG_REGS[0]));
                self.runtime_call("new_string", 0, true);
                self.compile_expr(arg);
                self.runtime_call("struct_set", 3, false);
            }
            return;
        }

        if self.c_functions.contains(&name) {
            self.compile_c_call(&name, args);
            return;
        }

        if let Some(label) = self.user_functions.get(&name).cloned() {
            let count = args.len().min(ARG_REGS.len());
            for arg in args.iter().take(count) {
                self.compile_expr(arg);
            }
            for i in (0..count).rev() {
                self.ins(format!("pop {}", ARG_REGS[i]));
            }
            self.aligned_call(&label);
            self.ins("push rax");
            return;
        }

        if let Some(builtin) = builtins::lookup(&name) {
            for i in 0..builtin.arity {
                match args.get(i) {
                    Some(arg) => self.compile_expr(arg),
                    None => self.push_null(),
                }
            }
            self.runtime_call(builtin.entry, builtin.arity, true);
            return;
        }

        warn!("Call to unknown function '{name}'");
        self.push_null();
    }

    fn compile_arg_or_zero(&mut self, args: &[Expr], index: usize) {
        match args.get(index) {
            Some(arg) => self.compile_expr(arg),
            None => self.ins("push 0"),
        }
    }

    /// `invoke_c_function(name, a1..a4)` carries five arguments; the fifth
    /// travels in r8 on System V and in the stack slot above the shadow
    /// space on Windows.
    fn compile_c_call(&mut self, name: &str, args: &[Expr]) {
        let label = self.string_label(name);
        self.ins(format!("lea rax, [rip + {label}]"));
        self.ins("push rax");
        for i in 0..4 {
            match args.get(i) {
                Some(arg) => self.compile_expr(arg),
                None => self.ins("push 0"),
            }
        }

        self.ins("pop r10");
        self.ins(format!("pop {}", ARG_REGS[3]));
        self.ins(format!("pop {}", ARG_REGS[2]));
        self.ins(format!("pop {}", ARG_REGS[1]));
        self.ins(format!("pop {}", ARG_REGS[0]));

        self.mark_extern("invoke_c_function");
        self.ins("mov r11, rsp");
        self.ins("and rsp, -16");
        self.ins(format!("sub rsp, {CALL_FRAME}"));
        self.ins(format!("mov [rsp + {SAVED_RSP_OFFSET}], r11"));
        match FIFTH_ARG_REG {
            Some(reg) => self.ins(format!("mov {reg}, r10")),
            None => self.ins(format!("mov [rsp + {STACK_ARG_OFFSET}], r10")),
        }
        self.ins("call invoke_c_function");
        self.ins(format!("mov rsp, [rsp + {SAVED_RSP_OFFSET}]"));
        self.ins("push rax");
    }

    fn compile_new(&mut self, class_name: &str, args: &[Expr]) {
        let type_label = self.string_label(class_name);
        self.ins(format!("lea {}, [rip + {type_label}]", ARG_REGS[0]));
        self.runtime_call("new_struct", 0, true);

        let has_init = self
            .class_methods
            .get(class_name)
            .map(|methods| methods.iter().any(|m| m == "init"))
            .unwrap_or(false);
        if !has_init {
            return;
        }

        self.ins("mov rax, [rsp]");
        self.ins("push rax");
        for i in 0..2 {
            match args.get(i) {
                Some(arg) => self.compile_expr(arg),
                None => self.push_null(),
            }
        }
        self.ins(format!("pop {}", ARG_REGS[3]));
        self.ins(format!("pop {}", ARG_REGS[2]));
        self.ins(format!("pop {}", ARG_REGS[0]));
        let init_label = self.string_label("init");
        self.ins(format!("lea {}, [rip + {init_label}]", ARG_REGS[1]));
        self.mark_extern("invoke_method");
        self.aligned_call("invoke_method");
    }

    // ------ final assembly ------

    fn assemble(&mut self) -> String {
        let mut output = String::new();
        output.push_str(".intel_syntax noprefix\n\n");

        if !self.freestanding && !self.externs.is_empty() {
            for symbol in &self.externs {
                output.push_str(&format!(".extern {symbol}\n"));
            }
            output.push('\n');
        }

        output.push_str(".global main\n");
        for label in &self.fn_labels {
            output.push_str(&format!(".global {label}\n"));
        }
        output.push('\n');

        if !self.data.is_empty() {
            output.push_str(".data\n");
            for line in &self.data {
                output.push_str(line);
                output.push('\n');
            }
            output.push('\n');
        }

        for name in &self.global_order {
            output.push_str(&format!(".lcomm g_{name}, 8\n"));
        }
        if !self.global_order.is_empty() {
            output.push('\n');
        }

        output.push_str(".text\n");
        output.push_str(&self.functions);

        if !self.freestanding {
            output.push_str(&setjmp_longjmp_text());
        }

        output.push_str(&self.out);
        output
    }
}

/// The custom setjmp/longjmp pair the generated code uses for try/catch.
/// It saves exactly ten slots (rbx, rbp, r12-r15, rsi, rdi, rsp, return
/// address) and no FPU/SSE state; `throw` longjmps into the top try frame
/// with a return value of 1.
fn setjmp_longjmp_text() -> String {
    let a0 = ARG_REGS[0];
    let a1 = ARG_REGS[1];
    format!(
        "\n.global stola_setjmp\n\
         stola_setjmp:\n    \
         mov [{a0} + 0], rbx\n    \
         mov [{a0} + 8], rbp\n    \
         mov [{a0} + 16], r12\n    \
         mov [{a0} + 24], r13\n    \
         mov [{a0} + 32], r14\n    \
         mov [{a0} + 40], r15\n    \
         mov [{a0} + 48], rsi\n    \
         mov [{a0} + 56], rdi\n    \
         lea rax, [rsp + 8]\n    \
         mov [{a0} + 64], rax\n    \
         mov rax, [rsp]\n    \
         mov [{a0} + 72], rax\n    \
         xor eax, eax\n    \
         ret\n\
         \n.global stola_longjmp\n\
         stola_longjmp:\n    \
         mov rax, {a1}\n    \
         mov rbx, [{a0} + 0]\n    \
         mov rbp, [{a0} + 8]\n    \
         mov r12, [{a0} + 16]\n    \
         mov r13, [{a0} + 24]\n    \
         mov r14, [{a0} + 32]\n    \
         mov r15, [{a0} + 40]\n    \
         mov rsi, [{a0} + 48]\n    \
         mov rsp, [{a0} + 64]\n    \
         mov r10, [{a0} + 72]\n    \
         mov rdi, [{a0} + 56]\n    \
         jmp r10\n\n"
    )
}

fn escape_asciz(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'"' => escaped.push_str("\\\""),
            b'\\' => escaped.push_str("\\\\"),
            b'\n' => escaped.push_str("\\n"),
            b'\t' => escaped.push_str("\\t"),
            b'\r' => escaped.push_str("\\r"),
            0x20..=0x7e => escaped.push(byte as char),
            other => escaped.push_str(&format!("\\{other:03o}")),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn compile(source: &str) -> String {
        let mut parser = Parser::from_source(source);
        let program = parser.parse_program();
        assert!(parser.errors.is_empty(), "parse errors: {:?}", parser.errors);
        generate(&program, false)
    }

    fn compile_freestanding(source: &str) -> String {
        let mut parser = Parser::from_source(source);
        let program = parser.parse_program();
        assert!(parser.errors.is_empty(), "parse errors: {:?}", parser.errors);
        generate(&program, true)
    }

    #[test]
    fn hello_world_shape() {
        let asm = compile("print(\"hi\")\n");
        assert!(asm.starts_with(".intel_syntax noprefix"));
        assert!(asm.contains(".global main"));
        assert!(asm.contains(".str0: .asciz \"hi\""));
        assert!(asm.contains("call new_string"));
        assert!(asm.contains("call print_value"));
        assert!(asm.contains(".extern print_value"));
        assert!(asm.contains(".extern new_string"));
    }

    #[test]
    fn string_literals_are_deduplicated() {
        let asm = compile("print(\"x\")\nprint(\"x\")\n");
        assert_eq!(asm.matches(".asciz \"x\"").count(), 1);
    }

    #[test]
    fn every_call_site_restores_rsp() {
        let asm = compile("x = 1 + 2\nprint(x)\n");
        // The aligned-call helper brackets every external call.
        let calls = asm
            .lines()
            .filter(|l| l.trim().starts_with("call ") && !l.contains("stola_setjmp"))
            .count();
        let realigns = asm.matches("and rsp, -16").count();
        assert_eq!(calls, realigns);
    }

    #[test]
    fn setjmp_is_called_directly() {
        let asm = compile("try\nthrow \"boom\"\ncatch e\nprint(e)\nend\n");
        // The call to stola_setjmp must not be preceded by the alignment
        // thunk within the try emission.
        let lines: Vec<&str> = asm.lines().map(|l| l.trim()).collect();
        let idx = lines
            .iter()
            .position(|l| *l == "call stola_setjmp")
            .expect("setjmp call emitted");
        assert_ne!(lines[idx - 1], "mov [rsp + 8], r11");
        assert!(asm.contains("call push_try"));
        assert!(asm.contains("call pop_try"));
        assert!(asm.contains("call get_error"));
        assert!(asm.contains(".global stola_setjmp"));
        assert!(asm.contains(".global stola_longjmp"));
    }

    #[test]
    fn functions_get_prologue_epilogue_and_mangled_labels() {
        let asm = compile("function f(a)\nreturn a\nend\nf(1)\n");
        assert!(asm.contains("fn_f:"));
        assert!(asm.contains(".global fn_f"));
        assert!(asm.contains(".Lfn_f_epilogue:"));
        assert!(asm.contains(&format!("sub rsp, {SPILL_AREA}")));
        assert!(asm.contains("call fn_f"));
    }

    #[test]
    fn locals_use_callee_saved_registers() {
        let asm = compile("function f()\nx = 1\ny = 2\nreturn x\nend\nf()\n");
        assert!(asm.contains("mov r12, rax"));
        assert!(asm.contains("mov r13, rax"));
    }

    #[test]
    fn top_level_assignments_are_globals() {
        let asm = compile("x = 3\nprint(x)\n");
        assert!(asm.contains(".lcomm g_x, 8"));
        assert!(asm.contains("mov [rip + g_x], rax"));
        assert!(asm.contains("mov rax, [rip + g_x]"));
    }

    #[test]
    fn loop_compiles_to_lt_and_add_cycle() {
        let asm = compile("loop i from 1 to 4\nprint(i)\nend\n");
        assert!(asm.contains("call lt"));
        assert!(asm.contains("call add"));
        assert!(asm.contains("call is_truthy"));
    }

    #[test]
    fn class_methods_are_registered_in_main() {
        let asm = compile("class C\nfunction init()\nthis.n = 7\nend\nend\no = new C()\n");
        assert!(asm.contains("method_C_init:"));
        assert!(asm.contains("call register_method"));
        assert!(asm.contains("call register_longjmp"));
        assert!(asm.contains("call new_struct"));
        assert!(asm.contains("call invoke_method"));
    }

    #[test]
    fn method_calls_go_through_invoke_method() {
        let asm =
            compile("class C\nfunction get()\nreturn this.n\nend\nend\no = new C()\nprint(o.get())\n");
        assert!(asm.contains("call invoke_method"));
        assert!(asm.contains("call struct_get"));
    }

    #[test]
    fn freestanding_has_no_externs_and_native_arithmetic() {
        let asm = compile_freestanding("x = 1 + 2\ny = x * 3\n");
        assert!(!asm.contains(".extern"));
        assert!(!asm.contains("new_int"));
        assert!(asm.contains("add rax, rcx"));
        assert!(asm.contains("imul rax, rcx"));
        assert!(!asm.contains("stola_setjmp"));
    }

    #[test]
    fn freestanding_division_uses_cqo_idiv() {
        let asm = compile_freestanding("x = 7 divided by 2\ny = 7 modulo 2\n");
        assert!(asm.contains("cqo"));
        assert!(asm.contains("idiv rcx"));
        assert!(asm.contains("push rdx"));
    }

    #[test]
    fn freestanding_memory_builtins_are_inline() {
        let asm = compile_freestanding("x = memory_read(4096)\nmemory_write(4096, 1)\n");
        assert!(asm.contains("mov rax, [rax]"));
        assert!(asm.contains("mov [rax], rcx"));
        assert!(!asm.contains("call memory_read"));
    }

    #[test]
    fn interrupt_functions_save_everything_and_iretq() {
        let asm = compile_freestanding("interrupt function isr()\nx = 1\nend\n");
        assert!(asm.contains("isr:"));
        assert!(asm.contains(".global isr"));
        assert!(asm.contains("iretq"));
        assert!(asm.contains("push r11"));
    }

    #[test]
    fn asm_blocks_are_verbatim_with_indentation() {
        let asm = compile_freestanding("asm {\n  mov rax, 60\n\n  syscall\n}\n");
        assert!(asm.contains("    mov rax, 60\n"));
        assert!(asm.contains("    syscall\n"));
    }

    #[test]
    fn import_native_and_c_function_bind_at_startup() {
        let asm = compile("import_native \"libm\"\nc_function c_sqrt(number)\nx = c_sqrt(4)\n");
        assert!(asm.contains("call load_dll"));
        assert!(asm.contains("call bind_c_function"));
        assert!(asm.contains("call invoke_c_function"));
    }

    #[test]
    fn match_emits_eq_chain_with_default() {
        let asm = compile("match 2\ncase 1\nprint(1)\ncase 2\nprint(2)\ndefault\nprint(0)\nend\n");
        assert_eq!(asm.matches("call eq").count(), 2);
    }

    #[test]
    fn break_and_continue_target_loop_labels() {
        let asm = compile("while true\nbreak\ncontinue\nend\n");
        let break_jump = asm
            .lines()
            .find(|l| l.trim().starts_with("jmp .Lwhile_end"))
            .is_some();
        assert!(break_jump);
    }

    #[test]
    fn emitted_runtime_entries_are_in_the_closed_list() {
        // Every `.extern` the generator can reference must be a runtime
        // entry point from the interface list.
        let asm = compile(concat!(
            "import_native \"x\"\nc_function cf(number)\n",
            "a = [1]\nd = { k: 1 }\ns = \"s\"\n",
            "print(a[0] plus d.k power 2)\n",
            "try\nthrow 1\ncatch e\nprint(e)\nend\n",
            "for v in a\nprint(v)\nend\n",
            "cf(1)\n",
        ));
        const CLOSED: &[&str] = &[
            "add", "sub", "mul", "div", "mod", "pow", "neg", "eq", "neq", "lt", "gt", "le", "ge",
            "and", "or", "not", "is_truthy", "new_int", "new_bool", "new_string", "new_null",
            "new_array", "new_dict", "new_struct", "push", "pop", "shift", "unshift", "length",
            "array_get", "array_set", "dict_get", "dict_set", "struct_get", "struct_set",
            "to_string", "to_number", "string_split", "string_starts_with", "string_ends_with",
            "string_contains", "string_substring", "string_index_of", "string_replace",
            "string_trim", "uppercase", "lowercase", "print_value", "read_file", "write_file",
            "append_file", "file_exists", "socket_connect", "socket_send", "socket_receive",
            "socket_close", "ws_connect", "ws_send", "ws_receive", "ws_close", "ws_server_create",
            "ws_server_accept", "ws_server_close", "ws_select", "http_fetch", "json_encode",
            "json_decode", "current_time", "sleep", "random", "floor", "ceil", "round",
            "thread_spawn", "thread_join", "mutex_create", "mutex_lock", "mutex_unlock",
            "register_method", "invoke_method", "load_dll", "bind_c_function",
            "invoke_c_function", "push_try", "pop_try", "throw", "get_error", "register_longjmp",
        ];
        for line in asm.lines() {
            if let Some(symbol) = line.strip_prefix(".extern ") {
                assert!(CLOSED.contains(&symbol), "unknown runtime symbol {symbol}");
            }
        }
    }
}
