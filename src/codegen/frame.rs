//! Per-function storage for locals.
//!
//! A first-fit allocator hands the first five distinct locals a
//! callee-saved register (saved in the prologue, restored in the epilogue);
//! any further locals land in a 512-byte spill area addressed by a name
//! hash. The hash scheme can collide; keeping the first five locals in
//! registers covers typical functions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::ast::{Block, Expr, Stmt};

/// Callee-saved registers handed out to locals, in first-fit order.
pub const LOCAL_REGS: [&str; 5] = ["r12", "r13", "r14", "r15", "rbx"];

/// Size of the per-frame spill area.
pub const SPILL_AREA: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Register(&'static str),
    /// Offset below rbp.
    Spill(usize),
}

fn spill_hash(name: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    ((hasher.finish() as usize % 64) + 1) * 8
}

#[derive(Debug)]
pub struct Frame {
    registers: Vec<String>,
    spills: Vec<String>,
    pub epilogue: String,
}

impl Frame {
    pub fn new(locals: Vec<String>, epilogue: String) -> Self {
        let mut registers = vec![];
        let mut spills = vec![];
        for name in locals {
            if registers.contains(&name) || spills.contains(&name) {
                continue;
            }
            if registers.len() < LOCAL_REGS.len() {
                registers.push(name);
            } else {
                spills.push(name);
            }
        }
        Self {
            registers,
            spills,
            epilogue,
        }
    }

    /// Registers this frame must save in its prologue.
    pub fn saved_regs(&self) -> &'static [&'static str] {
        &LOCAL_REGS[..self.registers.len()]
    }

    pub fn location(&self, name: &str) -> Option<Location> {
        if let Some(idx) = self.registers.iter().position(|n| n == name) {
            return Some(Location::Register(LOCAL_REGS[idx]));
        }
        if self.spills.iter().any(|n| n == name) {
            // Spill slots sit below the pushed callee-saved registers.
            let offset = 8 * self.registers.len() + spill_hash(name);
            return Some(Location::Spill(offset));
        }
        None
    }
}

/// Collect the names that become locals of a function body, in first-use
/// order: assignment targets (unless the name is a known global), loop and
/// for-in iterators, and catch variables.
pub fn collect_locals(
    block: &Block,
    globals: &std::collections::BTreeSet<String>,
    out: &mut Vec<String>,
) {
    for stmt in &block.statements {
        collect_stmt_locals(stmt, globals, out);
    }
}

pub fn collect_stmt_locals(
    stmt: &Stmt,
    globals: &std::collections::BTreeSet<String>,
    out: &mut Vec<String>,
) {
    match stmt {
        Stmt::Assignment { target, .. } => {
            if let Expr::Identifier(name) = target {
                if !globals.contains(name) && !out.contains(name) {
                    out.push(name.clone());
                }
            }
        }
        Stmt::If {
            consequence,
            elif_branches,
            alternative,
            ..
        } => {
            collect_locals(consequence, globals, out);
            for (_, block) in elif_branches {
                collect_locals(block, globals, out);
            }
            if let Some(alt) = alternative {
                collect_locals(alt, globals, out);
            }
        }
        Stmt::While { body, .. } => collect_locals(body, globals, out),
        Stmt::Loop { iterator, body, .. } | Stmt::ForIn { iterator, body, .. } => {
            if !out.contains(iterator) {
                out.push(iterator.clone());
            }
            collect_locals(body, globals, out);
        }
        Stmt::Match { cases, default, .. } => {
            for (_, block) in cases {
                collect_locals(block, globals, out);
            }
            if let Some(default) = default {
                collect_locals(default, globals, out);
            }
        }
        Stmt::TryCatch {
            try_block,
            catch_var,
            catch_block,
        } => {
            collect_locals(try_block, globals, out);
            if !out.contains(catch_var) {
                out.push(catch_var.clone());
            }
            collect_locals(catch_block, globals, out);
        }
        _ => {}
    }
}
