//! Standard-library import resolution.
//!
//! `import math` loads `<compiler_dir>/stdlib/math.stola`, parses it, and
//! prepends its function declarations to the program. Resolution is
//! best-effort: an unresolvable or unparsable module is a warning, not an
//! error. The loader never runs in freestanding mode (the stdlib leans on
//! the runtime).

use std::env;
use std::fs;
use std::path::PathBuf;

use log::warn;

use crate::ast::{Program, Stmt};
use crate::parser::Parser;

/// Directory the compiler binary lives in; falls back to the current
/// directory when the executable path cannot be determined.
fn compiler_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn stdlib_path(module: &str) -> PathBuf {
    compiler_dir().join("stdlib").join(format!("{module}.stola"))
}

/// Splice imported stdlib functions into `program`: imported function
/// declarations are prepended, import statements are removed.
pub fn resolve_imports(program: &mut Program) {
    let modules: Vec<String> = program
        .statements
        .iter()
        .filter_map(|stmt| match stmt {
            Stmt::Import { module } => Some(module.clone()),
            _ => None,
        })
        .collect();

    if modules.is_empty() {
        return;
    }

    let mut imported: Vec<Stmt> = vec![];

    for module in &modules {
        let path = stdlib_path(module);

        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(_) => {
                warn!(
                    "Could not import module '{module}' (tried {})",
                    path.display()
                );
                continue;
            }
        };

        println!("Importing {module}...");

        let mut parser = Parser::from_source(&source);
        let lib_program = parser.parse_program();

        if !parser.errors.is_empty() {
            warn!("Parse errors in imported module '{module}':");
            for error in &parser.errors {
                warn!("\t{error}");
            }
            continue;
        }

        imported.extend(
            lib_program
                .statements
                .into_iter()
                .filter(|stmt| matches!(stmt, Stmt::FunctionDecl(_))),
        );
    }

    let original = std::mem::take(&mut program.statements);
    program.statements = imported;
    program
        .statements
        .extend(original.into_iter().filter(|stmt| !matches!(stmt, Stmt::Import { .. })));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[test]
    fn unresolved_import_is_removed_but_not_fatal() {
        let mut parser =
            Parser::from_source("import definitely_not_a_module\nx = 1\n");
        let mut program = parser.parse_program();
        resolve_imports(&mut program);

        assert_eq!(program.statements.len(), 1);
        assert!(matches!(program.statements[0], Stmt::Assignment { .. }));
    }

    #[test]
    fn program_without_imports_is_untouched() {
        let mut parser = Parser::from_source("x = 1\ny = 2\n");
        let mut program = parser.parse_program();
        let before = program.clone();
        resolve_imports(&mut program);
        assert_eq!(program, before);
    }
}
