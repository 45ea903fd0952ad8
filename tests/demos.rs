//! Compile every demo program through the full pipeline.

use std::fs;
use std::path::Path;

use stola_lang::codegen;
use stola_lang::parser::Parser;
use stola_lang::semantic::SemanticAnalyzer;

fn compile_demo(name: &str, freestanding: bool) -> String {
    let path = Path::new("demos").join(name);
    let source = fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("could not read {}: {err}", path.display()));

    let mut parser = Parser::from_source(&source);
    let program = parser.parse_program();
    assert!(
        parser.errors.is_empty(),
        "{name} has parse errors: {:?}",
        parser.errors
    );

    let mut analyzer = SemanticAnalyzer::new(freestanding);
    assert!(
        analyzer.analyze(&program),
        "{name} has semantic errors: {:?}",
        analyzer.errors
    );

    codegen::generate(&program, freestanding)
}

#[test]
fn hello_demo_compiles() {
    let asm = compile_demo("hello.stola", false);
    assert!(asm.contains(".asciz \"Hello, World!\""));
    assert!(asm.contains("call print_value"));
}

#[test]
fn fib_demo_compiles() {
    let asm = compile_demo("fib.stola", false);
    assert!(asm.contains("fn_fib:"));
    // Recursion through the hoisted symbol.
    assert!(asm.contains("call fn_fib"));
    assert!(asm.contains("call lt"));
}

#[test]
fn inventory_demo_compiles() {
    let asm = compile_demo("inventory.stola", false);
    assert!(asm.contains("method_Inventory_init:"));
    assert!(asm.contains("method_Inventory_store:"));
    assert!(asm.contains("method_Inventory_take:"));
    assert!(asm.contains("call register_method"));
    assert!(asm.contains("call invoke_method"));
    assert!(asm.contains("call push_try"));
    assert!(asm.contains("call throw"));
}

#[test]
fn boot_demo_compiles_freestanding() {
    let asm = compile_demo("boot.stola", true);
    assert!(!asm.contains(".extern"));
    assert!(asm.contains("timer_isr:"));
    assert!(asm.contains("iretq"));
    assert!(asm.contains("cli"));
    assert!(asm.contains("hlt"));
    assert!(asm.contains("mov [rax], cl"));
}

#[test]
fn boot_demo_is_rejected_in_hosted_mode() {
    // memory_read/memory_write only exist without a runtime.
    let path = Path::new("demos").join("boot.stola");
    let source = fs::read_to_string(path).unwrap();
    let mut parser = Parser::from_source(&source);
    let program = parser.parse_program();
    let mut analyzer = SemanticAnalyzer::new(false);
    assert!(!analyzer.analyze(&program));
    assert!(analyzer.errors.iter().any(|e| e.contains("Undefined")));
}
