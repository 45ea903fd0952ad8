//! End-to-end pipeline tests: source text through lexer, parser, analyzer
//! and code generator, with assertions over the emitted assembly.

use stola_lang::codegen;
use stola_lang::parser::Parser;
use stola_lang::semantic::SemanticAnalyzer;

fn compile(source: &str, freestanding: bool) -> Result<String, Vec<String>> {
    let mut parser = Parser::from_source(source);
    let program = parser.parse_program();
    if !parser.errors.is_empty() {
        return Err(parser.errors);
    }

    let mut analyzer = SemanticAnalyzer::new(freestanding);
    if !analyzer.analyze(&program) {
        return Err(analyzer.errors);
    }

    Ok(codegen::generate(&program, freestanding))
}

fn compile_ok(source: &str) -> String {
    compile(source, false).expect("program should compile")
}

#[test]
fn hello_world() {
    let asm = compile_ok("print(\"hi\")\n");
    assert!(asm.contains(".intel_syntax noprefix"));
    assert!(asm.contains(".global main"));
    assert!(asm.contains(".asciz \"hi\""));
    assert!(asm.contains("call print_value"));
    // The emitted file declares what it references.
    assert!(asm.contains(".extern print_value"));
}

#[test]
fn mutual_recursion_compiles_through_hoisting() {
    let source = "function a()\nb()\nend\nfunction b()\nprint(1)\nend\na()\n";
    let asm = compile(source, false).expect("hoisting must allow forward calls");
    assert!(asm.contains("fn_a:"));
    assert!(asm.contains("fn_b:"));
    assert!(asm.contains("call fn_b"));
    assert!(asm.contains("call fn_a"));
}

#[test]
fn counter_loop_compiles_to_lt_add_cycle() {
    let asm = compile_ok("loop i from 1 to 4\nprint(i)\nend\n");
    assert!(asm.contains("call lt"));
    assert!(asm.contains("call add"));
    assert!(asm.contains("call print_value"));
}

#[test]
fn string_int_concatenation_goes_through_add() {
    let asm = compile_ok("x = 3\nprint(\"v=\" plus x)\n");
    assert!(asm.contains(".asciz \"v=\""));
    assert!(asm.contains("call add"));
}

#[test]
fn try_throw_catch_wires_the_exception_machinery() {
    let asm = compile_ok("try\nthrow \"boom\"\ncatch e\nprint(e)\nend\n");
    assert!(asm.contains("call push_try"));
    assert!(asm.contains("call stola_setjmp"));
    assert!(asm.contains("call throw"));
    assert!(asm.contains("call get_error"));
    assert!(asm.contains("call pop_try"));
    assert!(asm.contains("call register_longjmp"));
    assert!(asm.contains(".global stola_setjmp"));
    assert!(asm.contains(".global stola_longjmp"));
    assert!(!asm.contains("iretq"));
}

#[test]
fn class_method_dispatch_registers_and_invokes() {
    let source = concat!(
        "class C\n",
        "function init()\nthis.n = 7\nend\n",
        "function get()\nreturn this.n\nend\n",
        "end\n",
        "o = new C()\n",
        "print(o.get())\n",
    );
    let asm = compile_ok(source);
    assert!(asm.contains("method_C_init:"));
    assert!(asm.contains("method_C_get:"));
    assert!(asm.contains("call register_method"));
    assert!(asm.contains("call new_struct"));
    assert!(asm.contains("call invoke_method"));
    assert!(asm.contains("call struct_set"));
    assert!(asm.contains("call struct_get"));
}

#[test]
fn freestanding_rejects_classes_with_a_mode_error() {
    let source = "class C\nfunction init()\nend\nend\n";
    let errors = compile(source, true).expect_err("freestanding must reject classes");
    assert!(errors.iter().any(|e| e.contains("freestanding")));
}

#[test]
fn freestanding_accepts_the_restricted_subset() {
    let source = concat!(
        "x = 1 + 2\n",
        "function double(n)\nreturn n times 2\nend\n",
        "y = double(x)\n",
        "if y greater than 4\nz = memory_read(4096)\nend\n",
        "asm {\nhlt\n}\n",
    );
    let asm = compile(source, true).expect("subset must compile");
    assert!(!asm.contains(".extern"));
    assert!(asm.contains("hlt"));
    assert!(asm.contains("mov rax, [rax]"));
}

#[test]
fn parse_errors_fail_the_build_with_line_numbers() {
    let errors = compile("x = = 1\n", false).expect_err("syntax error expected");
    assert!(errors[0].starts_with("[Line 1]"));
}

#[test]
fn undefined_identifier_fails_semantic_analysis() {
    let errors = compile("print(nope)\n", false).expect_err("semantic error expected");
    assert!(errors.iter().any(|e| e.contains("'nope'")));
}

#[test]
fn unknown_builtin_call_is_a_semantic_error() {
    let errors =
        compile("definitely_not_builtin(1)\n", false).expect_err("semantic error expected");
    assert!(errors.iter().any(|e| e.contains("Undefined")));
}

#[test]
fn arity_of_ordinary_calls_stays_dynamic() {
    // Wrong arity on a plain function is allowed; only struct
    // constructors are checked.
    let asm = compile_ok("function f(a, b)\nreturn a\nend\nf(1)\n");
    assert!(asm.contains("call fn_f"));
}

#[test]
fn stack_is_balanced_per_statement() {
    // Expression statements discard exactly what they pushed.
    let asm = compile_ok("1 + 2\n\"x\"\ntrue\n");
    let pushes = asm.matches("\n    push rax").count();
    let explicit_discards = asm.matches("add rsp, 8").count();
    assert_eq!(explicit_discards, 3);
    assert!(pushes >= 3);
}

#[test]
fn rsp_is_realigned_at_every_external_call() {
    let asm = compile_ok("x = 1\nprint(x + 2)\n");
    let external_calls = asm
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("call ") && !line.contains("stola_setjmp"))
        .count();
    let realignments = asm.matches("and rsp, -16").count();
    assert_eq!(external_calls, realignments);
}

#[test]
fn imports_resolve_best_effort() {
    use stola_lang::loader;

    let mut parser = Parser::from_source("import not_a_real_module\nx = 1\n");
    let mut program = parser.parse_program();
    loader::resolve_imports(&mut program);

    // The import is gone and the rest of the program still analyzes.
    let mut analyzer = SemanticAnalyzer::new(false);
    assert!(analyzer.analyze(&program));
}

#[test]
fn for_in_lowers_through_the_iteration_protocol() {
    let asm = compile_ok("a = [1, 2]\nfor v in a\nprint(v)\nend\n");
    assert!(asm.contains("call length"));
    assert!(asm.contains("call array_get"));
}

#[test]
fn dict_and_member_access_shapes() {
    let asm = compile_ok("d = { name: \"ada\" }\nprint(d.name)\nprint(d[\"name\"])\n");
    assert!(asm.contains("call new_dict"));
    assert!(asm.contains("call dict_set"));
    assert!(asm.contains("call struct_get"));
    assert!(asm.contains("call array_get"));
}

#[test]
fn struct_constructor_builds_fields_in_order() {
    let asm = compile_ok("struct Point\nx\ny\nend\np = Point(1, 2)\nprint(p.x)\n");
    assert!(asm.contains("call new_struct"));
    assert!(asm.contains(".asciz \"x\""));
    assert!(asm.contains(".asciz \"y\""));
    assert!(asm.contains("call struct_set"));
}

#[test]
fn native_ffi_declarations_bind_at_startup() {
    let asm = compile_ok("import_native \"m\"\nc_function c_abs(number) -> number\nx = c_abs(0 minus 5)\n");
    assert!(asm.contains("call load_dll"));
    assert!(asm.contains("call bind_c_function"));
    assert!(asm.contains("call invoke_c_function"));
}
