//! End-to-end compiler tests

use super::ast::Span;
use super::parser::parse_program;
use super::{compile, source_hash};

#[test]
fn test_hash_identifies_source() {
    let a = compile("return 1").unwrap();
    let b = compile("return 1").unwrap();
    let c = compile("return 2").unwrap();
    assert_eq!(a.hash, b.hash);
    assert_ne!(a.hash, c.hash);
    assert_eq!(a.hash, source_hash("return 1"));
    assert_eq!(a.hash.len(), 64);
    assert_eq!(a.source, "return 1");
}

#[test]
fn test_statement_count_ignores_comments() {
    let unit = compile("const a = 1\nif (a) {\n  a\n}\n// note").unwrap();
    assert_eq!(unit.statement_count, 3);
}

#[test]
fn test_source_map_points_back_to_original_lines() {
    let unit = compile("const a = 1\n\n\nconst b = 2").unwrap();
    let lines: Vec<&str> = unit.code.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("__track(4, 0);"));
    assert_eq!(unit.original_position(Span::new(1, 1)).map(|s| s.line), Some(1));
    assert_eq!(unit.original_position(Span::new(2, 1)).map(|s| s.line), Some(4));
    assert!(!unit.source_map.is_empty());
}

#[test]
fn test_instrumented_code_reparses() {
    let source = "// greet
const name = 'Ada'
console.log(name)
yield <Message>Hello {name}</Message>";
    let unit = compile(source).unwrap();
    assert!(unit.code.contains("__comment(\"greet\", 1)"));
    assert!(unit.code.contains("__log(console.log, name)"));
    assert!(unit.code.contains("__tag(\"MESSAGE\""));
    assert!(parse_program(&unit.code).is_ok());
}

#[test]
fn test_syntax_error_position() {
    let err = compile("const a = 1\nconst b = )").unwrap_err();
    assert_eq!(err.line, 2);
    assert!(err.column > 0);
}

#[test]
fn test_reserved_identifiers_are_rejected() {
    let err = compile("const __track = 1").unwrap_err();
    assert_eq!(err.message, "'__track' is a reserved identifier");
    assert_eq!(err.line, 1);
}

#[test]
fn test_duplicate_declaration_is_rejected() {
    let err = compile("let a = 1\nlet a = 2").unwrap_err();
    assert_eq!(err.message, "Identifier 'a' has already been declared");
    assert_eq!(err.line, 2);
}

#[test]
fn test_yield_inside_function_is_rejected() {
    let err = compile("function f() {\n  yield <A />\n}").unwrap_err();
    assert_eq!(err.message, "yield is only valid at the top level of a script");
    assert_eq!(err.line, 2);
}
