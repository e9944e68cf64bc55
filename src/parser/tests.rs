use crate::ast::{ExprKind, Program, StmtKind};
use crate::lexer::Scanner;
use crate::parser::Parser;

fn parse(source: &str) -> Program {
    let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
    Parser::new(tokens).parse().expect("parser error")
}

fn parse_error(source: &str) -> String {
    let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
    Parser::new(tokens)
        .parse()
        .expect_err("expected parse error")
        .to_string()
}

#[test]
fn test_let_statement() {
    let program = parse("let x = 5;");
    assert_eq!(program.statements.len(), 1);
    match &program.statements[0].kind {
        StmtKind::Let { name, .. } => assert_eq!(name, "x"),
        other => panic!("expected let statement, got {:?}", other),
    }
}

#[test]
fn test_operator_precedence() {
    let cases = [
        ("1 + 2 * 3;", "(1 + (2 * 3));"),
        ("(1 + 2) * 3;", "((1 + 2) * 3);"),
        ("-a * b;", "((-a) * b);"),
        ("a + b - c;", "((a + b) - c);"),
        ("a < b == c > d;", "((a < b) == (c > d));"),
        ("a && b || c;", "((a && b) || c);"),
        ("!true == false;", "((!true) == false);"),
        ("a + add(b * c) + d;", "((a + add((b * c))) + d);"),
    ];

    for (source, expected) in cases {
        let program = parse(source);
        assert_eq!(program.statements[0].to_string(), expected, "{}", source);
    }
}

#[test]
fn test_function_literal_naming_through_let() {
    let program = parse("let double = fn(x) { x * 2 };");
    match &program.statements[0].kind {
        StmtKind::Let { value, .. } => match &value.kind {
            ExprKind::Function { name, parameters, .. } => {
                assert_eq!(name.as_deref(), Some("double"));
                assert_eq!(parameters, &["x".to_string()]);
            }
            other => panic!("expected function literal, got {:?}", other),
        },
        other => panic!("expected let statement, got {:?}", other),
    }
}

#[test]
fn test_anonymous_function_stays_unnamed() {
    let program = parse("fn(x) { x };");
    match &program.statements[0].kind {
        StmtKind::Expression(expr) => match &expr.kind {
            ExprKind::Function { name, .. } => assert!(name.is_none()),
            other => panic!("expected function literal, got {:?}", other),
        },
        other => panic!("expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_if_else_expression() {
    let program = parse("if (x < y) { x } else { y };");
    match &program.statements[0].kind {
        StmtKind::Expression(expr) => match &expr.kind {
            ExprKind::If { alternative, .. } => assert!(alternative.is_some()),
            other => panic!("expected if expression, got {:?}", other),
        },
        other => panic!("expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_array_and_hash_literals() {
    let program = parse(r#"[1, 2 * 2, 3 + 3]; {"one": 1, "two": 2};"#);
    match &program.statements[0].kind {
        StmtKind::Expression(expr) => match &expr.kind {
            ExprKind::Array(elements) => assert_eq!(elements.len(), 3),
            other => panic!("expected array literal, got {:?}", other),
        },
        other => panic!("expected expression statement, got {:?}", other),
    }
    match &program.statements[1].kind {
        StmtKind::Expression(expr) => match &expr.kind {
            ExprKind::Hash(pairs) => assert_eq!(pairs.len(), 2),
            other => panic!("expected hash literal, got {:?}", other),
        },
        other => panic!("expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_index_expression() {
    let program = parse("myArray[1 + 1];");
    match &program.statements[0].kind {
        StmtKind::Expression(expr) => {
            assert!(matches!(expr.kind, ExprKind::Index { .. }));
        }
        other => panic!("expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_while_statement() {
    let program = parse("while (i < 10) { i += 1; }");
    match &program.statements[0].kind {
        StmtKind::While { body, .. } => assert_eq!(body.statements.len(), 1),
        other => panic!("expected while statement, got {:?}", other),
    }
}

#[test]
fn test_for_statement_full() {
    let program = parse("for (let i = 0; i < 10; i += 1) { puts(i); }");
    match &program.statements[0].kind {
        StmtKind::For {
            init,
            condition,
            update,
            ..
        } => {
            assert!(init.is_some());
            assert!(condition.is_some());
            assert!(update.is_some());
        }
        other => panic!("expected for statement, got {:?}", other),
    }
}

#[test]
fn test_for_statement_empty_clauses() {
    let program = parse("for (;;) { break; }");
    match &program.statements[0].kind {
        StmtKind::For {
            init,
            condition,
            update,
            body,
        } => {
            assert!(init.is_none());
            assert!(condition.is_none());
            assert!(update.is_none());
            assert!(matches!(body.statements[0].kind, StmtKind::Break));
        }
        other => panic!("expected for statement, got {:?}", other),
    }
}

#[test]
fn test_compound_assignment() {
    let program = parse("x += 2 * 3;");
    match &program.statements[0].kind {
        StmtKind::Expression(expr) => match &expr.kind {
            ExprKind::Assign { name, value, .. } => {
                assert_eq!(name, "x");
                assert_eq!(value.to_string(), "(2 * 3)");
            }
            other => panic!("expected assignment, got {:?}", other),
        },
        other => panic!("expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_invalid_assignment_target() {
    let message = parse_error("1 += 2;");
    assert!(message.contains("Invalid assignment target"), "{}", message);
}

#[test]
fn test_missing_paren_is_error() {
    let message = parse_error("if (x { 1 }");
    assert!(message.contains("expected"), "{}", message);
}
