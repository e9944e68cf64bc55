//! Statement AST nodes.

use std::fmt;

use crate::ast::expr::Expr;
use crate::span::Span;

/// A complete program: a list of top-level statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}

/// A statement in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Variable binding: let x = expr;
    Let { name: String, value: Expr },

    /// Return from a function: return expr; / return;
    Return(Option<Expr>),

    /// Expression in statement position (result discarded).
    Expression(Expr),

    /// Conditional loop: while (cond) { .. }
    While { condition: Expr, body: Block },

    /// C-style loop: for (init; cond; update) { .. }
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Block,
    },

    /// Exit the innermost loop.
    Break,

    /// Skip to the next iteration of the innermost loop.
    Continue,
}

/// A braced sequence of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

impl Block {
    pub fn new(statements: Vec<Stmt>, span: Span) -> Self {
        Self { statements, span }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for stmt in &self.statements {
            write!(f, "{} ", stmt)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Let { name, value } => write!(f, "let {} = {};", name, value),
            StmtKind::Return(Some(value)) => write!(f, "return {};", value),
            StmtKind::Return(None) => write!(f, "return;"),
            StmtKind::Expression(expr) => write!(f, "{};", expr),
            StmtKind::While { condition, body } => write!(f, "while ({}) {}", condition, body),
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                write!(f, "for (")?;
                if let Some(init) = init {
                    write!(f, "{}", init)?;
                } else {
                    write!(f, ";")?;
                }
                if let Some(condition) = condition {
                    write!(f, " {}", condition)?;
                }
                write!(f, ";")?;
                if let Some(update) = update {
                    write!(f, " {}", update)?;
                }
                write!(f, ") {}", body)
            }
            StmtKind::Break => write!(f, "break;"),
            StmtKind::Continue => write!(f, "continue;"),
        }
    }
}
