//! Error types for all phases of the pipeline.

use crate::span::Span;
use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Unterminated block comment at {0}")]
    UnterminatedComment(Span),

    #[error("Invalid escape sequence '\\{0}' at {1}")]
    InvalidEscape(char, Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),
}

impl LexerError {
    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::UnterminatedComment(span) => *span,
            Self::InvalidEscape(_, span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Unexpected end of input at {0}")]
    UnexpectedEof(Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn general(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::UnexpectedEof(span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

impl From<LexerError> for ParserError {
    fn from(err: LexerError) -> Self {
        let span = err.span();
        Self::General {
            message: err.to_string(),
            span,
        }
    }
}

/// Bytecode compilation errors.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Undefined variable '{0}' at {1}")]
    UndefinedVariable(String, Span),

    #[error("Unknown operator '{0}' at {1}")]
    UnknownOperator(String, Span),

    #[error("'break' outside of a loop at {0}")]
    BreakOutsideLoop(Span),

    #[error("'continue' outside of a loop at {0}")]
    ContinueOutsideLoop(Span),

    #[error("Too many constants in one compilation unit at {0}")]
    TooManyConstants(Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UndefinedVariable(_, span) => *span,
            Self::UnknownOperator(_, span) => *span,
            Self::BreakOutsideLoop(span) => *span,
            Self::ContinueOutsideLoop(span) => *span,
            Self::TooManyConstants(span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

/// Runtime errors raised by the VM.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Unsupported types for binary operation: {left} {right}")]
    BinaryTypeMismatch { left: String, right: String },

    #[error("Unsupported type for negation: {0}")]
    BadNegation(String),

    #[error("Unknown operator: {operator} ({left} {right})")]
    UnknownOperator {
        operator: String,
        left: String,
        right: String,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unusable as hash key: {0}")]
    UnusableHashKey(String),

    #[error("Index operator not supported: {0}")]
    BadIndex(String),

    #[error("Wrong number of arguments: want={want}, got={got}")]
    WrongArity { want: usize, got: usize },

    #[error("Calling non-function and non-builtin")]
    NotCallable,

    #[error("Stack overflow: maximum stack size ({0}) exceeded")]
    StackOverflow(usize),

    #[error("Frame overflow: maximum call depth ({0}) exceeded")]
    FrameOverflow(usize),

    #[error("{0}")]
    General(String),
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum GibbonError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
