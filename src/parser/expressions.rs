//! Expression parsing (Pratt).

use crate::ast::{AssignOp, Block, Expr, ExprKind, InfixOp, PrefixOp};
use crate::error::ParserError;
use crate::lexer::TokenKind;
use crate::parser::core::{ParseResult, Parser};
use crate::parser::precedence::{get_precedence, Precedence};
use crate::span::Span;

impl Parser {
    /// Parse an expression at the lowest precedence.
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.parse_precedence(Precedence::Assignment)
    }

    fn parse_precedence(&mut self, min: Precedence) -> ParseResult<Expr> {
        let mut left = self.prefix()?;

        while get_precedence(&self.peek().kind) >= min && !self.is_at_end() {
            left = self.infix(left)?;
        }

        Ok(left)
    }

    fn prefix(&mut self) -> ParseResult<Expr> {
        let token = self.advance();
        let span = token.span;

        match token.kind {
            TokenKind::IntLiteral(n) => Ok(Expr::new(ExprKind::IntLiteral(n), span)),
            TokenKind::FloatLiteral(n) => Ok(Expr::new(ExprKind::FloatLiteral(n), span)),
            TokenKind::StringLiteral(s) => Ok(Expr::new(ExprKind::StringLiteral(s), span)),
            TokenKind::BoolLiteral(b) => Ok(Expr::new(ExprKind::BoolLiteral(b), span)),
            TokenKind::Null => Ok(Expr::new(ExprKind::Null, span)),
            TokenKind::Identifier(name) => Ok(Expr::new(ExprKind::Identifier(name), span)),

            TokenKind::Minus => {
                let operand = self.parse_precedence(Precedence::Unary)?;
                let span = span.merge(operand.span);
                Ok(Expr::new(
                    ExprKind::Prefix {
                        operator: PrefixOp::Minus,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Bang => {
                let operand = self.parse_precedence(Precedence::Unary)?;
                let span = span.merge(operand.span);
                Ok(Expr::new(
                    ExprKind::Prefix {
                        operator: PrefixOp::Bang,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }

            TokenKind::LeftParen => {
                let expr = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }

            TokenKind::If => self.if_expression(span),
            TokenKind::Fn => self.function_literal(span),

            TokenKind::LeftBracket => {
                let elements =
                    self.expression_list(&TokenKind::RightBracket, "array element")?;
                let span = span.merge(self.previous_span());
                Ok(Expr::new(ExprKind::Array(elements), span))
            }

            TokenKind::LeftBrace => self.hash_literal(span),

            other => Err(ParserError::unexpected_token(
                "expression",
                format!("{}", other),
                span,
            )),
        }
    }

    fn infix(&mut self, left: Expr) -> ParseResult<Expr> {
        let token = self.advance();
        let precedence = get_precedence(&token.kind);

        let operator = match token.kind {
            TokenKind::Plus => InfixOp::Add,
            TokenKind::Minus => InfixOp::Sub,
            TokenKind::Star => InfixOp::Mul,
            TokenKind::Slash => InfixOp::Div,
            TokenKind::EqualEqual => InfixOp::Equal,
            TokenKind::BangEqual => InfixOp::NotEqual,
            TokenKind::Less => InfixOp::Less,
            TokenKind::LessEqual => InfixOp::LessEqual,
            TokenKind::Greater => InfixOp::Greater,
            TokenKind::GreaterEqual => InfixOp::GreaterEqual,
            TokenKind::And => InfixOp::And,
            TokenKind::Or => InfixOp::Or,

            TokenKind::PlusEqual => return self.assignment(left, AssignOp::Add),
            TokenKind::MinusEqual => return self.assignment(left, AssignOp::Sub),
            TokenKind::StarEqual => return self.assignment(left, AssignOp::Mul),
            TokenKind::SlashEqual => return self.assignment(left, AssignOp::Div),

            TokenKind::LeftParen => return self.call(left),
            TokenKind::LeftBracket => return self.index(left),

            other => {
                return Err(ParserError::unexpected_token(
                    "operator",
                    format!("{}", other),
                    token.span,
                ))
            }
        };

        // Left-associative: parse the right side one level tighter.
        let next = match precedence {
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            other => other,
        };
        let right = self.parse_precedence(next)?;

        let span = left.span.merge(right.span);
        Ok(Expr::new(
            ExprKind::Infix {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn assignment(&mut self, target: Expr, operator: AssignOp) -> ParseResult<Expr> {
        let name = match target.kind {
            ExprKind::Identifier(name) => name,
            _ => {
                return Err(ParserError::general(
                    "Invalid assignment target",
                    target.span,
                ))
            }
        };

        let value = self.parse_precedence(Precedence::Assignment)?;
        let span = target.span.merge(value.span);
        Ok(Expr::new(
            ExprKind::Assign {
                name,
                operator,
                value: Box::new(value),
            },
            span,
        ))
    }

    fn call(&mut self, function: Expr) -> ParseResult<Expr> {
        let arguments = self.expression_list(&TokenKind::RightParen, "argument")?;
        let span = function.span.merge(self.previous_span());
        Ok(Expr::new(
            ExprKind::Call {
                function: Box::new(function),
                arguments,
            },
            span,
        ))
    }

    fn index(&mut self, left: Expr) -> ParseResult<Expr> {
        let index = self.expression()?;
        self.expect(&TokenKind::RightBracket)?;
        let span = left.span.merge(self.previous_span());
        Ok(Expr::new(
            ExprKind::Index {
                left: Box::new(left),
                index: Box::new(index),
            },
            span,
        ))
    }

    fn if_expression(&mut self, start: Span) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen)?;

        let consequence = self.block()?;

        let alternative = if self.match_token(&TokenKind::Else) {
            Some(self.block()?)
        } else {
            None
        };

        let span = start.merge(self.previous_span());
        Ok(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            },
            span,
        ))
    }

    fn function_literal(&mut self, start: Span) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;

        let mut parameters = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                parameters.push(self.expect_identifier()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;

        let body = self.block()?;
        let span = start.merge(self.previous_span());
        Ok(Expr::new(
            ExprKind::Function {
                name: None,
                parameters,
                body,
            },
            span,
        ))
    }

    fn hash_literal(&mut self, start: Span) -> ParseResult<Expr> {
        let mut pairs = Vec::new();

        if !self.check(&TokenKind::RightBrace) {
            loop {
                let key = self.expression()?;
                self.expect(&TokenKind::Colon)?;
                let value = self.expression()?;
                pairs.push((key, value));
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        let span = start.merge(self.previous_span());
        Ok(Expr::new(ExprKind::Hash(pairs), span))
    }

    fn expression_list(&mut self, end: &TokenKind, what: &str) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();

        if !self.check(end) {
            loop {
                if self.is_at_end() {
                    return Err(ParserError::unexpected_token(
                        what,
                        "EOF",
                        self.current_span(),
                    ));
                }
                items.push(self.expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(end)?;

        Ok(items)
    }

    pub(crate) fn block(&mut self) -> ParseResult<Block> {
        let start = self.expect(&TokenKind::LeftBrace)?.span;

        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(Block::new(statements, start.merge(self.previous_span())))
    }
}
