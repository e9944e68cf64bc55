//! Statement parsing.

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::lexer::TokenKind;
use crate::parser::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn statement(&mut self) -> ParseResult<Stmt> {
        match self.peek().kind {
            TokenKind::Let => self.let_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Break => self.break_statement(),
            TokenKind::Continue => self.continue_statement(),
            _ => self.expression_statement(),
        }
    }

    fn let_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.advance().span; // let
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Equal)?;

        let mut value = self.expression()?;

        // Name the function literal after its binding so the compiler can
        // register the self-reference symbol.
        if let ExprKind::Function {
            name: fn_name @ None,
            ..
        } = &mut value.kind
        {
            *fn_name = Some(name.clone());
        }

        self.match_token(&TokenKind::Semicolon);
        Ok(Stmt::new(
            StmtKind::Let { name, value },
            start.merge(self.previous_span()),
        ))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.advance().span; // return

        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };

        self.match_token(&TokenKind::Semicolon);
        Ok(Stmt::new(
            StmtKind::Return(value),
            start.merge(self.previous_span()),
        ))
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.advance().span; // while
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen)?;
        let body = self.block()?;

        Ok(Stmt::new(
            StmtKind::While { condition, body },
            start.merge(self.previous_span()),
        ))
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let start = self.advance().span; // for
        self.expect(&TokenKind::LeftParen)?;

        let init = if self.match_token(&TokenKind::Semicolon) {
            None
        } else {
            // The init clause consumes its own trailing semicolon.
            Some(Box::new(self.statement()?))
        };

        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        let update = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::RightParen)?;

        let body = self.block()?;
        Ok(Stmt::new(
            StmtKind::For {
                init,
                condition,
                update,
                body,
            },
            start.merge(self.previous_span()),
        ))
    }

    fn break_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.advance().span;
        self.match_token(&TokenKind::Semicolon);
        Ok(Stmt::new(StmtKind::Break, span))
    }

    fn continue_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.advance().span;
        self.match_token(&TokenKind::Semicolon);
        Ok(Stmt::new(StmtKind::Continue, span))
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr: Expr = self.expression()?;
        let span = expr.span;
        self.match_token(&TokenKind::Semicolon);
        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }
}
