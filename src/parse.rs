//! Análisis sintáctico.
//!
//! Parser predictivo de descenso recursivo. No construye un AST: cada
//! producción reconocida se traduce de inmediato por medio de
//! [`Context`], en el mismo orden en que un parser ascendente
//! reduciría la gramática. Por esta razón el parser nunca retrocede,
//! ya que toda reducción tiene efectos sobre el código emitido. Dos
//! tokens de lookahead bastan para decidir cada producción.
//!
//! Los marcadores de la gramática se invocan en los puntos exactos
//! donde aparecen:
//!
//! ```text
//! if ( Exp ) M Statement [ N else M Statement ]
//! while ( M Exp ) M Statement
//! Exp or M Exp
//! Exp and M Exp
//! ```
//!
//! Los errores de sintaxis son fatales.

use thiserror::Error;

use crate::{
    error::Failure,
    lex::{Identifier, Keyword, Token},
    semantic::{BinOp, Context, Expr, Invocation, LogicOp, Output, RelOp, Statement, Type},
    source::{Located, Location},
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {0}, found {1}")]
    UnexpectedToken(Token, Token),

    #[error("Expected {0}, found end of input")]
    MissingToken(Token),

    #[error("Expected identifier, found {0}")]
    ExpectedId(Token),

    #[error("Expected any of `int`, `byte`, `bool`, found {0}")]
    ExpectedType(Token),

    #[error("Expected a statement, found {0}")]
    ExpectedStatement(Token),

    #[error("Expected an expression, found {0}")]
    ExpectedExpr(Token),

    #[error("Abrupt end of program")]
    UnexpectedEof,
}

pub type Parse<T> = Result<T, Failure>;

/// Traduce un programa completo.
///
/// `eof` es la ubicación que se reporta para errores al final de la
/// entrada.
pub fn parse(tokens: &[Located<Token>], eof: Location, cx: Context) -> Parse<Output> {
    let mut parser = Parser {
        tokens,
        position: 0,
        last_known: eof.clone(),
        eof,
        cx,
    };

    parser.program()?;

    let Parser { cx, eof, .. } = parser;
    Ok(cx.finish(&eof)?)
}

struct Parser<'a> {
    tokens: &'a [Located<Token>],
    position: usize,
    last_known: Location,
    eof: Location,
    cx: Context,
}

impl<'a> Parser<'a> {
    fn program(&mut self) -> Parse<()> {
        while self.peek().is_some() {
            self.function()?;
        }

        Ok(())
    }

    fn function(&mut self) -> Parse<()> {
        let overrides = self.eat(&Token::Keyword(Keyword::Override));

        let returns = match self.peek() {
            Some(Token::Keyword(Keyword::Void)) => {
                self.next()?;
                Type::Void
            }

            _ => self.typ()?,
        };

        let name = self.id()?;

        self.expect(Token::OpenParen)?;
        let mut parameters = Vec::new();
        if !self.check(&Token::CloseParen) {
            loop {
                let typ = self.typ()?;
                parameters.push((typ, self.id()?));

                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        self.expect(Token::CloseParen)?;

        self.cx.begin_function(overrides, returns, &name, &parameters)?;

        self.expect(Token::OpenCurly)?;
        let body = self.statements()?;
        self.expect(Token::CloseCurly)?;

        self.cx.end_function(body);
        Ok(())
    }

    fn statements(&mut self) -> Parse<Statement> {
        let mut sequence = Statement::default();
        while !self.check(&Token::CloseCurly) {
            sequence = sequence.then(self.statement()?);
        }

        Ok(sequence)
    }

    fn statement(&mut self) -> Parse<Statement> {
        let token = match self.peek() {
            Some(token) => token,
            None => {
                self.last_known = self.eof.clone();
                return self.fail(ParserError::UnexpectedEof);
            }
        };

        match token {
            Token::OpenCurly => {
                self.next()?;

                self.cx.enter_block();
                let body = self.statements()?;
                self.expect(Token::CloseCurly)?;
                self.cx.exit_block();

                Ok(body)
            }

            Token::Keyword(Keyword::Int | Keyword::Byte | Keyword::Bool) => self.declaration(),

            Token::Id(_) => match self.peek_nth(1) {
                Some(Token::OpenParen) => {
                    let invocation = self.invocation()?;
                    self.expect(Token::Semicolon)?;

                    Ok(self.cx.call_statement(invocation))
                }

                _ => {
                    let name = self.id()?;
                    self.expect(Token::Assign)?;
                    let value = self.expr()?;
                    self.expect(Token::Semicolon)?;

                    Ok(self.cx.assign(&name, value)?)
                }
            },

            Token::Keyword(Keyword::Return) => {
                let location = self.next()?.location().clone();
                if self.eat(&Token::Semicolon) {
                    return Ok(self.cx.return_void(location)?);
                }

                let value = self.expr()?;
                self.expect(Token::Semicolon)?;

                Ok(self.cx.return_value(value)?)
            }

            Token::Keyword(Keyword::If) => self.if_statement(),
            Token::Keyword(Keyword::While) => self.while_statement(),

            Token::Keyword(Keyword::Break) => {
                let location = self.next()?.location().clone();
                self.expect(Token::Semicolon)?;

                Ok(self.cx.break_loop(location)?)
            }

            Token::Keyword(Keyword::Continue) => {
                let location = self.next()?.location().clone();
                self.expect(Token::Semicolon)?;

                Ok(self.cx.continue_loop(location)?)
            }

            _ => {
                let found = self.next()?.into_inner();
                self.fail(ParserError::ExpectedStatement(found))
            }
        }
    }

    fn declaration(&mut self) -> Parse<Statement> {
        let typ = self.typ()?;
        let name = self.id()?;

        if self.eat(&Token::Assign) {
            let value = self.expr()?;
            self.expect(Token::Semicolon)?;

            Ok(self.cx.declare_init(typ, &name, value)?)
        } else {
            self.expect(Token::Semicolon)?;
            Ok(self.cx.declare(typ, &name)?)
        }
    }

    fn if_statement(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::If)?;
        self.expect(Token::OpenParen)?;
        let condition = self.expr()?;
        let condition = self.cx.condition(condition)?;
        self.expect(Token::CloseParen)?;

        self.cx.enter_block();
        let then = self.cx.marker();
        let body = self.statement()?;
        self.cx.exit_block();

        if !self.eat(&Token::Keyword(Keyword::Else)) {
            return Ok(self.cx.if_then(condition, then, body));
        }

        let skip = self.cx.skip();

        self.cx.enter_block();
        let otherwise = self.cx.marker();
        let alternative = self.statement()?;
        self.cx.exit_block();

        Ok(self
            .cx
            .if_else(condition, then, body, skip, otherwise, alternative))
    }

    fn while_statement(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::While)?;
        self.expect(Token::OpenParen)?;

        let start = self.cx.marker();
        let condition = self.expr()?;
        let condition = self.cx.condition(condition)?;
        self.expect(Token::CloseParen)?;

        self.cx.enter_loop();
        let then = self.cx.marker();
        let body = self.statement()?;
        self.cx.exit_block();

        Ok(self.cx.while_loop(start, condition, then, body))
    }

    fn invocation(&mut self) -> Parse<Invocation> {
        let name = self.id()?;
        self.expect(Token::OpenParen)?;

        let mut arguments = Vec::new();
        if !self.check(&Token::CloseParen) {
            loop {
                let argument = self.expr()?;
                arguments.push(self.cx.argument(argument));

                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        self.expect(Token::CloseParen)?;
        Ok(self.cx.invoke(&name, arguments)?)
    }

    fn expr(&mut self) -> Parse<Located<Expr>> {
        self.logical(Keyword::Or, LogicOp::Or, Self::conjunction)
    }

    fn conjunction(&mut self) -> Parse<Located<Expr>> {
        self.logical(Keyword::And, LogicOp::And, Self::equality)
    }

    fn equality(&mut self) -> Parse<Located<Expr>> {
        self.relational(Self::comparison, |token| match token {
            Token::Equal => Some(RelOp::Equal),
            Token::NotEqual => Some(RelOp::NotEqual),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Parse<Located<Expr>> {
        self.relational(Self::additive, |token| match token {
            Token::Less => Some(RelOp::Less),
            Token::Greater => Some(RelOp::Greater),
            Token::LessOrEqual => Some(RelOp::LessOrEqual),
            Token::GreaterOrEqual => Some(RelOp::GreaterOrEqual),
            _ => None,
        })
    }

    fn additive(&mut self) -> Parse<Located<Expr>> {
        self.arithmetic(Self::multiplicative, |token| match token {
            Token::Plus => Some(BinOp::Add),
            Token::Minus => Some(BinOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Parse<Located<Expr>> {
        self.arithmetic(Self::unary, |token| match token {
            Token::Times => Some(BinOp::Mul),
            Token::Slash => Some(BinOp::Div),
            _ => None,
        })
    }

    /// `Exp op M Exp`, con el marcador entre ambos operandos.
    fn logical<O>(&mut self, keyword: Keyword, op: LogicOp, mut operand: O) -> Parse<Located<Expr>>
    where
        O: FnMut(&mut Self) -> Parse<Located<Expr>>,
    {
        let start = self.here();
        let mut lhs = operand(self)?;

        while self.eat(&Token::Keyword(keyword)) {
            let marker = self.cx.marker();
            let rhs = operand(self)?;

            let result = self.cx.logical(lhs, op, marker, rhs)?;
            lhs = self.since(start.clone(), result);
        }

        Ok(lhs)
    }

    fn relational<O, F>(&mut self, mut operand: O, operator: F) -> Parse<Located<Expr>>
    where
        O: FnMut(&mut Self) -> Parse<Located<Expr>>,
        F: Fn(&Token) -> Option<RelOp>,
    {
        let start = self.here();
        let mut lhs = operand(self)?;

        while let Some(op) = self.peek().and_then(&operator) {
            self.next()?;
            let rhs = operand(self)?;

            let result = self.cx.relational(lhs, op, rhs)?;
            lhs = self.since(start.clone(), result);
        }

        Ok(lhs)
    }

    fn arithmetic<O, F>(&mut self, mut operand: O, operator: F) -> Parse<Located<Expr>>
    where
        O: FnMut(&mut Self) -> Parse<Located<Expr>>,
        F: Fn(&Token) -> Option<BinOp>,
    {
        let start = self.here();
        let mut lhs = operand(self)?;

        while let Some(op) = self.peek().and_then(&operator) {
            self.next()?;
            let rhs = operand(self)?;

            let result = self.cx.arithmetic(lhs, op, rhs)?;
            lhs = self.since(start.clone(), result);
        }

        Ok(lhs)
    }

    fn unary(&mut self) -> Parse<Located<Expr>> {
        let start = self.here();

        let is_cast = matches!(
            (self.peek(), self.peek_nth(1)),
            (
                Some(Token::OpenParen),
                Some(Token::Keyword(Keyword::Int | Keyword::Byte | Keyword::Bool))
            )
        );

        if self.eat(&Token::Keyword(Keyword::Not)) {
            let operand = self.unary()?;
            let result = self.cx.not(operand)?;

            Ok(self.since(start, result))
        } else if is_cast {
            self.expect(Token::OpenParen)?;
            let target = self.typ()?;
            self.expect(Token::CloseParen)?;

            let operand = self.unary()?;
            let result = self.cx.cast(target, operand)?;

            Ok(self.since(start, result))
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Parse<Located<Expr>> {
        let start = self.here();

        let result = match self.peek() {
            Some(Token::OpenParen) => {
                self.next()?;
                let inner = self.expr()?;
                self.expect(Token::CloseParen)?;

                inner.into_inner()
            }

            Some(Token::Id(_)) if matches!(self.peek_nth(1), Some(Token::OpenParen)) => {
                let invocation = self.invocation()?;
                self.cx.call(invocation)
            }

            Some(Token::Id(_)) => {
                let name = self.id()?;
                self.cx.identifier(&name)?
            }

            _ => {
                let (location, token) = self.next()?.split();
                match token {
                    Token::IntLiteral(integer) => self.cx.int_literal(integer),
                    Token::ByteLiteral(byte) => self.cx.byte_literal(Located::at(byte, location))?,
                    Token::StringLiteral(text) => self.cx.string_literal(&text),
                    Token::Keyword(Keyword::True) => self.cx.bool_literal(true),
                    Token::Keyword(Keyword::False) => self.cx.bool_literal(false),

                    found => return self.fail(ParserError::ExpectedExpr(found)),
                }
            }
        };

        Ok(self.since(start, result))
    }

    fn typ(&mut self) -> Parse<Type> {
        match self.next()?.into_inner() {
            Token::Keyword(Keyword::Int) => Ok(Type::Int),
            Token::Keyword(Keyword::Byte) => Ok(Type::Byte),
            Token::Keyword(Keyword::Bool) => Ok(Type::Bool),

            found => self.fail(ParserError::ExpectedType(found)),
        }
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Id(id) => Ok(Located::at(id, location)),
            found => self.fail(ParserError::ExpectedId(found)),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        if self.peek().is_none() {
            self.last_known = self.eof.clone();
            return self.fail(ParserError::MissingToken(token));
        }

        match self.next()?.into_inner() {
            found if found == token => Ok(()),
            found => self.fail(ParserError::UnexpectedToken(token, found)),
        }
    }

    /// Consume el siguiente token solo si es `token`.
    fn eat(&mut self, token: &Token) -> bool {
        let found = self.check(token);
        if found {
            self.position += 1;
            self.last_known = self.tokens[self.position - 1].location().clone();
        }

        found
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn peek(&self) -> Option<&'a Token> {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> Option<&'a Token> {
        self.tokens.get(self.position + n).map(Located::val)
    }

    fn next(&mut self) -> Parse<Located<Token>> {
        match self.tokens.get(self.position) {
            Some(token) => {
                self.position += 1;
                self.last_known = token.location().clone();

                Ok(token.clone())
            }

            None => {
                self.last_known = self.eof.clone();
                self.fail(ParserError::UnexpectedEof)
            }
        }
    }

    /// Ubicación del siguiente token.
    fn here(&self) -> Location {
        self.tokens
            .get(self.position)
            .map(|token| token.location().clone())
            .unwrap_or_else(|| self.eof.clone())
    }

    /// Ubica un resultado desde `start` hasta el último token consumido.
    fn since<T>(&self, start: Location, value: T) -> Located<T> {
        Located::at(value, Location::span(start, &self.last_known))
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Failure::from(Located::at(error, self.last_known.clone())))
    }
}
