// パス: src/calc/parser.rs
// 役割: トークン列から calc の AST を生成する再帰下降パーサ
// 意図: 入力末尾で構文が途切れた場合を「入力不足」として区別する
// 関連ファイル: src/calc/lexer.rs, src/calc/eval.rs, src/calc/mod.rs
//! 構文解析モジュール
//!
//! 優先順位は `eq > cmp > add > mul > unary > postfix > primary`。

use std::rc::Rc;

use super::lexer::{lex, Token, TokenKind};
use super::{Function, SyntaxError};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Expr>),
    Var {
        name: String,
        line: usize,
    },
    Assign {
        name: String,
        value: Box<Expr>,
    },
    Def(Rc<Function>),
    Unary {
        op: TokenKind,
        operand: Box<Expr>,
        line: usize,
    },
    Binary {
        op: TokenKind,
        left: Box<Expr>,
        right: Box<Expr>,
        line: usize,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        line: usize,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        line: usize,
    },
    Method {
        target: Box<Expr>,
        name: String,
        line: usize,
    },
}

/// 文の列。最後の文の値が全体の値になる。
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub stmts: Vec<Expr>,
}

/// ソースを解析する。`label` は関数定義に記録される。
pub fn parse_program(src: &str, label: &str) -> Result<Program, SyntaxError> {
    let tokens = lex(src)?;
    Parser::new(tokens, label).program()
}

struct Parser<'l> {
    ts: Vec<Token>,
    i: usize,
    label: &'l str,
}

const EQUALITY: &[TokenKind] = &[TokenKind::EQ, TokenKind::NE];
const COMPARISON: &[TokenKind] = &[TokenKind::LT, TokenKind::LE, TokenKind::GT, TokenKind::GE];
const ADDITIVE: &[TokenKind] = &[TokenKind::PLUS, TokenKind::MINUS];
const MULTIPLICATIVE: &[TokenKind] = &[TokenKind::STAR, TokenKind::SLASH, TokenKind::PERCENT];

impl<'l> Parser<'l> {
    fn new(ts: Vec<Token>, label: &'l str) -> Self {
        Self { ts, i: 0, label }
    }

    fn peek(&self) -> &Token {
        &self.ts[self.i]
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        self.ts
            .get(self.i + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::EOF)
    }

    fn advance(&mut self) -> Token {
        let t = self.ts[self.i].clone();
        if t.kind != TokenKind::EOF {
            self.i += 1;
        }
        t
    }

    fn accept(&mut self, kind: TokenKind) -> Option<Token> {
        if self.peek().kind == kind {
            Some(self.advance())
        } else {
            None
        }
    }

    /// 期待外のトークンに対するエラー。EOF なら入力不足として扱う。
    fn unexpected(&self, expected: &str) -> SyntaxError {
        let t = self.peek();
        if t.kind == TokenKind::EOF {
            SyntaxError::incomplete(format!("unexpected end of input, expecting {}", expected), t.line)
        } else {
            SyntaxError::new(
                format!("unexpected `{}`, expecting {}", t.value.escape_debug(), expected),
                t.line,
            )
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, SyntaxError> {
        self.accept(kind).ok_or_else(|| self.unexpected(expected))
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek().kind, TokenKind::NEWLINE | TokenKind::SEMI) {
            self.advance();
        }
    }

    fn program(&mut self) -> Result<Program, SyntaxError> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while self.peek().kind != TokenKind::EOF {
            stmts.push(self.statement()?);
            match self.peek().kind {
                TokenKind::EOF => break,
                TokenKind::NEWLINE | TokenKind::SEMI => self.skip_separators(),
                _ => return Err(self.unexpected("end of statement")),
            }
        }
        Ok(Program { stmts })
    }

    fn statement(&mut self) -> Result<Expr, SyntaxError> {
        if self.peek().kind == TokenKind::DEF {
            return self.definition();
        }
        if self.peek().kind == TokenKind::IDENT && self.peek_kind_at(1) == TokenKind::ASSIGN {
            let name = self.advance().value;
            self.advance();
            let value = self.expression()?;
            return Ok(Expr::Assign {
                name,
                value: Box::new(value),
            });
        }
        self.expression()
    }

    /// `def name(a, b) = expr`
    fn definition(&mut self) -> Result<Expr, SyntaxError> {
        let def = self.advance();
        let name = self.expect(TokenKind::IDENT, "function name")?.value;
        self.expect(TokenKind::LPAREN, "`(`")?;
        let mut params = Vec::new();
        if self.accept(TokenKind::RPAREN).is_none() {
            loop {
                params.push(self.expect(TokenKind::IDENT, "parameter name")?.value);
                if self.accept(TokenKind::COMMA).is_some() {
                    continue;
                }
                self.expect(TokenKind::RPAREN, "`)`")?;
                break;
            }
        }
        self.expect(TokenKind::ASSIGN, "`=`")?;
        let body = self.expression()?;
        Ok(Expr::Def(Rc::new(Function {
            name,
            params,
            body,
            label: self.label.to_string(),
            line: def.line,
        })))
    }

    fn expression(&mut self) -> Result<Expr, SyntaxError> {
        self.binary_level(0)
    }

    fn binary_level(&mut self, level: usize) -> Result<Expr, SyntaxError> {
        let ops = match level {
            0 => EQUALITY,
            1 => COMPARISON,
            2 => ADDITIVE,
            3 => MULTIPLICATIVE,
            _ => return self.unary(),
        };
        let mut left = self.binary_level(level + 1)?;
        while ops.contains(&self.peek().kind) {
            let op = self.advance();
            let right = self.binary_level(level + 1)?;
            left = Expr::Binary {
                op: op.kind,
                left: Box::new(left),
                right: Box::new(right),
                line: op.line,
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        if matches!(self.peek().kind, TokenKind::MINUS | TokenKind::BANG) {
            let op = self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: op.kind,
                operand: Box::new(operand),
                line: op.line,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;
        loop {
            if let Some(t) = self.accept(TokenKind::LBRACK) {
                let index = self.expression()?;
                self.expect(TokenKind::RBRACK, "`]`")?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                    line: t.line,
                };
            } else if let Some(t) = self.accept(TokenKind::DOT) {
                let name = self.expect(TokenKind::IDENT, "method name")?.value;
                expr = Expr::Method {
                    target: Box::new(expr),
                    name,
                    line: t.line,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let t = self.peek().clone();
        match t.kind {
            TokenKind::INT => {
                self.advance();
                let value = t
                    .value
                    .parse()
                    .map_err(|_| SyntaxError::new("invalid integer", t.line))?;
                Ok(Expr::Int(value))
            }
            TokenKind::STRING => {
                self.advance();
                Ok(Expr::Str(t.value))
            }
            TokenKind::NIL => {
                self.advance();
                Ok(Expr::Nil)
            }
            TokenKind::TRUE | TokenKind::FALSE => {
                self.advance();
                Ok(Expr::Bool(t.kind == TokenKind::TRUE))
            }
            TokenKind::IDENT => {
                self.advance();
                if self.accept(TokenKind::LPAREN).is_some() {
                    let args = self.arguments(TokenKind::RPAREN, "`)`")?;
                    return Ok(Expr::Call {
                        name: t.value,
                        args,
                        line: t.line,
                    });
                }
                Ok(Expr::Var {
                    name: t.value,
                    line: t.line,
                })
            }
            TokenKind::LPAREN => {
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RPAREN, "`)`")?;
                Ok(inner)
            }
            TokenKind::LBRACK => {
                self.advance();
                let items = self.arguments(TokenKind::RBRACK, "`]`")?;
                Ok(Expr::List(items))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// 区切り `,` の式列を終端トークンまで読む。
    fn arguments(&mut self, close: TokenKind, what: &str) -> Result<Vec<Expr>, SyntaxError> {
        let mut items = Vec::new();
        if self.accept(close).is_some() {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.accept(TokenKind::COMMA).is_some() {
                continue;
            }
            self.expect(close, what)?;
            return Ok(items);
        }
    }
}
