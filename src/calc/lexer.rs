// パス: src/calc/lexer.rs
// 役割: calc 言語の字句解析器とトークン定義
// 意図: 行番号付きトークンを生成し、入力途中の検出（未閉じ文字列）を構文解析へ伝える
// 関連ファイル: src/calc/parser.rs, src/calc/mod.rs
//! 字句解析モジュール
//!
//! - 括弧の内側と二項演算子の直後の改行は読み飛ばし、それ以外の改行は文の区切りとする。
//! - `#` から行末まではコメント。

use super::SyntaxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    EOF,
    NEWLINE,
    SEMI,
    INT,
    STRING,
    IDENT,
    // キーワード
    DEF,
    NIL,
    TRUE,
    FALSE,
    // 演算子・記号
    PLUS,
    MINUS,
    STAR,
    SLASH,
    PERCENT,
    EQ,
    NE,
    LT,
    LE,
    GT,
    GE,
    ASSIGN,
    BANG,
    LPAREN,
    RPAREN,
    LBRACK,
    RBRACK,
    COMMA,
    DOT,
}

impl TokenKind {
    /// 直後の改行を継続扱いにするトークンかどうか。
    fn continues_line(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            PLUS | MINUS
                | STAR
                | SLASH
                | PERCENT
                | EQ
                | NE
                | LT
                | LE
                | GT
                | GE
                | ASSIGN
                | BANG
                | COMMA
                | DOT
        )
    }
}

/// ソースをトークン列へ変換する。
pub fn lex(src: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(src).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
            line: 1,
            depth: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        while let Some(ch) = self.chars.next() {
            match ch {
                ' ' | '\t' | '\r' => {}
                '#' => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                '\n' => {
                    self.newline();
                    self.line += 1;
                }
                '0'..='9' => self.number(ch)?,
                '"' => self.string()?,
                c if c.is_ascii_alphabetic() || c == '_' => self.ident(c),
                _ => self.symbol(ch)?,
            }
        }
        self.push(TokenKind::EOF, "");
        Ok(self.tokens)
    }

    fn push(&mut self, kind: TokenKind, value: impl Into<String>) {
        self.tokens.push(Token {
            kind,
            value: value.into(),
            line: self.line,
        });
    }

    fn newline(&mut self) {
        if self.depth > 0 {
            return;
        }
        match self.tokens.last() {
            Some(t) if t.kind.continues_line() => {}
            Some(t) if t.kind == TokenKind::NEWLINE || t.kind == TokenKind::SEMI => {}
            None => {}
            _ => self.push(TokenKind::NEWLINE, "\n"),
        }
    }

    fn number(&mut self, first: char) -> Result<(), SyntaxError> {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '_' {
                if c != '_' {
                    text.push(c);
                }
                self.chars.next();
            } else {
                break;
            }
        }
        if text.parse::<i64>().is_err() {
            return Err(SyntaxError::new(
                format!("integer literal too large: {}", text),
                self.line,
            ));
        }
        self.push(TokenKind::INT, text);
        Ok(())
    }

    fn string(&mut self) -> Result<(), SyntaxError> {
        let start = self.line;
        let mut text = String::new();
        loop {
            let Some(c) = self.chars.next() else {
                return Err(SyntaxError::incomplete("unterminated string", start));
            };
            match c {
                '"' => break,
                '\\' => {
                    let Some(esc) = self.chars.next() else {
                        return Err(SyntaxError::incomplete("unterminated string", start));
                    };
                    text.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        'e' => '\x1b',
                        '0' => '\0',
                        other => other,
                    });
                    if esc == '\n' {
                        self.line += 1;
                    }
                }
                '\n' => {
                    self.line += 1;
                    text.push('\n');
                }
                other => text.push(other),
            }
        }
        self.tokens.push(Token {
            kind: TokenKind::STRING,
            value: text,
            line: start,
        });
        Ok(())
    }

    fn ident(&mut self, first: char) {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '?' {
                text.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        let kind = match text.as_str() {
            "def" => TokenKind::DEF,
            "nil" => TokenKind::NIL,
            "true" => TokenKind::TRUE,
            "false" => TokenKind::FALSE,
            _ => TokenKind::IDENT,
        };
        self.push(kind, text);
    }

    fn symbol(&mut self, ch: char) -> Result<(), SyntaxError> {
        use TokenKind::*;
        let next_is_eq = self.chars.peek() == Some(&'=');
        let (kind, text) = match ch {
            '+' => (PLUS, "+"),
            '-' => (MINUS, "-"),
            '*' => (STAR, "*"),
            '/' => (SLASH, "/"),
            '%' => (PERCENT, "%"),
            ';' => (SEMI, ";"),
            ',' => (COMMA, ","),
            '.' => (DOT, "."),
            '(' => {
                self.depth += 1;
                (LPAREN, "(")
            }
            '[' => {
                self.depth += 1;
                (LBRACK, "[")
            }
            ')' => {
                self.depth = self.depth.saturating_sub(1);
                (RPAREN, ")")
            }
            ']' => {
                self.depth = self.depth.saturating_sub(1);
                (RBRACK, "]")
            }
            '=' if next_is_eq => (EQ, "=="),
            '!' if next_is_eq => (NE, "!="),
            '<' if next_is_eq => (LE, "<="),
            '>' if next_is_eq => (GE, ">="),
            '=' => (ASSIGN, "="),
            '!' => (BANG, "!"),
            '<' => (LT, "<"),
            '>' => (GT, ">"),
            other => {
                return Err(SyntaxError::new(
                    format!("unexpected character `{}`", other),
                    self.line,
                ))
            }
        };
        if text.len() == 2 {
            self.chars.next();
        }
        self.push(kind, text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{lex, TokenKind};

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lex_operators_and_keywords() {
        use TokenKind::*;
        assert_eq!(
            kinds("def f(a) = a <= 2 != nil"),
            vec![DEF, IDENT, LPAREN, IDENT, RPAREN, ASSIGN, IDENT, LE, INT, NE, NIL, EOF]
        );
    }

    #[test]
    /// 括弧内と演算子直後の改行は区切りにならない。
    fn newlines_inside_brackets_and_after_operators_are_skipped() {
        use TokenKind::*;
        assert_eq!(kinds("[1,\n2]"), vec![LBRACK, INT, COMMA, INT, RBRACK, EOF]);
        assert_eq!(kinds("1 +\n2"), vec![INT, PLUS, INT, EOF]);
        assert_eq!(kinds("1\n2"), vec![INT, NEWLINE, INT, EOF]);
    }

    #[test]
    fn unterminated_string_is_incomplete() {
        let err = lex("\"abc").unwrap_err();
        assert!(err.incomplete);
        let err = lex("@").unwrap_err();
        assert!(!err.incomplete);
    }

    #[test]
    fn string_escapes_and_comments() {
        let toks = lex("\"a\\tb\\\"\" # trailing").unwrap();
        assert_eq!(toks[0].value, "a\tb\"");
        assert_eq!(toks[1].kind, TokenKind::EOF);
    }
}
