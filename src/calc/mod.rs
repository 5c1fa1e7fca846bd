// パス: src/calc/mod.rs
// 役割: 付属の小さな式言語 calc と Evaluator 実装
// 意図: REPL エンジンを単体で動かし、端から端まで試せるようにする
// 関連ファイル: src/calc/lexer.rs, src/calc/parser.rs, src/calc/eval.rs, src/evaluator.rs
//! calc 言語
//!
//! 整数・文字列・リスト・関数定義だけを持つ、エンジンの動作確認用の言語。
//! 構文エラーのうち入力末尾で途切れたものは `Evaluation::Incomplete` として返す。

mod eval;
pub mod lexer;
pub mod parser;

use std::fmt::{self, Display, Formatter};

pub use eval::Calc;
pub use parser::{parse_program, Expr, Program};

/// 利用者定義関数。
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
    /// 定義時の評価ラベル。
    pub label: String,
    pub line: usize,
}

/// 字句・構文エラー。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    /// 入力末尾で途切れているため、行を足せば解決しうる。
    pub incomplete: bool,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
            incomplete: false,
        }
    }

    pub fn incomplete(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
            incomplete: true,
        }
    }
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

impl std::error::Error for SyntaxError {}
