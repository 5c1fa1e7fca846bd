//! エラー型と制御シグナルの定義。
//!
//! - `ReplError`: メタコマンドや入出力で発生する運用上の失敗（報告してループ継続）。
//! - `Failure`: 評価器が返す実行時エラー（メッセージ・種別・呼び出し位置）。
//! - `Control`: ループを制御するシグナル。エラーではないので別の閉じた列挙にする。

use std::fmt::{self, Display, Formatter};
use std::io;

use thiserror::Error;

/// 対話ループ内で回復可能な失敗。
#[derive(Debug, Error)]
pub enum ReplError {
    #[error("Unknown Metacommand: {0}")]
    UnknownMetacommand(String),
    #[error("Unknown history command: {0}")]
    UnknownHistoryOperation(String),
    #[error("{0}")]
    OperationFailed(String),
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Config error: {0}")]
    Config(String),
}

impl ReplError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::OperationFailed(message.into())
    }

    /// `(Kind)` 表示に使う種別ラベル。
    pub fn kind(&self) -> &'static str {
        match self {
            ReplError::UnknownMetacommand(_) | ReplError::UnknownHistoryOperation(_) => "Unknown",
            ReplError::OperationFailed(_) => "Failed",
            ReplError::Io(_) => "IOError",
            ReplError::Pattern(_) => "PatternError",
            ReplError::Config(_) => "ConfigError",
        }
    }

    /// 結果追跡用の失敗オブジェクトへ変換する。
    pub fn to_failure(&self) -> Failure {
        Failure::new(self.kind(), self.to_string())
    }
}

pub type ReplResult<T> = Result<T, ReplError>;

/// 呼び出し位置。`label` は評価時に渡されたラベル（ファイル名やプロンプト）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub label: String,
    pub line: usize,
    pub function: Option<String>,
}

impl Location {
    pub fn new(label: impl Into<String>, line: usize, function: Option<String>) -> Self {
        Self {
            label: label.into(),
            line,
            function,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "{}:{}:in `{}'", self.label, self.line, name),
            None => write!(f, "{}:{}", self.label, self.line),
        }
    }
}

/// 評価器の実行時エラー。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub kind: String,
    pub message: String,
    /// 内側の呼び出しが先頭。
    pub trace: Vec<Location>,
}

impl Failure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<Location>) -> Self {
        self.trace = trace;
        self
    }

    /// エンジン側の境界ラベルより外側の位置を切り落とした呼び出し履歴を返す。
    ///
    /// 末尾から見て最初に `boundary` を持つ位置までを残す。境界が一つも無ければ
    /// 何も切り落とさない。
    pub fn trimmed_trace(&self, boundary: &str) -> &[Location] {
        match self.trace.iter().rposition(|loc| loc.label == boundary) {
            Some(idx) => &self.trace[..=idx],
            None => &self.trace,
        }
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// ループ制御シグナル。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    /// 蓄積中の入力を破棄して続行する。
    ClearInput,
    /// 現在のセッションだけを終了する。
    StopSession,
    /// ネストしたセッションをすべて抜けて最上位へ戻る。
    StopBranch,
    /// すべての階層を終了する。
    StopAll,
    /// プロセス終了要求。
    Exit(i32),
}
