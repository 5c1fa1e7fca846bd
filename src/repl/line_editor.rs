// パス: src/repl/line_editor.rs
// 役割: Line input seam and its rustyline-backed implementation
// 意図: Let the engine read physical lines without knowing the terminal library
// 関連ファイル: src/repl/cmd.rs, src/repl/history.rs, tests/test_support.rs
//! 行入力。
//!
//! エンジンは `ReplLineSource` だけを使う。履歴の正本は `HistoryStore` にあり、
//! 行エディタ側の履歴はカーソル移動用の写しに過ぎない。

use std::io;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// 行入力が返す 3 種類の結果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadResult {
    Line(String),
    Eof,
    Interrupted,
}

/// 物理行を 1 行ずつ供給する能力。
pub trait ReplLineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadResult>;
    fn add_history(&mut self, entry: &str);
    /// 履歴全体を置き換える（履歴ファイルの読み込み後）。
    fn replace_history(&mut self, entries: &[String]);
    /// 次の入力欄にあらかじめ文字列を入れておく。
    fn prefill(&mut self, text: &str);
}

/// rustyline による端末入力。
pub struct RustylineSource {
    editor: DefaultEditor,
    initial: Option<String>,
}

impl RustylineSource {
    pub fn new() -> io::Result<Self> {
        let editor = DefaultEditor::new().map_err(to_io)?;
        Ok(Self {
            editor,
            initial: None,
        })
    }
}

impl ReplLineSource for RustylineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadResult> {
        let result = match self.initial.take() {
            Some(text) => self.editor.readline_with_initial(prompt, (&text, "")),
            None => self.editor.readline(prompt),
        };
        match result {
            Ok(line) => Ok(ReadResult::Line(line)),
            Err(ReadlineError::Eof) => Ok(ReadResult::Eof),
            Err(ReadlineError::Interrupted) => Ok(ReadResult::Interrupted),
            Err(e) => Err(to_io(e)),
        }
    }

    fn add_history(&mut self, entry: &str) {
        if let Err(e) = self.editor.add_history_entry(entry) {
            tracing::debug!("line editor history: {}", e);
        }
    }

    fn replace_history(&mut self, entries: &[String]) {
        if let Err(e) = self.editor.clear_history() {
            tracing::debug!("line editor history: {}", e);
        }
        for entry in entries {
            self.add_history(entry);
        }
    }

    fn prefill(&mut self, text: &str) {
        self.initial = Some(text.to_string());
    }
}

fn to_io(e: ReadlineError) -> io::Error {
    match e {
        ReadlineError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}
