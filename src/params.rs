// パス: src/params.rs
// 役割: ネストしたセッション間で共有される設定（パラメータ）
// 意図: 既定値・設定ファイル・コマンドライン・`\param` の順で上書きできる単一の表を提供する
// 関連ファイル: src/repl/handlers.rs, src/bin/intar.rs, src/repl/util.rs
//! パラメータ表
//!
//! 任意の名前を持てる `name -> Value` の順序付き表。既知の名前には型付きの
//! アクセサを用意し、値の型が想定と異なる場合は既定値として扱う。

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{ReplError, ReplResult};
use crate::value::Value;

pub const DEFAULT_PROMPT: &str = "%(32)c%16i%c:%1c%d:%3n%c%> ";

/// 共有パラメータ表。
#[derive(Clone, Debug)]
pub struct Params {
    entries: BTreeMap<String, Value>,
}

impl Default for Params {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("prompt".into(), Value::str(DEFAULT_PROMPT));
        entries.insert("color".into(), Value::Bool(true));
        entries.insert("show".into(), Value::Int(1));
        entries.insert("shownil".into(), Value::Bool(false));
        entries.insert("pager".into(), Value::Nil);
        entries.insert("catch_exit".into(), Value::Bool(false));
        entries.insert("histhid".into(), Value::Bool(true));
        entries.insert("histfile".into(), Value::Nil);
        entries.insert("histmax".into(), Value::Int(500));
        entries.insert("histlock_retries".into(), Value::Int(30));
        entries.insert("output".into(), Value::Nil);
        Self { entries }
    }
}

/// 設定ファイル（JSON オブジェクト）の読み込み形式。
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct ParamsFile {
    entries: BTreeMap<String, serde_json::Value>,
}

impl Params {
    pub fn get(&self, name: &str) -> Value {
        self.entries.get(name).cloned().unwrap_or(Value::Nil)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.entries.insert(name.into(), value);
    }

    /// 名前順の一覧。
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// JSON 設定を上書き適用する。値はスカラーのみ受け付ける。
    pub fn merge_json(&mut self, text: &str) -> ReplResult<()> {
        let file: ParamsFile =
            serde_json::from_str(text).map_err(|e| ReplError::Config(e.to_string()))?;
        for (name, raw) in file.entries {
            let value = match raw {
                serde_json::Value::Null => Value::Nil,
                serde_json::Value::Bool(b) => Value::Bool(b),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => Value::Int(i),
                    None => {
                        return Err(ReplError::Config(format!(
                            "{}: only integer numbers are supported",
                            name
                        )))
                    }
                },
                serde_json::Value::String(s) => Value::Str(s),
                _ => {
                    return Err(ReplError::Config(format!(
                        "{}: only scalar values are supported",
                        name
                    )))
                }
            };
            self.entries.insert(name, value);
        }
        Ok(())
    }

    pub fn merge_file(&mut self, path: &Path) -> ReplResult<()> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReplError::Config(format!("{}: {}", path.display(), e)))?;
        self.merge_json(&text)
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        match self.entries.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Nil) => false,
            Some(_) => true,
            None => default,
        }
    }

    fn text(&self, name: &str) -> Option<String> {
        match self.entries.get(name) {
            Some(Value::Nil) | None => None,
            Some(Value::Str(s)) => Some(s.clone()),
            Some(other) => Some(other.to_display()),
        }
    }

    pub fn prompt(&self) -> String {
        self.text("prompt").unwrap_or_default()
    }

    pub fn color(&self) -> bool {
        self.flag("color", true)
    }

    /// 表示行数の上限。`None` は表示しない、`Some(0)` は上限なし。
    pub fn show(&self) -> Option<usize> {
        match self.entries.get("show") {
            Some(Value::Nil) | Some(Value::Bool(false)) => None,
            Some(Value::Int(n)) => Some((*n).max(0) as usize),
            Some(Value::Str(s)) => Some(s.trim().parse().unwrap_or(0)),
            _ => Some(0),
        }
    }

    pub fn shownil(&self) -> bool {
        self.flag("shownil", false)
    }

    pub fn pager(&self) -> Option<String> {
        self.text("pager")
    }

    pub fn catch_exit(&self) -> bool {
        self.flag("catch_exit", false)
    }

    pub fn histhid(&self) -> bool {
        self.flag("histhid", true)
    }

    pub fn histfile(&self) -> Option<String> {
        self.text("histfile")
    }

    pub fn histmax(&self) -> usize {
        match self.entries.get("histmax") {
            Some(Value::Int(n)) if *n > 0 => *n as usize,
            _ => 500,
        }
    }

    pub fn histlock_retries(&self) -> u32 {
        match self.entries.get("histlock_retries") {
            Some(Value::Int(n)) if *n >= 0 => *n as u32,
            _ => 30,
        }
    }

    /// 永続的な出力先ファイル。
    pub fn output(&self) -> Option<String> {
        self.text("output")
    }
}
