// パス: src/value.rs
// 役割: 評価器と REPL エンジンが共有する値ドメイン
// 意図: 結果追跡・プロンプト・表示が評価器の内部表現に依存しないようにする
// 関連ファイル: src/evaluator.rs, src/calc/eval.rs, src/repl/results.rs
//! 値（Value）
//!
//! - リスト/マップは `Rc` で共有し、同一性（ポインタ比較）を観測可能にする。
//! - `inspect` は構造化表示、`to_display` は文字列表示を返す。

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use crate::calc::Function;
use crate::errors::Failure;

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Rc<Vec<Value>>),
    Map(Rc<BTreeMap<i64, Value>>),
    Func(Rc<Function>),
    Error(Rc<Failure>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// 真偽判定。`nil` と `false` のみが偽。
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// 型ラベル（プロンプトの `%C` とエラー表示で使う）。
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Str(_) => "Str",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Func(_) => "Func",
            Value::Error(_) => "Error",
        }
    }

    /// 同一オブジェクトかどうか。共有コンテナはポインタで比較する。
    pub fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// 構造化表示。文字列は引用符付きでエスケープされる。
    pub fn inspect(&self) -> String {
        match self {
            Value::Nil => "nil".into(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Str(s) => quote(s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::inspect).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{} => {}", k, v.inspect()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Func(f) => format!("#<fn {}({})>", f.name, f.params.join(", ")),
            Value::Error(e) => format!("#<{}: {}>", e.kind, e.message),
        }
    }

    /// 文字列表示。文字列はそのまま、それ以外は `inspect` と同じ。
    pub fn to_display(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Nil => String::new(),
            other => other.inspect(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (a, b) => a.same_object(b),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}

/// 文字列をダブルクォートで囲み、制御文字をエスケープする。
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x1b' => out.push_str("\\e"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_nested_collections() {
        let v = Value::list(vec![Value::Int(1), Value::str("a\"b"), Value::Nil]);
        assert_eq!(v.inspect(), "[1, \"a\\\"b\", nil]");
        let mut m = BTreeMap::new();
        m.insert(3, Value::Bool(true));
        assert_eq!(Value::Map(Rc::new(m)).inspect(), "{3 => true}");
    }

    #[test]
    /// 内容が等しくても別オブジェクトなら same_object は偽になる。
    fn same_object_compares_identity() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = a.clone();
        let c = Value::list(vec![Value::Int(1)]);
        assert!(a.same_object(&b));
        assert!(!a.same_object(&c));
        assert_eq!(a, c);
        assert!(!Value::Int(1).same_object(&Value::Int(1)));
    }

    #[test]
    fn display_and_truthiness() {
        assert_eq!(Value::str("hi").to_display(), "hi");
        assert_eq!(Value::Int(4).to_display(), "4");
        assert!(!Value::Nil.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Int(0).truthy());
        assert_eq!(Value::from(None::<i64>), Value::Nil);
    }
}
