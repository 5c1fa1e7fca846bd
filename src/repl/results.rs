//! 結果追跡（`_` / `__` / `___`）。
//!
//! `_` は直近の結果、`__` は新しい順の結果一覧、`___` は連番から結果への対応。
//! 値は評価器のセッション環境へ変数として公開する。

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::evaluator::{Evaluator, ScopeId};
use crate::value::Value;

pub const LAST_VAR: &str = "_";
pub const LIST_VAR: &str = "__";
pub const INDEX_VAR: &str = "___";

/// セッションごとの結果スロット。
#[derive(Clone, Debug, Default)]
pub struct ResultSlots {
    last: Value,
    list: Rc<Vec<Value>>,
    by_index: Rc<BTreeMap<i64, Value>>,
}

impl ResultSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> &Value {
        &self.last
    }

    pub fn list(&self) -> Value {
        Value::List(Rc::clone(&self.list))
    }

    pub fn by_index(&self) -> Value {
        Value::Map(Rc::clone(&self.by_index))
    }

    /// 自分自身のコンテナかどうか。
    fn is_own_container(&self, result: &Value) -> bool {
        result.same_object(&self.list()) || result.same_object(&self.by_index())
    }

    /// 1 回分の結果を記録する。
    ///
    /// 追跡用コンテナそのものは記録しない。`nil` は `shownil` が無効なら
    /// 連番の対応表にだけ入れる。
    pub fn record(&mut self, result: &Value, counter: u64, shownil: bool) {
        if self.is_own_container(result) {
            return;
        }
        if !result.is_nil() || shownil {
            self.last = result.clone();
            Rc::make_mut(&mut self.list).insert(0, result.clone());
        }
        Rc::make_mut(&mut self.by_index).insert(counter as i64, result.clone());
    }

    /// 評価器の環境へ `_` `__` `___` を書き込む。
    pub fn publish(&self, evaluator: &mut dyn Evaluator, scope: ScopeId) {
        evaluator.set_var(scope, LAST_VAR, self.last.clone());
        evaluator.set_var(scope, LIST_VAR, self.list());
        evaluator.set_var(scope, INDEX_VAR, self.by_index());
    }
}
