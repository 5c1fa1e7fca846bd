// パス: src/evaluator.rs
// 役割: REPL エンジンが利用する評価器の抽象
// 意図: エンジンは「値 / 入力不足 / 実行時エラー / 終了要求」の結果だけを知ればよいようにする
// 関連ファイル: src/calc/mod.rs, src/repl/cmd.rs, src/errors.rs
//! 評価器インタフェース。

use std::io::Write;

use crate::errors::Failure;
use crate::value::Value;

/// 評価器が管理するレキシカル環境の識別子。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(pub usize);

/// 1 回の評価の結果。
#[derive(Clone, Debug)]
pub enum Evaluation {
    Value(Value),
    /// 入力が途中で終わっている（さらに行が必要）。
    Incomplete { message: String },
    Failed(Failure),
    /// プロセス終了要求。
    Exit(i32),
}

/// 任意のソーステキストを名前付き環境で評価する能力。
pub trait Evaluator {
    /// セッション用の環境を作る。子環境は親の変数を参照でき、`self` は `target`。
    fn open_scope(&mut self, parent: Option<ScopeId>, target: Value) -> ScopeId;

    fn close_scope(&mut self, scope: ScopeId);

    /// `source` を評価する。`label` は呼び出し位置の記録に使うエンジン側の境界ラベル。
    fn evaluate(
        &mut self,
        source: &str,
        scope: ScopeId,
        label: &str,
        out: &mut dyn Write,
    ) -> Evaluation;

    fn set_var(&mut self, scope: ScopeId, name: &str, value: Value);

    /// `target` に対する引数なし問い合わせ（プロンプトの `%(name)i`）。
    fn query(&mut self, target: &Value, name: &str) -> Result<Value, Failure>;
}
