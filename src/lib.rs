// パス: src/lib.rs
// 役割: Crate root wiring modules and exports
// 意図: Expose the REPL engine together with its evaluator and process seams
// 関連ファイル: src/repl/mod.rs, src/evaluator.rs, src/errors.rs
//! intar (Rust) ルートモジュール
//!
//! 目的:
//! - メタコマンド・入れ子セッション・出力リダイレクトを備えた対話評価ループを提供する。
//! - 評価器・行入力・OS 操作はトレイト越しに差し替えられる。
//!
//! 方針:
//! - コメント/ドキュメントは日本語、識別子は英語。
//! - 同梱の `calc` 言語で単体でも動作確認できるようにする。
//! - パブリックAPIは最小限。

pub mod calc;
pub mod errors;
pub mod evaluator;
pub mod params;
pub mod repl;
pub mod system;
pub mod value;

pub use crate::errors::{Control, Failure, Location, ReplError, ReplResult};
pub use crate::evaluator::{Evaluation, Evaluator, ScopeId};
pub use crate::params::Params;
pub use crate::system::{CommandStatus, OsSystem, System};
pub use crate::value::Value;
