// パス: src/repl/mod.rs
// 役割: REPL module facade and re-exports
// 意図: Expose interactive entry points without leaking internals
// 関連ファイル: src/repl/cmd.rs, src/repl/handlers.rs, src/bin/intar.rs
//! 対話エンジンを構成するモジュール群をまとめたファサード。
//!
//! - `cmd`: セッションのループと入れ子の制御
//! - `handlers` / `metacmd`: メタコマンドの実装と登録表
//! - `history`: 履歴ストアとファイルへの保存
//! - `prompt`: プロンプトテンプレートの展開
//! - `redirect`: 行末の `|` / `>` によるリダイレクト
//! - `results`: `_` `__` `___` の結果追跡
//! - `printer`: 利用者向けの表示ロジック
//! - `util`: REPL 内部の軽量ユーティリティ

pub mod cmd;
mod handlers;
pub mod history;
pub mod line_editor;
pub mod metacmd;
mod printer;
pub mod prompt;
pub mod redirect;
pub mod results;
mod util;

pub use cmd::{run_repl, run_repl_with, Engine, LoopOutcome, Session, SessionEnd, Unwind};
pub use handlers::VERSION;
pub use history::HistoryStore;
pub use line_editor::{ReadResult, ReplLineSource, RustylineSource};
pub use redirect::RedirectTarget;
