// パス: src/repl/cmd.rs
// 役割: REPL session loop, input accumulation and nested-session control
// 意図: Drive one depth of interaction and report how it ended to the caller
// 関連ファイル: src/repl/handlers.rs, src/repl/prompt.rs, src/repl/redirect.rs, src/evaluator.rs
//! 対話セッションの状態機械。
//!
//! `Engine` はプロセス全体で共有する状態（パラメータ・履歴・入出力・評価器）を
//! 持ち、最上位のセッションがこれを所有する。ネストしたセッションは同じ `Engine`
//! を借りて動き、深さ・連番・作業ディレクトリの履歴・結果スロットだけを自前で持つ。
//!
//! 1 回の反復は `LoopOutcome` を返し、セッションの終わり方は `SessionEnd` で
//! 呼び出し元へ伝える。制御シグナルはエラーとしては扱わない。

use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use super::history::HistoryStore;
use super::line_editor::{ReadResult, ReplLineSource, RustylineSource};
use super::metacmd::{self, MetaLine};
use super::printer::{color, write_failure, write_internal_error, write_result};
use super::prompt::{self, PromptState, RenderedPrompt};
use super::redirect::{self, Redirection};
use super::results::ResultSlots;
use super::util::expand_path;
use crate::calc::Calc;
use crate::errors::{Control, Failure, ReplError};
use crate::evaluator::{Evaluation, Evaluator, ScopeId};
use crate::params::Params;
use crate::system::{OsSystem, System};
use crate::value::Value;

static NESTED_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+&\z").unwrap());

const LABEL_PREFIX: &str = "intar/";

/// 外側へ伝える巻き戻し。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unwind {
    /// ネストを抜けて最上位まで戻る。
    Branch,
    /// すべての階層を終える。
    All,
    /// プロセス終了要求。
    Exit(i32),
}

/// 1 回の反復の結果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopOutcome {
    Continue,
    ClearAndContinue,
    StopThisLoop,
    StopAndPropagate(Unwind),
}

/// セッションの終わり方。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    Finished,
    Unwinding(Unwind),
}

impl SessionEnd {
    /// プロセスの終了コード。
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionEnd::Unwinding(Unwind::Exit(code)) => *code,
            _ => 0,
        }
    }
}

/// 1 つのアクション（評価またはメタコマンド）の結果。
#[derive(Debug)]
pub(crate) enum Step {
    Value(Value),
    Failed(Failure),
    Control(Control),
    /// 入力が足りないので次の行を待つ。
    Incomplete,
    /// 値に入り込むネストしたセッションを開く。
    Enter(Value),
}

impl From<Value> for Step {
    fn from(v: Value) -> Self {
        Step::Value(v)
    }
}

/// 読み取った論理単位。
enum Input {
    Unit(String),
    Eof,
    Failed(io::Error),
}

/// セッション間で共有される状態。
pub struct Engine<'io> {
    pub(crate) editor: &'io mut dyn ReplLineSource,
    pub(crate) system: &'io dyn System,
    pub(crate) evaluator: &'io mut dyn Evaluator,
    pub(crate) out: &'io mut dyn Write,
    pub(crate) err: &'io mut dyn Write,
    pub(crate) params: Params,
    pub(crate) history: HistoryStore,
}

impl<'io> Engine<'io> {
    pub fn new(
        editor: &'io mut dyn ReplLineSource,
        system: &'io dyn System,
        evaluator: &'io mut dyn Evaluator,
        out: &'io mut dyn Write,
        err: &'io mut dyn Write,
        params: Params,
    ) -> Self {
        Self {
            editor,
            system,
            evaluator,
            out,
            err,
            params,
            history: HistoryStore::new(),
        }
    }

    /// 履歴ストアを差し替える（ロック待ち間隔の調整など）。
    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = history;
        self
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// 最上位（深さ 0）のセッションを開く。
    pub fn session(&mut self, target: Value) -> Session<'_, 'io> {
        Session::open(self, None, 0, target)
    }
}

/// 1 階層分の対話セッション。
pub struct Session<'e, 'io> {
    pub(crate) engine: &'e mut Engine<'io>,
    pub(crate) depth: usize,
    pub(crate) counter: u64,
    pub(crate) scope: ScopeId,
    pub(crate) target: Value,
    pending: Option<String>,
    pub(crate) dir_stack: Vec<PathBuf>,
    results: ResultSlots,
    pub(crate) redirect: Option<Redirection>,
    label: String,
}

impl<'e, 'io> Session<'e, 'io> {
    fn open(
        engine: &'e mut Engine<'io>,
        parent: Option<ScopeId>,
        depth: usize,
        target: Value,
    ) -> Self {
        let scope = engine.evaluator.open_scope(parent, target.clone());
        debug!(depth, target = %target.inspect(), "session opened");
        Self {
            engine,
            depth,
            counter: 1,
            scope,
            target,
            pending: None,
            dir_stack: Vec::new(),
            results: ResultSlots::new(),
            redirect: None,
            label: format!("{}execute", LABEL_PREFIX),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn target(&self) -> &Value {
        &self.target
    }

    pub fn results(&self) -> &ResultSlots {
        &self.results
    }

    /// 対話を行わずにソースを評価する。
    pub fn execute(&mut self, source: &str) -> Evaluation {
        self.evaluate_source(source)
    }

    /// `target` に束縛したネストしたセッションを開き、終わるまで走らせる。
    pub fn open_nested(&mut self, target: Value) -> SessionEnd {
        let mut child = Session::open(&mut *self.engine, Some(self.scope), self.depth + 1, target);
        child.run()
    }

    /// ループを走らせる。深さ 0 のときだけ履歴ファイルを読み書きする。
    pub fn run(&mut self) -> SessionEnd {
        if self.depth == 0 {
            self.load_history_file_reporting();
        }
        self.results.publish(&mut *self.engine.evaluator, self.scope);
        let end = loop {
            match self.iterate_guarded() {
                LoopOutcome::Continue | LoopOutcome::ClearAndContinue => {}
                LoopOutcome::StopThisLoop => break SessionEnd::Finished,
                LoopOutcome::StopAndPropagate(unwind) => break SessionEnd::Unwinding(unwind),
            }
        };
        if self.depth == 0 {
            if let Err(e) = self.save_history_file() {
                self.report(&e);
            }
        }
        debug!(depth = self.depth, end = ?end, "session closed");
        end
    }

    fn iterate_guarded(&mut self) -> LoopOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| self.iterate())) {
            Ok(outcome) => outcome,
            Err(payload) => {
                self.redirect = None;
                self.pending = None;
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                let colored = self.engine.params.color();
                let _ = write_internal_error(&mut *self.engine.err, &message, colored);
                LoopOutcome::Continue
            }
        }
    }

    fn iterate(&mut self) -> LoopOutcome {
        let unit = match self.read_unit() {
            Input::Unit(unit) => unit,
            Input::Eof => {
                let _ = writeln!(self.engine.out);
                return LoopOutcome::StopThisLoop;
            }
            Input::Failed(e) => {
                let _ = writeln!(self.engine.err, "Input error: {}", e);
                return LoopOutcome::StopThisLoop;
            }
        };

        let mut line = unit;
        let target = {
            let params = &self.engine.params;
            let env_pager = self.engine.system.env_var("PAGER");
            redirect::detect(
                &mut line,
                params.pager().as_deref(),
                env_pager.as_deref(),
                params.output().as_deref(),
            )
        };
        if line.trim().is_empty() {
            return LoopOutcome::Continue;
        }

        let mut step = match target.open() {
            Ok(r) => {
                self.redirect = r;
                self.perform(line)
            }
            Err(e) => Step::Failed(e.to_failure()),
        };
        if let Step::Enter(value) = step {
            self.redirect = None;
            match self.enter(value) {
                Ok(v) => step = Step::Value(v),
                Err(unwind) => return LoopOutcome::StopAndPropagate(unwind),
            }
        }

        let result = match step {
            Step::Incomplete => {
                self.redirect = None;
                return LoopOutcome::Continue;
            }
            Step::Control(control) => {
                self.redirect = None;
                return self.control(control);
            }
            Step::Value(v) => {
                self.display(&v);
                v
            }
            Step::Failed(f) => {
                self.show_failure(&f);
                Value::Error(Rc::new(f))
            }
            Step::Enter(v) => v,
        };
        self.finish_redirect();
        self.track(&result);
        LoopOutcome::Continue
    }

    /// 物理行を読み、論理単位を組み立てる。
    fn read_unit(&mut self) -> Input {
        let mut acc = self.pending.take();
        loop {
            let prompt = self.render_prompt(acc.is_some());
            self.label = format!("{}{}", LABEL_PREFIX, prompt.plain);
            let line = match self.engine.editor.read_line(&prompt.display) {
                Ok(ReadResult::Line(line)) => line,
                Ok(ReadResult::Eof) => return Input::Eof,
                // 空のプロンプトでの中断は入力の終わり。継続中なら蓄積を保って読み直す
                Ok(ReadResult::Interrupted) => {
                    if acc.is_none() {
                        return Input::Eof;
                    }
                    let _ = writeln!(self.engine.err, "^C");
                    continue;
                }
                Err(e) => return Input::Failed(e),
            };
            let hidden = acc.is_none()
                && self.engine.params.histhid()
                && line.starts_with([' ', '\t']);
            if !hidden && self.engine.history.push(&line) {
                self.engine.editor.add_history(&line);
            }
            if let Some(unit) = acc.as_mut() {
                unit.push('\n');
                unit.push_str(&line);
            } else if !line.is_empty() {
                acc = Some(line);
            }
            if let Some(unit) = acc {
                let reset = color(self.engine.params.color(), &[]);
                let _ = write!(self.engine.out, "{}", reset);
                return Input::Unit(unit);
            }
        }
    }

    fn render_prompt(&mut self, continuation: bool) -> RenderedPrompt {
        let template = self.engine.params.prompt();
        let state = PromptState {
            target: &self.target,
            counter: self.counter,
            depth: self.depth,
            continuation,
            color: self.engine.params.color(),
        };
        prompt::render(
            &template,
            &state,
            &mut *self.engine.evaluator,
            self.engine.system,
        )
    }

    /// メタコマンドまたは評価を 1 回行う。
    fn perform(&mut self, line: String) -> Step {
        match metacmd::parse(&line) {
            Some(meta) => {
                let step = self.dispatch(&meta);
                match (step, meta.rest) {
                    // 残りの行は継続入力として次の行を待つ
                    (Step::Value(_), Some(rest)) => {
                        self.pending = Some(rest);
                        Step::Incomplete
                    }
                    (step, _) => step,
                }
            }
            None => self.evaluate_unit(line),
        }
    }

    fn dispatch(&mut self, meta: &MetaLine) -> Step {
        debug!(command = %meta.command, arg = ?meta.arg, "metacommand");
        let arg = meta.arg.as_deref();
        match metacmd::lookup(&meta.command).and_then(|mc| self.run_handler(mc.handler, arg)) {
            Ok(step) => step,
            Err(e) => Step::Failed(e.to_failure()),
        }
    }

    fn evaluate_unit(&mut self, line: String) -> Step {
        let (source, nested) = match NESTED_SUFFIX.find(&line) {
            Some(m) => (line[..m.start()].to_string(), true),
            None => (line.clone(), false),
        };
        match self.evaluate_source(&source) {
            Evaluation::Incomplete { message } => {
                if line.ends_with('\n') {
                    Step::Failed(Failure::new("SyntaxError", message))
                } else {
                    trace!(depth = self.depth, "incomplete input");
                    self.pending = Some(line);
                    Step::Incomplete
                }
            }
            other => {
                let step = self.evaluation_step(other);
                match step {
                    Step::Value(v) if nested => Step::Enter(v),
                    step => step,
                }
            }
        }
    }

    pub(crate) fn evaluation_step(&self, evaluation: Evaluation) -> Step {
        match evaluation {
            Evaluation::Value(v) => Step::Value(v),
            Evaluation::Failed(f) => Step::Failed(f),
            Evaluation::Incomplete { message } => Step::Failed(Failure::new("SyntaxError", message)),
            Evaluation::Exit(code) if self.engine.params.catch_exit() => {
                Step::Failed(Failure::new("Exit", format!("exit {}", code)))
            }
            Evaluation::Exit(code) => Step::Control(Control::Exit(code)),
        }
    }

    pub(crate) fn evaluate_source(&mut self, source: &str) -> Evaluation {
        let label = self.label.clone();
        self.evaluate_labeled(source, &label)
    }

    pub(crate) fn evaluate_labeled(&mut self, source: &str, label: &str) -> Evaluation {
        let Session {
            engine,
            redirect,
            scope,
            ..
        } = self;
        let out: &mut dyn Write = match redirect.as_mut() {
            Some(r) => r,
            None => &mut *engine.out,
        };
        engine.evaluator.evaluate(source, *scope, label, out)
    }

    /// 値（リストなら各要素）に入り込む。子の巻き戻しのうち、この深さで
    /// 止めるべきでないものは `Err` で返す。
    fn enter(&mut self, value: Value) -> Result<Value, Unwind> {
        let targets: Vec<Value> = match &value {
            Value::List(items) => items.iter().cloned().collect(),
            other => vec![other.clone()],
        };
        for target in targets {
            match self.open_nested(target) {
                SessionEnd::Finished => {}
                SessionEnd::Unwinding(Unwind::Branch) if self.depth == 0 => break,
                SessionEnd::Unwinding(unwind) => return Err(unwind),
            }
        }
        Ok(value)
    }

    fn control(&mut self, control: Control) -> LoopOutcome {
        trace!(depth = self.depth, control = ?control, "control signal");
        match control {
            Control::ClearInput => {
                self.pending = None;
                LoopOutcome::ClearAndContinue
            }
            Control::StopSession => LoopOutcome::StopThisLoop,
            Control::StopBranch if self.depth == 0 => LoopOutcome::StopThisLoop,
            Control::StopBranch => LoopOutcome::StopAndPropagate(Unwind::Branch),
            Control::StopAll => LoopOutcome::StopAndPropagate(Unwind::All),
            Control::Exit(code) => LoopOutcome::StopAndPropagate(Unwind::Exit(code)),
        }
    }

    /// 現在の出力先（リダイレクト中ならその先）。
    pub(crate) fn out(&mut self) -> &mut dyn Write {
        match self.redirect.as_mut() {
            Some(r) => r,
            None => &mut *self.engine.out,
        }
    }

    fn display(&mut self, value: &Value) {
        let show = self.engine.params.show();
        let shownil = self.engine.params.shownil();
        let width = self.engine.system.terminal_width();
        if let Err(e) = write_result(self.out(), value, show, shownil, width) {
            debug!("display failed: {}", e);
        }
    }

    fn show_failure(&mut self, failure: &Failure) {
        let colored = self.engine.params.color();
        if let Err(e) = write_failure(&mut *self.engine.err, failure, &self.label, colored) {
            debug!("failure report failed: {}", e);
        }
    }

    pub(crate) fn report(&mut self, error: &ReplError) {
        self.show_failure(&error.to_failure());
    }

    fn finish_redirect(&mut self) {
        if let Some(r) = self.redirect.take() {
            if let Err(e) = r.finish() {
                self.report(&e);
            }
        }
    }

    fn track(&mut self, result: &Value) {
        let shownil = self.engine.params.shownil();
        self.results.record(result, self.counter, shownil);
        self.results.publish(&mut *self.engine.evaluator, self.scope);
        self.counter += 1;
    }

    /// 履歴ファイルのパス。`~` と相対パスはホームディレクトリ基準で解決する。
    fn history_path(&self) -> Option<PathBuf> {
        let file = self.engine.params.histfile()?;
        let home = self.engine.system.home_dir();
        let base = match &home {
            Some(h) => h.clone(),
            None => self.engine.system.current_dir().ok()?,
        };
        Some(expand_path(&file, &base, home.as_deref()))
    }

    pub(crate) fn load_history_file(&mut self) -> Result<(), ReplError> {
        let Some(path) = self.history_path() else {
            return Ok(());
        };
        let max = self.engine.params.histmax();
        self.engine.history.load(&path)?;
        self.engine.history.limit(max);
        self.engine.editor.replace_history(self.engine.history.entries());
        Ok(())
    }

    fn load_history_file_reporting(&mut self) {
        if let Err(e) = self.load_history_file() {
            self.report(&e);
        }
    }

    pub(crate) fn save_history_file(&mut self) -> Result<(), ReplError> {
        let Some(path) = self.history_path() else {
            return Ok(());
        };
        let params = &self.engine.params;
        self.engine
            .history
            .save(&path, params.histmax(), params.histlock_retries())
    }
}

impl Drop for Session<'_, '_> {
    fn drop(&mut self) {
        self.redirect = None;
        self.engine.evaluator.close_scope(self.scope);
    }
}

/// 標準入出力と rustyline で対話セッションを走らせ、終了コードを返す。
pub fn run_repl(params: Params) -> io::Result<i32> {
    let mut editor = RustylineSource::new()?;
    let system = OsSystem;
    let mut calc = Calc::new();
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let end = run_repl_with(
        &mut editor,
        &system,
        &mut calc,
        &mut stdout,
        &mut stderr,
        params,
        Value::Nil,
    );
    stdout.flush()?;
    Ok(end.exit_code())
}

/// 入出力と評価器を差し替えて最上位セッションを走らせる。
pub fn run_repl_with(
    editor: &mut dyn ReplLineSource,
    system: &dyn System,
    evaluator: &mut dyn Evaluator,
    out: &mut dyn Write,
    err: &mut dyn Write,
    params: Params,
    target: Value,
) -> SessionEnd {
    let mut engine = Engine::new(editor, system, evaluator, out, err, params);
    let mut session = engine.session(target);
    session.run()
}
