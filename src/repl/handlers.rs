// パス: src/repl/handlers.rs
// 役割: Built-in metacommand implementations
// 意図: Give every registry entry its behavior on top of the session and process capabilities
// 関連ファイル: src/repl/metacmd.rs, src/repl/cmd.rs, src/system.rs
//! メタコマンドの実装。
//!
//! いずれも `Session` のメソッドとして動き、出力は `Session::out` を通すので
//! 行末のリダイレクトに従う。戻り値は結果追跡に入る値か制御シグナル。

use std::io::Write;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::cmd::{Session, Step};
use super::metacmd::{self, Handler};
use super::printer::{write_help_entry, write_help_index};
use super::util::{expand_path, parse_param, split_assign, unquote};
use crate::errors::{Control, ReplError, ReplResult};
use crate::value::Value;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_SHELL: &str = "/bin/sh";
const DEFAULT_EDITOR: &str = "vi";

static HISTORY_SEARCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A(\d+)?/\s*(.*)\z").unwrap());
static HISTORY_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A(\d+)(?:\s+(\d+))?\s*\z").unwrap());

impl Session<'_, '_> {
    pub(crate) fn run_handler(&mut self, handler: Handler, arg: Option<&str>) -> ReplResult<Step> {
        match handler {
            Handler::Help => self.cmd_help(arg),
            Handler::Version => self.cmd_version(),
            Handler::Quit => Ok(Step::Control(quit_control(arg))),
            Handler::Clear => Ok(Step::Control(Control::ClearInput)),
            Handler::Cd => self.cmd_cd(arg),
            Handler::Env => self.cmd_env(arg),
            Handler::Shell => self.cmd_shell(arg),
            Handler::Param => self.cmd_param(arg),
            Handler::Input => self.cmd_input(arg),
            Handler::Output => self.cmd_output(arg),
            Handler::Edit => self.cmd_edit(arg),
            Handler::History => self.cmd_history(arg),
        }
    }

    fn cmd_help(&mut self, arg: Option<&str>) -> ReplResult<Step> {
        match arg {
            Some(name) => {
                let mc = metacmd::lookup(name)?;
                write_help_entry(self.out(), mc)?;
            }
            None => write_help_index(self.out())?,
        }
        Ok(Value::Nil.into())
    }

    fn cmd_version(&mut self) -> ReplResult<Step> {
        writeln!(self.out(), "intar {}", VERSION)?;
        Ok(Value::str(VERSION).into())
    }

    /// `N`、パス、`%` で移動。先頭の `-` は積み下ろしのみ、`=` は積まずに移動。
    fn cmd_cd(&mut self, arg: Option<&str>) -> ReplResult<Step> {
        let system = self.engine.system;
        let current = system.current_dir()?;
        let mut result = current.clone();
        if let Some(arg) = arg {
            let (mode, rest) = match arg.as_bytes().first() {
                Some(b'=') | Some(b'-') => (arg.chars().next(), &arg[1..]),
                _ => (None, arg),
            };
            let dir = if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
                let n: usize = rest
                    .parse()
                    .map_err(|_| ReplError::failed(format!("No directory #{}.", rest)))?;
                match self.dir_stack.len().checked_sub(n) {
                    Some(idx) if n > 0 => self.dir_stack[idx].clone(),
                    _ => return Err(ReplError::failed(format!("No directory #{}.", rest))),
                }
            } else if rest.is_empty() || rest == "%" {
                self.dir_stack
                    .last()
                    .cloned()
                    .ok_or_else(|| ReplError::failed("No last directory."))?
            } else {
                expand_path(rest, &current, system.home_dir().as_deref())
            };
            self.dir_stack.retain(|d| d != &dir);
            if mode != Some('-') {
                system
                    .set_current_dir(&dir)
                    .map_err(|e| ReplError::failed(format!("{}: {}", dir.display(), e)))?;
                if mode != Some('=') {
                    self.dir_stack.push(current);
                }
                debug!(dir = %dir.display(), "directory changed");
                result = dir;
            }
        }
        let count = self.dir_stack.len();
        let listing: Vec<String> = self
            .dir_stack
            .iter()
            .enumerate()
            .map(|(i, d)| format!("{:2}  {}", count - i, d.display()))
            .collect();
        let out = self.out();
        for line in listing {
            writeln!(out, "{}", line)?;
        }
        Ok(Value::Str(result.display().to_string()).into())
    }

    fn cmd_env(&mut self, arg: Option<&str>) -> ReplResult<Step> {
        let system = self.engine.system;
        let Some(arg) = arg else {
            let out = self.out();
            for (name, value) in system.env_vars() {
                writeln!(out, "{}={}", name, value)?;
            }
            return Ok(Value::Nil.into());
        };
        let (name, value) = split_assign(arg);
        match value {
            Some(value) => {
                let value = unquote(&value).unwrap_or(value);
                system.set_env_var(&name, &value);
                Ok(Value::Str(value).into())
            }
            None => Ok(Value::from(system.env_var(&name)).into()),
        }
    }

    fn cmd_shell(&mut self, arg: Option<&str>) -> ReplResult<Step> {
        let system = self.engine.system;
        let command = match arg {
            Some(c) => c.to_string(),
            None => system
                .env_var("SHELL")
                .unwrap_or_else(|| DEFAULT_SHELL.to_string()),
        };
        self.out().flush()?;
        let stdout = match self.redirect.as_ref() {
            Some(r) => r.try_clone_file()?,
            None => None,
        };
        let status = system.run_command(&command, stdout)?;
        if !status.success {
            return Err(ReplError::failed(format!(
                "Exit code: {}",
                status.code.map_or_else(|| "none".to_string(), |c| c.to_string())
            )));
        }
        Ok(Value::Nil.into())
    }

    fn cmd_param(&mut self, arg: Option<&str>) -> ReplResult<Step> {
        let Some(arg) = arg else {
            let lines: Vec<String> = self
                .engine
                .params
                .iter()
                .map(|(name, value)| format!("{}={}", name, value.inspect()))
                .collect();
            let out = self.out();
            for line in lines {
                writeln!(out, "{}", line)?;
            }
            return Ok(Value::Nil.into());
        };
        let (name, value) = split_assign(arg);
        match value {
            Some(raw) => {
                let value = parse_param(&raw);
                debug!(param = %name, value = %value.inspect(), "parameter set");
                self.engine.params.set(name, value.clone());
                Ok(value.into())
            }
            None => Ok(self.engine.params.get(&name).into()),
        }
    }

    fn cmd_input(&mut self, arg: Option<&str>) -> ReplResult<Step> {
        let path = arg.ok_or_else(|| ReplError::failed("No input file given."))?;
        let system = self.engine.system;
        let base = system.current_dir()?;
        let full = expand_path(path, &base, system.home_dir().as_deref());
        let source = system
            .read_to_string(&full)
            .map_err(|e| ReplError::failed(format!("{}: {}", path, e)))?;
        let evaluation = self.evaluate_labeled(&source, path);
        Ok(self.evaluation_step(evaluation))
    }

    fn cmd_output(&mut self, arg: Option<&str>) -> ReplResult<Step> {
        match arg {
            Some(path) => {
                let system = self.engine.system;
                system
                    .write_file(Path::new(path), "")
                    .map_err(|e| ReplError::failed(format!("File error: {}", e)))?;
                self.engine.params.set("output", Value::str(path));
                Ok(Value::str(path).into())
            }
            None => {
                self.engine.params.set("output", Value::Nil);
                Ok(Value::Nil.into())
            }
        }
    }

    /// 直近の（パターンに合う）履歴を編集器で開き、結果を次の入力欄に入れる。
    fn cmd_edit(&mut self, arg: Option<&str>) -> ReplResult<Step> {
        let pattern = arg.map(Regex::new).transpose()?;
        let entry = self
            .command_history()
            .find(|l| pattern.as_ref().map_or(true, |p| p.is_match(l)))
            .unwrap_or_default()
            .to_string();

        let mut file = tempfile::Builder::new()
            .prefix("intar-")
            .suffix(".calc")
            .tempfile()?;
        file.write_all(entry.as_bytes())?;
        file.flush()?;
        let path = file.into_temp_path();

        let system = self.engine.system;
        let editor = system
            .env_var("EDITOR")
            .or_else(|| system.env_var("VISUAL"))
            .unwrap_or_else(|| DEFAULT_EDITOR.to_string());
        let shown = path.display().to_string();
        let quoted = shlex::try_quote(&shown)
            .map_err(|e| ReplError::failed(format!("Executing editor failed: {}", e)))?;
        let command = format!("{} {}", editor, quoted);
        let status = system.run_command(&command, None)?;
        if !status.success {
            return Err(ReplError::failed(format!(
                "Executing editor failed: {}",
                status.code.map_or_else(|| "none".to_string(), |c| c.to_string())
            )));
        }
        let edited = system.read_to_string(&path)?.trim().to_string();
        if !edited.is_empty() {
            if self.engine.history.push(&edited) {
                self.engine.editor.add_history(&edited);
            }
            self.engine.editor.prefill(&edited);
        }
        Ok(Value::Str(edited).into())
    }

    fn cmd_history(&mut self, arg: Option<&str>) -> ReplResult<Step> {
        let Some(arg) = arg else {
            return self.show_history(5, 0);
        };
        match arg {
            "l" | "load" => {
                self.load_history_file()?;
                return Ok(Value::Nil.into());
            }
            "s" | "save" => {
                self.save_history_file()?;
                return Ok(Value::Nil.into());
            }
            _ => {}
        }
        if let Some(caps) = HISTORY_SEARCH.captures(arg) {
            let limit = caps.get(1).map_or(Ok(1), |m| m.as_str().parse::<usize>());
            let limit = limit.map_err(|_| ReplError::UnknownHistoryOperation(arg.to_string()))?;
            let pattern = Regex::new(&caps[2])?;
            let found: Vec<String> = self
                .command_history()
                .filter(|l| pattern.is_match(l))
                .take(if limit == 0 { usize::MAX } else { limit })
                .map(str::to_string)
                .collect();
            return self.print_oldest_first(found);
        }
        if let Some(caps) = HISTORY_RANGE.captures(arg) {
            let count = |i: usize| {
                caps.get(i)
                    .map_or(Ok(0), |m| m.as_str().parse::<usize>())
                    .map_err(|_| ReplError::UnknownHistoryOperation(arg.to_string()))
            };
            return self.show_history(count(1)?, count(2)?);
        }
        Err(ReplError::UnknownHistoryOperation(arg.to_string()))
    }

    fn show_history(&mut self, n: usize, skip: usize) -> ReplResult<Step> {
        let found: Vec<String> = self
            .command_history()
            .skip(skip)
            .take(n)
            .map(str::to_string)
            .collect();
        self.print_oldest_first(found)
    }

    fn print_oldest_first(&mut self, newest_first: Vec<String>) -> ReplResult<Step> {
        let out = self.out();
        for line in newest_first.iter().rev() {
            writeln!(out, "{}", line)?;
        }
        Ok(Value::Nil.into())
    }

    /// メタコマンド行を除いた履歴（新しい順）。
    fn command_history(&self) -> impl Iterator<Item = &str> + '_ {
        self.engine
            .history
            .scan_backward()
            .filter(|l| !l.starts_with('\\'))
    }
}

/// 先頭の `!` の数で終了の範囲を決める。
fn quit_control(arg: Option<&str>) -> Control {
    let bangs = arg.map_or(0, |a| a.chars().take_while(|c| *c == '!').count());
    match bangs {
        0 => Control::StopSession,
        1 => Control::StopBranch,
        _ => Control::StopAll,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_counts_leading_bangs() {
        assert_eq!(quit_control(None), Control::StopSession);
        assert_eq!(quit_control(Some("now")), Control::StopSession);
        assert_eq!(quit_control(Some("!")), Control::StopBranch);
        assert_eq!(quit_control(Some("!x!")), Control::StopBranch);
        assert_eq!(quit_control(Some("!!")), Control::StopAll);
        assert_eq!(quit_control(Some("!!!")), Control::StopAll);
    }
}
