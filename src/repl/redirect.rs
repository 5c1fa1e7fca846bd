// パス: src/repl/redirect.rs
// 役割: Trailing `| cmd` / `> file` detection and scoped output redirection
// 意図: Route exactly one action's output into a pager or file and release it on every path
// 関連ファイル: src/repl/cmd.rs, src/repl/handlers.rs, src/system.rs
//! 出力リダイレクト。
//!
//! 行末の `| cmd`、`> file`、`>> file` を検出して行から取り除く。明示が無くても
//! `output` パラメータが設定されていればそのファイルへ追記する。
//! `Redirection` は 1 回のアクションの間だけ有効で、破棄時にファイルを閉じ、
//! ページャの終了を待つ。

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::process::{Child, Command, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::util::unescape;
use crate::errors::{ReplError, ReplResult};

static PIPE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+\|((?:\b|/)[^|&;{}()\[\]]*)?\z").unwrap());
static FILE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s+>(>)?(\S+|"((?:[^\\"]|\\.)*)")\z"#).unwrap());

const DEFAULT_PAGER: &str = "more";

/// これらを含むパイプ先はシェル経由で起動する。
const SHELL_META: &[char] = &[
    '|', '&', ';', '<', '>', '(', ')', '$', '`', '*', '?', '[', ']', '{', '}', '~', '#', '!',
    '\n',
];

/// シェルがコマンドを見つけられない・実行できないときの終了コード。
const SHELL_NOT_FOUND: i32 = 127;
const SHELL_NOT_EXECUTABLE: i32 = 126;

/// 1 行分のリダイレクト先。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedirectTarget {
    None,
    Pipe(String),
    File { path: String, append: bool },
}

/// 行末のリダイレクト指定を検出し、その部分を `line` から取り除く。
///
/// 優先順位はパイプ、ファイル、`output` パラメータの順。パイプのコマンドが空なら
/// `pager`、環境変数 `PAGER`、`more` の順に既定値を使う。
pub fn detect(
    line: &mut String,
    pager: Option<&str>,
    env_pager: Option<&str>,
    output: Option<&str>,
) -> RedirectTarget {
    if let Some(caps) = PIPE_SUFFIX.captures(line) {
        let start = caps.get(0).map_or(line.len(), |m| m.start());
        let command = caps
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .filter(|c| !c.is_empty())
            .or_else(|| pager.map(str::to_string))
            .or_else(|| env_pager.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_PAGER.to_string());
        line.truncate(start);
        return RedirectTarget::Pipe(command);
    }
    if let Some(caps) = FILE_SUFFIX.captures(line) {
        let start = caps.get(0).map_or(line.len(), |m| m.start());
        let append = caps.get(1).is_some();
        let path = match caps.get(3) {
            Some(quoted) => unescape(quoted.as_str()),
            None => caps[2].to_string(),
        };
        line.truncate(start);
        return RedirectTarget::File { path, append };
    }
    match output {
        Some(path) => RedirectTarget::File {
            path: path.to_string(),
            append: true,
        },
        None => RedirectTarget::None,
    }
}

/// パイプ先のコマンドを組み立てる。単純なコマンドは直接起動し、起動失敗をそのまま返す。
fn pipe_command(command: &str) -> Command {
    if !command.contains(SHELL_META) {
        if let Some(words) = shlex::split(command) {
            if let Some((program, args)) = words.split_first() {
                let mut cmd = Command::new(program);
                cmd.args(args);
                return cmd;
            }
        }
    }
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(command);
    cmd
}

impl RedirectTarget {
    /// リダイレクト先を開く。`None` なら何も開かない。
    pub fn open(&self) -> ReplResult<Option<Redirection>> {
        match self {
            RedirectTarget::None => Ok(None),
            RedirectTarget::Pipe(command) => {
                debug!(command = %command, "redirect to pipe");
                let mut child = pipe_command(command)
                    .stdin(Stdio::piped())
                    .spawn()
                    .map_err(|e| ReplError::failed(format!("Pipe error: {}: {}", command, e)))?;
                let stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| ReplError::failed("Pipe error: no stdin"))?;
                let file = File::from(OwnedFd::from(stdin));
                Ok(Some(Redirection {
                    file: Some(file),
                    child: Some((command.clone(), child)),
                }))
            }
            RedirectTarget::File { path, append } => {
                debug!(path = %path, append, "redirect to file");
                let mut opts = OpenOptions::new();
                if *append {
                    opts.append(true).create(true);
                } else {
                    opts.write(true).create(true).truncate(true);
                }
                let file = opts
                    .open(path)
                    .map_err(|e| ReplError::failed(format!("File error: {}", e)))?;
                Ok(Some(Redirection {
                    file: Some(file),
                    child: None,
                }))
            }
        }
    }
}

/// 有効なリダイレクト。破棄されるまで出力を受け取る。
#[derive(Debug)]
pub struct Redirection {
    file: Option<File>,
    child: Option<(String, Child)>,
}

impl Redirection {
    /// 外部コマンドの標準出力に渡すための複製。
    pub fn try_clone_file(&self) -> io::Result<Option<File>> {
        self.file.as_ref().map(File::try_clone).transpose()
    }

    /// 出力を閉じてパイプ先の終了を待つ。シェルがコマンドを起動できなかったら失敗を返す。
    pub fn finish(mut self) -> ReplResult<()> {
        self.close()
    }

    fn close(&mut self) -> ReplResult<()> {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush() {
                debug!("redirect flush failed: {}", e);
            }
        }
        let Some((command, mut child)) = self.child.take() else {
            return Ok(());
        };
        match child.wait() {
            Ok(status) => match status.code() {
                Some(code @ (SHELL_NOT_FOUND | SHELL_NOT_EXECUTABLE)) => Err(ReplError::failed(
                    format!("Pipe error: {}: exited with {}", command, code),
                )),
                _ => Ok(()),
            },
            Err(e) => {
                warn!("pager wait failed: {}", e);
                Ok(())
            }
        }
    }
}

impl Write for Redirection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(f) => f.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for Redirection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(line: &str, pager: Option<&str>, output: Option<&str>) -> (String, RedirectTarget) {
        let mut l = line.to_string();
        let t = detect(&mut l, pager, None, output);
        (l, t)
    }

    #[test]
    fn pipe_suffix_is_stripped() {
        let (rest, t) = run("xs |less -R", None, None);
        assert_eq!(rest, "xs");
        assert_eq!(t, RedirectTarget::Pipe("less -R".into()));
        let (rest, t) = run("xs |/usr/bin/head", None, None);
        assert_eq!(rest, "xs");
        assert_eq!(t, RedirectTarget::Pipe("/usr/bin/head".into()));
    }

    #[test]
    fn empty_pipe_falls_back_to_pager_then_more() {
        assert_eq!(run("xs |", Some("pg"), None).1, RedirectTarget::Pipe("pg".into()));
        let mut l = "xs |".to_string();
        assert_eq!(detect(&mut l, None, Some("most"), None), RedirectTarget::Pipe("most".into()));
        assert_eq!(run("xs |", None, None).1, RedirectTarget::Pipe("more".into()));
    }

    #[test]
    fn file_suffix_truncate_append_and_quoted() {
        assert_eq!(
            run("x >out.txt", None, None),
            ("x".into(), RedirectTarget::File { path: "out.txt".into(), append: false })
        );
        assert_eq!(
            run("x >>log", None, None).1,
            RedirectTarget::File { path: "log".into(), append: true }
        );
        assert_eq!(
            run(r#"x >"my \"file\"""#, None, None).1,
            RedirectTarget::File { path: "my \"file\"".into(), append: false }
        );
    }

    #[test]
    fn pipe_wins_and_detection_is_idempotent() {
        let (rest, t) = run("x >a |less", None, Some("o"));
        assert_eq!(rest, "x >a");
        assert_eq!(t, RedirectTarget::Pipe("less".into()));
        let (rest, _) = run("xs |less", None, None);
        let (again, t2) = run(&rest, None, None);
        assert_eq!(again, "xs");
        assert_eq!(t2, RedirectTarget::None);
    }

    #[test]
    /// 演算子の前後に空白があれば比較やビット演算として残る。
    fn spaced_operators_are_not_redirects() {
        assert_eq!(run("1 > 0", None, None).1, RedirectTarget::None);
        assert_eq!(run("a | b", None, None).1, RedirectTarget::None);
    }

    #[test]
    fn output_param_appends_without_suffix() {
        assert_eq!(
            run("x", None, Some("o.txt")),
            ("x".into(), RedirectTarget::File { path: "o.txt".into(), append: true })
        );
        assert_eq!(run("a || b", None, None).1, RedirectTarget::None);
    }

    #[test]
    fn file_redirection_writes_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("o.txt");
        let target = RedirectTarget::File {
            path: path.display().to_string(),
            append: true,
        };
        for word in ["one", "two"] {
            let mut r = target.open().unwrap().unwrap();
            writeln!(r, "{}", word).unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn pipe_redirection_feeds_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.txt");
        let target = RedirectTarget::Pipe(format!("cat > '{}'", path.display()));
        {
            let mut r = target.open().unwrap().unwrap();
            writeln!(r, "piped").unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "piped\n");
    }

    #[test]
    fn missing_pager_is_reported_at_open() {
        let err = RedirectTarget::Pipe("no-such-pager-xyz-123 -R".into())
            .open()
            .unwrap_err();
        assert!(err.to_string().starts_with("Pipe error: no-such-pager-xyz-123 -R: "));
    }

    #[test]
    /// シェル経由で見つからないコマンドは終了時に報告する。
    fn missing_command_behind_shell_is_reported_at_finish() {
        let r = RedirectTarget::Pipe("no-such-pager-xyz-123 $HOME".into())
            .open()
            .unwrap()
            .unwrap();
        let err = r.finish().unwrap_err();
        assert!(err.to_string().contains("exited with 127"), "{}", err);
    }

    #[test]
    fn quoted_arguments_reach_direct_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a b.txt");
        let target = RedirectTarget::Pipe(format!("tee '{}'", path.display()));
        let mut r = target.open().unwrap().unwrap();
        writeln!(r, "direct").unwrap();
        r.finish().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "direct\n");
    }

    #[test]
    fn open_failure_is_reported() {
        let target = RedirectTarget::File {
            path: "/nonexistent-dir/x".into(),
            append: false,
        };
        let err = target.open().unwrap_err();
        assert!(err.to_string().starts_with("File error: "));
    }
}
