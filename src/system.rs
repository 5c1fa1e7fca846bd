// パス: src/system.rs
// 役割: REPL が必要とするプロセス/OS 操作の最小限の抽象
// 意図: メタコマンドやプロンプトを実 OS から切り離してテスト可能にする
// 関連ファイル: src/repl/handlers.rs, src/repl/prompt.rs, tests/test_support.rs
//! プロセス・OS 能力。
//!
//! ファイル読み書き・作業ディレクトリ・環境変数・シェル実行・利用者/ホスト名・
//! 端末幅だけを公開する。`OsSystem` が実装の標準版。

use std::ffi::CStr;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// 外部コマンドの終了状態。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandStatus {
    pub success: bool,
    /// シグナル終了の場合は `None`。
    pub code: Option<i32>,
}

pub trait System {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()>;
    fn current_dir(&self) -> io::Result<PathBuf>;
    fn set_current_dir(&self, path: &Path) -> io::Result<()>;
    fn env_var(&self, name: &str) -> Option<String>;
    fn set_env_var(&self, name: &str, value: &str);
    /// 名前順に並べた環境変数。
    fn env_vars(&self) -> Vec<(String, String)>;
    /// シェル経由でコマンドを実行し、終了まで待つ。
    ///
    /// `stdout` が与えられた場合は標準出力をそこへ向け、標準入力は空にする。
    fn run_command(&self, command: &str, stdout: Option<File>) -> io::Result<CommandStatus>;
    fn user_name(&self) -> String;
    fn host_name(&self) -> String;
    fn home_dir(&self) -> Option<PathBuf>;
    /// 特権ユーザー（root）で動作しているか。
    fn is_privileged(&self) -> bool;
    fn terminal_width(&self) -> usize;
}

/// 実際の OS にアクセスする標準実装。
#[derive(Clone, Copy, Debug, Default)]
pub struct OsSystem;

impl System for OsSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn current_dir(&self) -> io::Result<PathBuf> {
        std::env::current_dir()
    }

    fn set_current_dir(&self, path: &Path) -> io::Result<()> {
        std::env::set_current_dir(path)
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn set_env_var(&self, name: &str, value: &str) {
        std::env::set_var(name, value);
    }

    fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = std::env::vars_os()
            .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
            .collect();
        vars.sort();
        vars
    }

    fn run_command(&self, command: &str, stdout: Option<File>) -> io::Result<CommandStatus> {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command);
        if let Some(out) = stdout {
            cmd.stdin(Stdio::null()).stdout(Stdio::from(out));
        }
        let status = cmd.status()?;
        Ok(CommandStatus {
            success: status.success(),
            code: status.code(),
        })
    }

    fn user_name(&self) -> String {
        passwd_name().or_else(|| std::env::var("USER").ok()).unwrap_or_default()
    }

    fn host_name(&self) -> String {
        let mut buf = [0u8; 256];
        // SAFETY: buf は有効な領域で、長さを正しく渡している。
        let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
        if rc != 0 {
            return String::new();
        }
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        String::from_utf8_lossy(&buf[..end]).into_owned()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    fn is_privileged(&self) -> bool {
        // SAFETY: getuid は常に成功する。
        unsafe { libc::getuid() == 0 }
    }

    fn terminal_width(&self) -> usize {
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        // SAFETY: ws は ioctl が書き込む winsize 構造体。
        let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
        if rc == 0 && ws.ws_col > 0 {
            return ws.ws_col as usize;
        }
        std::env::var("COLUMNS")
            .ok()
            .and_then(|c| c.parse().ok())
            .filter(|&c: &usize| c > 0)
            .unwrap_or(80)
    }
}

/// passwd データベースから現在の利用者名を引く。
fn passwd_name() -> Option<String> {
    // SAFETY: getpwuid の戻り値は静的領域を指すため、直ちに複製する。
    unsafe {
        let pw = libc::getpwuid(libc::getuid());
        if pw.is_null() || (*pw).pw_name.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*pw).pw_name).to_string_lossy().into_owned())
    }
}
