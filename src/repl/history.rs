// パス: src/repl/history.rs
// 役割: Bounded in-memory history with lock-guarded persistence
// 意図: Share one store across nested sessions and merge safely with other processes
// 関連ファイル: src/repl/cmd.rs, src/repl/handlers.rs, src/repl/line_editor.rs
//! 入力履歴の保持と永続化。
//!
//! 複数行の項目はファイル上では改行を `\r` に置き換えて 1 行に収める。
//! 保存時はロックファイルで他プロセスと排他し、ディスク上の既存履歴と
//! 今回追加した分（`new_count`）をマージして書き戻す。

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::{ReplError, ReplResult};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// 履歴ストア。末尾が最新。
#[derive(Clone, Debug, Default)]
pub struct HistoryStore {
    entries: Vec<String>,
    new_count: usize,
    retry_interval: Option<Duration>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// ロック競合時の待ち時間を変更する（テスト用）。
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    /// 今回の実行で追加された項目数。
    pub fn new_count(&self) -> usize {
        self.new_count
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }

    /// 項目を追加する。空行と直前と同じ行は無視し、追加したら `true`。
    pub fn push(&mut self, line: &str) -> bool {
        if line.is_empty() || self.last() == Some(line) {
            return false;
        }
        self.entries.push(line.to_string());
        self.new_count += 1;
        true
    }

    /// 新しいものから順にたどる。
    pub fn scan_backward(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().rev().map(String::as_str)
    }

    /// 古い項目を捨てて `max` 件に収める。
    pub fn limit(&mut self, max: usize) {
        if self.entries.len() > max {
            let drop = self.entries.len() - max;
            self.entries.drain(..drop);
        }
        self.new_count = self.new_count.min(max);
    }

    /// ディスクの履歴を読み込み、今回追加した分をその上に積み直す。
    ///
    /// ファイルが存在しなければ何もしない。
    pub fn load(&mut self, path: &Path) -> ReplResult<()> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let keep = self.new_count.min(self.entries.len());
        let recent = self.entries.split_off(self.entries.len() - keep);
        self.entries.clear();
        self.entries
            .extend(text.lines().map(|l| l.replace('\r', "\n")));
        self.entries.extend(recent);
        debug!(path = %path.display(), entries = self.entries.len(), "history loaded");
        Ok(())
    }

    /// ディスクの履歴とマージして保存する。
    ///
    /// ディスク側は新しい方から `max - new_count` 行を残し、その後ろに今回の
    /// 追加分を新しい方から最大 `max` 件書き出す。
    pub fn save(&self, path: &Path, max: usize, lock_retries: u32) -> ReplResult<()> {
        let _lock = HistoryLock::acquire(path, lock_retries, self.retry_interval())?;
        let room = max.saturating_sub(self.new_count);
        let old: Vec<String> = match fs::read_to_string(path) {
            Ok(text) => {
                let lines: Vec<&str> = text.lines().collect();
                let skip = lines.len().saturating_sub(room);
                lines[skip..].iter().map(|l| l.to_string()).collect()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let fresh = self.new_count.min(max).min(self.entries.len());
        let mut file = fs::File::create(path)?;
        for line in &old {
            writeln!(file, "{}", line)?;
        }
        for entry in &self.entries[self.entries.len() - fresh..] {
            writeln!(file, "{}", entry.replace('\n', "\r"))?;
        }
        file.flush()?;
        debug!(path = %path.display(), kept = old.len(), appended = fresh, "history saved");
        Ok(())
    }

    fn retry_interval(&self) -> Duration {
        self.retry_interval.unwrap_or(LOCK_RETRY_INTERVAL)
    }
}

/// `<path>.lock` の存在による排他。破棄時にロックファイルを消す。
struct HistoryLock {
    path: PathBuf,
}

impl HistoryLock {
    fn acquire(target: &Path, retries: u32, interval: Duration) -> ReplResult<Self> {
        let mut name = target.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);
        let mut attempt = 0;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!("Lockfile {} exists.", path.display());
                    if attempt >= retries {
                        return Err(ReplError::failed(format!(
                            "Lockfile {} exists.",
                            path.display()
                        )));
                    }
                    attempt += 1;
                    thread::sleep(interval);
                }
                Err(e) => return Err(ReplError::Io(e)),
            }
        }
    }
}

impl Drop for HistoryLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("cannot remove {}: {}", self.path.display(), e);
            }
        }
    }
}
