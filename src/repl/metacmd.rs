// パス: src/repl/metacmd.rs
// 役割: Static metacommand table and backslash command parsing
// 意図: Keep the command surface declarative so help and dispatch read the same data
// 関連ファイル: src/repl/handlers.rs, src/repl/cmd.rs, src/repl/printer.rs
//! メタコマンドの登録表。
//!
//! 別名ごとに同じ記述子を指す表を起動時に一度だけ組み立てる。
//! ヘルプの一覧は記述子の定義順に並べる。

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{ReplError, ReplResult};

/// ハンドラの識別子。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Handler {
    Help,
    Version,
    Quit,
    Clear,
    Cd,
    Env,
    Shell,
    Param,
    Input,
    Output,
    Edit,
    History,
}

/// メタコマンドの記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct Metacommand {
    pub names: &'static [&'static str],
    pub handler: Handler,
    pub summary: &'static str,
    pub description: &'static str,
}

pub static METACOMMANDS: &[Metacommand] = &[
    Metacommand {
        names: &["?", "h", "help"],
        handler: Handler::Help,
        summary: "Help for metacommands",
        description: "List of Metacommands or help on a specific command, if given.\n",
    },
    Metacommand {
        names: &["v", "version"],
        handler: Handler::Version,
        summary: "Version information",
        description: "Print version number.\n",
    },
    Metacommand {
        names: &["q", "x", "quit", "exit"],
        handler: Handler::Quit,
        summary: "Quit Intar",
        description: "Leave Intar.\n\n  plain     quit current Intar level\n  !         quit all nested levels\n  !!        quit all levels\n",
    },
    Metacommand {
        names: &["c", "clear"],
        handler: Handler::Clear,
        summary: "Clear command line",
        description: "Use this if a statement cannot be successfully ended,\ni. e. when there is no other way to leave the dot prompt.\n",
    },
    Metacommand {
        names: &["cd"],
        handler: Handler::Cd,
        summary: "Change directory",
        description: "Switch to a different working directory.\nFormer directories will be pushed to a stack.\n\n  N|PATH|%     change directory and push\n  -N|PATH|%    drop stack item\n  =N|PATH|%    change directory but do not push\n\nDefault N or % is 1.\n",
    },
    Metacommand {
        names: &["$", "env"],
        handler: Handler::Env,
        summary: "Set environment variable",
        description: "Set or display an environment variable.\n",
    },
    Metacommand {
        names: &["!", "sh", "shell"],
        handler: Handler::Shell,
        summary: "Run shell command",
        description: "Run a shell command or a subshell.\n",
    },
    Metacommand {
        names: &["p", "param"],
        handler: Handler::Param,
        summary: "Set parameter",
        description: "Set or display a parameter.\n",
    },
    Metacommand {
        names: &["<", "i", "input"],
        handler: Handler::Input,
        summary: "Load source file",
        description: "Load a source file and evaluate its contents.\n",
    },
    Metacommand {
        names: &[">", "o", "output"],
        handler: Handler::Output,
        summary: "Output to file",
        description: "Append output to a file.\nWithout argument, stop writing to the file.\n",
    },
    Metacommand {
        names: &["e", "edit"],
        handler: Handler::Edit,
        summary: "Edit last command",
        description: "Take last command line from the history and open it in an editor.\nThe edited text is offered at the next prompt.\n",
    },
    Metacommand {
        names: &["^", "hist", "history"],
        handler: Handler::History,
        summary: "Manage history",
        description: "l load     Load history\ns save     Save history\n[N]/PAT    Search in history (N matches, 0 = all)\n[N [M]]    Show last N items (skip M)\n",
    },
];

static BY_NAME: Lazy<HashMap<&'static str, &'static Metacommand>> = Lazy::new(|| {
    METACOMMANDS
        .iter()
        .flat_map(|mc| mc.names.iter().map(move |n| (*n, mc)))
        .collect()
});

static META_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A\\(\w+|.)[ \t]*(.*?)\s*\z").unwrap());

/// 名前からメタコマンドを引く。
pub fn lookup(name: &str) -> ReplResult<&'static Metacommand> {
    BY_NAME
        .get(name)
        .copied()
        .ok_or_else(|| ReplError::UnknownMetacommand(name.to_string()))
}

/// メタコマンド行の解析結果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaLine {
    pub command: String,
    /// 前後の空白を除いた引数。空なら `None`。
    pub arg: Option<String>,
    /// メタコマンド行を除いた残りの行（継続入力として残す）。
    pub rest: Option<String>,
}

/// `\name args` 形式の行を含んでいればメタコマンドとして分解する。
///
/// 複数行のときは最初に該当した行を使う。継続入力の途中で `\c` を打てる。
pub fn parse(unit: &str) -> Option<MetaLine> {
    let lines: Vec<&str> = unit.split('\n').collect();
    let (idx, caps) = lines
        .iter()
        .enumerate()
        .find_map(|(i, l)| META_LINE.captures(l).map(|c| (i, c)))?;
    let arg = caps.get(2).map(|m| m.as_str()).filter(|a| !a.is_empty());
    let rest: Vec<&str> = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != idx)
        .map(|(_, l)| *l)
        .collect();
    let rest = rest.join("\n");
    Some(MetaLine {
        command: caps[1].to_string(),
        arg: arg.map(str::to_string),
        rest: Some(rest).filter(|r| !r.trim().is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_share_descriptor() {
        let q = lookup("q").unwrap();
        assert!(std::ptr::eq(q, lookup("exit").unwrap()));
        assert_eq!(q.handler, Handler::Quit);
        assert_eq!(lookup("^").unwrap().handler, Handler::History);
    }

    #[test]
    fn unknown_names_fail() {
        for name in ["zz", "", "quitt", "!!"] {
            let err = lookup(name).unwrap_err();
            assert!(matches!(err, ReplError::UnknownMetacommand(_)));
        }
    }

    #[test]
    fn parse_word_and_punctuation_commands() {
        let m = parse("\\cd  /tmp  ").unwrap();
        assert_eq!(m.command, "cd");
        assert_eq!(m.arg.as_deref(), Some("/tmp"));
        let m = parse("\\!ls -l").unwrap();
        assert_eq!(m.command, "!");
        assert_eq!(m.arg.as_deref(), Some("ls -l"));
        let m = parse("\\q!!").unwrap();
        assert_eq!(m.command, "q");
        assert_eq!(m.arg.as_deref(), Some("!!"));
        assert!(parse("1 + 2").is_none());
        assert!(parse(" \\q").is_none());
    }

    #[test]
    fn multi_line_unit_keeps_remaining_lines() {
        let m = parse("\\p show=0\nx = 1\ny").unwrap();
        assert_eq!(m.arg.as_deref(), Some("show=0"));
        assert_eq!(m.rest.as_deref(), Some("x = 1\ny"));
        assert_eq!(parse("\\q\n  ").unwrap().rest, None);
    }

    #[test]
    fn metacommand_on_continuation_line() {
        let m = parse("x = (1 +\n\\c").unwrap();
        assert_eq!(m.command, "c");
        assert_eq!(m.rest.as_deref(), Some("x = (1 +"));
        assert!(parse("x = 1\ny = \"\\\\n\"").is_none());
    }

    #[test]
    fn help_listing_is_in_definition_order() {
        let first: Vec<&str> = METACOMMANDS.iter().map(|m| m.names[0]).collect();
        assert_eq!(first[0], "?");
        assert_eq!(*first.last().unwrap(), "^");
    }
}
