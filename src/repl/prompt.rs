// パス: src/repl/prompt.rs
// 役割: Prompt template expansion (`%<width>(<arg>)<letter>`)
// 意図: Build both the colored prompt and the plain label used for error locations
// 関連ファイル: src/repl/cmd.rs, src/repl/util.rs, src/params.rs
//! プロンプトテンプレートの展開。
//!
//! | 文字 | 内容 |
//! |------|------|
//! | `s` / `i` / `C` | 対象の文字列形式 / inspect 形式（引数があれば問い合わせ結果）/ 型名 |
//! | `n` / `d` | 連番 / 深さ（幅指定で 0 埋め） |
//! | `t` | 現在時刻（引数は strftime 書式、既定 `%X`） |
//! | `u` / `h` | 利用者名 / ホスト名 |
//! | `w` / `W` | 作業ディレクトリ / その末尾（ホームは `~`） |
//! | `c` | 幅と引数の数字列から作る色指定 |
//! | `>` | 継続行なら `.`、特権ユーザーなら `#`、それ以外は `>` |
//! | `%` | `%` そのもの |
//!
//! それ以外の文字は展開せずにそのまま残す。

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::util::{axe, collapse_home, strip_ansi};
use crate::evaluator::Evaluator;
use crate::system::System;
use crate::value::Value;

static ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%(\d+)?(?:\(([^)]*)\)|\{([^}]*)\})?(.)").unwrap());
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

const DEFAULT_TIME_FORMAT: &str = "%X";

/// 展開に必要なセッションの状態。
#[derive(Clone, Copy, Debug)]
pub struct PromptState<'a> {
    pub target: &'a Value,
    pub counter: u64,
    pub depth: usize,
    pub continuation: bool,
    pub color: bool,
}

/// 展開結果。`plain` は色指定を除いて前後の空白を落としたもの。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub display: String,
    pub plain: String,
}

/// テンプレートを展開する。
///
/// 対象への問い合わせが失敗しても展開は止めず、失敗内容をその位置に埋め込む。
pub fn render(
    template: &str,
    state: &PromptState<'_>,
    evaluator: &mut dyn Evaluator,
    system: &dyn System,
) -> RenderedPrompt {
    let display = ESCAPE
        .replace_all(template, |caps: &Captures<'_>| {
            expand(caps, state, evaluator, system)
        })
        .into_owned();
    let plain = strip_ansi(&display).trim().to_string();
    RenderedPrompt { display, plain }
}

fn expand(
    caps: &Captures<'_>,
    state: &PromptState<'_>,
    evaluator: &mut dyn Evaluator,
    system: &dyn System,
) -> String {
    let width = caps.get(1).map(|m| m.as_str());
    let arg = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
    let letter = caps.get(4).map_or("", |m| m.as_str());
    let fit = |s: String| match width.and_then(|w| w.parse::<usize>().ok()) {
        Some(w) => axe(&s, w),
        None => s,
    };
    match letter {
        "s" => fit(state.target.to_display()),
        "i" => fit(match arg {
            Some(name) => match evaluator.query(state.target, name) {
                Ok(v) => v.inspect(),
                Err(f) => format!("#<{}: {}>", f.kind, f.message),
            },
            None => state.target.inspect(),
        }),
        "C" => fit(state.target.kind().to_string()),
        "n" => pad(state.counter, width),
        "d" => pad(state.depth as u64, width),
        "t" => fit(time_now(arg.unwrap_or(DEFAULT_TIME_FORMAT))),
        "u" => fit(system.user_name()),
        "h" => fit(system.host_name()),
        "w" => fit(short_cwd(system)),
        "W" => {
            let cwd = short_cwd(system);
            let base = match cwd.rsplit_once('/') {
                Some((_, last)) if !last.is_empty() => last.to_string(),
                _ => cwd,
            };
            fit(base)
        }
        "c" => {
            if !state.color {
                return String::new();
            }
            let codes: Vec<&str> = [width, arg]
                .into_iter()
                .flatten()
                .flat_map(|s| DIGITS.find_iter(s).map(|m| m.as_str()))
                .collect();
            format!("\x1b[{}m", codes.join(";"))
        }
        ">" => {
            if state.continuation {
                ".".into()
            } else if system.is_privileged() {
                "#".into()
            } else {
                ">".into()
            }
        }
        "%" => "%".into(),
        _ => caps[0].to_string(),
    }
}

fn pad(value: u64, width: Option<&str>) -> String {
    match width.and_then(|w| w.parse::<usize>().ok()) {
        Some(w) => format!("{:0w$}", value, w = w),
        None => value.to_string(),
    }
}

/// 書式が不正な場合は書式文字列をそのまま返す。
fn time_now(format: &str) -> String {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return format.to_string();
    }
    Local::now().format(format).to_string()
}

fn short_cwd(system: &dyn System) -> String {
    match system.current_dir() {
        Ok(dir) => collapse_home(&dir, system.home_dir().as_deref()),
        Err(_) => String::new(),
    }
}
