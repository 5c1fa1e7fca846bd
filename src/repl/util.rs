//! REPL 内部ユーティリティ

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::value::Value;

pub(crate) const ELLIPSIS: &str = "...";

static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\A"((?:[^\\"]|\\.)*)"\z"#).unwrap());
static ESCAPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(.)").unwrap());
static ASSIGN_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*=\s*|\s+").unwrap());
static ANSI_SGR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9]*(;[0-9]*)*m").unwrap());
static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A[+-]?\d+\z").unwrap());

/// バックスラッシュエスケープを外す（`\x` → `x`）。
pub(crate) fn unescape(s: &str) -> String {
    ESCAPED.replace_all(s, "$1").into_owned()
}

/// ダブルクォートで囲まれていれば中身をアンエスケープして返す。
pub(crate) fn unquote(s: &str) -> Option<String> {
    QUOTED.captures(s).map(|c| unescape(&c[1]))
}

/// `NAME=value` または `NAME value` を名前と値に分ける。値が空なら `None`。
pub(crate) fn split_assign(arg: &str) -> (String, Option<String>) {
    let mut parts = ASSIGN_SPLIT.splitn(arg, 2);
    let name = parts.next().unwrap_or_default().to_string();
    let value = parts.next().filter(|v| !v.is_empty()).map(str::to_string);
    (name, value)
}

/// `\param` の値を型付きに変換する。
pub(crate) fn parse_param(v: &str) -> Value {
    match v.to_ascii_lowercase().as_str() {
        "t" | "true" | "yes" | "on" => return Value::Bool(true),
        "f" | "false" | "no" | "off" => return Value::Bool(false),
        "nil" | "none" | "-" => return Value::Nil,
        _ => {}
    }
    if INTEGER.is_match(v) {
        if let Ok(i) = v.parse::<i64>() {
            return Value::Int(i);
        }
    }
    match unquote(v) {
        Some(s) => Value::Str(s),
        None => Value::str(v),
    }
}

/// ANSI の色指定シーケンスを取り除く。
pub(crate) fn strip_ansi(s: &str) -> String {
    ANSI_SGR.replace_all(s, "").into_owned()
}

/// 文字列を表示幅 `width` 桁に収め、切り詰めたときは末尾に省略記号を付ける。
///
/// 全角文字は 2 桁として数える。
pub(crate) fn axe(s: &str, width: usize) -> String {
    if s.width() <= width {
        return s.to_string();
    }
    let keep = width.saturating_sub(ELLIPSIS.len());
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > keep {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push_str(&ELLIPSIS[..width.min(ELLIPSIS.len())]);
    out
}

/// `~` とホームディレクトリ、相対パスを解決し、`.`/`..` を畳み込む。
pub(crate) fn expand_path(path: &str, base: &Path, home: Option<&Path>) -> PathBuf {
    let raw = match (path.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    };
    let joined = if raw.is_absolute() { raw } else { base.join(raw) };
    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// ホームディレクトリ配下なら先頭を `~` に縮める。
pub(crate) fn collapse_home(path: &Path, home: Option<&Path>) -> String {
    let full = path.display().to_string();
    let Some(home) = home else { return full };
    let home = home.display().to_string();
    if home.is_empty() || home == "/" {
        return full;
    }
    match full.strip_prefix(&home) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("~{}", rest),
        _ => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_param_coerces_values() {
        assert_eq!(parse_param("Yes"), Value::Bool(true));
        assert_eq!(parse_param("ON"), Value::Bool(true));
        assert_eq!(parse_param("t"), Value::Bool(true));
        assert_eq!(parse_param("off"), Value::Bool(false));
        assert_eq!(parse_param("None"), Value::Nil);
        assert_eq!(parse_param("-"), Value::Nil);
        assert_eq!(parse_param("-42"), Value::Int(-42));
        assert_eq!(parse_param("\"a \\\"b\\\"\""), Value::str("a \"b\""));
        assert_eq!(parse_param("%3n> "), Value::str("%3n> "));
    }

    #[test]
    fn split_assign_accepts_equals_or_space() {
        assert_eq!(split_assign("A=1"), ("A".into(), Some("1".into())));
        assert_eq!(split_assign("A = x y"), ("A".into(), Some("x y".into())));
        assert_eq!(split_assign("A b"), ("A".into(), Some("b".into())));
        assert_eq!(split_assign("A"), ("A".into(), None));
        assert_eq!(split_assign("A="), ("A".into(), None));
    }

    #[test]
    fn axe_truncates_with_ellipsis() {
        assert_eq!(axe("hello", 10), "hello");
        assert_eq!(axe("hello world", 8), "hello...");
        assert_eq!(axe("hello", 2), "..");
    }

    #[test]
    fn axe_counts_wide_characters_as_two_columns() {
        assert_eq!(axe("日本語", 6), "日本語");
        assert_eq!(axe("日本語テキスト", 8), "日本...");
        assert_eq!(axe("日本語テキスト", 7), "日本...");
        assert!(axe("日本語テキスト", 16).width() <= 16);
    }

    #[test]
    fn strip_ansi_removes_color_sequences() {
        assert_eq!(strip_ansi("\x1b[32mok\x1b[m:\x1b[1;31mx\x1b[0m"), "ok:x");
    }

    #[test]
    /// ホーム直下とその外側で `~` の扱いが異なることを確かめる。
    fn expand_and_collapse_home() {
        let home = Path::new("/home/u");
        assert_eq!(expand_path("~/src", Path::new("/tmp"), Some(home)), PathBuf::from("/home/u/src"));
        assert_eq!(expand_path("../x", Path::new("/tmp/a"), Some(home)), PathBuf::from("/tmp/x"));
        assert_eq!(collapse_home(Path::new("/home/u/src"), Some(home)), "~/src");
        assert_eq!(collapse_home(Path::new("/home/u"), Some(home)), "~");
        assert_eq!(collapse_home(Path::new("/home/user2"), Some(home)), "/home/user2");
    }
}
