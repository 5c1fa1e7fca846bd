// パス: src/repl/printer.rs
// 役割: Helpers for rendering results, failures and metacommand help
// 意図: Keep interactive messaging consistent across commands
// 関連ファイル: src/repl/cmd.rs, src/repl/metacmd.rs, src/value.rs
//! 結果・エラー・ヘルプの表示を集約したモジュール。

use std::io::{self, Write};

use super::metacmd::{Metacommand, METACOMMANDS};
use super::util::ELLIPSIS;
use crate::errors::Failure;
use crate::value::Value;

pub(crate) const ARROW: &str = "=> ";

/// 色指定の列。`color` が無効なら空文字列。
pub(crate) fn color(enabled: bool, codes: &[u8]) -> String {
    if !enabled {
        return String::new();
    }
    let parts: Vec<String> = codes.iter().map(u8::to_string).collect();
    format!("\x1b[{}m", parts.join(";"))
}

/// 評価結果を `=> inspect` 形式で書き出す。
///
/// `show` が `None` なら何も出さない。`Some(n)` で `n > 0` のときは端末幅 × `n`
/// 文字に切り詰める。
pub(crate) fn write_result(
    out: &mut dyn Write,
    value: &Value,
    show: Option<usize>,
    shownil: bool,
    terminal_width: usize,
) -> io::Result<()> {
    if value.is_nil() && !shownil {
        return Ok(());
    }
    let Some(lines) = show else {
        return Ok(());
    };
    let mut text = format!("{}{}", ARROW, value.inspect());
    if lines > 0 {
        let limit = terminal_width.saturating_mul(lines);
        if text.chars().count() > limit {
            let keep = limit.saturating_sub(ELLIPSIS.len());
            text = text.chars().take(keep).collect();
            text.push_str(ELLIPSIS);
        }
    }
    writeln!(out, "{}", text)
}

/// 失敗を「メッセージ (種別)」と呼び出し履歴の形で書き出す。
///
/// 呼び出し履歴は `boundary` ラベルより外側を切り落とす。
pub(crate) fn write_failure(
    err: &mut dyn Write,
    failure: &Failure,
    boundary: &str,
    colored: bool,
) -> io::Result<()> {
    if !failure.message.is_empty() {
        write!(err, "{}{}", color(colored, &[1, 31]), failure.message)?;
        if !failure.message.ends_with(char::is_whitespace) {
            write!(err, " ")?;
        }
    }
    writeln!(err, "{}({})", color(colored, &[22, 31]), failure.kind)?;
    write!(err, "{}", color(colored, &[33]))?;
    for loc in failure.trimmed_trace(boundary) {
        writeln!(err, "{}", loc)?;
    }
    write!(err, "{}", color(colored, &[]))?;
    err.flush()
}

/// 内部エラー（パニック）を報告する。
pub(crate) fn write_internal_error(
    err: &mut dyn Write,
    message: &str,
    colored: bool,
) -> io::Result<()> {
    writeln!(err, "{}Internal error.", color(colored, &[33]))?;
    write_failure(err, &Failure::new("Panic", message), "", colored)
}

/// メタコマンドの一覧を書き出す。
pub(crate) fn write_help_index(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "Metacommands:")?;
    for mc in METACOMMANDS {
        writeln!(out, "  {:<20}  {}", mc.names.join(" "), mc.summary)?;
    }
    Ok(())
}

/// 1 つのメタコマンドの詳細を書き出す。
pub(crate) fn write_help_entry(out: &mut dyn Write, mc: &Metacommand) -> io::Result<()> {
    writeln!(out, "Metacommand: {}", mc.names.join(" "))?;
    writeln!(out, "Summary:     {}", mc.summary)?;
    writeln!(out, "Description:")?;
    for line in mc.description.lines() {
        writeln!(out, "  {}", line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Location;

    fn result_text(v: &Value, show: Option<usize>, shownil: bool, width: usize) -> String {
        let mut buf = Vec::new();
        write_result(&mut buf, v, show, shownil, width).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn result_display_respects_show_and_shownil() {
        assert_eq!(result_text(&Value::Int(3), Some(1), false, 80), "=> 3\n");
        assert_eq!(result_text(&Value::Nil, Some(1), false, 80), "");
        assert_eq!(result_text(&Value::Nil, Some(1), true, 80), "=> nil\n");
        assert_eq!(result_text(&Value::Int(3), None, false, 80), "");
    }

    #[test]
    fn long_results_are_cut_to_terminal_lines() {
        let v = Value::str("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(result_text(&v, Some(1), false, 10), "=> \"abc...\n");
        assert_eq!(result_text(&v, Some(2), false, 10), "=> \"abcdefghijklm...\n");
        assert_eq!(result_text(&v, Some(0), false, 10).len(), 3 + 28 + 1);
    }

    #[test]
    /// 色なしの失敗表示。境界ラベルより外側の位置は出ない。
    fn failure_rendering_plain() {
        let f = Failure::new("RuntimeError", "boom").with_trace(vec![
            Location::new("lib.calc", 2, Some("f".into())),
            Location::new("intar/>", 1, None),
            Location::new("outer", 7, None),
        ]);
        let mut buf = Vec::new();
        write_failure(&mut buf, &f, "intar/>", false).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "boom (RuntimeError)\nlib.calc:2:in `f'\nintar/>:1\n"
        );
    }

    #[test]
    fn failure_rendering_colored() {
        let f = Failure::new("Failed", "No last directory.\n");
        let mut buf = Vec::new();
        write_failure(&mut buf, &f, "", true).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "\x1b[1;31mNo last directory.\n\x1b[22;31m(Failed)\n\x1b[33m\x1b[m"
        );
    }

    #[test]
    fn help_index_lists_aliases() {
        let mut buf = Vec::new();
        write_help_index(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Metacommands:\n"));
        assert!(text.contains(&format!("  {:<20}  Quit Intar\n", "q x quit exit")));
    }
}
