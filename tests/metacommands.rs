
use std::cell::RefCell;
use std::rc::Rc;

use intar::repl::VERSION;
use intar::CommandStatus;
use test_support::{quiet_params, results, run_script, run_script_with, FakeSystem};

fn ok() -> CommandStatus {
    CommandStatus {
        success: true,
        code: Some(0),
    }
}

fn failed(code: i32) -> CommandStatus {
    CommandStatus {
        success: false,
        code: Some(code),
    }
}

/// `vi /tmp/intar-xxx.calc` からパスを取り出す。
fn edited_path(command: &str) -> String {
    let words = shlex::split(command).expect("editor command");
    assert_eq!(words.len(), 2, "editor command: {}", command);
    words[1].clone()
}

#[test]
fn help_lists_commands_and_describes_one() {
    let run = run_script(&["\\?", "\\h cd"]);
    assert!(run.out.contains("Metacommands:"));
    assert!(run.out.contains("q x quit exit"));
    assert!(run.out.contains("Metacommand: cd"));
    assert!(run.out.contains("Summary:     Change directory"));

    let run = run_script(&["\\help nope"]);
    assert!(run.err.contains("Unknown Metacommand: nope"), "stderr: {}", run.err);
}

#[test]
fn version_prints_and_returns_version() {
    let run = run_script(&["\\v"]);
    assert!(run.out.contains(&format!("intar {}\n", VERSION)));
    assert_eq!(results(&run.out), vec![format!("\"{}\"", VERSION)]);
}

#[test]
fn help_output_follows_line_redirect() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path());
    let path = dir.path().join("help.txt");
    let line = format!("\\? >{}", path.display());
    let run = run_script_with(&[line.as_str()], quiet_params(), &system);
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("Metacommands:\n"));
    assert!(!run.out.contains("Metacommands:"));
}

#[test]
fn cd_pushes_and_returns_to_previous_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(dir.path().join("a")).unwrap();
    let system = FakeSystem::new(dir.path());
    let run = run_script_with(&["\\cd a", "\\cd %"], quiet_params(), &system);
    let base = dir.path().display().to_string();
    assert!(run.out.contains(&format!(" 1  {}\n", base)));
    assert_eq!(system.cwd(), dir.path());
    let shown = results(&run.out);
    assert_eq!(shown[0], format!("\"{}/a\"", base));
    assert_eq!(shown[1], format!("\"{}\"", base));
}

#[test]
fn cd_without_push_and_drop_from_stack() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(dir.path().join("a")).unwrap();
    std::fs::create_dir(dir.path().join("b")).unwrap();
    let system = FakeSystem::new(dir.path());
    let run = run_script_with(
        &["\\cd =a", "\\cd %", "\\cd ../b", "\\cd -1", "\\cd 1"],
        quiet_params(),
        &system,
    );
    assert!(run.err.contains("No last directory."), "stderr: {}", run.err);
    assert!(run.err.contains("No directory #1."), "stderr: {}", run.err);
    assert_eq!(system.cwd(), dir.path().join("b"));
}

#[test]
fn cd_to_missing_directory_fails() {
    let run = run_script(&["\\cd nowhere", "1"]);
    assert!(run.err.contains("nowhere"), "stderr: {}", run.err);
    assert_eq!(results(&run.out), vec!["1"]);
}

#[test]
fn env_sets_and_reads_variables() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path()).with_env("HOME_LANG", "C");
    let run = run_script_with(
        &["\\$ GREETING=\"hello world\"", "\\env GREETING", "\\$ MISSING", "\\$"],
        quiet_params(),
        &system,
    );
    assert_eq!(
        results(&run.out),
        vec!["\"hello world\"", "\"hello world\""]
    );
    assert!(run.out.contains("HOME_LANG=C\n"));
    assert!(run.out.contains("GREETING=hello world\n"));
}

#[test]
fn shell_runs_command_and_reports_exit_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path()).with_env("SHELL", "/bin/zsh");
    system.on_command(|command, _| if command == "false" { failed(2) } else { ok() });
    let run = run_script_with(&["\\! ls -l", "\\sh false", "\\!"], quiet_params(), &system);
    assert_eq!(*system.commands.borrow(), vec!["ls -l", "false", "/bin/zsh"]);
    assert!(run.err.contains("Exit code: 2 (Failed)"), "stderr: {}", run.err);
}

#[test]
fn param_sets_shows_and_lists() {
    let run = run_script(&["\\p histmax 20", "\\p histmax", "\\param color", "\\p"]);
    assert_eq!(results(&run.out), vec!["20", "20", "false"]);
    assert!(run.out.contains("histmax=20\n"));
    assert!(run.out.contains("prompt=\"%d:%3n%> \"\n"));
    assert_eq!(run.params.histmax(), 20);
}

#[test]
fn prompt_parameter_changes_next_prompt() {
    let run = run_script(&["\\p prompt=\"%n$ \"", "1"]);
    assert_eq!(run.prompts[1], "2$ ");
}

#[test]
fn input_evaluates_file_with_its_own_label() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("lib.calc"), "y = 5\ny * 2\n").unwrap();
    std::fs::write(dir.path().join("bad.calc"), "\nraise(\"oops\")\n").unwrap();
    let system = FakeSystem::new(dir.path());
    let run = run_script_with(
        &["\\< lib.calc", "y", "\\input bad.calc", "\\i"],
        quiet_params(),
        &system,
    );
    assert_eq!(results(&run.out), vec!["10", "5"]);
    assert!(run.err.contains("oops (RuntimeError)\nbad.calc:2\n"), "stderr: {}", run.err);
    assert!(run.err.contains("No input file given."), "stderr: {}", run.err);
}

#[test]
fn output_command_truncates_target_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path());
    let path = dir.path().join("o.txt");
    std::fs::write(&path, "stale\n").unwrap();
    let open = format!("\\> {}", path.display());
    let run = run_script_with(&[open.as_str(), "5"], quiet_params(), &system);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "=> 5\n");
    assert_eq!(run.params.output(), Some(path.display().to_string()));
}

#[test]
fn edit_opens_last_command_and_prefills_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path()).with_env("EDITOR", "myedit");
    let seen = Rc::new(RefCell::new(String::new()));
    let captured = Rc::clone(&seen);
    system.on_command(move |command, _| {
        let path = edited_path(command);
        *captured.borrow_mut() = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, "2 + 2\n").unwrap();
        ok()
    });
    let run = run_script_with(&["1 + 1", "\\e"], quiet_params(), &system);
    assert_eq!(*seen.borrow(), "1 + 1");
    let command = system.commands.borrow()[0].clone();
    assert!(command.starts_with("myedit "));
    assert!(edited_path(&command).ends_with(".calc"));
    assert_eq!(run.prefilled, vec!["2 + 2"]);
    assert_eq!(run.history.last().map(String::as_str), Some("2 + 2"));
    assert_eq!(results(&run.out), vec!["2", "\"2 + 2\""]);
}

#[test]
fn edit_with_pattern_picks_matching_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path());
    let seen = Rc::new(RefCell::new(String::new()));
    let captured = Rc::clone(&seen);
    system.on_command(move |command, _| {
        *captured.borrow_mut() = std::fs::read_to_string(edited_path(command)).unwrap();
        ok()
    });
    run_script_with(&["a = 1", "b = 2", "\\e ^a"], quiet_params(), &system);
    assert_eq!(*seen.borrow(), "a = 1");
    assert!(system.commands.borrow()[0].starts_with("vi "));
}

#[test]
fn edit_reports_editor_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path());
    system.on_command(|_, _| failed(1));
    let run = run_script_with(&["1", "\\e"], quiet_params(), &system);
    assert!(run.err.contains("Executing editor failed: 1"), "stderr: {}", run.err);
    assert!(run.prefilled.is_empty());
}

#[test]
fn history_shows_recent_commands_oldest_first() {
    let run = run_script(&["1", "2", "3", "\\^ 2", "\\hist 1 1"]);
    assert!(run.out.contains("=> 3\n2\n3\n2\n"), "stdout: {}", run.out);
}

#[test]
fn history_search_limits_matches() {
    let run = run_script(&["x1 = 1", "y = 2", "x2 = 3", "\\^ /x", "\\^ 0/x"]);
    assert!(
        run.out.contains("=> 3\nx2 = 3\nx1 = 1\nx2 = 3\n"),
        "stdout: {}",
        run.out
    );
}

#[test]
fn history_rejects_unknown_operation() {
    let run = run_script(&["\\^ bogus"]);
    assert!(
        run.err.contains("Unknown history command: bogus (Unknown)"),
        "stderr: {}",
        run.err
    );
}

#[test]
fn quit_aliases_end_the_session() {
    for quit in ["\\q", "\\x", "\\quit", "\\exit"] {
        let run = run_script(&[quit, "1"]);
        assert!(results(&run.out).is_empty(), "{} kept reading", quit);
    }
}
