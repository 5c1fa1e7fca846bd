
use intar::{Params, Value};
use test_support::{quiet_params, results, run_script_with, FakeSystem};

fn with_histfile(name: &str) -> Params {
    let mut params = quiet_params();
    params.set("histfile", Value::str(name));
    params
}

#[test]
fn history_is_saved_on_exit_and_loaded_on_start() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path());
    run_script_with(&["1", "2"], with_histfile(".intar_history"), &system);
    let path = dir.path().join(".intar_history");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n2\n");

    let run = run_script_with(&["3"], with_histfile(".intar_history"), &system);
    assert_eq!(run.history, vec!["1", "2", "3"]);
    assert_eq!(run.editor_history, vec!["1", "2", "3"]);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n2\n3\n");
}

#[test]
fn tilde_path_resolves_against_home() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let system = FakeSystem::new(dir.path());
    run_script_with(&["\\cd sub", "7"], with_histfile("~/hist"), &system);
    assert!(dir.path().join("hist").exists());
    assert!(!dir.path().join("sub").join("hist").exists());
}

#[test]
fn saved_history_is_bounded_by_histmax() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path());
    std::fs::write(dir.path().join("h"), "a\nb\nc\n").unwrap();
    let mut params = with_histfile("h");
    params.set("histmax", Value::Int(4));
    run_script_with(&["1", "2"], params, &system);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("h")).unwrap(),
        "b\nc\n1\n2\n"
    );
}

#[test]
fn nested_sessions_do_not_touch_history_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path());
    let run = run_script_with(
        &["5 &", "self", "\\q", "6"],
        with_histfile("h"),
        &system,
    );
    assert_eq!(results(&run.out), vec!["5", "5", "6"]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("h")).unwrap(),
        "5 &\nself\n\\q\n6\n"
    );
}

#[test]
fn held_lock_reports_failure_and_leaves_file_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path());
    std::fs::write(dir.path().join("h"), "old\n").unwrap();
    std::fs::write(dir.path().join("h.lock"), "").unwrap();
    let mut params = with_histfile("h");
    params.set("histlock_retries", Value::Int(1));
    let run = run_script_with(&["1"], params, &system);
    assert!(run.err.contains("h.lock exists."), "stderr: {}", run.err);
    assert_eq!(std::fs::read_to_string(dir.path().join("h")).unwrap(), "old\n");
    assert!(dir.path().join("h.lock").exists());
}

#[test]
fn explicit_save_and_load_metacommands() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path());
    let run = run_script_with(&["1", "\\^ s"], with_histfile("h"), &system);
    assert!(run.err.is_empty(), "stderr: {}", run.err);
    assert!(dir.path().join("h").exists());
    assert!(!dir.path().join("h.lock").exists());

    std::fs::write(dir.path().join("h"), "x = 1\ny = 2\n").unwrap();
    let run = run_script_with(&["\\hist load", "\\^ 0/="], with_histfile("h"), &system);
    assert!(run.out.contains("x = 1\ny = 2\n"), "stdout: {}", run.out);
}

#[test]
fn without_histfile_nothing_is_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    let system = FakeSystem::new(dir.path());
    let run = run_script_with(&["1", "\\^ s"], quiet_params(), &system);
    assert!(run.err.is_empty(), "stderr: {}", run.err);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
