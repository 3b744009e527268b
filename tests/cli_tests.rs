use std::process::{Command, Output};

fn todo_api(args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_todo-api"));
    cmd.env_clear().args(args);
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.output().unwrap()
}

#[test]
fn test_routes_prints_table_in_match_order() {
    let out = todo_api(&["routes"], &[("TODO_LOG_LEVEL", "error")]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("[routes] count=14"));
    let batch = stdout.find("/todos/batch-delete").unwrap();
    let by_id = stdout.find("/todos/{id}").unwrap();
    assert!(batch < by_id);
}

#[test]
fn test_invalid_config_fails_startup() {
    let out = todo_api(
        &["routes"],
        &[("BACKEND_CONTAINER_PORT", "99999"), ("TODO_LOG_LEVEL", "error")],
    );
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("invalid configuration"), "{stderr}");
}

#[test]
fn test_version_flag() {
    let out = todo_api(&["--version"], &[]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains(env!("CARGO_PKG_VERSION")));
}
