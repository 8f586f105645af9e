use std::process::Command;

use db_manager::prelude::*;
use db_manager::test_utils::{ScriptedAdapter, ScriptedDriver};

const CHILD_ENV: &str = "DBM_FATAL_CHILD";

fn connect(adapter: &ScriptedAdapter, debug: bool) -> ConnectionManager {
    let driver = ScriptedDriver::new(adapter.clone());
    let opts = ConnectionOptions::builder(Engine::Postgres, "localhost", "app", "pw", "shop")
        .debug(debug)
        .finish()
        .unwrap();
    ConnectionManager::connect_with(opts, &driver).unwrap()
}

#[test]
fn propagate_is_the_default() {
    let adapter = ScriptedAdapter::emulated();
    adapter.push_failure("syntax error near 'selec'");
    let mut manager = connect(&adapter, false);
    let conn = manager.connection().unwrap();

    let err = conn.execute("selec 1", &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    let report = conn.last_error().unwrap();
    assert_eq!(report.sql.as_deref(), Some("selec 1"));
    assert_eq!(report.code.as_deref(), Some("42000"));
}

#[test]
fn silent_false_returns_none_and_fills_the_slot() {
    let adapter = ScriptedAdapter::emulated();
    adapter.push_failure("duplicate key");
    adapter.push_affected(1);
    let mut manager = connect(&adapter, false);
    let conn = manager.connection().unwrap();

    let mut error = None;
    assert!(conn.try_execute("insert into t values (1)", &[], &mut error).is_none());
    let report = error.expect("error slot filled");
    assert_eq!(report.kind, ErrorKind::Execution);
    assert!(report.message.contains("duplicate key"));

    let cursor = conn
        .execute_with("insert into t values (2)", &[], ErrorMode::SilentFalse)
        .unwrap();
    assert_eq!(cursor.map(|c| c.affected_rows()), Some(1));
    assert_eq!(conn.diagnostics().error_count(), 1);
    assert_eq!(conn.query_count(), 1);
}

#[test]
fn explicit_mode_beats_debug() {
    let adapter = ScriptedAdapter::emulated();
    adapter.push_failure("boom");
    let mut manager = connect(&adapter, true);
    let conn = manager.connection().unwrap();

    let err = conn
        .execute_with("select boom()", &[], ErrorMode::Propagate)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(conn.commit_with(ErrorMode::SilentFalse).is_ok());
}

#[test]
fn mode_resolution() {
    assert_eq!(ErrorMode::resolve(None, false), ErrorMode::Propagate);
    assert_eq!(ErrorMode::resolve(None, true), ErrorMode::Fatal);
    assert_eq!(
        ErrorMode::resolve(Some(ErrorMode::SilentFalse), true),
        ErrorMode::SilentFalse
    );
}

#[test]
fn silent_false_covers_batch_and_connection_calls() {
    let adapter = ScriptedAdapter::emulated();
    adapter.fail_next_batch();
    let mut manager = connect(&adapter, true);
    let conn = manager.connection().unwrap();

    let script = "create table t (id integer); create index t_id on t (id)";
    assert!(!conn.execute_batch_with(script, ErrorMode::SilentFalse).unwrap());
    assert_eq!(conn.last_error().unwrap().sql.as_deref(), Some(script));
    assert_eq!(conn.query_count(), 0);
    assert!(conn.execute_batch_with(script, ErrorMode::SilentFalse).unwrap());
    assert_eq!(conn.query_count(), 1);

    conn.close().unwrap();
    assert!(!conn.select_db_with("archive", ErrorMode::SilentFalse).unwrap());
    assert_eq!(conn.connection_info().database, "shop");
    assert_eq!(conn.last_insert_id_with(ErrorMode::SilentFalse).unwrap(), None);
    assert_eq!(conn.last_error().unwrap().kind, ErrorKind::Connection);
    assert_eq!(conn.diagnostics().error_count(), 3);
}

fn child_scenario() -> Option<String> {
    std::env::var(CHILD_ENV).ok()
}

#[test]
fn fatal_child() {
    let Some(scenario) = child_scenario() else {
        return;
    };
    let adapter = ScriptedAdapter::flat();
    match scenario.as_str() {
        "execute" => {
            adapter.push_failure("relation \"missing\" does not exist");
            let mut manager = connect(&adapter, true);
            let conn = manager.connection().unwrap();
            let _ = conn.execute("select * from missing", &[]);
        }
        "batch" => {
            adapter.fail_next_batch();
            let mut manager = connect(&adapter, false);
            let conn = manager.connection().unwrap();
            let _ = conn.execute_batch_with("drop table audit", ErrorMode::Fatal);
        }
        "row_count" => {
            adapter.push_rows_then_fail(&["id"], vec![vec![RowValues::Int(1)]], "stream lost");
            let mut manager = connect(&adapter, true);
            let conn = manager.connection().unwrap();
            let mut cursor = conn.execute("select id from items", &[]).unwrap();
            let _ = cursor.row_count();
        }
        other => panic!("unknown scenario {other}"),
    }
    unreachable!("a fatal error must terminate the process");
}

fn run_fatal_child(scenario: &str) -> serde_json::Value {
    let exe = std::env::current_exe().unwrap();
    let output = Command::new(exe)
        .args(["--exact", "fatal_child", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, scenario)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1), "scenario {scenario}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr
        .lines()
        .find(|l| l.trim_start().starts_with('{'))
        .unwrap_or_else(|| panic!("no JSON report on stderr: {stderr}"));
    serde_json::from_str(line).unwrap()
}

#[test]
fn debug_mode_failure_terminates_with_a_json_report() {
    let report = run_fatal_child("execute");
    assert_eq!(report["kind"], "execution");
    assert_eq!(report["sql"], "select * from missing");
    assert_eq!(report["code"], "42000");
}

#[test]
fn explicit_fatal_batch_terminates() {
    let report = run_fatal_child("batch");
    assert_eq!(report["kind"], "execution");
    assert_eq!(report["sql"], "drop table audit");
}

#[test]
fn debug_mode_row_count_failure_terminates() {
    let report = run_fatal_child("row_count");
    assert_eq!(report["kind"], "execution");
    assert_eq!(report["code"], "08S01");
}
