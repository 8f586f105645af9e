use db_manager::prelude::*;
use db_manager::test_utils::{Call, ScriptedAdapter, ScriptedDriver};

fn scripted(adapter: &ScriptedAdapter) -> ConnectionManager {
    let driver = ScriptedDriver::new(adapter.clone());
    let opts = ConnectionOptions::new(Engine::Postgres, "localhost", "app", "pw", "shop");
    let manager = ConnectionManager::connect_with(opts, &driver).unwrap();
    adapter.clear_calls();
    manager
}

#[cfg(feature = "sqlite")]
fn sqlite() -> ConnectionManager {
    let mut manager = ConnectionOptions::builder(Engine::Sqlite, "localhost", "app", "pw", ":memory:")
        .connect()
        .unwrap();
    manager
        .connection()
        .unwrap()
        .execute_batch("CREATE TABLE ledger (id INTEGER PRIMARY KEY, amount INTEGER NOT NULL)")
        .unwrap();
    manager
}

#[cfg(feature = "sqlite")]
fn ledger_rows(conn: &mut Connection) -> i64 {
    let mut cursor = conn.execute("SELECT COUNT(*) AS n FROM ledger", &[]).unwrap();
    let row = cursor.next().unwrap().unwrap();
    *row.get("n").and_then(RowValues::as_int).unwrap()
}

#[cfg(feature = "sqlite")]
#[test]
fn nested_commits_unwind_one_level_at_a_time() {
    for depth in 1..=5_usize {
        let mut manager = sqlite();
        let conn = manager.connection().unwrap();
        for level in 1..=depth {
            conn.begin().unwrap();
            assert_eq!(conn.transaction_state(), TransactionState::InTransaction(level));
            conn.execute(
                "INSERT INTO ledger (amount) VALUES (?)",
                &[PreparedParameter::integer(level as i64)],
            )
            .unwrap();
        }
        for level in (0..depth).rev() {
            assert!(conn.commit().unwrap());
            let expected = if level == 0 {
                TransactionState::Idle
            } else {
                TransactionState::InTransaction(level)
            };
            assert_eq!(conn.transaction_state(), expected, "depth {depth}");
        }
        assert_eq!(ledger_rows(conn), depth as i64);
        assert!(!conn.commit().unwrap());
    }
}

#[cfg(feature = "sqlite")]
#[test]
fn rollback_discards_every_level() {
    for depth in 1..=5_usize {
        let mut manager = sqlite();
        let conn = manager.connection().unwrap();
        for level in 1..=depth {
            conn.begin().unwrap();
            conn.execute(
                "INSERT INTO ledger (amount) VALUES (?)",
                &[PreparedParameter::integer(level as i64)],
            )
            .unwrap();
        }
        assert!(conn.rollback().unwrap());
        assert_eq!(conn.transaction_state(), TransactionState::Idle);
        assert_eq!(ledger_rows(conn), 0, "depth {depth}");
        assert!(!conn.rollback().unwrap());
    }
}

#[cfg(feature = "sqlite")]
#[test]
fn inner_scope_commit_survives_outer_work() {
    let mut manager = sqlite();
    let conn = manager.connection().unwrap();
    conn.begin().unwrap();
    conn.execute("INSERT INTO ledger (amount) VALUES (1)", &[]).unwrap();
    conn.begin().unwrap();
    conn.execute("INSERT INTO ledger (amount) VALUES (2)", &[]).unwrap();
    conn.commit().unwrap();
    conn.commit().unwrap();
    assert_eq!(ledger_rows(conn), 2);
}

#[cfg(feature = "sqlite")]
#[test]
fn closing_with_open_transaction_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db").to_string_lossy().into_owned();
    let open = || {
        ConnectionOptions::builder(Engine::Sqlite, "localhost", "app", "pw", path.as_str())
            .connect()
            .unwrap()
    };

    let mut manager = open();
    let conn = manager.connection().unwrap();
    conn.execute_batch("CREATE TABLE ledger (id INTEGER PRIMARY KEY, amount INTEGER NOT NULL)")
        .unwrap();
    conn.begin().unwrap();
    conn.execute("INSERT INTO ledger (amount) VALUES (5)", &[]).unwrap();
    manager.close().unwrap();

    let mut manager = open();
    assert_eq!(ledger_rows(manager.connection().unwrap()), 0);
}

#[cfg(feature = "sqlite")]
#[test]
fn autocommit_off_work_is_adopted_by_begin() {
    let mut manager = ConnectionOptions::builder(Engine::Sqlite, "localhost", "app", "pw", ":memory:")
        .autocommit(false)
        .connect()
        .unwrap();
    let conn = manager.connection().unwrap();
    conn.execute("CREATE TABLE ledger (id INTEGER PRIMARY KEY, amount INTEGER NOT NULL)", &[])
        .unwrap();
    conn.execute("INSERT INTO ledger (amount) VALUES (1)", &[]).unwrap();
    conn.begin().unwrap();
    conn.execute("INSERT INTO ledger (amount) VALUES (2)", &[]).unwrap();
    conn.rollback().unwrap();
    // the implicit transaction was adopted, so both inserts and the table are gone
    assert!(conn.execute("SELECT COUNT(*) FROM ledger", &[]).is_err());
}

#[test]
fn flat_backend_rejects_nested_begin() {
    let adapter = ScriptedAdapter::flat();
    let mut manager = scripted(&adapter);
    let conn = manager.connection().unwrap();
    conn.begin().unwrap();
    let err = conn.begin().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert_eq!(conn.transaction_state(), TransactionState::InTransaction(1));

    assert!(!conn.begin_with(ErrorMode::SilentFalse).unwrap());
    assert_eq!(conn.last_error().map(|r| r.kind), Some(ErrorKind::UnsupportedOperation));
    assert!(conn.commit().unwrap());
    assert_eq!(conn.transaction_state(), TransactionState::Idle);
}

#[test]
fn scope_names_are_never_reused() {
    let adapter = ScriptedAdapter::emulated();
    let mut manager = scripted(&adapter);
    let conn = manager.connection().unwrap();
    conn.begin().unwrap();
    conn.begin().unwrap();
    conn.commit().unwrap();
    conn.begin().unwrap();
    conn.rollback().unwrap();

    assert_eq!(
        adapter.calls(),
        &[
            Call::SetAutocommit(false),
            Call::Begin,
            Call::BeginScope("dbm_sp_1".into()),
            Call::CommitScope("dbm_sp_1".into()),
            Call::BeginScope("dbm_sp_2".into()),
            Call::RollbackScope("dbm_sp_2".into()),
            Call::Rollback,
            Call::SetAutocommit(true),
        ]
    );
}

#[test]
fn failed_outer_commit_keeps_transaction_open() {
    let adapter = ScriptedAdapter::emulated();
    let mut manager = scripted(&adapter);
    let conn = manager.connection().unwrap();
    conn.begin().unwrap();
    adapter.fail_next_commit();
    assert!(conn.commit().is_err());
    assert_eq!(conn.transaction_state(), TransactionState::InTransaction(1));
    assert!(conn.commit().unwrap());
    assert_eq!(conn.transaction_state(), TransactionState::Idle);
}

#[test]
fn failed_rollback_reports_transaction_error_and_ends_idle() {
    let adapter = ScriptedAdapter::emulated();
    let mut manager = scripted(&adapter);
    let conn = manager.connection().unwrap();
    conn.begin().unwrap();
    conn.begin().unwrap();
    conn.begin().unwrap();
    adapter.fail_next_rollback_scope();
    let err = conn.rollback().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transaction);
    assert_eq!(conn.transaction_state(), TransactionState::Idle);
    assert!(adapter.calls().contains(&Call::Rollback));
}
