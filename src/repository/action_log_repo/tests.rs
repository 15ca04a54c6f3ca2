use super::ActionLogRepository;
use crate::domain::action_log::{ActionLog, ActionType};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::init_schema(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

fn make_test_log(action_id: &str, action_type: ActionType, minute: u32) -> ActionLog {
    ActionLog {
        action_id: action_id.to_string(),
        action_type,
        action_ts: NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, minute, 0)
            .unwrap(),
        actor: "tester".to_string(),
        payload_json: Some(json!({ "batches": 2 })),
        detail: Some("Test log".to_string()),
    }
}

#[test]
fn test_insert_and_find_by_id() {
    let repo = ActionLogRepository::new(setup_test_db());

    let log = make_test_log("log1", ActionType::RecordProduction, 0);
    assert_eq!(repo.insert(&log).unwrap(), "log1");

    let found = repo.find_by_id("log1").unwrap().expect("log should exist");
    assert_eq!(found.action_type, ActionType::RecordProduction);
    assert_eq!(found.payload_json, Some(json!({ "batches": 2 })));
    assert_eq!(found.action_ts, log.action_ts);
}

#[test]
fn test_find_by_id_missing() {
    let repo = ActionLogRepository::new(setup_test_db());
    assert!(repo.find_by_id("nope").unwrap().is_none());
}

#[test]
fn test_find_by_action_type_and_count() {
    let repo = ActionLogRepository::new(setup_test_db());
    repo.insert(&make_test_log("a", ActionType::RecordProduction, 1)).unwrap();
    repo.insert(&make_test_log("b", ActionType::RecordAssembly, 2)).unwrap();
    repo.insert(&make_test_log("c", ActionType::RecordProduction, 3)).unwrap();

    let logs = repo.find_by_action_type(ActionType::RecordProduction, 10).unwrap();
    assert_eq!(logs.len(), 2);
    // 按时间倒序
    assert_eq!(logs[0].action_id, "c");
    assert_eq!(repo.count_by_action_type(ActionType::RecordAssembly).unwrap(), 1);

    let recent = repo.find_recent(2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].action_id, "c");
}
