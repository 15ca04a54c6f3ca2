// ==========================================
// 组装记录器集成测试
// ==========================================


use batch_production_aps::domain::types::RecorderPhase;
use batch_production_aps::engine::{
    AssemblyRecorder, AssemblyRequest, PlanningError, ProductionRecorder, ProductionRequest,
};
use batch_production_aps::repository::AssemblyRunRepository;
use std::sync::{Arc, Mutex};
use rusqlite::Connection;
use test_helpers::*;

/// 礼盒场景
///
/// - gift-box: 4 cookie + 2 brownie + 1 box + 1 ribbon
/// - hamper: 2 gift-box + 1 ribbon
/// - cookie 由一次生产得到 48 个（单位成本 3.0 / 48）
fn seed_gift_scenario(conn: &Arc<Mutex<Connection>>) {
    seed_cookie_scenario(conn);
    ProductionRecorder::new(conn.clone(), standard_converter(), default_config())
        .record_production(
            &ProductionRequest {
                recipe_id: "choc-chip".to_string(),
                finished_unit_id: "cookie".to_string(),
                batches: 1,
                actual_yield: 48,
                notes: None,
                actor: "baker".to_string(),
            },
            None,
        )
        .unwrap();

    Seeder::new(conn.clone())
        .unit("brownie", "Brownie", None, 10)
        .item("box", "Gift Box", "each", true)
        .item("ribbon", "Ribbon", "each", true)
        .lot("box-1", "box", 5.0, "each", Some(1.0), "2026-01-01 09:00:00")
        .lot("ribbon-1", "ribbon", 20.0, "each", Some(0.5), "2026-01-01 09:00:00")
        .good("gift-box", "Gift Box of Six")
        .good("hamper", "Holiday Hamper")
        .compose_unit("gift-box", "gb-1", "cookie", 4.0)
        .compose_unit("gift-box", "gb-2", "brownie", 2.0)
        .compose_packaging("gift-box", "gb-3", Some("box"), 1.0)
        .compose_packaging("gift-box", "gb-4", Some("ribbon"), 1.0)
        .compose_good("hamper", "h-1", "gift-box", 2.0)
        .compose_packaging("hamper", "h-2", Some("ribbon"), 1.0);
}

fn assemble(good_id: &str, quantity: i64) -> AssemblyRequest {
    AssemblyRequest {
        good_id: good_id.to_string(),
        quantity,
        notes: None,
        actor: "packer".to_string(),
    }
}

#[test]
fn test_nested_assembly_writes_two_ledgers() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_gift_scenario(&conn);
    let recorder = AssemblyRecorder::new(conn.clone(), standard_converter(), default_config());

    let outcome = recorder.record_assembly(&assemble("hamper", 1), None).unwrap();
    assert_eq!(outcome.phase, RecorderPhase::Committed);

    // cookie 8, brownie 4, box 2, ribbon 2 + 1
    assert_eq!(unit_count(&conn, "cookie"), 40);
    assert_eq!(unit_count(&conn, "brownie"), 6);
    assert_close(lot_remaining(&conn, "box-1"), 3.0);
    assert_close(lot_remaining(&conn, "ribbon-1"), 17.0);
    assert_eq!(good_count(&conn, "hamper"), 1);
    assert_eq!(good_count(&conn, "gift-box"), 0);

    assert_eq!(outcome.unit_consumption.len(), 2);
    assert_eq!(outcome.packaging_consumption.len(), 2);
    let cookie_line = outcome
        .unit_consumption
        .iter()
        .find(|c| c.finished_unit_id == "cookie")
        .unwrap();
    assert_eq!(cookie_line.quantity, 8);
    assert_close(cookie_line.unit_cost, 3.0 / 48.0);

    // cookie 0.5 + brownie 0（无生产成本） + box 2.0 + ribbon 1.5
    assert_close(outcome.run.total_cost, 4.0);

    let repo = AssemblyRunRepository::new(conn.clone());
    assert_eq!(repo.count_runs().unwrap(), 1);
    assert_eq!(repo.list_unit_consumption(&outcome.run.run_id).unwrap().len(), 2);
    assert_eq!(repo.list_packaging_consumption(&outcome.run.run_id).unwrap().len(), 2);
}

#[test]
fn test_shortfall_aborts_whole_assembly() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_gift_scenario(&conn);
    let recorder = AssemblyRecorder::new(conn.clone(), standard_converter(), default_config());

    let check = recorder.check_can_assemble("hamper", 3, None).unwrap();
    assert!(!check.can_assemble);
    // brownie 12 > 10, box 6 > 5
    assert_eq!(check.shortfalls.len(), 2);

    let err = recorder.record_assembly(&assemble("hamper", 3), None).unwrap_err();
    assert!(matches!(err, PlanningError::InsufficientInventory { ref shortfalls } if shortfalls.len() == 2));

    assert_eq!(unit_count(&conn, "cookie"), 48);
    assert_eq!(unit_count(&conn, "brownie"), 10);
    assert_close(lot_remaining(&conn, "box-1"), 5.0);
    assert_close(lot_remaining(&conn, "ribbon-1"), 20.0);
    assert_eq!(good_count(&conn, "hamper"), 0);
    assert_eq!(count_rows(&conn, "assembly_run"), 0);
    assert_eq!(count_rows(&conn, "assembly_unit_consumption"), 0);
    assert_eq!(count_rows(&conn, "assembly_packaging_consumption"), 0);
}

#[test]
fn test_unassigned_packaging_blocks_assembly() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_gift_scenario(&conn);
    Seeder::new(conn.clone())
        .good("mystery", "Mystery Bag")
        .compose_unit("mystery", "m-1", "cookie", 1.0)
        .compose_packaging("mystery", "m-2", None, 1.0);
    let recorder = AssemblyRecorder::new(conn.clone(), standard_converter(), default_config());

    let check = recorder.check_can_assemble("mystery", 2, None).unwrap();
    assert!(!check.can_assemble);
    assert!(check.shortfalls.is_empty());
    assert_eq!(check.unassigned_packaging.len(), 1);
    assert_eq!(check.unassigned_packaging[0].composition_id, "m-2");
    assert_close(check.unassigned_packaging[0].quantity, 2.0);

    let err = recorder.record_assembly(&assemble("mystery", 2), None).unwrap_err();
    assert!(matches!(err, PlanningError::Validation(_)));
    assert_eq!(unit_count(&conn, "cookie"), 48);
}

#[test]
fn test_invalid_assembly_requests() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_gift_scenario(&conn);
    let recorder = AssemblyRecorder::new(conn.clone(), standard_converter(), default_config());

    let err = recorder.record_assembly(&assemble("gift-box", 0), None).unwrap_err();
    assert!(matches!(err, PlanningError::Validation(_)));

    let err = recorder.record_assembly(&assemble("nope", 1), None).unwrap_err();
    assert!(matches!(err, PlanningError::NotFound { .. }));
}
