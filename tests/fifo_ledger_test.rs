// ==========================================
// FIFO 扣减台账集成测试
// ==========================================


use batch_production_aps::engine::{FifoLedger, PlanningError};
use test_helpers::*;

#[test]
fn test_dry_run_and_real_consume_share_breakdown() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_cookie_scenario(&conn);
    let ledger = FifoLedger::new(conn.clone(), standard_converter(), default_config());

    let dry = ledger.consume("flour", 1200.0, "g", true, None).unwrap();
    assert!(dry.satisfied);
    assert!(dry.dry_run);
    assert_eq!(dry.breakdown.len(), 2);
    assert_eq!(dry.breakdown[0].lot_id, "flour-1");
    assert_close(dry.breakdown[0].quantity_from_lot, 1.0);
    assert_close(dry.breakdown[0].quantity_in_request, 1000.0);
    assert_eq!(dry.breakdown[1].lot_id, "flour-2");
    assert_close(dry.breakdown[1].quantity_from_lot, 200.0);
    assert_close(dry.total_cost, 2.8);

    // 试算不修改批次
    assert_close(lot_remaining(&conn, "flour-1"), 1.0);
    assert_close(lot_remaining(&conn, "flour-2"), 500.0);

    let real = ledger.consume("flour", 1200.0, "g", false, None).unwrap();
    assert!(!real.dry_run);
    assert_eq!(real.breakdown, dry.breakdown);
    assert_close(real.total_cost, dry.total_cost);

    assert_close(lot_remaining(&conn, "flour-1"), 0.0);
    assert_close(lot_remaining(&conn, "flour-2"), 300.0);
}

#[test]
fn test_oldest_lot_drawn_first_regardless_of_insert_order() {
    let (_tmp, conn) = create_test_db().unwrap();
    Seeder::new(conn.clone())
        .item("sugar", "Sugar", "g", false)
        .lot("z-newer", "sugar", 100.0, "g", Some(0.01), "2026-02-01 09:00:00")
        .lot("a-older", "sugar", 100.0, "g", Some(0.02), "2026-01-01 09:00:00");
    let ledger = FifoLedger::new(conn.clone(), standard_converter(), default_config());

    let result = ledger.consume("sugar", 50.0, "g", false, None).unwrap();
    assert_eq!(result.breakdown.len(), 1);
    assert_eq!(result.breakdown[0].lot_id, "a-older");
    assert_close(result.total_cost, 1.0);
    assert_close(lot_remaining(&conn, "a-older"), 50.0);
    assert_close(lot_remaining(&conn, "z-newer"), 100.0);
}

#[test]
fn test_dry_run_reports_shortfall() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_cookie_scenario(&conn);
    let ledger = FifoLedger::new(conn.clone(), standard_converter(), default_config());

    let result = ledger.consume("flour", 2000.0, "g", true, None).unwrap();
    assert!(!result.satisfied);
    assert_close(result.consumed, 1500.0);
    assert_close(result.shortfall, 500.0);
    assert_close(ledger.available_quantity("flour", "g", None).unwrap(), 1500.0);
}

#[test]
fn test_missing_lot_cost_is_flagged_not_fatal() {
    let (_tmp, conn) = create_test_db().unwrap();
    Seeder::new(conn.clone())
        .item("salt", "Salt", "g", false)
        .lot("salt-1", "salt", 100.0, "g", None, "2026-01-01 09:00:00");
    let ledger = FifoLedger::new(conn.clone(), standard_converter(), default_config());

    let result = ledger.consume("salt", 10.0, "g", true, None).unwrap();
    assert!(result.satisfied);
    assert!(result.missing_cost);
    assert_close(result.total_cost, 0.0);
}

#[test]
fn test_conversion_failure_leaves_lots_untouched() {
    let (_tmp, conn) = create_test_db().unwrap();
    Seeder::new(conn.clone())
        .item("eggs", "Eggs", "g", false)
        .lot("eggs-1", "eggs", 100.0, "g", Some(0.05), "2026-01-01 09:00:00")
        .lot("eggs-2", "eggs", 12.0, "each", Some(0.3), "2026-01-02 09:00:00");
    let ledger = FifoLedger::new(conn.clone(), standard_converter(), default_config());

    let err = ledger.consume("eggs", 150.0, "g", false, None).unwrap_err();
    assert!(matches!(err, PlanningError::UnitConversion { .. }), "unexpected: {:?}", err);

    assert_close(lot_remaining(&conn, "eggs-1"), 100.0);
    assert_close(lot_remaining(&conn, "eggs-2"), 12.0);
}
