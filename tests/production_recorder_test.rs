// ==========================================
// 生产记录器集成测试
// ==========================================


use batch_production_aps::domain::types::RecorderPhase;
use batch_production_aps::engine::{PlanningError, ProductionRecorder, ProductionRequest};
use test_helpers::*;

fn request(batches: u32, actual_yield: i64) -> ProductionRequest {
    ProductionRequest {
        recipe_id: "choc-chip".to_string(),
        finished_unit_id: "cookie".to_string(),
        batches,
        actual_yield,
        notes: Some("morning bake".to_string()),
        actor: "baker".to_string(),
    }
}

#[test]
fn test_check_can_produce_lists_every_ingredient() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_cookie_scenario(&conn);
    let recorder = ProductionRecorder::new(conn.clone(), standard_converter(), default_config());

    let check = recorder.check_can_produce("choc-chip", 2, None).unwrap();
    assert!(check.can_produce);
    assert_eq!(check.ingredients.len(), 2);
    assert!(check.shortfalls.is_empty());
    assert_close(check.estimated_total_cost, 6.0);
    assert!(!check.missing_cost);

    let check = recorder.check_can_produce("choc-chip", 4, None).unwrap();
    assert!(!check.can_produce);
    assert_eq!(check.shortfalls.len(), 1);
    assert_eq!(check.shortfalls[0].item_id, "flour");
    assert_close(check.shortfalls[0].needed, 2000.0);
    assert_close(check.shortfalls[0].available, 1500.0);
}

#[test]
fn test_record_production_commits_all_effects() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_cookie_scenario(&conn);
    let recorder = ProductionRecorder::new(conn.clone(), standard_converter(), default_config());

    let outcome = recorder.record_production(&request(2, 96), None).unwrap();
    assert_eq!(outcome.phase, RecorderPhase::Committed);
    assert_eq!(outcome.run.batches, 2);
    assert_close(outcome.run.expected_yield, 96.0);
    assert_eq!(outcome.run.actual_yield, 96);
    assert_close(outcome.run.total_cost, 6.0);
    assert_close(outcome.run.per_unit_cost, 6.0 / 96.0);
    assert!(outcome.run.snapshot_id.is_some());
    assert_eq!(outcome.consumption.len(), 2);

    assert_eq!(unit_count(&conn, "cookie"), 96);
    assert_close(lot_remaining(&conn, "flour-1"), 0.0);
    assert_close(lot_remaining(&conn, "flour-2"), 500.0);
    assert_close(lot_remaining(&conn, "butter-1"), 0.5);
    assert_eq!(count_rows(&conn, "recipe_snapshot"), 1);
    assert_eq!(count_rows(&conn, "action_log"), 1);

    let listed = recorder.list_runs_for_recipe("choc-chip").unwrap();
    assert_eq!(listed.len(), 1);
    let detail = recorder.get_run_with_consumption(&outcome.run.run_id).unwrap();
    assert_eq!(detail.run, outcome.run);
    assert_eq!(detail.consumption.len(), 2);
    let total: f64 = detail.consumption.iter().map(|c| c.total_cost).sum();
    assert_close(total, outcome.run.total_cost);
}

#[test]
fn test_insufficient_ingredients_leave_no_trace() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_cookie_scenario(&conn);
    let recorder = ProductionRecorder::new(conn.clone(), standard_converter(), default_config());

    let err = recorder.record_production(&request(4, 192), None).unwrap_err();
    match err {
        PlanningError::InsufficientInventory { shortfalls } => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].item_name, "Flour");
            assert_close(shortfalls[0].missing(), 500.0);
        }
        other => panic!("unexpected: {:?}", other),
    }

    assert_eq!(unit_count(&conn, "cookie"), 0);
    assert_close(lot_remaining(&conn, "flour-1"), 1.0);
    assert_close(lot_remaining(&conn, "flour-2"), 500.0);
    assert_close(lot_remaining(&conn, "butter-1"), 1.0);
    assert_eq!(count_rows(&conn, "production_run"), 0);
    assert_eq!(count_rows(&conn, "production_consumption"), 0);
    assert_eq!(count_rows(&conn, "recipe_snapshot"), 0);
    assert_eq!(count_rows(&conn, "action_log"), 0);
}

#[test]
fn test_invalid_requests_are_rejected() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_cookie_scenario(&conn);
    Seeder::new(conn.clone())
        .recipe("shortbread", "Shortbread", 24.0)
        .unit("shortbread-unit", "Shortbread", Some("shortbread"), 0);
    let recorder = ProductionRecorder::new(conn.clone(), standard_converter(), default_config());

    let err = recorder.record_production(&request(0, 48), None).unwrap_err();
    assert!(matches!(err, PlanningError::Validation(_)));

    let err = recorder.record_production(&request(1, 0), None).unwrap_err();
    assert!(matches!(err, PlanningError::Validation(_)));

    let mut mismatched = request(1, 48);
    mismatched.finished_unit_id = "shortbread-unit".to_string();
    let err = recorder.record_production(&mismatched, None).unwrap_err();
    assert!(matches!(err, PlanningError::Validation(_)));

    let mut missing = request(1, 48);
    missing.recipe_id = "nope".to_string();
    let err = recorder.record_production(&missing, None).unwrap_err();
    assert!(matches!(err, PlanningError::NotFound { .. }));

    assert_eq!(count_rows(&conn, "production_run"), 0);
}

#[test]
fn test_nested_recipe_consumes_component_ingredients() {
    let (_tmp, conn) = create_test_db().unwrap();
    Seeder::new(conn.clone())
        .item("cocoa", "Cocoa", "g", false)
        .item("cream", "Cream", "ml", false)
        .lot("cocoa-1", "cocoa", 1000.0, "g", Some(0.01), "2026-01-01 09:00:00")
        .lot("cream-1", "cream", 1.0, "l", Some(4.0), "2026-01-01 09:00:00")
        .recipe("ganache", "Ganache", 1.0)
        .ingredient("ganache", "cream", 250.0, "ml")
        .recipe("truffle", "Truffle", 30.0)
        .ingredient("truffle", "cocoa", 100.0, "g")
        .component("truffle", "ganache", 2.0)
        .unit("truffle-unit", "Truffle", Some("truffle"), 0);
    let recorder = ProductionRecorder::new(conn.clone(), standard_converter(), default_config());

    let outcome = recorder
        .record_production(
            &ProductionRequest {
                recipe_id: "truffle".to_string(),
                finished_unit_id: "truffle-unit".to_string(),
                batches: 1,
                actual_yield: 28,
                notes: None,
                actor: "chocolatier".to_string(),
            },
            None,
        )
        .unwrap();

    // cocoa 100 g + cream 2 x 250 ml
    assert_eq!(outcome.consumption.len(), 2);
    assert_close(lot_remaining(&conn, "cocoa-1"), 900.0);
    assert_close(lot_remaining(&conn, "cream-1"), 0.5);
    assert_close(outcome.run.total_cost, 1.0 + 2.0);
    assert_eq!(unit_count(&conn, "truffle-unit"), 28);
}

#[test]
fn test_same_item_in_mixed_units_is_one_requirement() {
    let (_tmp, conn) = create_test_db().unwrap();
    Seeder::new(conn.clone())
        .item("flour", "Flour", "g", false)
        .lot("flour-kg", "flour", 1.2, "kg", Some(2.0), "2026-01-01 09:00:00")
        .recipe("crust", "Crust", 1.0)
        .ingredient("crust", "flour", 1.0, "kg")
        .recipe("pie", "Apple Pie", 8.0)
        .ingredient("pie", "flour", 500.0, "g")
        .component("pie", "crust", 1.0)
        .unit("pie-slice", "Pie Slice", Some("pie"), 0);
    let recorder = ProductionRecorder::new(conn.clone(), standard_converter(), default_config());

    // 500 g + 1 kg = 1500 g > 1.2 kg
    let check = recorder.check_can_produce("pie", 1, None).unwrap();
    assert!(!check.can_produce);
    assert_eq!(check.ingredients.len(), 1);
    assert_eq!(check.ingredients[0].unit, "g");
    assert_close(check.ingredients[0].needed, 1500.0);
    assert_eq!(check.shortfalls.len(), 1);
    assert_close(check.shortfalls[0].available, 1200.0);

    let pie = ProductionRequest {
        recipe_id: "pie".to_string(),
        finished_unit_id: "pie-slice".to_string(),
        batches: 1,
        actual_yield: 8,
        notes: None,
        actor: "baker".to_string(),
    };
    let err = recorder.record_production(&pie, None).unwrap_err();
    assert!(matches!(err, PlanningError::InsufficientInventory { .. }));
    assert_close(lot_remaining(&conn, "flour-kg"), 1.2);

    Seeder::new(conn.clone()).lot("flour-g", "flour", 1000.0, "g", Some(0.001), "2026-01-02 09:00:00");
    let outcome = recorder.record_production(&pie, None).unwrap();
    assert_eq!(outcome.consumption.len(), 1);
    assert_close(outcome.consumption[0].quantity, 1500.0);
    assert_close(lot_remaining(&conn, "flour-kg"), 0.0);
    assert_close(lot_remaining(&conn, "flour-g"), 700.0);
    assert_eq!(count_rows(&conn, "production_consumption"), 1);
}
