// ==========================================
// 配方快照集成测试
// ==========================================


use batch_production_aps::domain::{ProductionRun, Recipe};
use batch_production_aps::engine::{PlanningError, ProductionRecorder, ProductionRequest, SnapshotStore};
use batch_production_aps::repository::{
    ProductionRunRepository, RecipeRepository, RecipeSnapshotRepository,
};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use test_helpers::*;

fn produce_cookies(conn: &Arc<Mutex<Connection>>) -> ProductionRun {
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
        .unwrap()
        .run
}

#[test]
fn test_snapshot_rows_are_immutable() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_cookie_scenario(&conn);
    let run = produce_cookies(&conn);
    let snapshot_id = run.snapshot_id.clone().unwrap();

    let snapshot = RecipeSnapshotRepository::new(conn.clone())
        .find_by_id(&snapshot_id)
        .unwrap()
        .unwrap();
    assert!(!snapshot.is_backfilled);
    assert_eq!(snapshot.payload.recipe.name, "Chocolate Chip");
    assert_eq!(snapshot.payload.ingredients.len(), 2);

    let result = conn.lock().unwrap().execute(
        "UPDATE recipe_snapshot SET snapshot_json = '{}' WHERE snapshot_id = ?",
        params![snapshot_id],
    );
    assert!(result.is_err());

    let result = conn.lock().unwrap().execute(
        "UPDATE production_run SET actual_yield = 1 WHERE run_id = ?",
        params![run.run_id],
    );
    assert!(result.is_err());
}

#[test]
fn test_staleness_tracks_recipe_and_ingredient_changes() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_cookie_scenario(&conn);
    let run = produce_cookies(&conn);
    let snapshot_id = run.snapshot_id.unwrap();
    let store = SnapshotStore::new(conn.clone());

    let fresh = store.check_staleness(&snapshot_id, None).unwrap();
    assert!(!fresh.is_stale);
    assert!(fresh.reason().is_none());

    let recipes = RecipeRepository::new(conn.clone());
    recipes.remove_ingredient("choc-chip", "flour").unwrap();
    Seeder::new(conn.clone()).ingredient("choc-chip", "flour", 600.0, "g");

    let stale = store.check_staleness(&snapshot_id, None).unwrap();
    assert!(stale.is_stale);
    assert_eq!(stale.reasons.len(), 1);
    assert!(stale.reasons[0].contains("Flour"));

    let mut recipe: Recipe = recipes.find_by_id("choc-chip").unwrap().unwrap();
    recipe.notes = Some("less sugar".to_string());
    recipe.updated_at = ts("2026-03-01 10:00:00");
    recipes.update(&recipe).unwrap();

    let stale = store.check_staleness(&snapshot_id, None).unwrap();
    assert_eq!(stale.reasons.len(), 2);
    assert!(stale.reason().unwrap().contains("Chocolate Chip"));
}

#[test]
fn test_backfill_attaches_flagged_snapshots_once() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_cookie_scenario(&conn);
    let runs = ProductionRunRepository::new(conn.clone());
    let legacy = ProductionRun {
        run_id: "legacy-1".to_string(),
        recipe_id: "choc-chip".to_string(),
        finished_unit_id: "cookie".to_string(),
        snapshot_id: None,
        batches: 1,
        expected_yield: 48.0,
        actual_yield: 46,
        total_cost: 3.0,
        per_unit_cost: 3.0 / 46.0,
        produced_at: ts("2025-11-20 07:30:00"),
        notes: None,
    };
    runs.insert_legacy_run(&legacy).unwrap();

    let store = SnapshotStore::new(conn.clone());
    let report = store.backfill_missing_snapshots("migration", None).unwrap();
    assert_eq!(report.created.len(), 1);
    assert!(report.skipped.is_empty());
    assert_eq!(report.created[0].run_id, "legacy-1");

    let attached = runs.find_by_id("legacy-1").unwrap().unwrap();
    assert_eq!(attached.snapshot_id.as_deref(), Some(report.created[0].snapshot_id.as_str()));

    let snapshot = RecipeSnapshotRepository::new(conn.clone())
        .find_by_id(&report.created[0].snapshot_id)
        .unwrap()
        .unwrap();
    assert!(snapshot.is_backfilled);
    assert_eq!(snapshot.payload.source_produced_at, Some(legacy.produced_at));

    let again = store.backfill_missing_snapshots("migration", None).unwrap();
    assert!(again.created.is_empty());
    assert_eq!(count_rows(&conn, "recipe_snapshot"), 1);
}

#[test]
fn test_restore_recreates_deleted_items() {
    let (_tmp, conn) = create_test_db().unwrap();
    Seeder::new(conn.clone())
        .recipe("plain", "Plain Sugar Cookie", 36.0)
        .item("sugar", "Sugar", "g", false)
        .item("vanilla", "Vanilla", "ml", false)
        .ingredient("plain", "sugar", 200.0, "g")
        .ingredient("plain", "vanilla", 5.0, "ml");
    let store = SnapshotStore::new(conn.clone());
    let snapshot = store.create_snapshot("plain", None).unwrap();

    RecipeRepository::new(conn.clone())
        .remove_ingredient("plain", "vanilla")
        .unwrap();
    conn.lock()
        .unwrap()
        .execute("DELETE FROM inventory_item WHERE item_id = 'vanilla'", [])
        .unwrap();

    let staleness = store.check_staleness(&snapshot.snapshot_id, None).unwrap();
    assert!(staleness.is_stale);

    let err = store
        .restore_as_new_recipe(&snapshot.snapshot_id, "  ", "baker", None)
        .unwrap_err();
    assert!(matches!(err, PlanningError::Validation(_)));

    let restored = store
        .restore_as_new_recipe(&snapshot.snapshot_id, "Plain Sugar Cookie (restored)", "baker", None)
        .unwrap();
    assert_eq!(restored.ingredient_count, 2);
    assert_eq!(restored.recreated_items, vec!["vanilla".to_string()]);
    assert!(restored.skipped_components.is_empty());

    let recipes = RecipeRepository::new(conn.clone());
    let recipe = recipes.find_by_id(&restored.recipe_id).unwrap().unwrap();
    assert_eq!(recipe.name, "Plain Sugar Cookie (restored)");
    assert_eq!(recipe.yield_quantity, 36.0);
    assert_eq!(recipes.list_ingredients(&restored.recipe_id).unwrap().len(), 2);

    // 原配方不受影响
    assert_eq!(recipes.list_ingredients("plain").unwrap().len(), 1);
}

#[test]
fn test_same_second_yield_edit_is_stale() {
    let (_tmp, conn) = create_test_db().unwrap();
    Seeder::new(conn.clone())
        .recipe("plain", "Plain Sugar Cookie", 36.0)
        .item("sugar", "Sugar", "g", false)
        .ingredient("plain", "sugar", 200.0, "g");
    let store = SnapshotStore::new(conn.clone());
    let snapshot = store.create_snapshot("plain", None).unwrap();

    let recipes = RecipeRepository::new(conn.clone());
    let mut recipe: Recipe = recipes.find_by_id("plain").unwrap().unwrap();
    // updated_at 不变，模拟同一秒内的修改
    recipe.yield_quantity = 24.0;
    recipes.update(&recipe).unwrap();

    let stale = store.check_staleness(&snapshot.snapshot_id, None).unwrap();
    assert!(stale.is_stale);
    assert_eq!(stale.reasons.len(), 1);
    assert!(stale.reasons[0].contains("36"));
    assert!(stale.reasons[0].contains("24"));

    recipe.yield_quantity = 36.0;
    recipe.category = "bars".to_string();
    recipes.update(&recipe).unwrap();
    let stale = store.check_staleness(&snapshot.snapshot_id, None).unwrap();
    assert!(stale.is_stale);
    assert!(stale.reasons[0].contains("bars"));

    recipe.category = "cookies".to_string();
    recipes.update(&recipe).unwrap();
    assert!(!store.check_staleness(&snapshot.snapshot_id, None).unwrap().is_stale);
}
