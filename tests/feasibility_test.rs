// ==========================================
// 可行性评估集成测试
// ==========================================


use batch_production_aps::config::PlannerConfig;
use batch_production_aps::domain::types::{AllocationPolicy, AssemblyStatus};
use batch_production_aps::engine::{
    AssemblyTarget, BlockerSubject, FeasibilityService, ProductionTarget,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use test_helpers::*;

fn independent() -> PlannerConfig {
    PlannerConfig {
        allocation_policy: AllocationPolicy::Independent,
        ..PlannerConfig::default()
    }
}

fn target(good_id: &str, quantity: i64, upstream_complete: bool) -> AssemblyTarget {
    AssemblyTarget {
        good_id: good_id.to_string(),
        target_quantity: quantity,
        upstream_production_complete: upstream_complete,
    }
}

/// duo: 6 unit-a + 3 unit-b；库存 A=300 / B=120
fn seed_duo(conn: &Arc<Mutex<Connection>>) {
    Seeder::new(conn.clone())
        .unit("unit-a", "Unit A", None, 300)
        .unit("unit-b", "Unit B", None, 120)
        .good("duo", "Duo Pack")
        .compose_unit("duo", "d-1", "unit-a", 6.0)
        .compose_unit("duo", "d-2", "unit-b", 3.0);
}

#[test]
fn test_can_assemble_is_min_over_components() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_duo(&conn);
    let service = FeasibilityService::new(conn.clone(), standard_converter(), default_config());

    let results = service.assess_assembly_targets(&[target("duo", 50, false)], None).unwrap();
    let duo = &results[0];
    assert_eq!(duo.can_assemble, 40);
    assert_eq!(duo.status, AssemblyStatus::Partial);
    assert_eq!(duo.limiting_component.as_deref(), Some("Unit B"));

    assert_eq!(duo.inventory_blockers.len(), 1);
    let blocker = &duo.inventory_blockers[0];
    assert_eq!(blocker.subject, BlockerSubject::FinishedUnit);
    assert_eq!(blocker.subject_id, "unit-b");
    assert_close(blocker.needed, 150.0);
    assert_close(blocker.available, 120.0);

    // 两个成品单元都没有生产成本
    assert_eq!(duo.cost_blockers.len(), 2);
    assert!(duo.assignment_blockers.is_empty());
}

#[test]
fn test_sequential_policy_reserves_for_earlier_targets() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_duo(&conn);
    let targets = [target("duo", 50, false), target("duo", 10, true)];

    let sequential = FeasibilityService::new(conn.clone(), standard_converter(), default_config())
        .assess_assembly_targets(&targets, None)
        .unwrap();
    assert_eq!(sequential[0].can_assemble, 40);
    assert_eq!(sequential[1].can_assemble, 0);
    assert_eq!(sequential[1].status, AssemblyStatus::CannotAssemble);

    let independent = FeasibilityService::new(conn.clone(), standard_converter(), independent())
        .assess_assembly_targets(&targets, None)
        .unwrap();
    assert_eq!(independent[0].can_assemble, 40);
    assert_eq!(independent[1].can_assemble, 40);
    assert_eq!(independent[1].status, AssemblyStatus::CanAssemble);
}

#[test]
fn test_zero_capacity_status_depends_on_upstream_progress() {
    let (_tmp, conn) = create_test_db().unwrap();
    Seeder::new(conn.clone())
        .unit("scone", "Scone", None, 0)
        .good("tea-set", "Tea Set")
        .compose_unit("tea-set", "t-1", "scone", 2.0);
    let service = FeasibilityService::new(conn.clone(), standard_converter(), default_config());

    let results = service
        .assess_assembly_targets(&[target("tea-set", 5, false), target("tea-set", 5, true)], None)
        .unwrap();
    assert_eq!(results[0].status, AssemblyStatus::AwaitingProduction);
    assert_eq!(results[1].status, AssemblyStatus::CannotAssemble);
}

#[test]
fn test_assignment_and_packaging_cost_blockers() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_duo(&conn);
    Seeder::new(conn.clone())
        .item("tissue", "Tissue Paper", "each", true)
        .lot("tissue-1", "tissue", 50.0, "each", None, "2026-01-01 09:00:00")
        .good("bag", "Treat Bag")
        .compose_unit("bag", "b-1", "unit-a", 1.0)
        .compose_packaging("bag", "b-2", Some("tissue"), 2.0)
        .compose_packaging("bag", "b-3", None, 1.0)
        .good("empty", "Empty Shell");
    let service = FeasibilityService::new(conn.clone(), standard_converter(), default_config());

    let results = service
        .assess_assembly_targets(&[target("bag", 5, false), target("empty", 7, false)], None)
        .unwrap();

    let bag = &results[0];
    assert_eq!(bag.can_assemble, 25);
    assert_eq!(bag.status, AssemblyStatus::CanAssemble);
    assert!(bag.inventory_blockers.is_empty());
    assert_eq!(bag.assignment_blockers.len(), 1);
    assert_eq!(bag.assignment_blockers[0].composition_id, "b-3");
    assert!(bag
        .cost_blockers
        .iter()
        .any(|b| b.subject == BlockerSubject::InventoryItem && b.subject_id == "tissue"));
    assert!(bag
        .cost_blockers
        .iter()
        .any(|b| b.subject == BlockerSubject::FinishedUnit && b.subject_id == "unit-a"));

    // 无组件的组合不受库存约束
    let empty = &results[1];
    assert_eq!(empty.can_assemble, 7);
    assert_eq!(empty.status, AssemblyStatus::CanAssemble);
    assert!(empty.limiting_component.is_none());
}

#[test]
fn test_production_targets_compete_for_ingredients() {
    let (_tmp, conn) = create_test_db().unwrap();
    seed_cookie_scenario(&conn);
    let targets = [
        ProductionTarget {
            recipe_id: "choc-chip".to_string(),
            batches: 2,
        },
        ProductionTarget {
            recipe_id: "choc-chip".to_string(),
            batches: 2,
        },
    ];

    let sequential = FeasibilityService::new(conn.clone(), standard_converter(), default_config())
        .assess_production_targets(&targets, None)
        .unwrap();
    assert_eq!(sequential[0].max_batches, 3);
    assert!(sequential[0].can_produce);
    assert_eq!(sequential[1].max_batches, 1);
    assert!(!sequential[1].can_produce);
    assert_eq!(sequential[1].inventory_blockers.len(), 1);
    assert_eq!(sequential[1].inventory_blockers[0].subject_id, "flour");
    assert_close(sequential[1].inventory_blockers[0].available, 500.0);
    assert!(sequential[1].cost_blockers.is_empty());

    let independent = FeasibilityService::new(conn.clone(), standard_converter(), independent())
        .assess_production_targets(&targets, None)
        .unwrap();
    assert!(independent.iter().all(|r| r.can_produce && r.max_batches == 3));
}

#[test]
fn test_reservation_pools_mixed_units_of_one_item() {
    let (_tmp, conn) = create_test_db().unwrap();
    Seeder::new(conn.clone())
        .item("flour", "Flour", "g", false)
        .lot("flour-kg", "flour", 1.2, "kg", Some(2.0), "2026-01-01 09:00:00")
        .lot("flour-g", "flour", 1000.0, "g", Some(0.001), "2026-01-02 09:00:00")
        .recipe("crust", "Crust", 1.0)
        .ingredient("crust", "flour", 1.0, "kg")
        .recipe("pie", "Apple Pie", 8.0)
        .ingredient("pie", "flour", 500.0, "g")
        .component("pie", "crust", 1.0);
    let pie = ProductionTarget {
        recipe_id: "pie".to_string(),
        batches: 1,
    };

    // 每批 1500 g，库存合计 2200 g
    let results = FeasibilityService::new(conn.clone(), standard_converter(), default_config())
        .assess_production_targets(&[pie.clone(), pie], None)
        .unwrap();
    assert_eq!(results[0].max_batches, 1);
    assert!(results[0].can_produce);
    assert!(!results[1].can_produce);
    assert_eq!(results[1].inventory_blockers.len(), 1);
    assert_eq!(results[1].inventory_blockers[0].unit, "g");
    assert_close(results[1].inventory_blockers[0].available, 700.0);
}
