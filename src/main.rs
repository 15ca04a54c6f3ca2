// ==========================================
// 小批量生产排产系统 - 维护入口
// ==========================================
// 用法:
//   batch-production-aps [db_path]
// 打开（必要时创建）数据库，补齐历史生产记录缺失的配方快照
// ==========================================

use batch_production_aps::app::{get_default_db_path, AppState};
use batch_production_aps::logging;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let db_path = std::env::args()
        .nth(1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(get_default_db_path);

    let state = AppState::new(db_path)?;
    logging::init_with(&state.logging_config);

    tracing::info!("==================================================");
    tracing::info!("{}", batch_production_aps::APP_NAME);
    tracing::info!("系统版本: {}", batch_production_aps::VERSION);
    tracing::info!("使用数据库: {}", state.db_path);
    tracing::info!("==================================================");

    let report = state.planning_api.backfill_snapshots("maintenance")?;
    tracing::info!(
        created = report.created.len(),
        skipped = report.skipped.len(),
        "快照补齐完成"
    );
    for (run_id, reason) in &report.skipped {
        tracing::warn!(run_id = %run_id, reason = %reason, "生产记录未补齐快照");
    }

    println!(
        "snapshots_created={} skipped={}",
        report.created.len(),
        report.skipped.len()
    );
    Ok(())
}
