// ==========================================
// 小批量生产排产系统 - 应用层
// ==========================================
// 职责: 装配数据库、配置与 API，供 CLI / 界面层启动使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
