// ==========================================
// 小批量生产排产系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 配方批量生产与组合商品履约的计划引擎
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/事务）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 启动装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域实体
pub use domain::{
    ActionLog, ActionType, AssemblyRun, FinishedGood, FinishedUnit, InventoryItem, InventoryLot,
    ProductionRun, Recipe, RecipeSnapshot,
};

// 引擎
pub use engine::{
    AssemblyRecorder, BundleDecomposer, FeasibilityService, FifoLedger, PlanningError,
    ProductionRecorder, SnapshotStore,
};

// API
pub use api::{ApiError, PlanningApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "小批量生产排产系统";
