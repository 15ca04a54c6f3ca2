// ==========================================
// 小批量生产排产系统 - 操作日志数据仓储
// ==========================================
// 红线: 记录类写入必须与业务写入处于同一事务
// ==========================================

mod core;
mod queries;

#[cfg(test)]
mod tests;

pub use core::ActionLogRepository;
