//! # MIRS数据库模块
//!
//! 负责患者档案、医学影像元数据、检查和审计日志的存储，
//! 提供PostgreSQL数据库连接池和完整的CRUD操作。

pub mod connection;
pub mod models;
pub mod queries;

// 重新导出主要类型
pub use connection::{DatabasePool, PoolSettings};
pub use models::*;
pub use queries::DatabaseQueries;
