//! # MIRS Web模块
//!
//! REST API层：认证、患者档案、影像上传与分发、检查与报告、审计日志。

pub mod audit;
pub mod auth;
pub mod cache;
pub mod error;
pub mod examinations;
pub mod images;
pub mod patients;
pub mod server;

pub use cache::TtlCache;
pub use error::{ApiError, ApiResult};
pub use server::{AppState, WebServer};
