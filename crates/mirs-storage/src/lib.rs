//! # MIRS存储模块
//!
//! 负责编码后影像和缩略图的文件系统存储。

pub mod storage;

pub use storage::{sha256_hex, ImageStore};
