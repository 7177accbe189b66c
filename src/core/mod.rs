//! 核心业务模块
//!
//! 包含结果解析、会话存储、关联引擎和下载追踪。

pub mod download;
pub mod engine;
pub mod parser;
pub mod session;
