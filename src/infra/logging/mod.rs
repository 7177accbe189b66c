//! 日志系统模块
//!
//! 本模块提供了统一的日志记录功能，使用 `tracing` 库实现。

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// 日志级别
///
/// 从低到高：Trace < Debug < Info < Warn < Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// 最详细的日志级别（调试用）
    Trace,
    /// 调试信息
    Debug,
    /// 一般信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    /// 从字符串解析日志级别，无法识别时回落到 Info
    pub fn from_str(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    /// 转换为 tracing 的 Level
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// 初始化日志系统
///
/// # 参数说明
/// * `level` - 日志级别
///
/// 重复初始化（如测试中）会失败，此处静默忽略。
pub fn init(level: LogLevel) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level.to_tracing_level())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
