//! 错误处理模块

/// 错误类型
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("中继不可达: {0}")]
    RelayUnavailable(String),

    #[error("会话不存在: {0}")]
    SessionNotFound(String),

    #[error("会话已过期或已结束: {0}")]
    SessionExpired(String),

    #[error("渠道错误: {0}")]
    Channel(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("IO 错误: {0}")]
    Io(String),
}

/// 结果类型
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Channel(e.to_string())
    }
}
