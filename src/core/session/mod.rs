//! 会话模块
//!
//! 会话是一次被追踪的请求（检索、热门榜或下载），从创建到
//! 终态的完整生命周期。本模块提供会话类型定义和进程内存储。

pub mod store;
pub mod types;

pub use store::{SessionStore, StoreConfig, SweepReason, SweptSession};
pub use types::{
    DownloadDelta, DownloadPhase, HotItem, Origin, Record, SearchResult, Session, SessionKind,
    SessionState,
};
