//! 中继模块
//!
//! 定义核心与中继侧进程之间的消息信封，以及向中继下发
//! 指令的客户端。

pub mod client;
pub mod protocol;

pub use client::{RelayPort, TcpRelayClient};
pub use protocol::{CommandPayload, EventPayload, PushPayload, RelayMessage};
