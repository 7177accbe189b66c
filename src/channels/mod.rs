//! 渠道模块
//!
//! 聊天侧投递接口及其 Webhook 实现。聊天平台客户端本身
//! （指令注册、消息/按钮渲染）是外部协作方，核心只通过
//! `ChatSurface` 接口与之交互。

pub mod traits;
pub mod webhook;

pub use traits::ChatSurface;
pub use webhook::WebhookChatSurface;
