//! xdccbot 库入口
//!
//! 让群聊平台上的用户检索只能经由 IRC 风格中继到达的文件
//! 分享网络，并在其上触发文件传输，而无需任何用户直接使用
//! IRC。核心是把无结构的多行异步回复关联回单个用户请求的
//! 关联引擎，以及围绕它的会话超时状态机、Webhook 传输契约
//! 和下载追踪状态机。
//!
//! # 使用示例
//! ```rust
//! use xdccbot::infra::config::Config;
//! ```

/// 核心模块：解析、会话、关联引擎、下载追踪
pub mod core;
/// 渠道模块：聊天侧投递接口
pub mod channels;
/// 中继模块：协议信封与指令客户端
pub mod relay;
/// 基础设施：配置、错误、日志
pub mod infra;
/// 服务生命周期
pub mod service;
/// Web 接口
pub mod web;
