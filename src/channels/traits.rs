//! 渠道 Trait 定义模块
//!
//! 定义聊天侧投递的统一接口。
//!
//! # 设计原则
//! 1. 使用 `async-trait` 支持异步方法
//! 2. 所有方法返回 `Result` 类型
//! 3. 投递失败不致命：调用方记录日志后继续

use async_trait::async_trait;

use crate::core::session::types::Origin;
use crate::infra::error::Result;
use crate::relay::protocol::PushContent;

/// 聊天表面
///
/// 核心向聊天平台投递消息的唯一出口。
///
/// # 方法说明
/// - `render_message()`: 渲染一条新消息（或带选择项的列表），
///   返回交互句柄供后续编辑
/// - `render_status()`: 针对已有交互句柄做状态编辑（下载
///   进度等渐进更新）
#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// 渲染一条新消息
    ///
    /// # 参数说明
    /// * `session_id` - 关联 ID，聊天侧据此定位原始交互
    /// * `origin` - 聊天侧来源
    /// * `content` - 结构化内容
    ///
    /// # 返回值
    /// 交互句柄，供 `render_status` 编辑同一条消息
    async fn render_message(
        &self,
        session_id: &str,
        origin: &Origin,
        content: &PushContent,
    ) -> Result<String>;

    /// 状态更新
    ///
    /// # 参数说明
    /// * `handle` - `render_message` 返回的交互句柄
    /// * `content` - 新的结构化内容
    async fn render_status(&self, handle: &str, content: &PushContent) -> Result<()>;
}
