//! Webhook 聊天表面模块
//!
//! 把结构化推送以 JSON POST 到聊天侧进程的接收端点。
//! 端点按内容类型区分：`search_results`、`hot_results`、
//! `download_status`、`session_expired`。

use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use async_trait::async_trait;

use crate::channels::traits::ChatSurface;
use crate::core::session::types::Origin;
use crate::infra::error::{Error, Result};
use crate::relay::protocol::PushContent;

/// Webhook 聊天表面
///
/// # 字段说明
/// * `base_url` - 聊天侧进程的基础 URL
/// * `http_client` - HTTP 客户端（连接复用）
#[derive(Debug, Clone)]
pub struct WebhookChatSurface {
    base_url: String,
    http_client: Client,
}

impl WebhookChatSurface {
    /// 创建 Webhook 聊天表面
    ///
    /// # 参数说明
    /// * `base_url` - 聊天侧基础 URL
    /// * `request_timeout_ms` - 单次请求超时
    pub fn new(base_url: &str, request_timeout_ms: u64) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(request_timeout_ms))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    /// 内容类型对应的端点
    fn endpoint(content: &PushContent) -> &'static str {
        match content {
            PushContent::SearchResults { .. } => "search_results",
            PushContent::HotResults { .. } => "hot_results",
            PushContent::DownloadStatus { .. } => "download_status",
            PushContent::SessionExpired { .. } => "session_expired",
        }
    }

    /// 发送一条 Webhook
    async fn post(&self, session_id: &str, origin: &Origin, content: &PushContent) -> Result<()> {
        let endpoint = Self::endpoint(content);
        let url = format!("{}/{}", self.base_url, endpoint);

        let payload = json!({
            "session_id": session_id,
            "origin": origin,
            "content": content,
        });

        debug!(session_id = %session_id, url = %url, "发送聊天侧 Webhook");

        let response = self
            .http_client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Webhook 发送失败: {}", e)))?;

        if !response.status().is_success() {
            warn!(session_id = %session_id, status = %response.status(), "聊天侧返回非成功状态");
            return Err(Error::Channel(format!(
                "聊天侧返回状态 {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ChatSurface for WebhookChatSurface {
    async fn render_message(
        &self,
        session_id: &str,
        origin: &Origin,
        content: &PushContent,
    ) -> Result<String> {
        self.post(session_id, origin, content).await?;
        // 聊天侧按会话 ID 定位原始交互，句柄即会话 ID
        Ok(session_id.to_string())
    }

    async fn render_status(&self, handle: &str, content: &PushContent) -> Result<()> {
        self.post(handle, &Origin::default(), content).await
    }
}
