//! 下载追踪模块
//!
//! 用户从检索结果中选中一项后启动的小型会话状态机：
//! `Requested -> Queued -> Transferring -> {Completed, Failed}`，
//! 另有调度失败时的 `Requested -> Failed` 直达边。
//!
//! 与检索会话不同，进度增量不做缓冲：每条增量立即推送到
//! 聊天侧做渐进状态编辑；终态消息只交付一次，之后的增量
//! 一律丢弃。失败不自动重试——底层网络没有恰好一次语义，
//! 自动重试可能造成重复传输，由用户显式重新发起。

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::channels::traits::ChatSurface;
use crate::core::session::store::SessionStore;
use crate::core::session::types::{
    DownloadDelta, DownloadPhase, Origin, Session, SessionKind, SessionState,
};
use crate::relay::client::RelayPort;
use crate::relay::protocol::{CommandPayload, PushContent, PushStatus};

/// 下载追踪器
///
/// # 字段说明
/// * `store` - 会话存储
/// * `relay` - 中继指令出口
/// * `chat` - 聊天侧投递出口
#[derive(Clone)]
pub struct DownloadTracker {
    store: Arc<SessionStore>,
    relay: Arc<dyn RelayPort>,
    chat: Arc<dyn ChatSurface>,
}

impl DownloadTracker {
    /// 创建下载追踪器
    pub fn new(
        store: Arc<SessionStore>,
        relay: Arc<dyn RelayPort>,
        chat: Arc<dyn ChatSurface>,
    ) -> Self {
        Self { store, relay, chat }
    }

    /// 发起一次下载
    ///
    /// 创建下载会话并把启动指令调度到中继。调度失败时会话
    /// 立即终结为失败，并向聊天侧推送与"无结果"/"超时"可
    /// 区分的传输层失败消息。
    ///
    /// # 参数说明
    /// * `origin` - 聊天侧来源
    /// * `label` - 下载目标的展示名
    /// * `transfer_ref` - 从检索结果提取的传输指令令牌
    ///
    /// # 返回值
    /// 下载会话 ID；失败已在内部上报，不再向外传播
    pub async fn start(&self, origin: Origin, label: &str, transfer_ref: &str) -> String {
        let session = self
            .store
            .create(SessionKind::Download, origin.clone(), transfer_ref);
        self.store.set_label(&session.id, label);

        info!(session_id = %session.id, label = %label, "发起下载");

        let command = CommandPayload::StartDownload {
            transfer_ref: transfer_ref.to_string(),
        };
        match self.relay.dispatch(&session.id, &command).await {
            Ok(()) => {
                let content = PushContent::DownloadStatus {
                    status: PushStatus::Success,
                    message: format!("Download command for `{}` sent to the network.", label),
                    progress: None,
                    terminal: false,
                };
                self.push_message(&session.id, &origin, &content).await;
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "下载启动指令调度失败");
                self.store.finalize(&session.id, SessionState::Failed);
                let content = PushContent::DownloadStatus {
                    status: PushStatus::Error,
                    message: format!(
                        "Could not reach the relay to start the download of `{}`.",
                        label
                    ),
                    progress: None,
                    terminal: true,
                };
                self.push_message(&session.id, &origin, &content).await;
            }
        }

        session.id
    }

    /// 处理一条下载状态增量
    ///
    /// 阶段只向前推进；终态后的增量丢弃，终态消息至多交付
    /// 一次（与会话存储的幂等终结同一套纪律）。
    pub async fn handle_delta(&self, session_id: &str, delta: DownloadDelta) {
        let Some(session) = self.store.get(session_id) else {
            debug!(session_id = %session_id, "增量指向未知会话，忽略");
            return;
        };
        if session.is_terminal() {
            debug!(session_id = %session_id, "增量到达已终结会话，丢弃");
            return;
        }

        let label = session.label.clone().unwrap_or_else(|| session.query.clone());

        match delta.phase {
            DownloadPhase::Completed => {
                if let Some((session, first)) =
                    self.store.finalize(session_id, SessionState::Completed)
                {
                    if first {
                        let content = PushContent::DownloadStatus {
                            status: PushStatus::Success,
                            message: format!("Download of `{}` completed.", label),
                            progress: Some(100),
                            terminal: true,
                        };
                        self.push_update(&session, &content).await;
                    }
                }
            }
            DownloadPhase::Failed => {
                if let Some((session, first)) =
                    self.store.finalize(session_id, SessionState::Failed)
                {
                    if first {
                        let reason = delta
                            .error
                            .unwrap_or_else(|| "the transfer was aborted".to_string());
                        let content = PushContent::DownloadStatus {
                            status: PushStatus::Error,
                            message: format!("Download of `{}` failed: {}", label, reason),
                            progress: None,
                            terminal: true,
                        };
                        self.push_update(&session, &content).await;
                    }
                }
            }
            phase @ (DownloadPhase::Queued | DownloadPhase::Transferring) => {
                match self
                    .store
                    .advance_phase(session_id, phase.to_state(), delta.progress)
                {
                    Ok(session) => {
                        let message = match (phase, session.progress) {
                            (DownloadPhase::Queued, _) => {
                                format!("`{}` queued for transfer.", label)
                            }
                            (DownloadPhase::Transferring, Some(pct)) => {
                                format!("Transferring `{}`... {}%", label, pct)
                            }
                            (DownloadPhase::Transferring, None) => {
                                format!("Transfer of `{}` starting.", label)
                            }
                            _ => return,
                        };
                        let content = PushContent::DownloadStatus {
                            status: PushStatus::Success,
                            message,
                            progress: session.progress,
                            terminal: false,
                        };
                        self.push_update(&session, &content).await;
                    }
                    Err(_) => {
                        // 向后或并发竞争的转移，忽略
                        debug!(session_id = %session_id, phase = ?phase, "阶段转移被拒绝，忽略");
                    }
                }
            }
        }
    }

    /// 处理下载会话的硬超时
    ///
    /// 由清扫驱动：会话从未收到任何增量时终结为超时，推送
    /// 与"传输失败"可区分的静默消息。
    pub async fn handle_timeout(&self, session: &Session) {
        let label = session.label.clone().unwrap_or_else(|| session.query.clone());
        let content = PushContent::DownloadStatus {
            status: PushStatus::TimedOut,
            message: format!(
                "No transfer activity from the network for `{}`. The download session has expired.",
                label
            ),
            progress: None,
            terminal: true,
        };
        self.push_update(session, &content).await;
    }

    /// 推送一条新消息并记录交互句柄
    async fn push_message(&self, session_id: &str, origin: &Origin, content: &PushContent) {
        match self.chat.render_message(session_id, origin, content).await {
            Ok(handle) => self.store.set_interaction(session_id, &handle),
            Err(e) => warn!(session_id = %session_id, error = %e, "聊天侧投递失败"),
        }
    }

    /// 针对已有交互句柄做状态编辑，无句柄时退化为新消息
    async fn push_update(&self, session: &Session, content: &PushContent) {
        let result = match &session.interaction {
            Some(handle) => self.chat.render_status(handle, content).await,
            None => self
                .chat
                .render_message(&session.id, &session.origin, content)
                .await
                .map(|handle| self.store.set_interaction(&session.id, &handle)),
        };
        if let Err(e) = result {
            warn!(session_id = %session.id, error = %e, "聊天侧状态更新失败");
        }
    }
}
