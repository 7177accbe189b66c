//! Web 接口模块
//!
//! 提供两组 HTTP 端点：
//! * `/relay/event` - 中继侧进程回推事件的入口（原始行、
//!   列表结束信号）
//! * `/commands/*` - 聊天平台协作方的指令接入缝（检索、
//!   热门榜、下载选择、取消）
//!
//! 同一会话的事件按请求到达顺序应用；跨会话之间没有顺序
//! 约束。

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::engine::CorrelationEngine;
use crate::core::session::store::SessionStore;
use crate::core::session::types::Origin;
use crate::relay::protocol::RelayMessage;

/// Web 共享状态
#[derive(Clone)]
pub struct AppState {
    /// 关联引擎
    pub engine: Arc<CorrelationEngine>,
    /// 会话存储（健康检查用）
    pub store: Arc<SessionStore>,
}

/// 检索指令请求体
#[derive(Debug, Clone, Deserialize)]
pub struct SearchCommand {
    /// 频道 ID
    pub channel_id: String,
    /// 请求者 ID
    pub requester_id: String,
    /// 检索文本
    pub query: String,
}

/// 热门榜指令请求体
#[derive(Debug, Clone, Deserialize)]
pub struct HotCommand {
    pub channel_id: String,
    pub requester_id: String,
}

/// 下载选择请求体
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadCommand {
    /// 已完成检索会话的 ID
    pub session_id: String,
    /// 到达顺序序号（1 起）
    pub choice: usize,
}

/// 取消请求体
#[derive(Debug, Clone, Deserialize)]
pub struct CancelCommand {
    pub session_id: String,
}

/// 热门榜视图查询参数
#[derive(Debug, Clone, Deserialize)]
pub struct HotViewQuery {
    /// 分类过滤；缺省表示全部
    pub category: Option<String>,
}

/// 会话 ID 响应体
#[derive(Debug, Clone, Serialize)]
pub struct SessionCreated {
    pub session_id: String,
}

/// 构建路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/relay/event", post(receive_relay_event))
        .route("/commands/search", post(command_search))
        .route("/commands/hot", post(command_hot))
        .route("/commands/download", post(command_download))
        .route("/commands/cancel", post(command_cancel))
        .route("/hot/:session_id", get(hot_view))
        .route("/health", get(health))
        .with_state(state)
}

/// 启动 Web 服务器
///
/// # 参数说明
/// * `state` - 共享状态
/// * `port` - 监听端口
pub async fn start_web(state: AppState, port: u16) -> crate::infra::error::Result<()> {
    let app = router(state);
    let addr = format!("0.0.0.0:{}", port);

    info!(addr = %addr, "Web 服务器启动");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| crate::infra::error::Error::Io(format!("绑定 {} 失败: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| crate::infra::error::Error::Io(e.to_string()))?;

    Ok(())
}

/// 接收中继事件
///
/// 只接受 `Event` 信封；未知会话的事件被引擎吸收为无副作用。
async fn receive_relay_event(
    State(state): State<AppState>,
    Json(message): Json<RelayMessage>,
) -> impl IntoResponse {
    match message {
        RelayMessage::Event { session_id, payload } => {
            state.engine.handle_event(&session_id, payload).await;
            (StatusCode::OK, Json(json!({"status": "ok"})))
        }
        other => {
            warn!(message = ?other, "中继事件端点收到非事件信封");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"status": "error", "message": "expected an event envelope"})),
            )
        }
    }
}

/// 检索指令
async fn command_search(
    State(state): State<AppState>,
    Json(cmd): Json<SearchCommand>,
) -> impl IntoResponse {
    let origin = Origin::new(&cmd.channel_id, &cmd.requester_id);
    let session_id = state.engine.start_search(origin, &cmd.query).await;
    Json(SessionCreated { session_id })
}

/// 热门榜指令
async fn command_hot(
    State(state): State<AppState>,
    Json(cmd): Json<HotCommand>,
) -> impl IntoResponse {
    let origin = Origin::new(&cmd.channel_id, &cmd.requester_id);
    let session_id = state.engine.start_hot(origin).await;
    Json(SessionCreated { session_id })
}

/// 下载选择指令
async fn command_download(
    State(state): State<AppState>,
    Json(cmd): Json<DownloadCommand>,
) -> impl IntoResponse {
    match state.engine.select_download(&cmd.session_id, cmd.choice).await {
        Some(download_id) => (
            StatusCode::OK,
            Json(json!({"status": "ok", "session_id": download_id})),
        ),
        // 失败已经以聊天消息形式上报
        None => (
            StatusCode::OK,
            Json(json!({"status": "rejected"})),
        ),
    }
}

/// 取消指令
async fn command_cancel(
    State(state): State<AppState>,
    Json(cmd): Json<CancelCommand>,
) -> impl IntoResponse {
    state.engine.cancel(&cmd.session_id).await;
    Json(json!({"status": "ok"}))
}

/// 热门榜分类视图
///
/// 从已冻结的累积集合中选取子集，纯展示过滤，不触发中继
/// 查询。
async fn hot_view(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<HotViewQuery>,
) -> impl IntoResponse {
    match state
        .engine
        .hot_category_view(&session_id, query.category.as_deref())
    {
        Ok((summary, items)) => {
            let categories = state.engine.hot_categories(&session_id).unwrap_or_default();
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "summary": summary,
                    "items": items,
                    "categories": categories,
                })),
            )
        }
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "message": e.to_string()})),
        ),
    }
}

/// 健康检查
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "sessions": state.store.len(),
    }))
}
