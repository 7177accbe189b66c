//! 中继协议定义
//!
//! 核心与中继侧进程之间交换的消息信封。三种消息：
//! * `Command`（核心 -> 中继侧）：转发一条指令到底层网络
//! * `Event`（中继侧 -> 核心）：底层网络上与某个开放会话
//!   相关的一行原始文本，或列表结束信号
//! * `Push`（核心 -> 聊天侧）：最终或进度消息
//!
//! 同一会话的消息必须按发送顺序投递和应用；不同会话之间
//! 没有顺序约束。

use serde::{Deserialize, Serialize};

use crate::core::session::types::{HotItem, Origin};

/// 中继消息信封
///
/// 所有跨进程消息共用的外层结构，按 `type` 字段区分。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    /// 指令（核心 -> 中继侧）
    Command {
        session_id: String,
        payload: CommandPayload,
    },
    /// 事件（中继侧 -> 核心）
    Event {
        session_id: String,
        payload: EventPayload,
    },
    /// 推送（核心 -> 聊天侧）
    Push {
        session_id: String,
        payload: PushPayload,
    },
}

/// 指令载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CommandPayload {
    /// 发起检索
    Search { query: String },
    /// 拉取热门榜
    FetchHot,
    /// 发起下载
    StartDownload { transfer_ref: String },
}

impl CommandPayload {
    /// 渲染为中继侧插件的服务指令
    ///
    /// 中继侧注册了三条服务指令，负责把底层网络命令发到
    /// 检索频道，并把随后观察到的行带上会话 ID 回推。
    pub fn to_service_command(&self, session_id: &str) -> String {
        match self {
            CommandPayload::Search { query } => {
                format!("/xdcc_service_search {} {}", session_id, query)
            }
            CommandPayload::FetchHot => format!("/xdcc_service_hot {}", session_id),
            CommandPayload::StartDownload { transfer_ref } => {
                format!("/xdcc_service_download {} {}", session_id, transfer_ref)
            }
        }
    }
}

/// 事件载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventPayload {
    /// 底层网络上观察到的一行原始文本
    RawLine { line: String },
    /// 底层网络发出的列表结束信号
    EndOfListing,
}

/// 推送状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    /// 成功
    Success,
    /// 空结果（与超时、失败严格区分）
    NoResults,
    /// 网络无响应
    TimedOut,
    /// 失败（传输层故障等）
    Error,
}

/// 推送给聊天侧的一条选择项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// 到达顺序序号（1 起），用户用它发起 "Download N"
    pub index: usize,
    /// 文件名
    pub label: String,
    /// 原始大小文本
    pub size: String,
    /// 归一化字节数
    pub size_bytes: Option<u64>,
    /// 抓取次数
    pub grabs: u32,
}

/// 推送载荷
///
/// 聊天侧按 `content` 的变体选择渲染方式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    /// 聊天侧来源
    pub origin: Origin,
    /// 结构化内容
    pub content: PushContent,
}

/// 推送内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushContent {
    /// 检索结果（最终渲染）
    SearchResults {
        status: PushStatus,
        message: String,
        choices: Vec<Choice>,
        /// 截断提示（超出渲染上限时）
        notice: Option<String>,
    },
    /// 热门榜结果（最终渲染）
    HotResults {
        status: PushStatus,
        message: String,
        summary: Option<String>,
        items: Vec<HotItem>,
        /// 供聊天侧过滤控件使用的去重分类列表
        categories: Vec<String>,
    },
    /// 下载状态（进度编辑与最终消息共用）
    DownloadStatus {
        status: PushStatus,
        message: String,
        progress: Option<u8>,
        /// 是否为终态消息
        terminal: bool,
    },
    /// 会话过期（网络无响应，与空结果严格区分）
    SessionExpired { message: String },
}
