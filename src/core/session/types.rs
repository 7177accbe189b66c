//! 会话类型定义
//!
//! 定义会话相关的核心数据结构。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 获取当前毫秒时间戳
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 会话类型
///
/// 区分三种被追踪的请求
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// 文件检索
    Search,
    /// 热门榜
    Hot,
    /// 文件下载
    Download,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::Search => write!(f, "search"),
            SessionKind::Hot => write!(f, "hot"),
            SessionKind::Download => write!(f, "download"),
        }
    }
}

/// 会话状态
///
/// 状态机只向前推进，任何状态不会被重新进入。
/// 检索/热门榜会话：`Collecting -> {Completed, TimedOut, Cancelled, Failed}`；
/// 下载会话：`Requested -> Queued -> Transferring -> {Completed, Failed}`，
/// 外加调度失败时的 `Requested -> Failed` 直达边。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// 收集中（检索/热门榜初始态）
    Collecting,
    /// 已请求（下载初始态）
    Requested,
    /// 传输已排队
    Queued,
    /// 传输中
    Transferring,
    /// 正常完成（终态）
    Completed,
    /// 超时（终态）
    TimedOut,
    /// 已取消（终态）
    Cancelled,
    /// 失败（终态）
    Failed,
}

impl SessionState {
    /// 状态机推进序号，只允许向序号更大的状态转移
    pub fn rank(&self) -> u8 {
        match self {
            SessionState::Collecting | SessionState::Requested => 0,
            SessionState::Queued => 1,
            SessionState::Transferring => 2,
            SessionState::Completed
            | SessionState::TimedOut
            | SessionState::Cancelled
            | SessionState::Failed => 3,
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }
}

/// 请求来源
///
/// 标识发起请求的聊天侧位置（频道 + 请求者）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// 频道 ID
    pub channel_id: String,
    /// 请求者 ID
    pub requester_id: String,
}

impl Origin {
    /// 创建请求来源
    pub fn new(channel_id: &str, requester_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            requester_id: requester_id.to_string(),
        }
    }
}

/// 检索结果
///
/// 从一行列表机器人输出解析出的单条结果，解析后不可变。
///
/// # 字段说明
/// * `label` - 展示文本（文件名）
/// * `raw_size` - 列表行中的原始大小文本（如 "700M"）
/// * `size_bytes` - 归一化后的字节数（无法解析时为 None）
/// * `grabs` - 抓取次数（热度）
/// * `transfer_ref` - 发起下载所需的指令令牌，仅在本会话内有效
/// * `source_tag` - 来源机器人
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub label: String,
    pub raw_size: String,
    pub size_bytes: Option<u64>,
    pub grabs: u32,
    pub transfer_ref: String,
    pub source_tag: String,
}

/// 热门榜条目
///
/// # 字段说明
/// * `label` - 展示文本（文件名）
/// * `rank` - 抓取次数（榜单热度）
/// * `category` - 分类标签，取自列表行的原始文本，核心不做任何再推导
/// * `raw_size` - 原始大小文本
/// * `size_bytes` - 归一化后的字节数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotItem {
    pub label: String,
    pub rank: u32,
    pub category: String,
    pub raw_size: String,
    pub size_bytes: Option<u64>,
}

/// 下载阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPhase {
    /// 已排队
    Queued,
    /// 传输中
    Transferring,
    /// 已完成
    Completed,
    /// 已失败
    Failed,
}

impl DownloadPhase {
    /// 对应的会话状态
    pub fn to_state(self) -> SessionState {
        match self {
            DownloadPhase::Queued => SessionState::Queued,
            DownloadPhase::Transferring => SessionState::Transferring,
            DownloadPhase::Completed => SessionState::Completed,
            DownloadPhase::Failed => SessionState::Failed,
        }
    }
}

/// 下载状态增量
///
/// 由解析器从中继推来的原始行提取，逐条推送给聊天侧。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadDelta {
    /// 阶段
    pub phase: DownloadPhase,
    /// 进度百分比（0-100）
    pub progress: Option<u8>,
    /// 错误消息（Failed 时）
    pub error: Option<String>,
}

/// 累积记录
///
/// 会话累积序列中的一条已解析记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    /// 检索结果
    Search(SearchResult),
    /// 热门榜条目
    Hot(HotItem),
}

/// 会话信息
///
/// 代表一次在途请求，由会话存储独占持有；所有修改必须经过
/// 存储的原子操作，任何调用方不得直接改写会话。
///
/// # 字段说明
/// * `id` - 进程生命周期内唯一的关联 ID
/// * `kind` - 会话类型
/// * `origin` - 聊天侧来源
/// * `query` - 原始检索文本，下载会话中为传输指令令牌
/// * `label` - 下载目标的展示名（仅下载会话）
/// * `created_at` - 创建时间戳（毫秒）
/// * `deadline` - 硬超时时间戳（毫秒）
/// * `quiet_deadline` - 静默完成时间戳（仅热门榜会话）
/// * `state` - 当前状态
/// * `accumulated` - 已解析记录的有序序列，保持中继到达顺序；
///   终态后冻结
/// * `dropped` - 超出累积上限被丢弃的记录数
/// * `hot_summary` - 热门榜头部摘要行
/// * `progress` - 最近一次下载进度
/// * `interaction` - 聊天侧交互句柄，用于后续状态编辑
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub kind: SessionKind,
    pub origin: Origin,
    pub query: String,
    pub label: Option<String>,
    pub created_at: i64,
    pub deadline: i64,
    pub quiet_deadline: Option<i64>,
    pub state: SessionState,
    pub accumulated: Vec<Record>,
    pub dropped: u32,
    pub hot_summary: Option<String>,
    pub progress: Option<u8>,
    pub interaction: Option<String>,
}

impl Session {
    /// 创建新会话
    ///
    /// # 参数说明
    /// * `kind` - 会话类型
    /// * `origin` - 聊天侧来源
    /// * `query` - 检索文本或目标引用
    /// * `timeout_ms` - 该类型的硬超时
    pub fn new(kind: SessionKind, origin: Origin, query: &str, timeout_ms: u64) -> Self {
        let now = now_ms();
        let state = match kind {
            SessionKind::Download => SessionState::Requested,
            _ => SessionState::Collecting,
        };

        Self {
            id: format!("sess_{}", Uuid::new_v4().to_string().replace('-', "")),
            kind,
            origin,
            query: query.to_string(),
            label: None,
            created_at: now,
            deadline: now + timeout_ms as i64,
            quiet_deadline: None,
            state,
            accumulated: Vec::new(),
            dropped: 0,
            hot_summary: None,
            progress: None,
            interaction: None,
        }
    }

    /// 会话是否已到达终态
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// 已累积的检索结果（按到达顺序）
    pub fn search_results(&self) -> Vec<&SearchResult> {
        self.accumulated
            .iter()
            .filter_map(|r| match r {
                Record::Search(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// 已累积的热门榜条目（按到达顺序）
    pub fn hot_items(&self) -> Vec<&HotItem> {
        self.accumulated
            .iter()
            .filter_map(|r| match r {
                Record::Hot(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    /// 会话是否已有任何解析活动
    ///
    /// 热门榜的静默完成窗口只有在出现过活动后才生效，
    /// 完全无响应的会话走硬超时。
    pub fn has_activity(&self) -> bool {
        !self.accumulated.is_empty() || self.hot_summary.is_some()
    }
}
