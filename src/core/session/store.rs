//! 会话存储模块
//!
//! 进程范围内的在途请求表，按关联 ID 索引，负责生命周期、
//! 过期与查找。存储是核心中唯一的共享可变状态，所有修改都
//! 经过这里的原子操作。
//!
//! # 并发约定
//! * `append` / `finalize` / `sweep` 可被多个入站事件并发调用
//! * 每个会话至多被终结一次，重复 `finalize` 是无副作用的
//! * 终态会话保留到截止时间被清扫，期间冻结的累积集合仍可
//!   读取（渲染期分类过滤、按序号选择下载都依赖它）

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{now_ms, Origin, Record, Session, SessionKind, SessionState};
use crate::infra::error::{Error, Result};

/// 存储配置
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// 检索会话超时（毫秒）
    pub search_timeout_ms: u64,
    /// 热门榜会话超时（毫秒）
    pub hot_timeout_ms: u64,
    /// 下载会话超时（毫秒）
    pub download_timeout_ms: u64,
    /// 热门榜静默完成窗口（毫秒）
    pub hot_quiet_ms: u64,
    /// 检索结果累积上限
    pub search_max_results: usize,
    /// 热门榜条目累积上限
    pub hot_max_items: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            search_timeout_ms: 300_000,
            hot_timeout_ms: 300_000,
            download_timeout_ms: 600_000,
            hot_quiet_ms: 2_000,
            search_max_results: 10,
            hot_max_items: 50,
        }
    }
}

impl StoreConfig {
    /// 某类型会话的硬超时
    fn timeout_ms(&self, kind: SessionKind) -> u64 {
        match kind {
            SessionKind::Search => self.search_timeout_ms,
            SessionKind::Hot => self.hot_timeout_ms,
            SessionKind::Download => self.download_timeout_ms,
        }
    }

    /// 某类型会话的累积上限
    fn max_records(&self, kind: SessionKind) -> usize {
        match kind {
            SessionKind::Hot => self.hot_max_items,
            _ => self.search_max_results,
        }
    }
}

/// 清扫转移原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepReason {
    /// 硬超时，无完成信号
    TimedOut,
    /// 热门榜静默窗口期满，视为列表结束
    QuietCompleted,
}

/// 清扫产生的强制终结
#[derive(Debug, Clone)]
pub struct SweptSession {
    /// 终结后的会话快照
    pub session: Session,
    /// 终结原因
    pub reason: SweepReason,
}

/// 会话存储
///
/// 使用 DashMap 实现线程安全的内存存储。会话是瞬态的，
/// 进程重启即丢失，在途检索被直接放弃（用户可重试）。
#[derive(Debug, Clone)]
pub struct SessionStore {
    /// 会话存储（ID -> Session）
    sessions: Arc<DashMap<String, Session>>,
    /// 配置
    config: StoreConfig,
}

impl SessionStore {
    /// 创建新的会话存储
    pub fn new(config: StoreConfig) -> Self {
        let store = Self {
            sessions: Arc::new(DashMap::new()),
            config,
        };

        info!(
            search_timeout_ms = store.config.search_timeout_ms,
            download_timeout_ms = store.config.download_timeout_ms,
            "会话存储创建成功"
        );

        store
    }

    /// 创建新会话
    ///
    /// 分配新 ID，以收集态插入，按类型设置硬超时。
    ///
    /// # 参数说明
    /// * `kind` - 会话类型
    /// * `origin` - 聊天侧来源
    /// * `query` - 检索文本或目标引用
    ///
    /// # 返回值
    /// 插入后的会话快照
    pub fn create(&self, kind: SessionKind, origin: Origin, query: &str) -> Session {
        let session = Session::new(kind, origin, query, self.config.timeout_ms(kind));
        debug!(session_id = %session.id, kind = %kind, "创建新会话");
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// 获取会话快照
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// 向会话追加一条已解析记录
    ///
    /// 记录按到达顺序累积；超出该类型累积上限的记录被丢弃
    /// 并计数（渲染时据此附加截断提示）。热门榜会话的静默
    /// 完成窗口在每次追加时刷新。
    ///
    /// # 返回值
    /// 追加后的累积长度；会话不存在返回 `SessionNotFound`，
    /// 已过截止时间或已终结返回 `SessionExpired`
    pub fn append(&self, session_id: &str, record: Record) -> Result<usize> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let now = now_ms();
        if entry.is_terminal() || now > entry.deadline {
            return Err(Error::SessionExpired(session_id.to_string()));
        }

        let cap = self.config.max_records(entry.kind);
        if entry.accumulated.len() >= cap {
            entry.dropped += 1;
            debug!(session_id = %session_id, dropped = entry.dropped, "超出累积上限，丢弃记录");
        } else {
            entry.accumulated.push(record);
        }

        if entry.kind == SessionKind::Hot {
            entry.quiet_deadline = Some(now + self.config.hot_quiet_ms as i64);
        }

        Ok(entry.accumulated.len())
    }

    /// 记录热门榜头部摘要
    ///
    /// 摘要也算解析活动，同样刷新静默完成窗口。终态后忽略。
    pub fn set_hot_summary(&self, session_id: &str, summary: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            if entry.is_terminal() {
                return;
            }
            entry.hot_summary = Some(summary.to_string());
            entry.quiet_deadline = Some(now_ms() + self.config.hot_quiet_ms as i64);
        }
    }

    /// 记录下载会话的展示名
    pub fn set_label(&self, session_id: &str, label: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.label = Some(label.to_string());
        }
    }

    /// 记录聊天侧交互句柄
    ///
    /// 终态会话也允许写入：终结渲染返回的句柄仍要用于
    /// 后续的状态编辑。
    pub fn set_interaction(&self, session_id: &str, handle: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.interaction = Some(handle.to_string());
        }
    }

    /// 推进下载会话的阶段
    ///
    /// 状态机只向前：尝试转移到序号更小的状态会被忽略，
    /// 终态后的增量同样被忽略（保证至多一次交付）。
    ///
    /// # 返回值
    /// 推进后的会话快照；向后或终态后的转移返回 `SessionExpired`
    pub fn advance_phase(
        &self,
        session_id: &str,
        state: SessionState,
        progress: Option<u8>,
    ) -> Result<Session> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        if entry.is_terminal() || state.rank() < entry.state.rank() {
            return Err(Error::SessionExpired(session_id.to_string()));
        }

        entry.state = state;
        if progress.is_some() {
            entry.progress = progress;
        }
        debug!(session_id = %session_id, state = ?state, progress = ?progress, "下载阶段推进");
        Ok(entry.clone())
    }

    /// 终结会话
    ///
    /// 转移到给定终态并冻结累积集合。幂等：重复调用不再
    /// 改变状态，返回的布尔值指示本次调用是否完成了转移，
    /// 调用方据此保证终结渲染恰好触发一次。
    ///
    /// # 参数说明
    /// * `outcome` - 目标终态（必须是终态之一）
    ///
    /// # 返回值
    /// `(冻结后的会话, 是否由本次调用终结)`；会话不存在返回 None
    pub fn finalize(&self, session_id: &str, outcome: SessionState) -> Option<(Session, bool)> {
        debug_assert!(outcome.is_terminal());

        let mut entry = self.sessions.get_mut(session_id)?;
        if entry.is_terminal() {
            debug!(session_id = %session_id, state = ?entry.state, "会话已终结，忽略重复终结");
            return Some((entry.clone(), false));
        }

        entry.state = outcome;
        info!(session_id = %session_id, outcome = ?outcome, records = entry.accumulated.len(), "会话终结");
        Some((entry.clone(), true))
    }

    /// 过期扫描
    ///
    /// 定时器驱动。超过截止时间仍在收集的会话被强制终结为
    /// 超时；有过活动且静默窗口期满的热门榜会话视为列表结束，
    /// 终结为完成。已终结且超过截止时间的会话被清除。
    /// 这是显式完成信号之外唯一的强制转移来源。
    ///
    /// # 参数说明
    /// * `now` - 当前毫秒时间戳（显式传入以便测试）
    ///
    /// # 返回值
    /// 本轮被强制终结的会话列表，调用方负责渲染
    pub fn sweep(&self, now: i64) -> Vec<SweptSession> {
        // 先收集候选 ID，再逐个在分片锁内复查并转移，
        // 避免在迭代时修改表
        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| !e.is_terminal())
            .filter(|e| {
                now > e.deadline
                    || (e.kind == SessionKind::Hot
                        && e.has_activity()
                        && e.quiet_deadline.map(|q| now > q).unwrap_or(false))
            })
            .map(|e| e.id.clone())
            .collect();

        let mut swept = Vec::new();
        for id in candidates {
            let Some(mut entry) = self.sessions.get_mut(&id) else {
                continue;
            };
            if entry.is_terminal() {
                continue; // 在途事件抢先终结
            }

            let quiet_done = entry.kind == SessionKind::Hot
                && entry.has_activity()
                && entry.quiet_deadline.map(|q| now > q).unwrap_or(false);

            let (state, reason) = if quiet_done {
                (SessionState::Completed, SweepReason::QuietCompleted)
            } else if now > entry.deadline {
                (SessionState::TimedOut, SweepReason::TimedOut)
            } else {
                continue;
            };

            entry.state = state;
            warn!(session_id = %entry.id, kind = %entry.kind, reason = ?reason, "清扫强制终结会话");
            swept.push(SweptSession {
                session: entry.clone(),
                reason,
            });
        }

        // 清除超过截止时间的终态会话
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| !(s.is_terminal() && now > s.deadline));
        let evicted = before - self.sessions.len();
        if evicted > 0 {
            debug!(evicted = evicted, "清除过期终态会话");
        }

        swept
    }

    /// 当前会话总数
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// 存储是否为空
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
