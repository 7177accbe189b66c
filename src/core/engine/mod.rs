//! 关联引擎模块
//!
//! 把共享事件流多路分解到各自请求的桶里：聊天侧指令进来
//! 时创建会话并把指令转发到中继侧，随后把中继推来的每一
//! 行经解析器累积进对应会话，直到完成信号或超时，最后把
//! 聚合结果渲染回聊天侧。
//!
//! 会话状态机：`Collecting -> {Completed, TimedOut, Cancelled, Failed}`。
//! * `Completed`：底层网络给出列表结束标记；热门榜没有显式
//!   标记，用配置的静默窗口代替
//! * `TimedOut`：清扫发现超过截止时间（覆盖中继完全无响应、
//!   列表机器人离线等情况），渲染与"空结果"严格区分的消息
//! * `Cancelled`：聊天侧撤回请求，尽力而为地抑制最终渲染，
//!   已发出的中继指令不保证收回

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::channels::traits::ChatSurface;
use crate::core::download::DownloadTracker;
use crate::core::parser::{LineParser, ParsedLine};
use crate::core::session::store::{SessionStore, SweepReason};
use crate::core::session::types::{
    now_ms, HotItem, Origin, Record, Session, SessionKind, SessionState,
};
use crate::infra::error::{Error, Result};
use crate::relay::client::RelayPort;
use crate::relay::protocol::{Choice, CommandPayload, EventPayload, PushContent, PushStatus};

/// 关联引擎
///
/// # 字段说明
/// * `store` - 会话存储（核心唯一的共享可变状态）
/// * `relay` - 中继指令出口
/// * `chat` - 聊天侧投递出口
/// * `tracker` - 下载追踪器
/// * `parser` - 行解析器
#[derive(Clone)]
pub struct CorrelationEngine {
    store: Arc<SessionStore>,
    relay: Arc<dyn RelayPort>,
    chat: Arc<dyn ChatSurface>,
    tracker: DownloadTracker,
    parser: Arc<LineParser>,
}

impl CorrelationEngine {
    /// 创建关联引擎
    pub fn new(
        store: Arc<SessionStore>,
        relay: Arc<dyn RelayPort>,
        chat: Arc<dyn ChatSurface>,
    ) -> Self {
        let tracker = DownloadTracker::new(store.clone(), relay.clone(), chat.clone());
        Self {
            store,
            relay,
            chat,
            tracker,
            parser: Arc::new(LineParser::new()),
        }
    }

    /// 下载追踪器引用
    pub fn tracker(&self) -> &DownloadTracker {
        &self.tracker
    }

    /// 发起一次检索
    ///
    /// 创建会话并把检索指令调度到中继。调度失败时会话立即
    /// 终结为失败，向聊天侧推送传输层失败消息。
    ///
    /// # 返回值
    /// 会话 ID（失败已在内部上报）
    pub async fn start_search(&self, origin: Origin, query: &str) -> String {
        let session = self.store.create(SessionKind::Search, origin.clone(), query);
        info!(session_id = %session.id, query = %query, "发起检索会话");

        let command = CommandPayload::Search {
            query: query.to_string(),
        };
        if let Err(e) = self.relay.dispatch(&session.id, &command).await {
            warn!(session_id = %session.id, error = %e, "检索指令调度失败");
            self.store.finalize(&session.id, SessionState::Failed);
            let content = PushContent::SearchResults {
                status: PushStatus::Error,
                message: format!(
                    "Could not reach the relay to dispatch the search for '{}'.",
                    query
                ),
                choices: Vec::new(),
                notice: None,
            };
            self.push_message(&session.id, &origin, &content).await;
        }

        session.id
    }

    /// 拉取热门榜
    ///
    /// 热门榜会话累积全部条目，分类过滤在渲染期由聊天侧
    /// 从冻结集合中选取，不会再次查询中继。
    pub async fn start_hot(&self, origin: Origin) -> String {
        let session = self.store.create(SessionKind::Hot, origin.clone(), "");
        info!(session_id = %session.id, "发起热门榜会话");

        if let Err(e) = self.relay.dispatch(&session.id, &CommandPayload::FetchHot).await {
            warn!(session_id = %session.id, error = %e, "热门榜指令调度失败");
            self.store.finalize(&session.id, SessionState::Failed);
            let content = PushContent::HotResults {
                status: PushStatus::Error,
                message: "Could not reach the relay to fetch the hot list.".to_string(),
                summary: None,
                items: Vec::new(),
                categories: Vec::new(),
            };
            self.push_message(&session.id, &origin, &content).await;
        }

        session.id
    }

    /// 处理一条中继事件
    ///
    /// 同一会话的事件按到达顺序应用；未知会话、已终结会话
    /// 的事件吸收为无副作用（记录日志），不向上传播。
    pub async fn handle_event(&self, session_id: &str, payload: EventPayload) {
        match payload {
            EventPayload::EndOfListing => self.complete(session_id).await,
            EventPayload::RawLine { line } => self.handle_raw_line(session_id, &line).await,
        }
    }

    /// 处理一行原始文本
    async fn handle_raw_line(&self, session_id: &str, line: &str) {
        let Some(session) = self.store.get(session_id) else {
            debug!(session_id = %session_id, "事件指向未知会话，忽略");
            return;
        };
        if session.is_terminal() {
            debug!(session_id = %session_id, "事件到达已终结会话，忽略");
            return;
        }

        match self.parser.parse_line(session.kind, line) {
            Some(ParsedLine::Result(result)) => {
                if let Err(e) = self.store.append(session_id, Record::Search(result)) {
                    debug!(session_id = %session_id, error = %e, "追加被拒绝");
                }
            }
            Some(ParsedLine::HotItem(item)) => {
                if let Err(e) = self.store.append(session_id, Record::Hot(item)) {
                    debug!(session_id = %session_id, error = %e, "追加被拒绝");
                }
            }
            Some(ParsedLine::HotHeader { summary }) => {
                self.store.set_hot_summary(session_id, &summary);
            }
            Some(ParsedLine::EndOfResults { total }) => {
                debug!(session_id = %session_id, total = total, "检测到列表结束标记");
                self.complete(session_id).await;
            }
            Some(ParsedLine::Download(delta)) => {
                self.tracker.handle_delta(session_id, delta).await;
            }
            // 无关闲聊，静默跳过
            None => {}
        }
    }

    /// 显式完成信号
    ///
    /// 终结为完成并触发最终渲染。幂等终结保证重复的结束
    /// 信号不会造成二次交付。
    pub async fn complete(&self, session_id: &str) {
        match self.store.finalize(session_id, SessionState::Completed) {
            Some((session, true)) => self.render_final(&session).await,
            Some((_, false)) => {
                debug!(session_id = %session_id, "会话已终结，忽略重复完成信号")
            }
            None => debug!(session_id = %session_id, "完成信号指向未知会话，忽略"),
        }
    }

    /// 撤回一次请求
    ///
    /// 尽力而为：会话标记为已取消，最终渲染被抑制；已发往
    /// 中继的指令不保证收回。
    pub async fn cancel(&self, session_id: &str) {
        match self.store.finalize(session_id, SessionState::Cancelled) {
            Some((_, true)) => info!(session_id = %session_id, "会话已取消"),
            Some((_, false)) => debug!(session_id = %session_id, "会话已终结，取消无效果"),
            None => debug!(session_id = %session_id, "取消指向未知会话，忽略"),
        }
    }

    /// 过期扫描
    ///
    /// 由服务层的定时器驱动。对每个被强制终结的会话渲染
    /// 对应的终结消息。
    pub async fn sweep(&self) {
        for swept in self.store.sweep(now_ms()) {
            match swept.reason {
                SweepReason::QuietCompleted => self.render_final(&swept.session).await,
                SweepReason::TimedOut => self.render_timeout(&swept.session).await,
            }
        }
    }

    /// 渲染最终结果
    ///
    /// 空结果渲染"无结果"消息而非错误；超出渲染上限的部分
    /// 在累积期已被丢弃，此处根据丢弃计数附加截断提示。
    async fn render_final(&self, session: &Session) {
        if session.state == SessionState::Cancelled {
            return;
        }

        let content = match session.kind {
            SessionKind::Search => {
                let results = session.search_results();
                if results.is_empty() {
                    PushContent::SearchResults {
                        status: PushStatus::NoResults,
                        message: format!("Search for '{}' yielded no results.", session.query),
                        choices: Vec::new(),
                        notice: None,
                    }
                } else {
                    let choices: Vec<Choice> = results
                        .iter()
                        .enumerate()
                        .map(|(i, r)| Choice {
                            index: i + 1,
                            label: r.label.clone(),
                            size: r.raw_size.clone(),
                            size_bytes: r.size_bytes,
                            grabs: r.grabs,
                        })
                        .collect();
                    let notice = (session.dropped > 0).then(|| {
                        format!(
                            "Showing the first {} of {} results.",
                            choices.len(),
                            choices.len() + session.dropped as usize
                        )
                    });
                    PushContent::SearchResults {
                        status: PushStatus::Success,
                        message: format!("Found {} results.", choices.len()),
                        choices,
                        notice,
                    }
                }
            }
            SessionKind::Hot => {
                let items: Vec<HotItem> = session.hot_items().into_iter().cloned().collect();
                if items.is_empty() {
                    PushContent::HotResults {
                        status: PushStatus::NoResults,
                        message: "The hot list returned no items.".to_string(),
                        summary: session.hot_summary.clone(),
                        items: Vec::new(),
                        categories: Vec::new(),
                    }
                } else {
                    let categories: Vec<String> = items
                        .iter()
                        .map(|i| i.category.clone())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect();
                    PushContent::HotResults {
                        status: PushStatus::Success,
                        message: format!("Fetched {} trending files.", items.len()),
                        summary: session.hot_summary.clone(),
                        items,
                        categories,
                    }
                }
            }
            // 下载会话的终结交付由追踪器负责
            SessionKind::Download => return,
        };

        self.push_message(&session.id, &session.origin, &content).await;
    }

    /// 渲染超时消息
    ///
    /// 与"空结果"严格区分：用户需要分辨空列表和失联的中继。
    async fn render_timeout(&self, session: &Session) {
        match session.kind {
            SessionKind::Download => self.tracker.handle_timeout(session).await,
            SessionKind::Search => {
                let content = PushContent::SessionExpired {
                    message: format!(
                        "No response from the network for '{}'. The relay or listing bots may be offline.",
                        session.query
                    ),
                };
                self.push_message(&session.id, &session.origin, &content).await;
            }
            SessionKind::Hot => {
                let content = PushContent::SessionExpired {
                    message: "No response from the network for the hot list. The relay or listing bots may be offline."
                        .to_string(),
                };
                self.push_message(&session.id, &session.origin, &content).await;
            }
        }
    }

    /// 热门榜分类列表
    ///
    /// 取自冻结累积集合的去重分类，供聊天侧过滤控件使用。
    pub fn hot_categories(&self, session_id: &str) -> Result<Vec<String>> {
        let session = self
            .store
            .get(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        Ok(session
            .hot_items()
            .iter()
            .map(|i| i.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    /// 热门榜分类视图
    ///
    /// 从已终结、已冻结的累积集合中选取给定分类的子集，
    /// 纯展示过滤，不会再次查询中继。
    ///
    /// # 参数说明
    /// * `category` - 分类标签；None 表示全部
    ///
    /// # 返回值
    /// `(头部摘要, 匹配条目)`，保持到达顺序
    pub fn hot_category_view(
        &self,
        session_id: &str,
        category: Option<&str>,
    ) -> Result<(Option<String>, Vec<HotItem>)> {
        let session = self
            .store
            .get(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let items: Vec<HotItem> = session
            .hot_items()
            .into_iter()
            .filter(|i| category.map(|c| i.category == c).unwrap_or(true))
            .cloned()
            .collect();

        Ok((session.hot_summary.clone(), items))
    }

    /// 从检索结果中选择一项并发起下载
    ///
    /// 序号是最终渲染里的到达顺序序号（1 起）。无效会话或
    /// 序号不报错：向聊天侧推送失败消息后返回 None。
    ///
    /// # 返回值
    /// 新建下载会话的 ID
    pub async fn select_download(&self, session_id: &str, choice_index: usize) -> Option<String> {
        let Some(session) = self.store.get(session_id) else {
            warn!(session_id = %session_id, "下载选择指向未知会话");
            // 会话已被清扫时来源信息也随之丢失，聊天侧按会话 ID 定位原始交互
            let content = PushContent::DownloadStatus {
                status: PushStatus::Error,
                message: "Download failed: this search session has expired. Please search again."
                    .to_string(),
                progress: None,
                terminal: true,
            };
            self.push_message(session_id, &Origin::default(), &content).await;
            return None;
        };

        if session.kind != SessionKind::Search || session.state != SessionState::Completed {
            let content = PushContent::DownloadStatus {
                status: PushStatus::Error,
                message: "Download failed: this search session is not ready or has expired. Please search again."
                    .to_string(),
                progress: None,
                terminal: true,
            };
            self.push_message(&session.id, &session.origin, &content).await;
            return None;
        }

        let results = session.search_results();
        let Some(result) = choice_index
            .checked_sub(1)
            .and_then(|i| results.get(i).copied())
        else {
            let content = PushContent::DownloadStatus {
                status: PushStatus::Error,
                message: format!(
                    "Download failed: invalid choice #{}. Please select from the available options.",
                    choice_index
                ),
                progress: None,
                terminal: true,
            };
            self.push_message(&session.id, &session.origin, &content).await;
            return None;
        };

        let download_id = self
            .tracker
            .start(session.origin.clone(), &result.label, &result.transfer_ref)
            .await;
        Some(download_id)
    }

    /// 推送一条新消息并记录交互句柄
    async fn push_message(&self, session_id: &str, origin: &Origin, content: &PushContent) {
        match self.chat.render_message(session_id, origin, content).await {
            Ok(handle) => self.store.set_interaction(session_id, &handle),
            Err(e) => warn!(session_id = %session_id, error = %e, "聊天侧投递失败"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::store::StoreConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct MockRelay {
        fail: bool,
        dispatched: Mutex<Vec<(String, CommandPayload)>>,
    }

    impl MockRelay {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                dispatched: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RelayPort for MockRelay {
        async fn dispatch(&self, session_id: &str, command: &CommandPayload) -> crate::infra::error::Result<()> {
            if self.fail {
                return Err(Error::RelayUnavailable("connection refused".to_string()));
            }
            self.dispatched
                .lock()
                .unwrap()
                .push((session_id.to_string(), command.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockChat {
        pushes: Mutex<Vec<(String, PushContent)>>,
    }

    #[async_trait]
    impl ChatSurface for MockChat {
        async fn render_message(
            &self,
            session_id: &str,
            _origin: &Origin,
            content: &PushContent,
        ) -> crate::infra::error::Result<String> {
            self.pushes
                .lock()
                .unwrap()
                .push((session_id.to_string(), content.clone()));
            Ok(session_id.to_string())
        }

        async fn render_status(
            &self,
            handle: &str,
            content: &PushContent,
        ) -> crate::infra::error::Result<()> {
            self.pushes
                .lock()
                .unwrap()
                .push((handle.to_string(), content.clone()));
            Ok(())
        }
    }

    fn engine_with(
        config: StoreConfig,
        fail_relay: bool,
    ) -> (CorrelationEngine, Arc<SessionStore>, Arc<MockRelay>, Arc<MockChat>) {
        let store = Arc::new(SessionStore::new(config));
        let relay = Arc::new(MockRelay::new(fail_relay));
        let chat = Arc::new(MockChat::default());
        let engine = CorrelationEngine::new(store.clone(), relay.clone(), chat.clone());
        (engine, store, relay, chat)
    }

    fn raw(line: &str) -> EventPayload {
        EventPayload::RawLine {
            line: line.to_string(),
        }
    }

    #[tokio::test]
    async fn test_search_completes_with_normalized_sizes_in_arrival_order() {
        let (engine, _store, relay, chat) = engine_with(StoreConfig::default(), false);
        let id = engine.start_search(Origin::new("c", "u"), "show s01").await;

        // 指令已转发到中继
        assert!(matches!(
            &relay.dispatched.lock().unwrap()[0].1,
            CommandPayload::Search { query } if query == "show s01"
        ));

        engine
            .handle_event(&id, raw("( 3x [700MB] Show.S01E01.mkv ) (/msg BotA xdcc send #1 )"))
            .await;
        engine
            .handle_event(&id, raw("( 9x [1.4GB] Show.S01E02.mkv ) (/msg BotA xdcc send #2 )"))
            .await;
        engine
            .handle_event(
                &id,
                raw("( 1x [350000000] Show.S01E03.mkv ) (/msg BotB xdcc send #3 )"),
            )
            .await;
        // 夹杂的无关闲聊被静默跳过
        engine.handle_event(&id, raw("<nick> unrelated chatter")).await;
        engine.handle_event(&id, raw("( 3 Results Found - 13 Gets )")).await;

        let pushes = chat.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        match &pushes[0].1 {
            PushContent::SearchResults { status, choices, notice, .. } => {
                assert_eq!(*status, PushStatus::Success);
                assert!(notice.is_none());
                assert_eq!(choices.len(), 3);
                // 到达顺序即选择序号
                assert_eq!(choices[0].index, 1);
                assert_eq!(choices[0].label, "Show.S01E01.mkv");
                assert_eq!(choices[0].size_bytes, Some(734_003_200));
                assert_eq!(choices[1].size_bytes, Some(1_503_238_553));
                assert_eq!(choices[2].size_bytes, Some(350_000_000));
            }
            other => panic!("意外的推送内容: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_end_of_listing_renders_once() {
        let (engine, _store, _relay, chat) = engine_with(StoreConfig::default(), false);
        let id = engine.start_search(Origin::new("c", "u"), "q").await;

        engine.handle_event(&id, EventPayload::EndOfListing).await;
        engine.handle_event(&id, EventPayload::EndOfListing).await;
        engine.handle_event(&id, raw("( 1 Result Found - 1 Gets )")).await;

        assert_eq!(chat.pushes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_results_completion_distinct_from_timeout() {
        // 空列表完成
        let (engine, _store, _relay, chat) = engine_with(StoreConfig::default(), false);
        let id = engine.start_search(Origin::new("c", "u"), "nothing").await;
        engine.handle_event(&id, EventPayload::EndOfListing).await;

        match &chat.pushes.lock().unwrap()[0].1 {
            PushContent::SearchResults { status, message, .. } => {
                assert_eq!(*status, PushStatus::NoResults);
                assert!(message.contains("no results"));
            }
            other => panic!("意外的推送内容: {:?}", other),
        }

        // 网络无响应超时
        let (engine, _store, _relay, chat) = engine_with(
            StoreConfig {
                search_timeout_ms: 0,
                ..Default::default()
            },
            false,
        );
        let _id = engine.start_search(Origin::new("c", "u"), "nothing").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        engine.sweep().await;

        let pushes = chat.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        match &pushes[0].1 {
            PushContent::SessionExpired { message } => {
                assert!(message.contains("No response from the network"));
            }
            other => panic!("意外的推送内容: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_truncation_notice_on_overflow() {
        let (engine, _store, _relay, chat) = engine_with(
            StoreConfig {
                search_max_results: 2,
                ..Default::default()
            },
            false,
        );
        let id = engine.start_search(Origin::new("c", "u"), "q").await;

        for i in 1..=4 {
            engine
                .handle_event(
                    &id,
                    raw(&format!("( 1x [700M] File.{:02}.mkv ) (/msg Bot xdcc send #{} )", i, i)),
                )
                .await;
        }
        engine.handle_event(&id, EventPayload::EndOfListing).await;

        match &chat.pushes.lock().unwrap()[0].1 {
            PushContent::SearchResults { choices, notice, .. } => {
                assert_eq!(choices.len(), 2);
                assert_eq!(notice.as_deref(), Some("Showing the first 2 of 4 results."));
            }
            other => panic!("意外的推送内容: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hot_quiet_completion_and_category_view() {
        let (engine, _store, _relay, chat) = engine_with(
            StoreConfig {
                hot_quiet_ms: 0,
                ..Default::default()
            },
            false,
        );
        let id = engine.start_hot(Origin::new("c", "u")).await;

        engine
            .handle_event(
                &id,
                raw("#THE.SOURCE - ALL SECTIONS ¦ TOP GETS OF THE LAST 2 DAYS ¦ 536 NEW RELEASES, 4481 GETS"),
            )
            .await;
        engine
            .handle_event(&id, raw("68x | TV-X265 [564M] Squid.Game.S03E01.mkv"))
            .await;
        engine
            .handle_event(&id, raw("41x | MOVIE [2.3G] Some.Movie.2025.mkv"))
            .await;
        engine
            .handle_event(&id, raw("12x | TV-X265 [700M] Other.Show.S02E04.mkv"))
            .await;

        // 静默窗口期满，清扫将其视为列表结束
        tokio::time::sleep(Duration::from_millis(5)).await;
        engine.sweep().await;

        {
            let pushes = chat.pushes.lock().unwrap();
            assert_eq!(pushes.len(), 1);
            match &pushes[0].1 {
                PushContent::HotResults { status, summary, items, categories, .. } => {
                    assert_eq!(*status, PushStatus::Success);
                    assert_eq!(
                        summary.as_deref(),
                        Some("TOP GETS OF THE LAST 2 DAYS ¦ 536 NEW RELEASES, 4481 GETS")
                    );
                    assert_eq!(items.len(), 3);
                    assert_eq!(categories, &vec!["MOVIE".to_string(), "TV-X265".to_string()]);
                }
                other => panic!("意外的推送内容: {:?}", other),
            }
        }

        // 渲染期分类过滤：从冻结集合选取，不再查询中继
        let (_, all) = engine.hot_category_view(&id, None).unwrap();
        assert_eq!(all.len(), 3);
        let (_, tv) = engine.hot_category_view(&id, Some("TV-X265")).unwrap();
        assert_eq!(tv.len(), 2);
        assert!(tv.iter().all(|i| i.category == "TV-X265"));
        let (_, none) = engine.hot_category_view(&id, Some("GAMES")).unwrap();
        assert!(none.is_empty());

        assert_eq!(engine.hot_categories(&id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_hot_silence_times_out_instead_of_completing() {
        let (engine, _store, _relay, chat) = engine_with(
            StoreConfig {
                hot_quiet_ms: 0,
                hot_timeout_ms: 0,
                ..Default::default()
            },
            false,
        );
        let _id = engine.start_hot(Origin::new("c", "u")).await;

        // 没有任何解析活动：静默窗口不生效，走硬超时
        tokio::time::sleep(Duration::from_millis(5)).await;
        engine.sweep().await;

        let pushes = chat.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        assert!(matches!(&pushes[0].1, PushContent::SessionExpired { .. }));
    }

    #[tokio::test]
    async fn test_cancel_suppresses_render() {
        let (engine, _store, _relay, chat) = engine_with(StoreConfig::default(), false);
        let id = engine.start_search(Origin::new("c", "u"), "q").await;

        engine
            .handle_event(&id, raw("( 1x [700M] File.mkv ) (/msg Bot xdcc send #1 )"))
            .await;
        engine.cancel(&id).await;
        engine.handle_event(&id, EventPayload::EndOfListing).await;

        assert!(chat.pushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relay_failure_finalizes_failed_with_distinct_message() {
        let (engine, store, _relay, chat) = engine_with(StoreConfig::default(), true);
        let id = engine.start_search(Origin::new("c", "u"), "q").await;

        assert_eq!(store.get(&id).unwrap().state, SessionState::Failed);
        match &chat.pushes.lock().unwrap()[0].1 {
            PushContent::SearchResults { status, message, .. } => {
                assert_eq!(*status, PushStatus::Error);
                assert!(message.contains("relay"));
            }
            other => panic!("意外的推送内容: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_select_download_resolves_arrival_order_index() {
        let (engine, _store, relay, chat) = engine_with(StoreConfig::default(), false);
        let id = engine.start_search(Origin::new("c", "u"), "q").await;

        engine
            .handle_event(&id, raw("( 5x [700M] First.mkv ) (/msg BotA xdcc send #11 )"))
            .await;
        engine
            .handle_event(&id, raw("( 2x [1.4G] Second.mkv ) (/msg BotB xdcc send #22 )"))
            .await;
        engine.handle_event(&id, EventPayload::EndOfListing).await;

        let download_id = engine.select_download(&id, 2).await.expect("应当启动下载");

        let dispatched = relay.dispatched.lock().unwrap();
        let last = dispatched.last().unwrap();
        assert_eq!(last.0, download_id);
        assert_eq!(
            last.1,
            CommandPayload::StartDownload {
                transfer_ref: "/msg BotB xdcc send #22".to_string()
            }
        );

        // 越界序号：推送失败消息，不报错
        drop(dispatched);
        assert!(engine.select_download(&id, 9).await.is_none());
        let pushes = chat.pushes.lock().unwrap();
        assert!(matches!(
            &pushes.last().unwrap().1,
            PushContent::DownloadStatus { status: PushStatus::Error, .. }
        ));
    }

    #[tokio::test]
    async fn test_select_download_requires_completed_search() {
        let (engine, _store, _relay, chat) = engine_with(StoreConfig::default(), false);
        let id = engine.start_search(Origin::new("c", "u"), "q").await;

        // 会话仍在收集中
        assert!(engine.select_download(&id, 1).await.is_none());
        assert!(matches!(
            &chat.pushes.lock().unwrap()[0].1,
            PushContent::DownloadStatus { status: PushStatus::Error, .. }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_sessions_do_not_cross_talk() {
        let (engine, _store, _relay, chat) = engine_with(StoreConfig::default(), false);
        let id_a = engine.start_search(Origin::new("c1", "u1"), "alpha").await;
        let id_b = engine.start_search(Origin::new("c2", "u2"), "beta").await;

        engine
            .handle_event(&id_a, raw("( 1x [700M] Alpha.mkv ) (/msg Bot xdcc send #1 )"))
            .await;
        engine
            .handle_event(&id_b, raw("( 1x [1.4G] Beta.mkv ) (/msg Bot xdcc send #2 )"))
            .await;

        engine.handle_event(&id_a, EventPayload::EndOfListing).await;
        engine.handle_event(&id_b, EventPayload::EndOfListing).await;

        let pushes = chat.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 2);
        for (sid, content) in pushes.iter() {
            let PushContent::SearchResults { choices, .. } = content else {
                panic!("意外的推送内容: {:?}", content);
            };
            assert_eq!(choices.len(), 1);
            if sid == &id_a {
                assert_eq!(choices[0].label, "Alpha.mkv");
            } else {
                assert_eq!(choices[0].label, "Beta.mkv");
            }
        }
    }
}
