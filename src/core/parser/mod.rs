//! 结果解析模块
//!
//! 将文件列表网络上的一行原始文本转换为带类型的记录。
//! 列表机器人的输出是自由文本，格式会漂移，无关的闲聊占
//! 大多数，因此所有解析都返回 `Option`：不匹配不是错误，
//! 调用方应静默跳过。任何歧义或残缺输入都退化为 `None`，
//! 解析绝不 panic。
//!
//! # 已知格式
//! * 检索结果行：`( 3x [700M] Some.File.mkv ) (/msg Bot xdcc send #123 )`
//! * 检索结束行：`( 6 Results Found - 64 Gets )`
//! * 热门榜头部：`#THE.SOURCE - ALL SECTIONS ¦ TOP GETS ... ¦ 536 NEW RELEASES, 4481 GETS`
//! * 热门榜条目：`68x | TV-X265 [564M] Squid.Game.S03E01...`
//! * 传输状态通告：排队 / 开始发送 / 进度百分比 / 完成 / 失败

use regex::Regex;
use tracing::trace;

use crate::core::session::types::{
    DownloadDelta, DownloadPhase, HotItem, SearchResult, SessionKind,
};

/// 一行文本的解析产物
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// 一条检索结果
    Result(SearchResult),
    /// 检索结束标记，携带机器人报告的总数
    EndOfResults { total: u32 },
    /// 热门榜头部摘要
    HotHeader { summary: String },
    /// 一条热门榜条目
    HotItem(HotItem),
    /// 一条下载状态增量
    Download(DownloadDelta),
}

/// 行解析器
///
/// 持有预编译的正则表达式。regex 引擎保证线性时间匹配，
/// 恶意构造的超长行不会造成回溯爆炸。
#[derive(Debug)]
pub struct LineParser {
    result_line: Regex,
    end_of_results: Regex,
    hot_header: Regex,
    hot_item: Regex,
    size: Regex,
    dl_completed: Regex,
    dl_failed: Regex,
    dl_progress: Regex,
    dl_sending: Regex,
    dl_queued: Regex,
}

impl LineParser {
    /// 创建行解析器
    pub fn new() -> Self {
        Self {
            // ( 3x [700M] Some.File.mkv ) (/msg Bot xdcc send #123 )
            result_line: Regex::new(
                r"\(\s*(\d+)x\s*\[(.*?)\]\s*(.*?)\s*\)\s*\(\s*(/msg\s+(\S+)\s+xdcc\s+send\s+#\d+)\s*\)",
            )
            .unwrap(),
            // ( 6 Results Found - 64 Gets )
            end_of_results: Regex::new(r"\(\s*(\d+)\s+Results?\s+Found\s+-\s+\d+\s+Gets\s*\)")
                .unwrap(),
            // #THE.SOURCE - ALL SECTIONS ¦ TOP GETS ... ¦ 536 NEW RELEASES, 4481 GETS
            hot_header: Regex::new(r"#THE\.SOURCE.*?¦\s*(.*?)\s*¦\s*(.*)").unwrap(),
            // 68x | TV-X265 [564M] Squid.Game.S03E01...
            hot_item: Regex::new(r"(\d+)x\s*\|\s+([\w.\-]+)\s+\[(.*?)\]\s+(.*)").unwrap(),
            size: Regex::new(r"^(\d+(?:\.\d+)?)\s*([KkMmGgTt])?[Ii]?[Bb]?$").unwrap(),
            dl_completed: Regex::new(r"(?i)transfer\s+(?:of\s+.*?\s+)?complete[d]?\b").unwrap(),
            dl_failed: Regex::new(r"(?i)transfer\s+(?:failed|aborted|cancell?ed)").unwrap(),
            dl_progress: Regex::new(r"(?i)(?:xfer|transfer)\b.*?(\d{1,3})\s*%").unwrap(),
            dl_sending: Regex::new(r"(?i)\bsending you (?:queued )?pack\b").unwrap(),
            dl_queued: Regex::new(r"(?i)added you to .*queue").unwrap(),
        }
    }

    /// 按会话类型提示解析一行
    ///
    /// # 参数说明
    /// * `kind` - 当前会话期望的记录类型
    /// * `line` - 中继推来的一行原始文本
    ///
    /// # 返回值
    /// 匹配到已知格式返回对应记录，否则返回 None（无关闲聊，
    /// 调用方不得视为错误）
    pub fn parse_line(&self, kind: SessionKind, line: &str) -> Option<ParsedLine> {
        let parsed = match kind {
            SessionKind::Search => self
                .parse_search_result(line)
                .map(ParsedLine::Result)
                .or_else(|| {
                    self.parse_end_of_results(line)
                        .map(|total| ParsedLine::EndOfResults { total })
                }),
            SessionKind::Hot => self
                .parse_hot_header(line)
                .map(|summary| ParsedLine::HotHeader { summary })
                .or_else(|| self.parse_hot_item(line).map(ParsedLine::HotItem)),
            SessionKind::Download => self.parse_download_delta(line).map(ParsedLine::Download),
        };

        if parsed.is_none() {
            trace!(kind = %kind, line = line, "行未匹配任何已知格式");
        }
        parsed
    }

    /// 解析一条检索结果行
    pub fn parse_search_result(&self, line: &str) -> Option<SearchResult> {
        let caps = self.result_line.captures(line)?;
        let grabs = caps.get(1)?.as_str().parse().ok()?;
        let raw_size = caps.get(2)?.as_str().trim().to_string();
        let label = caps.get(3)?.as_str().trim().to_string();
        let transfer_ref = caps.get(4)?.as_str().trim().to_string();
        let source_tag = caps.get(5)?.as_str().to_string();

        if label.is_empty() {
            return None;
        }

        Some(SearchResult {
            size_bytes: self.normalize_size(&raw_size),
            label,
            raw_size,
            grabs,
            transfer_ref,
            source_tag,
        })
    }

    /// 识别检索结束行
    pub fn parse_end_of_results(&self, line: &str) -> Option<u32> {
        let caps = self.end_of_results.captures(line)?;
        caps.get(1)?.as_str().parse().ok()
    }

    /// 解析热门榜头部，返回归一化的一行摘要
    pub fn parse_hot_header(&self, line: &str) -> Option<String> {
        let caps = self.hot_header.captures(line)?;
        let left = caps.get(1)?.as_str().trim();
        let right = caps.get(2)?.as_str().trim();
        Some(format!("{} ¦ {}", left, right))
    }

    /// 解析一条热门榜条目
    ///
    /// 分类标签取列表行的原始文本，核心不做任何再推导。
    pub fn parse_hot_item(&self, line: &str) -> Option<HotItem> {
        let caps = self.hot_item.captures(line)?;
        let rank = caps.get(1)?.as_str().parse().ok()?;
        let category = caps.get(2)?.as_str().trim().to_string();
        let raw_size = caps.get(3)?.as_str().trim().to_string();
        let label = caps.get(4)?.as_str().trim().to_string();

        if label.is_empty() {
            return None;
        }

        Some(HotItem {
            size_bytes: self.normalize_size(&raw_size),
            label,
            rank,
            category,
            raw_size,
        })
    }

    /// 从传输通告行提取下载状态增量
    ///
    /// 终态判定优先于进度：`transfer completed` 一类的行
    /// 不应被百分比模式截走。
    pub fn parse_download_delta(&self, line: &str) -> Option<DownloadDelta> {
        if self.dl_completed.is_match(line) {
            return Some(DownloadDelta {
                phase: DownloadPhase::Completed,
                progress: Some(100),
                error: None,
            });
        }
        if self.dl_failed.is_match(line) {
            return Some(DownloadDelta {
                phase: DownloadPhase::Failed,
                progress: None,
                error: Some(line.trim().to_string()),
            });
        }
        if let Some(caps) = self.dl_progress.captures(line) {
            let pct: u8 = caps.get(1)?.as_str().parse().ok()?;
            if pct <= 100 {
                return Some(DownloadDelta {
                    phase: DownloadPhase::Transferring,
                    progress: Some(pct),
                    error: None,
                });
            }
            return None;
        }
        if self.dl_sending.is_match(line) {
            return Some(DownloadDelta {
                phase: DownloadPhase::Transferring,
                progress: None,
                error: None,
            });
        }
        if self.dl_queued.is_match(line) {
            return Some(DownloadDelta {
                phase: DownloadPhase::Queued,
                progress: None,
                error: None,
            });
        }
        None
    }

    /// 大小归一化
    ///
    /// 接受 `700MB`、`1.4GB`、`564M`、`2.3G`、纯字节数等写法，
    /// 单位按 1024 进制换算（K=1024, M=1024², G=1024³, T=1024⁴），
    /// 换算后的小数部分直接截断（700MB -> 734003200，
    /// 1.4GB -> 1503238553）。无法解析时返回 None，原始文本
    /// 由调用方另行保留。
    pub fn normalize_size(&self, raw: &str) -> Option<u64> {
        let caps = self.size.captures(raw.trim())?;
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        let multiplier: f64 = match caps.get(2).map(|m| m.as_str().to_ascii_uppercase()) {
            None => 1.0,
            Some(u) => match u.as_str() {
                "K" => 1024.0,
                "M" => 1024.0 * 1024.0,
                "G" => 1024.0 * 1024.0 * 1024.0,
                "T" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
                _ => return None,
            },
        };
        Some((value * multiplier) as u64)
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_result_line() {
        let parser = LineParser::new();
        let line = r#"( 3x [700M] Some.Show.S01E02.1080p.mkv )  (/msg SearchBot xdcc send #123 )"#;

        let result = parser.parse_search_result(line).expect("应当匹配");
        assert_eq!(result.grabs, 3);
        assert_eq!(result.raw_size, "700M");
        assert_eq!(result.label, "Some.Show.S01E02.1080p.mkv");
        assert_eq!(result.transfer_ref, "/msg SearchBot xdcc send #123");
        assert_eq!(result.source_tag, "SearchBot");
        assert_eq!(result.size_bytes, Some(734_003_200));
    }

    #[test]
    fn test_parse_end_of_results() {
        let parser = LineParser::new();
        assert_eq!(parser.parse_end_of_results("( 6 Results Found - 64 Gets )"), Some(6));
        assert_eq!(parser.parse_end_of_results("( 1 Result Found - 2 Gets )"), Some(1));
        assert_eq!(parser.parse_end_of_results("6 results, maybe"), None);
    }

    #[test]
    fn test_parse_hot_header() {
        let parser = LineParser::new();
        let line = "#THE.SOURCE - ALL SECTIONS ¦ TOP GETS OF THE LAST 2 DAYS ¦ 536 NEW RELEASES, 4481 GETS";
        assert_eq!(
            parser.parse_hot_header(line).as_deref(),
            Some("TOP GETS OF THE LAST 2 DAYS ¦ 536 NEW RELEASES, 4481 GETS")
        );
    }

    #[test]
    fn test_parse_hot_item() {
        let parser = LineParser::new();
        let line = "68x | TV-X265 [564M] Squid.Game.S03E01.1080p.HEVC.x265-MeGusta";

        let item = parser.parse_hot_item(line).expect("应当匹配");
        assert_eq!(item.rank, 68);
        assert_eq!(item.category, "TV-X265");
        assert_eq!(item.raw_size, "564M");
        assert_eq!(item.label, "Squid.Game.S03E01.1080p.HEVC.x265-MeGusta");
        assert_eq!(item.size_bytes, Some(591_396_864));
    }

    #[test]
    fn test_normalize_size_units() {
        let parser = LineParser::new();
        // 列表里常见的三类写法：带 B 后缀、小数、纯字节数
        assert_eq!(parser.normalize_size("700MB"), Some(734_003_200));
        assert_eq!(parser.normalize_size("1.4GB"), Some(1_503_238_553));
        assert_eq!(parser.normalize_size("350000000"), Some(350_000_000));

        assert_eq!(parser.normalize_size("2.3G"), Some(2_469_606_195));
        assert_eq!(parser.normalize_size("564M"), Some(591_396_864));
        assert_eq!(parser.normalize_size(" 1k "), Some(1024));
        assert_eq!(parser.normalize_size("4TB"), Some(4_398_046_511_104));

        assert_eq!(parser.normalize_size("unknown"), None);
        assert_eq!(parser.normalize_size(""), None);
        assert_eq!(parser.normalize_size("12.3.4M"), None);
    }

    #[test]
    fn test_unrelated_chatter_returns_none() {
        let parser = LineParser::new();
        let lines = [
            "hello everyone",
            "<nick> did you see that file?",
            "( broken [ line",
            "]]][[[)))(((",
            "!search something",
        ];
        for line in lines {
            assert_eq!(parser.parse_line(SessionKind::Search, line), None, "{}", line);
            assert_eq!(parser.parse_line(SessionKind::Hot, line), None, "{}", line);
            assert_eq!(parser.parse_line(SessionKind::Download, line), None, "{}", line);
        }
    }

    #[test]
    fn test_adversarial_long_line_is_bounded() {
        let parser = LineParser::new();
        // regex 引擎保证线性时间，超长输入只是返回 None
        let line = "( ".repeat(50_000);
        assert_eq!(parser.parse_line(SessionKind::Search, &line), None);
    }

    #[test]
    fn test_parse_download_deltas() {
        let parser = LineParser::new();

        let queued = parser
            .parse_download_delta("** All Slots Full, Added you to the main queue in position 2")
            .unwrap();
        assert_eq!(queued.phase, DownloadPhase::Queued);

        let sending = parser
            .parse_download_delta(r#"** Sending you pack #123 ("Some.File.mkv")"#)
            .unwrap();
        assert_eq!(sending.phase, DownloadPhase::Transferring);
        assert_eq!(sending.progress, None);

        let progress = parser
            .parse_download_delta(r#"xfer: "Some.File.mkv" 45% done"#)
            .unwrap();
        assert_eq!(progress.phase, DownloadPhase::Transferring);
        assert_eq!(progress.progress, Some(45));

        let completed = parser
            .parse_download_delta("xfer: transfer of Some.File.mkv completed")
            .unwrap();
        assert_eq!(completed.phase, DownloadPhase::Completed);
        assert_eq!(completed.progress, Some(100));

        let failed = parser
            .parse_download_delta("xfer: transfer failed (connection closed)")
            .unwrap();
        assert_eq!(failed.phase, DownloadPhase::Failed);
        assert!(failed.error.is_some());
    }

    #[test]
    fn test_kind_hint_routes_parsing() {
        let parser = LineParser::new();
        let line = r#"( 3x [700M] File.mkv ) (/msg Bot xdcc send #1 )"#;

        // 检索行只在检索会话中生效
        assert!(matches!(
            parser.parse_line(SessionKind::Search, line),
            Some(ParsedLine::Result(_))
        ));
        assert_eq!(parser.parse_line(SessionKind::Download, line), None);

        assert!(matches!(
            parser.parse_line(SessionKind::Search, "( 3 Results Found - 9 Gets )"),
            Some(ParsedLine::EndOfResults { total: 3 })
        ));
    }
}
