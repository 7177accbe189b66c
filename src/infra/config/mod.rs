//! 配置管理系统模块
//!
//! 本模块负责加载和管理系统配置。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::{env, fs};

/// 主配置结构
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// 中继配置
    #[serde(default)]
    pub relay: RelayConfig,
    /// 聊天侧配置
    #[serde(default)]
    pub chat: ChatConfig,
    /// 会话配置
    #[serde(default)]
    pub session: SessionSettings,
    /// Web 服务配置
    #[serde(default)]
    pub web: WebConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingSection,
}

/// 中继配置
///
/// 描述如何连接到维持 IRC 长连接的中继进程。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// 中继主机
    pub host: String,
    /// 中继端口
    pub port: u16,
    /// 中继密码
    pub password: Option<String>,
    /// IRC 服务器名（中继侧的 buffer 前缀）
    pub server_name: String,
    /// 检索频道
    pub search_channel: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9001,
            password: None,
            server_name: "irc.example.org".to_string(),
            search_channel: "#channel".to_string(),
        }
    }
}

/// 聊天侧配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// 聊天侧进程的 Webhook 基础 URL
    pub webhook_base_url: String,
    /// 单次请求超时（毫秒）
    pub request_timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            webhook_base_url: "http://localhost:8000/".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// 会话配置
///
/// 不同类型会话的超时相互独立：检索延迟与传输时长的
/// 自然尺度不同。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// 检索会话超时（毫秒）
    pub search_timeout_ms: u64,
    /// 热门榜会话超时（毫秒）
    pub hot_timeout_ms: u64,
    /// 下载会话超时（毫秒）
    pub download_timeout_ms: u64,
    /// 热门榜静默完成窗口（毫秒）
    pub hot_quiet_ms: u64,
    /// 检索结果渲染上限
    pub search_max_results: usize,
    /// 热门榜条目累积上限
    pub hot_max_items: usize,
    /// 过期扫描间隔（毫秒）
    pub sweep_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            search_timeout_ms: 300_000,
            hot_timeout_ms: 300_000,
            download_timeout_ms: 600_000,
            hot_quiet_ms: 2_000,
            search_max_results: 10,
            hot_max_items: 50,
            sweep_interval_ms: 1_000,
        }
    }
}

/// Web 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// 监听端口
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingSection {
    /// 日志级别
    pub level: Option<String>,
    /// 日志文件路径
    pub file_path: Option<PathBuf>,
}

/// 配置加载器
#[derive(Debug, Clone)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// 创建新的配置加载器
    pub fn new() -> Self {
        Self
    }

    /// 加载配置
    pub async fn load(&self, path: &str) -> Result<Config, super::error::Error> {
        tracing::info!(path = path, "加载配置文件");

        // 检查文件是否存在
        if !PathBuf::from(path).exists() {
            tracing::warn!(path = path, "配置文件不存在，使用默认配置");
            return Ok(Config::default());
        }

        // 读取文件内容
        let content = fs::read_to_string(path)
            .map_err(|e| super::error::Error::Config(format!("读取配置文件失败: {}", e)))?;

        // 解析 TOML
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| super::error::Error::Config(format!("解析配置文件失败: {}", e)))?;

        // 环境变量替换
        self.substitute_env_vars(&mut config);

        tracing::info!("配置加载成功");
        Ok(config)
    }

    /// 替换环境变量
    ///
    /// 将 `${VAR_NAME}` 格式的字符串替换为对应的环境变量值
    fn substitute_env_vars(&self, config: &mut Config) {
        if let Some(password) = &config.relay.password {
            config.relay.password = Some(self.replace_env_vars(password));
        }
        config.relay.host = self.replace_env_vars(&config.relay.host);
        config.chat.webhook_base_url = self.replace_env_vars(&config.chat.webhook_base_url);
    }

    /// 替换字符串中的环境变量
    fn replace_env_vars(&self, input: &str) -> String {
        let pattern = r"\$\{([^}]+)\}";

        // 使用正则表达式替换环境变量
        let re = regex::Regex::new(pattern).unwrap();
        let result = re.replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
        });

        result.to_string()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.relay.port, 9001);
        assert_eq!(config.session.search_timeout_ms, 300_000);
        assert_eq!(config.session.hot_quiet_ms, 2_000);
        assert_eq!(config.web.port, 8080);
    }

    #[test]
    fn test_parse_toml_with_defaults() {
        let toml_str = r#"
[relay]
host = "10.0.0.5"
port = 9000
server_name = "irc.rizon.net"
search_channel = "#listing"

[session]
search_timeout_ms = 60000
"#;
        // 未出现的字段回落到默认值
        let config: Config = toml::from_str(toml_str).expect("解析失败");
        assert_eq!(config.relay.host, "10.0.0.5");
        assert_eq!(config.session.search_timeout_ms, 60_000);
        assert_eq!(config.session.download_timeout_ms, 600_000);
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("XDCCBOT_TEST_PASSWORD", "hunter2");
        let loader = ConfigLoader::new();
        let replaced = loader.replace_env_vars("${XDCCBOT_TEST_PASSWORD}");
        assert_eq!(replaced, "hunter2");

        // 未定义的变量保持原样
        let kept = loader.replace_env_vars("${XDCCBOT_NO_SUCH_VAR}");
        assert_eq!(kept, "${XDCCBOT_NO_SUCH_VAR}");
    }
}
