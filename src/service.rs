//! 服务模块
//!
//! 负责机器人的完整生命周期管理：装配组件、启动 Web 服务
//! 与过期扫描定时器、处理关闭信号。

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::channels::webhook::WebhookChatSurface;
use crate::core::engine::CorrelationEngine;
use crate::core::session::store::{SessionStore, StoreConfig};
use crate::infra::config::{Config, ConfigLoader};
use crate::relay::client::{RelayCredentials, TcpRelayClient};
use crate::web::{start_web, AppState};

/// 服务状态
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceStatus {
    Initializing,
    Running,
    Stopping,
    Stopped,
    Error(String),
}

/// 服务配置
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub config_path: String,
    pub verbose: bool,
    pub port: Option<u16>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            config_path: "xdccbot.toml".to_string(),
            verbose: false,
            port: None,
        }
    }
}

/// xdccbot 服务
#[derive(Clone)]
pub struct XdccbotService {
    config: ServiceConfig,
    status: Arc<tokio::sync::RwLock<ServiceStatus>>,
    shutdown_tx: broadcast::Sender<()>,
    /// 加载的配置
    loaded_config: Arc<Option<Config>>,
}

impl XdccbotService {
    pub fn new(config: ServiceConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            status: Arc::new(tokio::sync::RwLock::new(ServiceStatus::Initializing)),
            shutdown_tx,
            loaded_config: Arc::new(None),
        }
    }

    /// 初始化服务
    pub async fn initialize(&mut self, config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
        info!(path = config_path, "初始化服务...");

        let loader = ConfigLoader::new();
        let config = loader
            .load(config_path)
            .await
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;
        self.loaded_config = Arc::new(Some(config));

        info!("服务初始化完成");
        Ok(())
    }

    /// 启动服务
    ///
    /// 阻塞直到收到关闭信号。
    pub async fn start(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("开始启动服务...");

        *self.status.write().await = ServiceStatus::Running;

        let config = self.loaded_config.as_ref().clone().unwrap_or_default();

        // 装配核心组件
        let store = Arc::new(SessionStore::new(StoreConfig {
            search_timeout_ms: config.session.search_timeout_ms,
            hot_timeout_ms: config.session.hot_timeout_ms,
            download_timeout_ms: config.session.download_timeout_ms,
            hot_quiet_ms: config.session.hot_quiet_ms,
            search_max_results: config.session.search_max_results,
            hot_max_items: config.session.hot_max_items,
        }));
        let relay = Arc::new(TcpRelayClient::new(RelayCredentials {
            host: config.relay.host.clone(),
            port: config.relay.port,
            password: config.relay.password.clone(),
        }));
        let chat = Arc::new(WebhookChatSurface::new(
            &config.chat.webhook_base_url,
            config.chat.request_timeout_ms,
        ));
        let engine = Arc::new(CorrelationEngine::new(store.clone(), relay, chat));

        // 启动过期扫描定时器
        self.start_sweeper(engine.clone(), config.session.sweep_interval_ms);

        // 启动 Web 服务器
        let web_port = self.config.port.unwrap_or(config.web.port);
        let app_state = AppState {
            engine: engine.clone(),
            store: store.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = start_web(app_state, web_port).await {
                error!(error = %e, "Web 服务器启动失败");
            }
        });

        // 启动关闭信号监听
        let mut rx = self.shutdown_tx.subscribe();
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            let _ = signal::ctrl_c().await;
            warn!("收到 Ctrl+C 信号，准备关闭服务...");
            let _ = shutdown_tx.send(());
        });

        // 等待关闭信号
        let _ = rx.recv().await;

        *self.status.write().await = ServiceStatus::Stopped;
        info!("服务已停止");

        Ok(())
    }

    /// 启动过期扫描定时器
    ///
    /// 超时是显式完成信号之外唯一的强制终结来源；扫描周期
    /// 决定超时判定的粒度。
    fn start_sweeper(&self, engine: Arc<CorrelationEngine>, interval_ms: u64) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(interval_ms.max(100)));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        engine.sweep().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("过期扫描定时器退出");
                        break;
                    }
                }
            }
        });
    }

    /// 停止服务
    pub async fn stop(&mut self) {
        info!("正在停止服务...");

        *self.status.write().await = ServiceStatus::Stopping;

        let _ = self.shutdown_tx.send(());

        info!("停止信号已发送");
    }

    /// 查询服务状态
    pub async fn status(&self) -> ServiceStatus {
        self.status.read().await.clone()
    }
}

impl Default for XdccbotService {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}
