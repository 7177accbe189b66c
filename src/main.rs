//! xdccbot 主入口

use clap::{Parser, Subcommand};
use tracing::{error, info};

use xdccbot::infra::config::ConfigLoader;
use xdccbot::infra::logging::{self, LogLevel};
use xdccbot::service::{ServiceConfig, XdccbotService};

// 命令行参数解析结构体
#[derive(Parser, Debug)]
#[command(name = "xdccbot")]
#[command(version = "0.1.0")]
#[command(about = "连接群聊平台与 IRC 文件检索网络的桥接机器人", long_about = None)]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "xdccbot.toml")]
    config: String,

    /// 是否启用 verbose 模式（显示 DEBUG 日志）
    #[arg(short, long)]
    verbose: bool,

    /// 监听端口（覆盖配置文件）
    #[arg(short, long)]
    port: Option<u16>,

    /// 子命令
    #[command(subcommand)]
    command: Option<Commands>,
}

// 子命令枚举
#[derive(Subcommand, Debug)]
enum Commands {
    /// 启动 xdccbot 服务
    Start,
    /// 检查配置文件是否有效
    Check,
    /// 显示版本信息
    Version,
}

// 主函数
#[tokio::main]
async fn main() {
    // 加载 .env 文件
    dotenv::dotenv().ok();

    let args = Args::parse();

    // 设置日志级别
    let log_level = if args.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    logging::init(log_level);

    info!(version = "0.1.0", "xdccbot 启动");

    // 根据子命令执行不同操作
    match args.command {
        Some(Commands::Start) | None => {
            run_service(&args.config, args.verbose, args.port).await;
        }
        Some(Commands::Check) => {
            check_config(&args.config).await;
        }
        Some(Commands::Version) => {
            println!("xdccbot 0.1.0");
        }
    }
}

/// 启动服务
async fn run_service(config_path: &str, verbose: bool, port: Option<u16>) {
    let service_config = ServiceConfig {
        config_path: config_path.to_string(),
        verbose,
        port,
    };

    let mut service = XdccbotService::new(service_config);

    if let Err(e) = service.initialize(config_path).await {
        error!(error = %e, "服务初始化失败");
        std::process::exit(1);
    }

    if let Err(e) = service.start().await {
        error!(error = %e, "服务运行失败");
        std::process::exit(1);
    }
}

/// 检查配置文件
async fn check_config(config_path: &str) {
    let loader = ConfigLoader::new();
    match loader.load(config_path).await {
        Ok(config) => {
            info!(
                relay = %format!("{}:{}", config.relay.host, config.relay.port),
                webhook = %config.chat.webhook_base_url,
                "配置文件有效"
            );
            println!("配置文件有效");
        }
        Err(e) => {
            error!(error = %e, "配置文件无效");
            println!("配置文件无效: {}", e);
            std::process::exit(1);
        }
    }
}
