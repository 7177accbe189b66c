//! 中继客户端模块
//!
//! 向中继进程下发指令。中继协议是长度前缀帧的 TCP 协议：
//! 登录流程为 `handshake` -> 读响应 -> `init password=...`，
//! 随后用 `input <buffer> <command>` 执行即发即弃指令
//! （`input` 不产生响应，发送后即可断开）。
//!
//! 调度失败（连接拒绝、握手失败等）以 `RelayUnavailable`
//! 上抛，由调用方立即终结会话并通知聊天侧——这是唯一会
//! 暴露给最终用户的错误类别。

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::infra::error::{Error, Result};
use crate::relay::protocol::CommandPayload;

/// 中继指令出口
///
/// 关联引擎与下载追踪器通过该接口下发指令，测试中可用
/// 内存实现替换。
#[async_trait]
pub trait RelayPort: Send + Sync {
    /// 将一条指令调度到中继侧
    ///
    /// # 参数说明
    /// * `session_id` - 关联 ID，中继侧据此给回推事件打标
    /// * `command` - 指令载荷
    async fn dispatch(&self, session_id: &str, command: &CommandPayload) -> Result<()>;
}

/// 中继凭证配置
#[derive(Debug, Clone)]
pub struct RelayCredentials {
    /// 中继主机
    pub host: String,
    /// 中继端口
    pub port: u16,
    /// 中继密码
    pub password: Option<String>,
}

/// TCP 中继客户端
///
/// 每次调度建立一条短连接：登录、发送、断开。中继侧的
/// 服务指令是即发即弃的，核心不等待任何响应——结果经由
/// Webhook 事件异步回流。
#[derive(Debug, Clone)]
pub struct TcpRelayClient {
    credentials: RelayCredentials,
}

impl TcpRelayClient {
    /// 创建中继客户端
    pub fn new(credentials: RelayCredentials) -> Self {
        Self { credentials }
    }

    /// 建立连接并完成登录
    async fn login(&self) -> Result<TcpStream> {
        let addr = format!("{}:{}", self.credentials.host, self.credentials.port);
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::RelayUnavailable(format!("连接 {} 失败: {}", addr, e)))?;

        debug!(addr = %addr, "中继连接建立");

        Self::send_line(&mut stream, "handshake").await?;
        Self::read_frame(&mut stream).await?;

        let password = self
            .credentials
            .password
            .as_deref()
            .ok_or_else(|| Error::Config("中继密码未配置".to_string()))?;
        Self::send_line(&mut stream, &format!("init password={}", password)).await?;

        Ok(stream)
    }

    /// 发送一行指令
    async fn send_line(stream: &mut TcpStream, command: &str) -> Result<()> {
        stream
            .write_all(format!("{}\n", command).as_bytes())
            .await
            .map_err(|e| Error::RelayUnavailable(format!("发送指令失败: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| Error::RelayUnavailable(format!("发送指令失败: {}", e)))?;
        Ok(())
    }

    /// 读取一个长度前缀帧
    ///
    /// 帧格式：4 字节大端总长度 + 1 字节压缩标志 + 数据。
    /// 压缩帧不支持，直接报错。
    async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
        let mut header = [0u8; 4];
        stream
            .read_exact(&mut header)
            .await
            .map_err(|e| Error::RelayUnavailable(format!("读取响应头失败: {}", e)))?;

        let total_length = u32::from_be_bytes(header) as usize;
        if total_length < 5 {
            return Err(Error::RelayUnavailable(format!(
                "非法的响应帧长度: {}",
                total_length
            )));
        }

        let mut body = vec![0u8; total_length - 4];
        stream
            .read_exact(&mut body)
            .await
            .map_err(|e| Error::RelayUnavailable(format!("读取响应体失败: {}", e)))?;

        if body[0] != 0x00 {
            return Err(Error::RelayUnavailable("不支持压缩的响应帧".to_string()));
        }

        Ok(body[1..].to_vec())
    }
}

#[async_trait]
impl RelayPort for TcpRelayClient {
    async fn dispatch(&self, session_id: &str, command: &CommandPayload) -> Result<()> {
        let service_command = command.to_service_command(session_id);
        let mut stream = self.login().await?;

        // input 指令不产生响应，发送后即可断开
        let full_command = format!("(ff_cmd) input core.relay {}", service_command);
        Self::send_line(&mut stream, &full_command).await?;

        info!(session_id = %session_id, command = %service_command, "指令已调度到中继");
        Ok(())
    }
}
