//! 求解器进程监督 - 基础设施层
//!
//! 持有唯一的求解器子进程资源：
//! - 拉起进程并立即写入握手行
//! - stdout 按行解码后原序转发给调度器
//! - stderr 仅作为诊断日志转发，不影响协议状态
//! - 进程退出（任何退出码）统一降级为 Exited 事件
//!
//! 不认识调度状态，不处理任务流程。

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, ProcessError};
use crate::protocol::{classify_line, SolverCommand, SolverMessage};

/// 监督器向调度器转发的事件
#[derive(Debug)]
pub enum SolverEvent {
    /// 一条按行解码后的协议消息（保持 stdout 原始顺序）
    Message(SolverMessage),
    /// 进程退出（任何退出码）或启动后夭折
    Exited { code: Option<i32> },
}

/// 求解器控制接口
///
/// 调度器通过该接口驱动进程，测试中用记录型假实现替换
#[async_trait]
pub trait SolverControl: Send {
    /// 拉起进程并写入握手；已有存活进程时拒绝
    async fn start(&mut self, api_key: &str) -> AppResult<()>;
    /// 向存活进程写入一条命令；写前重新检查可写性
    async fn send(&mut self, command: &SolverCommand) -> AppResult<()>;
    /// 关闭输入通道，让进程自然结束
    async fn shutdown(&mut self);
    /// 是否存在存活进程
    fn is_running(&self) -> bool;
}

/// 求解器进程监督器
pub struct SolverSupervisor {
    solver_path: String,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    alive: Arc<AtomicBool>,
    events: UnboundedSender<SolverEvent>,
}

impl SolverSupervisor {
    /// 创建监督器（尚未拉起进程）
    pub fn new(solver_path: impl Into<String>, events: UnboundedSender<SolverEvent>) -> Self {
        Self {
            solver_path: solver_path.into(),
            stdin: Arc::new(Mutex::new(None)),
            alive: Arc::new(AtomicBool::new(false)),
            events,
        }
    }
}

#[async_trait]
impl SolverControl for SolverSupervisor {
    async fn start(&mut self, api_key: &str) -> AppResult<()> {
        // 单实例不变式：同一时刻最多一个子进程
        if self.is_running() {
            return Err(AppError::Process(ProcessError::AlreadyRunning));
        }

        info!("🚀 启动验证码求解器...");
        debug!("📂 求解器路径: {}", self.solver_path);

        let mut child = Command::new(&self.solver_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::spawn_failed(self.solver_path.as_str(), e))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        *self.stdin.lock().await = stdin;
        self.alive.store(true, Ordering::SeqCst);

        // 三个独立监听：stdout 解码、stderr 日志、进程退出
        if let Some(stdout) = stdout {
            let events = self.events.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match classify_line(&line) {
                        Ok(message) => {
                            if events.send(SolverEvent::Message(message)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            // 解码失败不致命：丢弃该行，流继续
                            warn!("⚠️ 忽略无法解析的求解器输出: {}", e);
                        }
                    }
                }
            });
        }

        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        warn!("📟 求解器 stderr: {}", line);
                    }
                }
            });
        }

        {
            let events = self.events.clone();
            let alive = Arc::clone(&self.alive);
            let stdin = Arc::clone(&self.stdin);
            tokio::spawn(async move {
                let status = child.wait().await;
                alive.store(false, Ordering::SeqCst);
                // 释放输入通道：退出后任何写入都必须失败
                stdin.lock().await.take();
                let code = status.ok().and_then(|s| s.code());
                info!("🔚 求解器进程退出，代码 {:?}", code);
                let _ = events.send(SolverEvent::Exited { code });
            });
        }

        // 握手必须在任何其他命令之前写入
        self.send(&SolverCommand::Handshake {
            api_key: api_key.to_string(),
        })
        .await?;
        info!("✅ API Key 已发送至求解器进程");

        Ok(())
    }

    async fn send(&mut self, command: &SolverCommand) -> AppResult<()> {
        // 写前重新检查存活状态：终止可能与调用方的 send 竞争
        if !self.alive.load(Ordering::SeqCst) {
            return Err(AppError::Process(ProcessError::NotRunning));
        }

        let mut guard = self.stdin.lock().await;
        let stdin = match guard.as_mut() {
            Some(stdin) => stdin,
            None => return Err(AppError::Process(ProcessError::NotRunning)),
        };

        let line = command.encode_line();
        debug!("→ 求解器: {}", line.trim());

        let result = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = result {
            // 检查与写入之间进程可能已退出：降级为失败的写，不崩溃
            guard.take();
            return Err(AppError::Process(ProcessError::WriteFailed {
                source: Box::new(e),
            }));
        }

        Ok(())
    }

    async fn shutdown(&mut self) {
        if self.stdin.lock().await.take().is_some() {
            info!("👋 已关闭求解器输入通道");
        }
    }

    fn is_running(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}
