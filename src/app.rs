//! 应用主结构 - 编排层
//!
//! 持有三路独立事件源（求解器输出、验证码窗口、终端菜单），
//! 在单个事件循环里驱动调度器。协作全部经异步回调完成，
//! 没有任何阻塞等待。

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{error, info, warn};

use crate::auth::AuthGateway;
use crate::config::Config;
use crate::dispatcher::TaskDispatcher;
use crate::logger;
use crate::models::Session;
use crate::solver::{SolverEvent, SolverSupervisor};
use crate::surface::{ChromiumSurface, SurfaceEvent};

/// 应用主结构
pub struct App {
    gateway: AuthGateway,
    dispatcher: TaskDispatcher,
    solver_rx: UnboundedReceiver<SolverEvent>,
    surface_rx: UnboundedReceiver<SurfaceEvent>,
}

/// 终端菜单命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuCommand {
    Solve,
    Balance,
    Abandon,
    Quit,
}

impl App {
    /// 初始化应用：建好事件通道并组装各层
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化运行日志文件
        logger::init_log_file(&config.output_log_file)?;
        log_startup(&config);

        let (solver_tx, solver_rx) = mpsc::unbounded_channel();
        let (surface_tx, surface_rx) = mpsc::unbounded_channel();

        let supervisor = SolverSupervisor::new(config.solver_path.clone(), solver_tx);
        let surface = ChromiumSurface::new(&config, surface_tx);
        let dispatcher = TaskDispatcher::new(Box::new(supervisor), Box::new(surface), &config);
        let gateway = AuthGateway::new(config.solver_path.clone());

        Ok(Self {
            gateway,
            dispatcher,
            solver_rx,
            surface_rx,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(mut self) -> Result<()> {
        // 终端输入：登录与菜单共用同一行通道
        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        });

        // 凭证输入循环：失败停留在输入界面
        let mut session = self.login_loop(&mut line_rx).await?;
        info!("💰 当前余额: {}", session.balance);
        self.dispatcher.on_authenticated(session.api_key.clone());

        print_menu();

        loop {
            tokio::select! {
                Some(event) = self.solver_rx.recv() => {
                    if let Err(e) = self.dispatcher.on_solver_event(event).await {
                        error!("❌ 处理求解器事件失败: {}", e);
                    }
                }
                Some(event) = self.surface_rx.recv() => {
                    if let Err(e) = self.dispatcher.on_surface_event(event).await {
                        error!("❌ 处理窗口事件失败: {}", e);
                    }
                }
                maybe_line = line_rx.recv() => {
                    let Some(line) = maybe_line else {
                        info!("🔚 标准输入关闭，退出");
                        break;
                    };
                    match parse_menu_command(&line) {
                        Some(MenuCommand::Solve) => {
                            // 启动失败（如二进制缺失）可直接重试：状态仍是 Ready
                            if let Err(e) = self.dispatcher.request_solve().await {
                                error!("❌ 无法请求任务: {}", e);
                            }
                        }
                        Some(MenuCommand::Balance) => {
                            // 认证调用是幂等的，可直接复用做余额刷新
                            match self.gateway.authenticate(&session.api_key).await {
                                Ok(refreshed) => {
                                    session.balance = refreshed.balance;
                                    info!("💰 当前余额: {}", session.balance);
                                }
                                Err(e) => warn!("⚠️ 余额刷新失败: {}", e),
                            }
                        }
                        Some(MenuCommand::Abandon) => {
                            if let Err(e) = self.dispatcher.abandon().await {
                                warn!("⚠️ 放弃任务失败: {}", e);
                            }
                        }
                        Some(MenuCommand::Quit) => break,
                        None => print_menu(),
                    }
                }
            }
        }

        self.dispatcher.shutdown().await;
        info!("👋 程序退出");
        Ok(())
    }

    /// 凭证输入循环：认证失败显示原因并重新提示
    async fn login_loop(&mut self, lines: &mut UnboundedReceiver<String>) -> Result<Session> {
        loop {
            info!("🔑 请输入 API Key:");
            let Some(line) = lines.recv().await else {
                anyhow::bail!("标准输入已关闭，无法完成认证");
            };
            let api_key = line.trim();
            if api_key.is_empty() {
                continue;
            }

            self.dispatcher.begin_authentication();
            match self.gateway.authenticate(api_key).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    warn!("❌ 认证失败: {}", e);
                    self.dispatcher.on_auth_failed();
                }
            }
        }
    }

}

/// 解析一行菜单输入
fn parse_menu_command(line: &str) -> Option<MenuCommand> {
    match line.trim().to_lowercase().as_str() {
        "1" | "s" | "solve" => Some(MenuCommand::Solve),
        "2" | "b" | "balance" => Some(MenuCommand::Balance),
        "3" | "x" | "abandon" => Some(MenuCommand::Abandon),
        "0" | "q" | "quit" | "exit" => Some(MenuCommand::Quit),
        _ => None,
    }
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 验证码人工处理模式");
    info!("📂 求解器路径: {}", config.solver_path);
    if config.verbose_logging {
        info!(
            "📊 稳定延迟: {} ms | 轮询间隔: {} ms | 窗口: {}x{}",
            config.settle_delay_ms,
            config.token_poll_interval_ms,
            config.window_width,
            config.window_height
        );
    }
    info!("{}", "=".repeat(60));
}

fn print_menu() {
    info!("");
    info!("========== 菜单 ==========");
    info!("  1) solve   - 请求一个验证码任务");
    info!("  2) balance - 刷新余额");
    info!("  3) abandon - 放弃当前任务");
    info!("  0) quit    - 退出");
    info!("==========================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_menu_command_aliases() {
        assert_eq!(parse_menu_command("1"), Some(MenuCommand::Solve));
        assert_eq!(parse_menu_command("solve"), Some(MenuCommand::Solve));
        assert_eq!(parse_menu_command("  BALANCE "), Some(MenuCommand::Balance));
        assert_eq!(parse_menu_command("x"), Some(MenuCommand::Abandon));
        assert_eq!(parse_menu_command("q"), Some(MenuCommand::Quit));
    }

    #[test]
    fn test_parse_menu_command_unknown() {
        assert_eq!(parse_menu_command(""), None);
        assert_eq!(parse_menu_command("help"), None);
    }
}
