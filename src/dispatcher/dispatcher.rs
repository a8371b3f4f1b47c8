//! 任务调度状态机 - 流程层
//!
//! 核心职责：驱动 请求任务 → 展示 → 人工解答 → 提交 → 下一个任务 的循环
//!
//! 关键不变式：
//! - start 意味着恰好一次握手；此后存活进程上的每次请求
//!   都是一次 `get_task`，绝不重复拉起进程
//! - 每个 task_id 最多提交一次，且只提交先前展示过的任务
//! - 过期消息（非预期状态下收到的任务或确认）记录后丢弃，
//!   绝不重新触发展示

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dispatcher::state::DispatcherState;
use crate::error::AppResult;
use crate::logger;
use crate::models::{Solution, StatusMessage, Task};
use crate::protocol::{SolverCommand, SolverMessage};
use crate::solver::{SolverControl, SolverEvent};
use crate::surface::{ChallengeSurface, SurfaceEvent};

/// 任务调度器
pub struct TaskDispatcher {
    state: DispatcherState,
    solver: Box<dyn SolverControl>,
    surface: Box<dyn ChallengeSurface>,
    api_key: Option<String>,
    settle_delay: Duration,
    /// 当前在展示/等待解答的任务
    current_task: Option<Task>,
    /// 已提交过的任务编号，拒绝重复提交
    submitted_ids: HashSet<i64>,
    /// 提交确认期间排队的"下一个任务"请求（最多一个，重复合并）
    pending_next: bool,
    /// 本次进程的握手是否已被确认（区分认证前夭折）
    handshake_acked: bool,
}

impl TaskDispatcher {
    /// 创建调度器
    pub fn new(
        solver: Box<dyn SolverControl>,
        surface: Box<dyn ChallengeSurface>,
        config: &Config,
    ) -> Self {
        Self {
            state: DispatcherState::Idle,
            solver,
            surface,
            api_key: None,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            current_task: None,
            submitted_ids: HashSet::new(),
            pending_next: false,
            handshake_acked: false,
        }
    }

    /// 当前状态（测试与日志用）
    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// 认证开始
    pub fn begin_authentication(&mut self) {
        self.state = DispatcherState::Authenticating;
    }

    /// 认证成功，进入可请求任务状态
    pub fn on_authenticated(&mut self, api_key: impl Into<String>) {
        self.api_key = Some(api_key.into());
        self.state = DispatcherState::Ready;
    }

    /// 认证失败，回到无会话状态
    pub fn on_auth_failed(&mut self) {
        self.state = DispatcherState::Idle;
    }

    /// 用户请求解一个验证码
    ///
    /// 这是最容易出错的分支点：进程存活时必须请求下一个任务
    /// 而不是再拉起一个进程
    pub async fn request_solve(&mut self) -> AppResult<()> {
        match self.state {
            DispatcherState::Idle | DispatcherState::Authenticating => {
                warn!("⚠️ 尚未认证，无法请求任务");
            }
            DispatcherState::Ready => {
                let api_key = match &self.api_key {
                    Some(key) => key.clone(),
                    None => {
                        warn!("⚠️ 会话缺少 API Key");
                        return Ok(());
                    }
                };

                if self.solver.is_running() {
                    // 进程仍存活：只请求下一个任务，绝不重复拉起
                    info!("📬 请求新任务");
                    self.solver.send(&SolverCommand::GetTask).await?;
                } else {
                    self.handshake_acked = false;
                    self.solver.start(&api_key).await?;
                    // 等待求解器完成与服务端的握手
                    sleep(self.settle_delay).await;
                    info!("📬 请求首个任务");
                    self.solver.send(&SolverCommand::GetTask).await?;
                }
                self.state = DispatcherState::WaitingForTask;
            }
            DispatcherState::WaitingForTask => {
                info!("已在等待任务，忽略重复请求");
            }
            DispatcherState::Presenting | DispatcherState::AwaitingSolution => {
                warn!("⚠️ 当前任务尚未完成，请先完成或放弃后再请求新任务");
            }
            DispatcherState::Submitting => {
                if self.pending_next {
                    debug!("已有排队中的任务请求，合并");
                } else {
                    self.pending_next = true;
                    info!("📝 提交确认后将自动请求下一个任务");
                }
            }
        }
        Ok(())
    }

    /// 处理监督器事件
    pub async fn on_solver_event(&mut self, event: SolverEvent) -> AppResult<()> {
        match event {
            SolverEvent::Message(message) => self.on_message(message).await,
            SolverEvent::Exited { code } => self.on_exited(code).await,
        }
    }

    /// 处理展示层事件
    pub async fn on_surface_event(&mut self, event: SurfaceEvent) -> AppResult<()> {
        match event {
            SurfaceEvent::Solved(solution) => self.on_solved(solution).await,
            SurfaceEvent::Abandoned => self.abandon().await,
        }
    }

    /// 用户放弃当前任务
    ///
    /// 只影响编排侧：不通知子进程，其侧的任务被静默遗弃
    pub async fn abandon(&mut self) -> AppResult<()> {
        if !self.state.has_task_in_flight() {
            debug!("当前无可放弃的任务（状态 {:?}）", self.state);
            return Ok(());
        }

        info!("↩️ 放弃当前任务");
        if let Err(e) = self.surface.close().await {
            warn!("⚠️ 关闭窗口失败: {}", e);
        }
        self.current_task = None;
        self.request_next_or_degrade().await;
        Ok(())
    }

    /// 程序退出前的清理
    pub async fn shutdown(&mut self) {
        let _ = self.surface.close().await;
        self.solver.shutdown().await;
    }

    // ========== 内部转移 ==========

    async fn on_message(&mut self, message: SolverMessage) -> AppResult<()> {
        match message {
            SolverMessage::Status(status) => self.on_status(status).await,
            SolverMessage::Task(task) => self.on_task(task).await,
            SolverMessage::Unrecognized(value) => {
                warn!("⚠️ 无法识别的求解器消息，已丢弃: {}", value);
                Ok(())
            }
        }
    }

    async fn on_status(&mut self, status: StatusMessage) -> AppResult<()> {
        if status.is_ok() {
            self.handshake_acked = true;
            match status.balance {
                Some(balance) => info!("✅ 求解器握手成功，余额: {}", balance),
                None => info!("✅ 求解器确认: ok"),
            }
            // 确认驱动的续接：ok 也视为提交确认
            if self.state == DispatcherState::Submitting {
                self.continue_after_ack().await;
            }
        } else if status.is_solution_saved() {
            if self.state == DispatcherState::Submitting {
                info!("💾 解答已保存");
                self.continue_after_ack().await;
            } else {
                warn!("⚠️ 非提交状态收到保存确认（当前 {:?}），已丢弃", self.state);
            }
        } else if status.is_error() {
            let message = status.message.as_deref().unwrap_or("unknown error");
            error!("❌ 求解器返回错误: {}", message);
            // 一次被拒绝的提交不应卡死循环：继续请求下一个任务
            if self.state == DispatcherState::Submitting {
                self.continue_after_ack().await;
            }
        }
        Ok(())
    }

    async fn on_task(&mut self, task: Task) -> AppResult<()> {
        if self.state != DispatcherState::WaitingForTask {
            // 过期/重复的任务绝不重新触发展示
            warn!(
                "⚠️ 非等待状态收到任务（当前 {:?}），按过期消息丢弃: {}",
                self.state,
                task.describe()
            );
            return Ok(());
        }

        info!("📦 收到{}", task.describe());
        self.state = DispatcherState::Presenting;

        match self.surface.present(&task).await {
            Ok(()) => {
                self.current_task = Some(task);
                self.state = DispatcherState::AwaitingSolution;
            }
            Err(e) => {
                error!("❌ 展示任务失败: {}", e);
                // 回到 Ready：下一次请求会在存活进程上重新要任务
                self.current_task = None;
                self.state = DispatcherState::Ready;
            }
        }
        Ok(())
    }

    async fn on_solved(&mut self, solution: Solution) -> AppResult<()> {
        if self.state != DispatcherState::AwaitingSolution {
            warn!("⚠️ 非等待解答状态收到 token（当前 {:?}），已丢弃", self.state);
            return Ok(());
        }

        let task = match self.current_task.clone() {
            Some(task) => task,
            None => {
                warn!("⚠️ 收到解答但没有在处理中的任务，已丢弃");
                return Ok(());
            }
        };

        if task.task_id != solution.task_id {
            warn!(
                "⚠️ 解答的任务编号不匹配（期望 {:?}，收到 {:?}），已丢弃",
                task.task_id, solution.task_id
            );
            return Ok(());
        }

        if let Some(id) = solution.task_id {
            if self.submitted_ids.contains(&id) {
                warn!("⚠️ 任务 #{} 已提交过，拒绝重复提交", id);
                return Ok(());
            }
        }

        info!(
            "📤 提交解答: {}",
            logger::truncate_text(&solution.token, 16)
        );

        let command = SolverCommand::SubmitSolution {
            task_id: solution.task_id,
            solution: solution.token,
        };
        match self.solver.send(&command).await {
            Ok(()) => {
                if let Some(id) = solution.task_id {
                    self.submitted_ids.insert(id);
                }
                self.current_task = None;
                self.state = DispatcherState::Submitting;
                if let Err(e) = self.surface.close().await {
                    warn!("⚠️ 关闭窗口失败: {}", e);
                }
                // 等待 solution_saved / ok 确认后再请求下一个任务
            }
            Err(e) => {
                warn!("⚠️ 提交失败（求解器可能已退出）: {}", e);
                let _ = self.surface.close().await;
                self.current_task = None;
                self.state = DispatcherState::Ready;
            }
        }
        Ok(())
    }

    async fn on_exited(&mut self, code: Option<i32>) -> AppResult<()> {
        if matches!(
            self.state,
            DispatcherState::Idle | DispatcherState::Authenticating
        ) {
            return Ok(());
        }

        if !self.handshake_acked && self.state == DispatcherState::WaitingForTask {
            // 认证完成前退出是唯一需要用户可见失败的退出
            error!("❌ 求解器在认证完成前退出（代码 {:?}），请检查 API Key 与网络", code);
        } else {
            info!("🔚 求解器已退出（代码 {:?}），下一次请求将重新启动", code);
        }

        // 显式关闭窗口，避免留下没有后备任务的无主窗口
        if self.state.has_task_in_flight() {
            if let Err(e) = self.surface.close().await {
                warn!("⚠️ 关闭窗口失败: {}", e);
            }
        }

        self.current_task = None;
        self.pending_next = false;
        self.state = if self.api_key.is_some() {
            DispatcherState::Ready
        } else {
            DispatcherState::Idle
        };
        Ok(())
    }

    /// 收到提交确认后的续接：请求下一个任务
    ///
    /// 排队中的请求（Submitting 期间的 request_solve）在此合并，
    /// 保证恰好一次 get_task
    async fn continue_after_ack(&mut self) {
        self.pending_next = false;
        self.request_next_or_degrade().await;
    }

    async fn request_next_or_degrade(&mut self) {
        match self.solver.send(&SolverCommand::GetTask).await {
            Ok(()) => {
                info!("📬 请求下一个任务");
                self.state = DispatcherState::WaitingForTask;
            }
            Err(e) => {
                warn!("⚠️ 无法请求下一个任务: {}", e);
                self.state = DispatcherState::Ready;
            }
        }
    }
}
