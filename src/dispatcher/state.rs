//! 调度器状态定义

/// 任务调度状态机的状态
///
/// 正常循环：Ready → WaitingForTask → Presenting →
/// AwaitingSolution → Submitting → WaitingForTask → ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// 无会话
    Idle,
    /// 认证进行中
    Authenticating,
    /// 已认证，求解器进程可能尚未启动
    Ready,
    /// 已请求任务，等待求解器下发
    WaitingForTask,
    /// 任务已收到，窗口展示中
    Presenting,
    /// 窗口就绪，等待人工解答
    AwaitingSolution,
    /// 解答已提交，等待求解器确认
    Submitting,
}

impl DispatcherState {
    /// 是否存在未完结的任务（展示中或等待解答）
    pub fn has_task_in_flight(self) -> bool {
        matches!(
            self,
            DispatcherState::Presenting | DispatcherState::AwaitingSolution
        )
    }
}
