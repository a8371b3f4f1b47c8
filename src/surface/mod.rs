//! 验证码展示层
//!
//! 负责把任务呈现给真人并把解答送回调度器。
//! 同一时刻最多存在一个存活窗口，跨任务复用而非反复重建。

pub mod chromium;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{Solution, Task};

/// 展示层向调度器转发的事件
#[derive(Debug)]
pub enum SurfaceEvent {
    /// 真人完成验证码，携带 token（每个任务最多触发一次）
    Solved(Solution),
    /// 窗口被用户关闭或页面失联，等价于放弃当前任务
    Abandoned,
}

/// 验证码展示接口
///
/// 声明式契约：加载挑战页并注入组件，解答通过事件通道送回。
/// 核心代码从不自行拼接页面结构以外的内容。
#[async_trait]
pub trait ChallengeSurface: Send {
    /// 确保唯一窗口存在（懒创建/复用），加载任务页面并注入组件
    async fn present(&mut self, task: &Task) -> AppResult<()>;
    /// 销毁当前窗口；窗口不存在时为幂等空操作
    async fn close(&mut self) -> AppResult<()>;
}

pub use chromium::ChromiumSurface;
