//! # Captcha Desk
//!
//! 验证码人工处理的桌面编排器：监督外部求解器子进程，
//! 把它下发的任务交给真人完成，再把 token 提交回去
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `protocol/` - 行协议编解码（命令编码、消息分类）
//! - `solver/` - 求解器进程监督，唯一的子进程 owner
//! - `models/` - 任务 / 解答 / 状态 / 会话数据模型
//!
//! ### ② 业务能力层（Services）
//! - `auth/` - 认证网关（一次性进程调用，取会话与余额）
//! - `surface/` - 验证码窗口（唯一页面的懒创建与复用、组件注入）
//!
//! ### ③ 流程层（Workflow）
//! - `dispatcher/` - 任务调度状态机
//!   （请求 → 展示 → 人工解答 → 提交 → 下一个任务）
//!
//! ### ④ 编排层（Orchestration）
//! - `app` - 事件循环：三路事件源汇入单个 select 循环
//!
//! ## 模块结构

pub mod app;
pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logger;
pub mod models;
pub mod protocol;
pub mod solver;
pub mod surface;

// 重新导出常用类型
pub use app::App;
pub use auth::{AuthError, AuthGateway};
pub use config::Config;
pub use dispatcher::{DispatcherState, TaskDispatcher};
pub use error::{AppError, AppResult};
pub use models::{Session, Solution, StatusMessage, Task};
pub use protocol::{classify_line, SolverCommand, SolverMessage};
pub use solver::{SolverControl, SolverEvent, SolverSupervisor};
pub use surface::{ChallengeSurface, ChromiumSurface, SurfaceEvent};
