//! 求解器状态消息模型

use serde::{Deserialize, Serialize};

/// 已知的非任务状态值
pub const RECOGNIZED_STATUSES: [&str; 3] = ["ok", "error", "solution_saved"];

/// 求解器输出的状态消息（认证确认、错误、提交确认）
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusMessage {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    pub fn is_error(&self) -> bool {
        self.status == "error"
    }

    pub fn is_solution_saved(&self) -> bool {
        self.status == "solution_saved"
    }
}
