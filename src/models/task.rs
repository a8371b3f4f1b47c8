//! 任务与解答数据模型
//!
//! 与求解器子进程的 JSON 行协议共用同一套序列化结构

use serde::{Deserialize, Serialize};

/// 一个待人工处理的验证码任务
///
/// 只有同时携带 `url` 和 `sitekey` 的消息才会被识别为任务，
/// 缺少任一字段的消息在协议分类阶段就会被过滤掉
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    pub url: String,
    pub sitekey: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
}

impl Task {
    /// 日志用的简短描述
    pub fn describe(&self) -> String {
        match self.task_id {
            Some(id) => format!("任务 #{} ({})", id, self.url),
            None => format!("任务 ({})", self.url),
        }
    }
}

/// 人工完成验证码后产生的解答
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Solution {
    #[serde(default)]
    pub task_id: Option<i64>,
    pub token: String,
}
