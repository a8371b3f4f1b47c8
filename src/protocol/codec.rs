//! 行协议编解码 - 基础设施层
//!
//! 出站：把命令编码为单行 JSON（以换行符结尾），写入求解器 stdin。
//! 入站：独立解析 stdout 的每一行，并按优先级分类：
//! 状态消息 → 任务 → 无法识别。
//! 状态优先的顺序保证认证确认不会被误认成任务。

use serde_json::{json, Value as JsonValue};

use crate::error::{AppError, AppResult};
use crate::models::{StatusMessage, Task, RECOGNIZED_STATUSES};

/// 发往求解器的命令
#[derive(Debug, Clone, PartialEq)]
pub enum SolverCommand {
    /// 握手：进程启动后立即发送一次
    Handshake { api_key: String },
    /// 请求下一个任务
    GetTask,
    /// 提交人工解答
    SubmitSolution {
        task_id: Option<i64>,
        solution: String,
    },
}

impl SolverCommand {
    /// 编码为一行 JSON（含结尾换行符）
    pub fn encode_line(&self) -> String {
        let value = match self {
            SolverCommand::Handshake { api_key } => json!({ "api_key": api_key }),
            SolverCommand::GetTask => json!({ "command": "get_task" }),
            SolverCommand::SubmitSolution { task_id, solution } => {
                let mut value = json!({
                    "command": "submit_solution",
                    "solution": solution,
                });
                if let Some(id) = task_id {
                    value["task_id"] = json!(id);
                }
                value
            }
        };
        format!("{}\n", value)
    }
}

/// 求解器输出的一条消息（封闭变体集合）
#[derive(Debug, Clone, PartialEq)]
pub enum SolverMessage {
    /// 非任务状态消息（ok / error / solution_saved）
    Status(StatusMessage),
    /// 一个完整的验证码任务
    Task(Task),
    /// 合法 JSON 但无法归类，调用方记录后丢弃
    Unrecognized(JsonValue),
}

/// 解析并分类一行求解器输出
///
/// 解析失败不致命：调用方记录该行并继续读下一行。
///
/// 分类优先级：
/// 1. 携带已知非任务 `status` 且不含 `url`/`sitekey` → 状态消息
/// 2. 同时携带 `url` 和 `sitekey` → 任务
/// 3. 其余 → 无法识别
pub fn classify_line(line: &str) -> AppResult<SolverMessage> {
    let value: JsonValue =
        serde_json::from_str(line.trim()).map_err(|e| AppError::decode_failed(line, e))?;

    let has_task_fields = value.get("url").and_then(JsonValue::as_str).is_some()
        && value.get("sitekey").and_then(JsonValue::as_str).is_some();

    if let Some(status) = value.get("status").and_then(JsonValue::as_str) {
        if RECOGNIZED_STATUSES.contains(&status) && !has_task_fields {
            let status: StatusMessage = serde_json::from_value(value)?;
            return Ok(SolverMessage::Status(status));
        }
    }

    if has_task_fields {
        let task: Task = serde_json::from_value(value)?;
        return Ok(SolverMessage::Task(task));
    }

    Ok(SolverMessage::Unrecognized(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_handshake() {
        let cmd = SolverCommand::Handshake {
            api_key: "KEY-1".to_string(),
        };
        assert_eq!(cmd.encode_line(), "{\"api_key\":\"KEY-1\"}\n");
    }

    #[test]
    fn test_encode_get_task() {
        assert_eq!(
            SolverCommand::GetTask.encode_line(),
            "{\"command\":\"get_task\"}\n"
        );
    }

    #[test]
    fn test_encode_submit_solution() {
        let cmd = SolverCommand::SubmitSolution {
            task_id: Some(7),
            solution: "tok".to_string(),
        };
        let value: JsonValue = serde_json::from_str(cmd.encode_line().trim()).unwrap();
        assert_eq!(value["command"], "submit_solution");
        assert_eq!(value["task_id"], 7);
        assert_eq!(value["solution"], "tok");
    }

    #[test]
    fn test_encode_submit_solution_without_task_id() {
        let cmd = SolverCommand::SubmitSolution {
            task_id: None,
            solution: "tok".to_string(),
        };
        let value: JsonValue = serde_json::from_str(cmd.encode_line().trim()).unwrap();
        assert!(value.get("task_id").is_none());
    }

    #[test]
    fn test_classify_status_ok() {
        let msg = classify_line(r#"{"status":"ok","balance":42.5}"#).unwrap();
        match msg {
            SolverMessage::Status(s) => {
                assert!(s.is_ok());
                assert_eq!(s.balance, Some(42.5));
            }
            other => panic!("应分类为状态消息: {:?}", other),
        }
    }

    #[test]
    fn test_classify_solution_saved_is_not_task() {
        // 提交确认绝不能触发展示
        let msg = classify_line(r#"{"status":"solution_saved"}"#).unwrap();
        assert!(matches!(msg, SolverMessage::Status(s) if s.is_solution_saved()));
    }

    #[test]
    fn test_classify_task() {
        let msg =
            classify_line(r#"{"url":"https://x","sitekey":"abc","task_id":7,"type":"v2"}"#)
                .unwrap();
        match msg {
            SolverMessage::Task(task) => {
                assert_eq!(task.url, "https://x");
                assert_eq!(task.sitekey, "abc");
                assert_eq!(task.task_id, Some(7));
                assert_eq!(task.kind.as_deref(), Some("v2"));
            }
            other => panic!("应分类为任务: {:?}", other),
        }
    }

    #[test]
    fn test_classify_task_without_optional_fields() {
        let msg = classify_line(r#"{"url":"https://x","sitekey":"abc"}"#).unwrap();
        assert!(matches!(msg, SolverMessage::Task(_)));
    }

    #[test]
    fn test_status_priority_over_task_fields() {
        // 已知状态 + 任务字段并存时，任务字段胜出（规则 1 要求"不含 url/sitekey"）
        let msg = classify_line(r#"{"status":"ok","url":"https://x","sitekey":"abc"}"#).unwrap();
        assert!(matches!(msg, SolverMessage::Task(_)));
    }

    #[test]
    fn test_classify_incomplete_task_is_unrecognized() {
        // 缺少 sitekey 的消息不是任务
        let msg = classify_line(r#"{"url":"https://x"}"#).unwrap();
        assert!(matches!(msg, SolverMessage::Unrecognized(_)));
    }

    #[test]
    fn test_classify_unknown_status_is_unrecognized() {
        let msg = classify_line(r#"{"status":"working"}"#).unwrap();
        assert!(matches!(msg, SolverMessage::Unrecognized(_)));
    }

    #[test]
    fn test_classify_invalid_json_is_error() {
        assert!(classify_line("not json at all").is_err());
        // 解码失败不影响下一行
        assert!(classify_line(r#"{"status":"ok"}"#).is_ok());
    }

    #[test]
    fn test_classify_error_status_carries_message() {
        let msg = classify_line(r#"{"status":"error","message":"invalid"}"#).unwrap();
        match msg {
            SolverMessage::Status(s) => {
                assert!(s.is_error());
                assert_eq!(s.message.as_deref(), Some("invalid"));
            }
            other => panic!("应分类为状态消息: {:?}", other),
        }
    }
}
