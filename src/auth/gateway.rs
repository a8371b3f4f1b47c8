//! 认证网关 - 业务能力层
//!
//! 只负责"验证 API Key 并取余额"能力：拉起一次性的
//! `captcha_cli auth` 进程，写入握手行，收集全部输出后
//! 解析为单个 JSON 对象。调用是幂等的，可重复用于余额刷新。

use std::process::Stdio;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::models::Session;
use crate::protocol::SolverCommand;

/// 认证错误
#[derive(Debug, Error)]
pub enum AuthError {
    /// 服务端拒绝（错误的 Key 等），携带响应中的 message
    #[error("认证被拒绝: {0}")]
    Rejected(String),
    /// 响应不是合法的 JSON 对象
    #[error("无效的认证响应")]
    InvalidResponse,
    /// 认证进程无法启动（二进制缺失、无执行权限）
    #[error("无法启动认证进程 ({path}): {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 与认证进程交互时的 IO 错误
    #[error("认证进程 IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 认证网关
pub struct AuthGateway {
    solver_path: String,
}

impl AuthGateway {
    /// 创建认证网关
    pub fn new(solver_path: impl Into<String>) -> Self {
        Self {
            solver_path: solver_path.into(),
        }
    }

    /// 验证 API Key，成功则返回带余额的会话
    ///
    /// 独立于长驻求解器进程：每次调用拉起一个只带握手命令的
    /// 短生命周期进程，进程关闭后解析其累计输出。
    pub async fn authenticate(&self, api_key: &str) -> Result<Session, AuthError> {
        info!("🔐 正在验证 API Key...");

        let mut child = Command::new(&self.solver_path)
            .arg("auth")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AuthError::Spawn {
                path: self.solver_path.clone(),
                source,
            })?;

        // 写入握手行后立即关闭 stdin，让子进程自然结束
        if let Some(mut stdin) = child.stdin.take() {
            let line = SolverCommand::Handshake {
                api_key: api_key.to_string(),
            }
            .encode_line();
            stdin.write_all(line.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            if !line.trim().is_empty() {
                warn!("📟 认证进程 stderr: {}", line);
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("认证进程输出: {}", stdout.trim());

        let session = parse_auth_response(&stdout, api_key)?;
        info!("✅ 认证成功，余额: {}", session.balance);
        Ok(session)
    }
}

/// 解析认证进程的累计输出
///
/// `status == "ok"` 产生会话（余额缺省为 0）；
/// 其他状态返回携带响应 message 的拒绝错误；
/// 解析失败返回无效响应错误。
pub(crate) fn parse_auth_response(output: &str, api_key: &str) -> Result<Session, AuthError> {
    let value: JsonValue =
        serde_json::from_str(output.trim()).map_err(|_| AuthError::InvalidResponse)?;

    match value.get("status").and_then(JsonValue::as_str) {
        Some("ok") => {
            let balance = value
                .get("balance")
                .and_then(JsonValue::as_f64)
                .unwrap_or(0.0);
            Ok(Session::new(api_key, balance))
        }
        _ => {
            let message = value
                .get("message")
                .and_then(JsonValue::as_str)
                .unwrap_or("invalid response")
                .to_string();
            Err(AuthError::Rejected(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok_with_balance() {
        let session = parse_auth_response(r#"{"status":"ok","balance":42.5}"#, "GOOD").unwrap();
        assert_eq!(session.api_key, "GOOD");
        assert_eq!(session.balance, 42.5);
        assert!(session.authenticated);
    }

    #[test]
    fn test_parse_ok_without_balance_defaults_to_zero() {
        let session = parse_auth_response(r#"{"status":"ok"}"#, "GOOD").unwrap();
        assert_eq!(session.balance, 0.0);
    }

    #[test]
    fn test_parse_error_carries_message() {
        let err = parse_auth_response(r#"{"status":"error","message":"invalid"}"#, "BAD")
            .expect_err("错误状态不应产生会话");
        match err {
            AuthError::Rejected(message) => assert_eq!(message, "invalid"),
            other => panic!("应为拒绝错误: {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_without_message_uses_generic() {
        let err = parse_auth_response(r#"{"status":"error"}"#, "BAD").expect_err("应失败");
        assert!(matches!(err, AuthError::Rejected(m) if m == "invalid response"));
    }

    #[test]
    fn test_parse_garbage_is_invalid_response() {
        let err = parse_auth_response("плохой ответ", "KEY").expect_err("应失败");
        assert!(matches!(err, AuthError::InvalidResponse));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_distinct() {
        let gateway = AuthGateway::new("/nonexistent/captcha_cli_missing");
        let err = gateway.authenticate("KEY").await.expect_err("应失败");
        assert!(matches!(err, AuthError::Spawn { .. }));
    }

    /// 需要真实的求解器二进制：cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_authenticate_against_real_binary() {
        let _ = tracing_subscriber::fmt::try_init();

        let gateway = AuthGateway::new("./captcha_cli");
        let result = gateway.authenticate("test-key").await;
        println!("认证结果: {:?}", result);
    }
}
