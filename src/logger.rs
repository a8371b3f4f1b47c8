//! 日志工具模块
//!
//! 提供 tracing 初始化、运行日志文件头和日志格式化辅助函数

use anyhow::Result;
use std::fs;
use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅器
///
/// 默认级别 info，可通过 RUST_LOG 环境变量覆盖。
/// 重复调用是安全的（测试中常见）。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化运行日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n验证码处理日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 截断长文本用于日志显示（例如验证码 token 预览）
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_text("abc", 10), "abc");
    }

    #[test]
    fn test_truncate_long_text() {
        assert_eq!(truncate_text("abcdefgh", 4), "abcd...");
    }
}
