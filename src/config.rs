use serde::Deserialize;
use tracing::warn;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 求解器二进制路径
    pub solver_path: String,
    /// 进程启动后到首次请求任务的稳定延迟（毫秒）
    pub settle_delay_ms: u64,
    /// 轮询验证码 token 的间隔（毫秒）
    pub token_poll_interval_ms: u64,
    /// 验证码窗口宽度
    pub window_width: u32,
    /// 验证码窗口高度
    pub window_height: u32,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 浏览器可执行文件路径（空则使用系统默认）
    pub chrome_executable: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solver_path: "./captcha_cli".to_string(),
            settle_delay_ms: 1000,
            token_poll_interval_ms: 500,
            window_width: 1000,
            window_height: 800,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            chrome_executable: None,
        }
    }
}

impl Config {
    /// 加载配置：config.toml（如存在）为底，环境变量覆盖
    pub fn load() -> Self {
        let base = Self::from_toml_file("config.toml").unwrap_or_default();
        base.apply_env()
    }

    /// 从 TOML 文件加载配置
    ///
    /// 文件不存在或解析失败时返回 None（记录警告后回退默认值）
    pub fn from_toml_file(path: &str) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("⚠️ 配置文件解析失败 ({}): {}", path, e);
                None
            }
        }
    }

    /// 用环境变量覆盖各字段
    pub fn apply_env(self) -> Self {
        Self {
            solver_path: std::env::var("SOLVER_PATH").unwrap_or(self.solver_path),
            settle_delay_ms: std::env::var("SETTLE_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.settle_delay_ms),
            token_poll_interval_ms: std::env::var("TOKEN_POLL_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.token_poll_interval_ms),
            window_width: std::env::var("WINDOW_WIDTH").ok().and_then(|v| v.parse().ok()).unwrap_or(self.window_width),
            window_height: std::env::var("WINDOW_HEIGHT").ok().and_then(|v| v.parse().ok()).unwrap_or(self.window_height),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(self.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(self.output_log_file),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().or(self.chrome_executable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.solver_path, "./captcha_cli");
        assert_eq!(config.settle_delay_ms, 1000);
        assert_eq!(config.window_width, 1000);
        assert_eq!(config.window_height, 800);
    }

    #[test]
    fn test_from_toml_str() {
        let config: Config =
            toml::from_str("solver_path = \"/opt/captcha_cli\"\nsettle_delay_ms = 200\n").unwrap();
        assert_eq!(config.solver_path, "/opt/captcha_cli");
        assert_eq!(config.settle_delay_ms, 200);
        // 未出现的字段保持默认
        assert_eq!(config.token_poll_interval_ms, 500);
    }

    #[test]
    fn test_missing_file_returns_none() {
        assert!(Config::from_toml_file("definitely_missing_config.toml").is_none());
    }
}
