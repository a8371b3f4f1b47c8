use std::fmt;

use crate::auth::AuthError;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 求解器进程相关错误
    Process(ProcessError),
    /// 协议编解码错误
    Protocol(ProtocolError),
    /// 验证码窗口相关错误
    Surface(SurfaceError),
    /// 认证错误
    Auth(AuthError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Process(e) => write!(f, "进程错误: {}", e),
            AppError::Protocol(e) => write!(f, "协议错误: {}", e),
            AppError::Surface(e) => write!(f, "窗口错误: {}", e),
            AppError::Auth(e) => write!(f, "认证错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Process(e) => Some(e),
            AppError::Protocol(e) => Some(e),
            AppError::Surface(e) => Some(e),
            AppError::Auth(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 求解器进程相关错误
#[derive(Debug)]
pub enum ProcessError {
    /// 启动子进程失败（二进制不存在或无执行权限）
    SpawnFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 已有存活的求解器进程，拒绝重复启动
    AlreadyRunning,
    /// 没有存活的求解器进程，或其输入通道已关闭
    NotRunning,
    /// 写入求解器输入通道失败（与进程退出竞争时的正常降级）
    WriteFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::SpawnFailed { path, source } => {
                write!(f, "无法启动求解器 ({}): {}", path, source)
            }
            ProcessError::AlreadyRunning => {
                write!(f, "求解器进程已在运行")
            }
            ProcessError::NotRunning => {
                write!(f, "求解器进程未运行或输入通道不可写")
            }
            ProcessError::WriteFailed { source } => {
                write!(f, "写入求解器失败: {}", source)
            }
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::SpawnFailed { source, .. } | ProcessError::WriteFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 协议编解码错误
#[derive(Debug)]
pub enum ProtocolError {
    /// 单行 JSON 解析失败（该行被丢弃，流继续）
    DecodeFailed {
        line: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::DecodeFailed { line, source } => {
                write!(f, "JSON 解析失败 (行: {}): {}", line, source)
            }
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::DecodeFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

/// 验证码窗口相关错误
#[derive(Debug)]
pub enum SurfaceError {
    /// 启动浏览器失败
    BrowserLaunchFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 创建页面失败
    PageCreationFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    NavigationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::BrowserLaunchFailed { source } => {
                write!(f, "启动浏览器失败: {}", source)
            }
            SurfaceError::PageCreationFailed { source } => {
                write!(f, "创建页面失败: {}", source)
            }
            SurfaceError::NavigationFailed { url, source } => {
                write!(f, "导航到 {} 失败: {}", url, source)
            }
            SurfaceError::ScriptExecutionFailed { source } => {
                write!(f, "执行脚本失败: {}", source)
            }
        }
    }
}

impl std::error::Error for SurfaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SurfaceError::BrowserLaunchFailed { source }
            | SurfaceError::PageCreationFailed { source }
            | SurfaceError::NavigationFailed { source, .. }
            | SurfaceError::ScriptExecutionFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 读取配置文件失败
    FileReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    ParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileReadFailed { path, source } => {
                write!(f, "读取配置文件失败 ({}): {}", path, source)
            }
            ConfigError::ParseFailed { path, source } => {
                write!(f, "配置文件解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileReadFailed { source, .. }
            | ConfigError::ParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Surface(SurfaceError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Protocol(ProtocolError::DecodeFailed {
            line: String::new(), // serde 错误通常不携带原始行
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Process(ProcessError::WriteFailed {
            source: Box::new(err),
        })
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建子进程启动失败错误
    pub fn spawn_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Process(ProcessError::SpawnFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建导航失败错误
    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Surface(SurfaceError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建单行解码失败错误
    pub fn decode_failed(
        line: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Protocol(ProtocolError::DecodeFailed {
            line: line.into(),
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
