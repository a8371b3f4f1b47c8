//! 会话数据模型

/// 认证成功后的用户会话
///
/// 同一时刻只存在一个会话（单用户桌面进程）；
/// API Key 只保存在内存中，核心代码从不落盘
#[derive(Debug, Clone)]
pub struct Session {
    pub api_key: String,
    pub balance: f64,
    pub authenticated: bool,
}

impl Session {
    /// 由认证响应创建会话
    pub fn new(api_key: impl Into<String>, balance: f64) -> Self {
        Self {
            api_key: api_key.into(),
            balance,
            authenticated: true,
        }
    }
}
