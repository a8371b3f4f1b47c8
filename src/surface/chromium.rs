//! 基于 Chromium 的验证码窗口实现
//!
//! 持有唯一的 Browser / Page 资源：
//! - 浏览器在首次展示时懒启动（带窗口）
//! - 页面跨任务复用，销毁后下一个任务再懒创建
//! - 对挑战页单独放开 CSP，第三方验证码脚本及其回调才能执行；
//!   放宽范围仅限验证码页面，从不涉及主程序
//! - 注入的组件在回调触发后立即移除自身 UI，
//!   解答通过轮询取回并经事件通道送回调度器

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::SetBypassCspParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, SurfaceError};
use crate::models::{Solution, Task};
use crate::surface::{ChallengeSurface, SurfaceEvent};

/// 连续轮询失败多少次后认定页面失联（窗口被用户关闭）
const POLL_FAILURE_LIMIT: u32 = 5;

/// 验证码窗口
pub struct ChromiumSurface {
    window_width: u32,
    window_height: u32,
    chrome_executable: Option<String>,
    poll_interval: Duration,
    browser: Option<Browser>,
    page: Option<Page>,
    poll_task: Option<JoinHandle<()>>,
    events: UnboundedSender<SurfaceEvent>,
}

impl ChromiumSurface {
    /// 创建验证码窗口管理器（浏览器尚未启动）
    pub fn new(config: &Config, events: UnboundedSender<SurfaceEvent>) -> Self {
        Self {
            window_width: config.window_width,
            window_height: config.window_height,
            chrome_executable: config.chrome_executable.clone(),
            poll_interval: Duration::from_millis(config.token_poll_interval_ms),
            browser: None,
            page: None,
            poll_task: None,
            events,
        }
    }

    /// 懒启动带窗口的浏览器
    async fn ensure_browser(&mut self) -> AppResult<()> {
        if self.browser.is_none() {
            info!("🚀 启动验证码浏览器窗口...");

            let mut builder = BrowserConfig::builder()
                .with_head()
                .window_size(self.window_width, self.window_height)
                .args(vec![
                    "--no-sandbox",
                    "--disable-dev-shm-usage",
                    "--remote-debugging-port=0",
                ]);
            if let Some(path) = &self.chrome_executable {
                builder = builder.chrome_executable(std::path::Path::new(path));
            }
            let config = builder
                .build()
                .map_err(|e| AppError::Other(format!("配置浏览器失败: {}", e)))?;

            let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
                AppError::Surface(SurfaceError::BrowserLaunchFailed {
                    source: Box::new(e),
                })
            })?;

            // 在后台处理浏览器事件
            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            // 添加短暂延迟以等待浏览器状态同步
            sleep(Duration::from_millis(300)).await;

            self.browser = Some(browser);
        }
        Ok(())
    }

    /// 复用或懒创建唯一页面
    async fn ensure_page(&mut self) -> AppResult<Page> {
        if self.page.is_none() {
            self.ensure_browser().await?;
            let browser = match self.browser.as_ref() {
                Some(browser) => browser,
                None => return Err(AppError::Other("浏览器未初始化".to_string())),
            };
            let page = browser.new_page("about:blank").await.map_err(|e| {
                AppError::Surface(SurfaceError::PageCreationFailed {
                    source: Box::new(e),
                })
            })?;
            self.page = Some(page);
        }

        match self.page.as_ref() {
            Some(page) => Ok(page.clone()),
            None => Err(AppError::Other("页面未初始化".to_string())),
        }
    }

    /// 终止上一个任务的轮询
    fn stop_polling(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }

    /// 启动解答轮询：组件回调把结果放入页面全局变量，
    /// 此处定期取回并送入事件通道
    fn start_polling(&mut self, page: Page) {
        let events = self.events.clone();
        let interval = self.poll_interval;
        self.poll_task = Some(tokio::spawn(async move {
            let mut failures = 0u32;
            loop {
                sleep(interval).await;
                match page.evaluate(POLL_JS).await {
                    Ok(result) => {
                        failures = 0;
                        let value = result.value().cloned().unwrap_or(JsonValue::Null);
                        if value.is_null() {
                            continue;
                        }
                        match serde_json::from_value::<Solution>(value) {
                            Ok(solution) => {
                                info!("✅ 验证码已由人工完成");
                                let _ = events.send(SurfaceEvent::Solved(solution));
                                break;
                            }
                            Err(e) => {
                                warn!("⚠️ 解答格式异常，忽略: {}", e);
                            }
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        debug!("轮询失败 ({}/{}): {}", failures, POLL_FAILURE_LIMIT, e);
                        if failures >= POLL_FAILURE_LIMIT {
                            // 页面失联：视为用户放弃当前任务
                            warn!("⚠️ 验证码页面失联，视为放弃任务");
                            let _ = events.send(SurfaceEvent::Abandoned);
                            break;
                        }
                    }
                }
            }
        }));
    }
}

#[async_trait]
impl ChallengeSurface for ChromiumSurface {
    async fn present(&mut self, task: &Task) -> AppResult<()> {
        self.stop_polling();
        let page = self.ensure_page().await?;

        // CSP 放宽仅作用于该挑战页面
        if let Err(e) = page.execute(SetBypassCspParams::new(true)).await {
            warn!("⚠️ 放开 CSP 失败: {}", e);
        }

        // 加载失败不致命：窗口保持可见但未解，用户可经菜单放弃
        if let Err(e) = page.goto(task.url.as_str()).await {
            error!("❌ 导航到 {} 失败: {}", task.url, e);
            return Ok(());
        }
        if let Err(e) = page.wait_for_navigation().await {
            debug!("等待页面加载完成失败: {}", e);
        }

        // 注入验证码组件（脚本错误只记录，不中断宿主进程）
        let inject_js = build_widget_js(task);
        match page.evaluate(inject_js).await {
            Ok(_) => debug!("✓ 验证码组件已注入"),
            Err(e) => warn!("⚠️ 注入验证码组件失败: {}", e),
        }

        self.start_polling(page);
        info!("🪟 验证码窗口已就绪: {}", task.describe());
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        self.stop_polling();
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("关闭页面失败（可能已被用户关闭）: {}", e);
            }
            info!("🗙 验证码窗口已关闭");
        }
        Ok(())
    }
}

/// 轮询脚本：取出并清空组件回调存放的解答
const POLL_JS: &str = r#"
(() => {
  const r = window.__captcha_result;
  if (r) { window.__captcha_result = null; }
  return r || null;
})()
"#;

/// 构建验证码组件注入脚本
///
/// 组件绑定任务的 sitekey（及 task_id），回调触发后
/// 立即移除自身 UI，每个任务最多触发一次
fn build_widget_js(task: &Task) -> String {
    // 经 serde_json 转义后再嵌入，防止 sitekey/task_id 破坏脚本结构
    let sitekey = serde_json::to_string(&task.sitekey).unwrap_or_else(|_| "\"\"".to_string());
    let task_id = serde_json::to_string(&task.task_id).unwrap_or_else(|_| "null".to_string());

    format!(
        r#"
(() => {{
  try {{
    window.__captcha_result = null;
    window.onCaptchaSolved = function (token) {{
      window.__captcha_result = {{ token: token, task_id: {task_id} }};
      const wrap = document.getElementById('captcha-wrapper');
      if (wrap) wrap.remove();
    }};

    const old = document.getElementById('captcha-wrapper');
    if (old) old.remove();

    const wrapper = document.createElement('div');
    wrapper.id = 'captcha-wrapper';
    wrapper.style = 'position: fixed; inset: 0; z-index: 999999; background: #0f172a; display: flex; align-items: center; justify-content: center;';

    const card = document.createElement('div');
    card.style = 'background: white; padding: 20px; border-radius: 10px; box-shadow: 0 0 20px rgba(0,0,0,0.3);';

    const title = document.createElement('h2');
    title.style = 'text-align: center; margin-bottom: 16px;';
    title.textContent = '请完成验证码';

    const widget = document.createElement('div');
    widget.className = 'g-recaptcha';
    widget.setAttribute('data-sitekey', {sitekey});
    widget.setAttribute('data-callback', 'onCaptchaSolved');

    card.appendChild(title);
    card.appendChild(widget);
    wrapper.appendChild(card);
    document.body.appendChild(wrapper);

    const script = document.createElement('script');
    script.src = 'https://www.google.com/recaptcha/api.js';
    document.body.appendChild(script);
    return true;
  }} catch (e) {{
    return String(e);
  }}
}})()
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widget_js_embeds_sitekey_escaped() {
        let task = Task {
            url: "https://x".to_string(),
            sitekey: "abc\"def".to_string(),
            kind: None,
            task_id: Some(7),
        };
        let js = build_widget_js(&task);
        assert!(js.contains(r#""abc\"def""#));
        assert!(js.contains("task_id: 7"));
        assert!(js.contains("data-callback"));
    }

    #[test]
    fn test_widget_js_without_task_id() {
        let task = Task {
            url: "https://x".to_string(),
            sitekey: "abc".to_string(),
            kind: None,
            task_id: None,
        };
        let js = build_widget_js(&task);
        assert!(js.contains("task_id: null"));
    }
}
