use anyhow::Result;
use captcha_desk::app::App;
use captcha_desk::config::Config;
use captcha_desk::logger;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init();

    // 加载配置
    let config = Config::load();

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
