use anyhow::Result;
use attendee_scraper::utils::logging;
use attendee_scraper::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // .env 不存在也没关系
    let _ = dotenvy::dotenv();

    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::load()?;

    // 初始化并运行应用
    let app = App::initialize(config.clone()).await?;
    let result = app.run().await;
    app.shutdown().await;

    let summary = result?;
    logging::print_final_summary(&summary, &config);

    Ok(())
}
