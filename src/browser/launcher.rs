use anyhow::{Context, Result};
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::Config;

/// 启动浏览器（无头或有界面）
///
/// 返回浏览器和后台事件处理任务，关闭浏览器后应等待该任务结束
pub async fn launch_browser(config: &Config) -> Result<(Browser, JoinHandle<()>)> {
    info!(
        "🚀 启动{}浏览器...",
        if config.headed { "有界面" } else { "无头" }
    );

    let mut builder = BrowserConfig::builder()
        .request_timeout(config.page_timeout)
        .args(vec![
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
        ]);
    builder = if config.headed {
        builder.with_head()
    } else {
        builder.new_headless_mode()
    };
    if let Some(path) = &config.chrome_executable {
        debug!("使用浏览器: {}", path.display());
        builder = builder.chrome_executable(path);
    }

    let browser_config = builder.build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        anyhow::anyhow!("配置浏览器失败: {}", e)
    })?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("启动浏览器失败")?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    let handler_task = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    info!("✅ 浏览器已就绪");
    Ok((browser, handler_task))
}
