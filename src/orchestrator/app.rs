//! 应用入口 - 编排层
//!
//! 唯一持有 Browser 的模块：启动浏览器、打开渲染上下文、登录，
//! 然后把页面包装成目录页和提取器交给 `Crawl`。

use std::sync::Arc;

use anyhow::{Context, Result};
use chromiumoxide::Browser;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::browser;
use crate::config::Config;
use crate::infrastructure::PagePool;
use crate::models::CrawlSummary;
use crate::orchestrator::crawl::Crawl;
use crate::services::{BrowserDetailExtractor, BrowserDirectory, Credentials, SessionProvider};
use crate::utils::logging::log_startup;

/// 应用主结构
pub struct App {
    config: Arc<Config>,
    browser: Browser,
    handler: JoinHandle<()>,
    pages: PagePool,
    session: Arc<SessionProvider>,
    crawl: Crawl,
}

impl App {
    /// 初始化应用：读凭据 → 打开进度 / 输出 → 启动浏览器 → 恢复会话并登录
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let credentials = Credentials::from_env().context("读取登录凭据失败")?;
        let config = Arc::new(config);
        let crawl = Crawl::open(config.clone())
            .await
            .context("打开进度文件或输出文件失败")?;

        let (browser, handler) = browser::launch_browser(&config).await?;
        let pages = PagePool::open(&browser, config.concurrency, config.page_timeout)
            .await
            .context("打开渲染上下文失败")?;
        let session = Arc::new(SessionProvider::new(&config, credentials));

        let first = pages
            .contexts()
            .into_iter()
            .next()
            .context("没有可用的渲染上下文")?;
        session.restore(&first).await.context("恢复会话失败")?;
        session
            .ensure_authenticated(&first)
            .await
            .context("登录失败")?;
        info!("✓ 会话就绪，{} 个 worker 共享", pages.len());

        Ok(Self {
            config,
            browser,
            handler,
            pages,
            session,
            crawl,
        })
    }

    /// 运行抓取；出现致命错误时先尽量把进度写盘再返回错误
    pub async fn run(&self) -> Result<CrawlSummary> {
        let contexts = self.pages.contexts();
        let directory_page = contexts
            .first()
            .cloned()
            .context("没有可用的渲染上下文")?;
        let directory =
            BrowserDirectory::new(directory_page, self.session.clone(), self.config.clone());
        let extractors: Vec<BrowserDetailExtractor> = contexts
            .into_iter()
            .map(|page| BrowserDetailExtractor::new(page, self.session.clone(), self.config.clone()))
            .collect();

        match self.crawl.run(&directory, extractors).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!("❌ 抓取中止: {}", e);
                if let Err(save_err) = self.crawl.store().save().await {
                    error!("保存进度失败: {}", save_err);
                } else {
                    info!("💾 进度已保存至 {}", self.crawl.store().path().display());
                }
                Err(e).context("抓取中止")
            }
        }
    }

    /// 关闭页面和浏览器
    pub async fn shutdown(self) {
        let Self {
            mut browser,
            handler,
            pages,
            ..
        } = self;

        pages.close_all().await;
        if let Err(e) = browser.close().await {
            warn!("关闭浏览器失败: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("等待浏览器进程退出失败: {}", e);
        }
        handler.abort();
        info!("👋 浏览器已关闭");
    }
}
