//! 列表发现服务 - 业务能力层
//!
//! 按页码翻阅参会者目录，收集去重后的身份列表。
//! 目录不提供总页数，连续 2 页没有新 id 即视为结束。

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppResult, ScrapeError};
use crate::infrastructure::PageContext;
use crate::models::Identity;
use crate::services::SessionProvider;
use crate::utils::DelayRange;

/// 连续多少页没有新 id 后停止
pub const EMPTY_PAGE_LIMIT: u32 = 2;

/// 参会者目录中的一页
#[async_trait]
pub trait DirectoryPage: Send + Sync {
    /// 加载第 `page_number` 页（从 1 开始）并返回其中的身份
    async fn load_page(&self, page_number: u32) -> AppResult<Vec<Identity>>;
}

/// 列表发现流程
pub struct ListDiscovery {
    delay: DelayRange,
    empty_page_limit: u32,
}

impl ListDiscovery {
    pub fn new(delay: DelayRange) -> Self {
        Self {
            delay,
            empty_page_limit: EMPTY_PAGE_LIMIT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.list_delay)
    }

    /// 翻页直到连续 `empty_page_limit` 页没有新 id
    ///
    /// 任何一页加载失败都直接返回错误（不重试）
    pub async fn discover<D>(&self, directory: &D) -> AppResult<Vec<Identity>>
    where
        D: DirectoryPage + ?Sized,
    {
        let mut identities: Vec<Identity> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut empty_page_streak = 0;
        let mut page_number = 1;

        info!("📋 开始按页码收集参会者...");

        loop {
            let found = directory.load_page(page_number).await?;
            let found_count = found.len();

            let mut new_count = 0;
            for identity in found {
                if seen.insert(identity.id.clone()) {
                    identities.push(identity);
                    new_count += 1;
                }
            }

            info!(
                "第 {} 页: 找到 {} 人 (新增 {}), 累计 {}",
                page_number,
                found_count,
                new_count,
                identities.len()
            );

            if new_count == 0 {
                empty_page_streak += 1;
                if empty_page_streak >= self.empty_page_limit {
                    info!("连续 {} 页没有新的参会者，收集结束", empty_page_streak);
                    break;
                }
            } else {
                empty_page_streak = 0;
            }

            page_number += 1;
            self.delay.wait().await;
        }

        info!(
            "✓ 共收集到 {} 位参会者 (翻阅 {} 页)",
            identities.len(),
            page_number
        );
        Ok(identities)
    }
}

/// 列表页上的原始链接
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileLink {
    pub href: String,
    pub text: String,
}

fn profile_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/profile/(\d+)").expect("合法的正则表达式"))
}

/// 从链接中解析身份：需要 `/profile/<数字>` 且文本长度大于 1，页内按 id 去重
pub fn parse_profile_links(links: &[ProfileLink]) -> Vec<Identity> {
    let mut seen = HashSet::new();
    links
        .iter()
        .filter_map(|link| {
            let id = profile_id_regex().captures(&link.href)?.get(1)?.as_str();
            let name = link.text.split_whitespace().collect::<Vec<_>>().join(" ");
            if name.chars().count() <= 1 || !seen.insert(id.to_string()) {
                return None;
            }
            Some(Identity::new(id, name, link.href.clone()))
        })
        .collect()
}

const COLLECT_LINKS_JS: &str = r#"
(() => Array.from(document.querySelectorAll('a[href*="/app/profile/"]')).map(a => ({
    href: a.getAttribute('href') || '',
    text: (a.textContent || '').trim()
})))()
"#;

/// 基于浏览器的目录页实现
pub struct BrowserDirectory {
    page: PageContext,
    session: Arc<SessionProvider>,
    config: Arc<Config>,
}

impl BrowserDirectory {
    pub fn new(page: PageContext, session: Arc<SessionProvider>, config: Arc<Config>) -> Self {
        Self {
            page,
            session,
            config,
        }
    }

    async fn render(&self, url: &str, page_number: u32) -> AppResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ScrapeError::discovery(page_number, e.to_string()))?;
        sleep(self.config.list_settle).await;
        Ok(())
    }
}

#[async_trait]
impl DirectoryPage for BrowserDirectory {
    async fn load_page(&self, page_number: u32) -> AppResult<Vec<Identity>> {
        let url = self.config.list_url(page_number);
        debug!("加载列表第 {} 页: {}", page_number, url);
        self.render(&url, page_number).await?;

        // 中途会话失效：重新登录后再加载一次
        if self.session.is_login_url(&self.page.current_url().await?) {
            warn!("⚠️ 列表第 {} 页被重定向到登录页，重新登录...", page_number);
            self.session.ensure_authenticated(&self.page).await?;
            self.render(&url, page_number).await?;
        }

        let links: Vec<ProfileLink> = self
            .page
            .eval_as(COLLECT_LINKS_JS)
            .await
            .map_err(|e| ScrapeError::discovery(page_number, e.to_string()))?;
        Ok(parse_profile_links(&links))
    }
}
