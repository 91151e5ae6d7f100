//! 渲染上下文池
//!
//! 同一个浏览器下打开 N 个 Page，供 worker 各自独占使用

use std::time::Duration;

use chromiumoxide::Browser;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::PageContext;

pub struct PagePool {
    contexts: Vec<PageContext>,
}

impl PagePool {
    /// 打开 `count` 个渲染上下文；任何一个打不开都视为基础设施错误
    pub async fn open(browser: &Browser, count: usize, page_timeout: Duration) -> AppResult<Self> {
        let mut contexts = Vec::with_capacity(count);
        for i in 0..count {
            let page = browser.new_page("about:blank").await?;
            debug!("渲染上下文 {} 已创建", i + 1);
            contexts.push(PageContext::new(page, page_timeout));
        }
        info!("✓ 已打开 {} 个渲染上下文", contexts.len());
        Ok(Self { contexts })
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// 每个 worker 一份（Page 内部是 Arc，clone 不会新建页面）
    pub fn contexts(&self) -> Vec<PageContext> {
        self.contexts.clone()
    }

    /// 关闭全部页面，单个失败只记录警告
    pub async fn close_all(self) {
        for (i, context) in self.contexts.into_iter().enumerate() {
            if let Err(e) = context.close().await {
                warn!("关闭渲染上下文 {} 失败: {}", i + 1, e);
            }
        }
    }
}
