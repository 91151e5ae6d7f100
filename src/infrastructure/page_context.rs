//! 渲染上下文 - 基础设施层
//!
//! 持有一个 Page 资源，只暴露"导航 / 等待 / 执行 JS"的能力

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam};
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::error::{AppResult, ScrapeError};

/// 元素轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 渲染上下文
///
/// 职责：
/// - 持有一个 Page（同一浏览器下的 Page 共享 cookie，即共享登录会话）
/// - 每个操作都有独立的超时
/// - 不认识参会者 / 列表
#[derive(Clone)]
pub struct PageContext {
    page: Page,
    timeout: Duration,
}

impl PageContext {
    /// 创建新的渲染上下文
    ///
    /// `timeout` 用于页面导航
    pub fn new(page: Page, timeout: Duration) -> Self {
        Self { page, timeout }
    }

    /// 导航到指定地址并等待加载完成
    pub async fn goto(&self, url: &str) -> AppResult<()> {
        debug!("导航到: {}", url);
        timeout(self.timeout, self.page.goto(url))
            .await
            .map_err(|_| ScrapeError::timeout(format!("导航到 {}", url), self.timeout))??;
        Ok(())
    }

    /// 当前地址
    pub async fn current_url(&self) -> AppResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    /// 在限定时间内等待选择器出现
    pub async fn wait_for_selector(&self, selector: &str, wait: Duration) -> AppResult<()> {
        let deadline = Instant::now() + wait;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::timeout(format!("等待元素 {}", selector), wait));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// 在限定时间内等待地址满足条件，返回最后一次看到的地址
    pub async fn wait_for_url<F>(&self, wait: Duration, mut predicate: F) -> AppResult<Result<String, String>>
    where
        F: FnMut(&str) -> bool,
    {
        let deadline = Instant::now() + wait;
        loop {
            let url = self.current_url().await?;
            if predicate(&url) {
                return Ok(Ok(url));
            }
            if Instant::now() >= deadline {
                return Ok(Err(url));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        Ok(result.into_value()?)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        Ok(serde_json::from_value(json_value)?)
    }

    /// 点击第一个匹配选择器、可见且文本包含 `text` 的元素
    ///
    /// 返回是否找到并点击
    pub async fn click_text(&self, selector: &str, text: &str) -> AppResult<bool> {
        let js_code = format!(
            r#"
            (() => {{
                const want = {};
                const el = Array.from(document.querySelectorAll({}))
                    .find(n => (n.textContent || '').trim().includes(want) && n.offsetParent !== null);
                if (!el) return false;
                el.click();
                return true;
            }})()
            "#,
            serde_json::to_string(text)?,
            serde_json::to_string(selector)?
        );
        self.eval_as(js_code).await
    }

    /// 向输入框填入内容
    pub async fn fill(&self, selector: &str, value: &str) -> AppResult<()> {
        let element = self.page.find_element(selector).await?;
        element.click().await?.type_str(value).await?;
        Ok(())
    }

    /// 读取当前会话的全部 cookie
    pub async fn cookies(&self) -> AppResult<Vec<Cookie>> {
        Ok(self.page.get_cookies().await?)
    }

    /// 写入 cookie
    pub async fn set_cookies(&self, cookies: Vec<CookieParam>) -> AppResult<()> {
        if !cookies.is_empty() {
            self.page.set_cookies(cookies).await?;
        }
        Ok(())
    }

    /// 关闭页面
    pub async fn close(self) -> AppResult<()> {
        self.page.close().await?;
        Ok(())
    }
}
