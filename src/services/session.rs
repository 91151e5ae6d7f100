//! 会话服务 - 业务能力层
//!
//! 只负责"保证已登录"能力：检查当前地址、必要时执行登录、保存 / 恢复会话

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppResult, AuthError, ScrapeError};
use crate::infrastructure::PageContext;

pub const EMAIL_VAR: &str = "SCRAPER_EMAIL";
pub const PASSWORD_VAR: &str = "SCRAPER_PASSWORD";

/// 登录表单每一步的等待
const FORM_STEP_WAIT: Duration = Duration::from_secs(10);

/// 登录凭据
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// 从环境变量读取，缺失或为空都视为错误
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |var_name: &'static str| {
            lookup(var_name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(AuthError::MissingCredentials { var_name })
        };
        Ok(Self::new(read(EMAIL_VAR)?, read(PASSWORD_VAR)?))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// 保存到会话文件中的 cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
}

impl From<&Cookie> for StoredCookie {
    fn from(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            secure: cookie.secure,
            http_only: cookie.http_only,
        }
    }
}

impl StoredCookie {
    fn to_param(&self) -> Result<CookieParam, String> {
        CookieParam::builder()
            .name(self.name.clone())
            .value(self.value.clone())
            .domain(self.domain.clone())
            .path(self.path.clone())
            .secure(self.secure)
            .http_only(self.http_only)
            .build()
    }
}

/// 会话文件内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub saved_at: DateTime<Utc>,
    pub cookies: Vec<StoredCookie>,
}

/// 会话服务
///
/// 所有 worker 共享一个实例；登录过程用锁串行化，
/// 拿到锁后会重新检查地址，别的 worker 刚登录过就直接返回
pub struct SessionProvider {
    credentials: Credentials,
    state_path: PathBuf,
    entry_url: String,
    app_marker: String,
    login_marker: String,
    login_timeout: Duration,
    login_lock: Mutex<()>,
}

impl SessionProvider {
    pub fn new(config: &Config, credentials: Credentials) -> Self {
        Self {
            credentials,
            state_path: config.session_state_path(),
            entry_url: config.entry_url(),
            app_marker: config.app_marker.clone(),
            login_marker: config.login_marker.clone(),
            login_timeout: config.login_timeout,
            login_lock: Mutex::new(()),
        }
    }

    /// 地址是否处于已认证区域
    pub fn is_authenticated_url(&self, url: &str) -> bool {
        url.contains(&self.app_marker) && !url.contains(&self.login_marker)
    }

    /// 地址是否是登录页
    pub fn is_login_url(&self, url: &str) -> bool {
        url.contains(&self.login_marker)
    }

    /// 读取会话文件，不存在时返回 None
    pub async fn load_state(path: &Path) -> AppResult<Option<SessionState>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ScrapeError::persist(path.display().to_string(), e)),
        }
    }

    /// 把已保存的会话写入页面，返回是否恢复了会话
    ///
    /// 会话文件损坏只记录警告，之后按未登录处理
    pub async fn restore(&self, page: &PageContext) -> AppResult<bool> {
        let state = match Self::load_state(&self.state_path).await {
            Ok(Some(state)) => state,
            Ok(None) => return Ok(false),
            Err(ScrapeError::Json(e)) => {
                warn!("⚠️ 会话文件无法解析，将重新登录: {}", e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let params: Vec<CookieParam> = state
            .cookies
            .iter()
            .filter_map(|cookie| match cookie.to_param() {
                Ok(param) => Some(param),
                Err(e) => {
                    debug!("跳过无效 cookie {}: {}", cookie.name, e);
                    None
                }
            })
            .collect();
        let count = params.len();
        page.set_cookies(params).await?;
        info!(
            "🔑 已加载保存的会话 ({} 个 cookie, 保存于 {})",
            count,
            state.saved_at.format("%Y-%m-%d %H:%M:%S")
        );
        Ok(count > 0)
    }

    /// 保证页面处于已登录状态（幂等）
    pub async fn ensure_authenticated(&self, page: &PageContext) -> AppResult<()> {
        if self.is_authenticated_url(&page.current_url().await?) {
            return Ok(());
        }

        let _guard = self.login_lock.lock().await;

        page.goto(&self.entry_url).await?;
        if self.is_authenticated_url(&page.current_url().await?) {
            info!("✓ 会话有效，无需登录");
            return Ok(());
        }

        self.login(page).await?;
        self.persist(page).await?;
        info!("✅ 登录成功，会话已保存");
        Ok(())
    }

    /// 多步登录：接受 cookie 提示 → 登录按钮 → 邮箱 → 密码 → 等待跳转
    async fn login(&self, page: &PageContext) -> AppResult<()> {
        info!("🔐 未登录，开始登录流程...");

        if page.click_text("button", "Accept All").await? {
            debug!("已接受 cookie 提示");
            sleep(Duration::from_secs(1)).await;
        }

        if !page.click_text("button", "Login").await? {
            debug!("落地页没有登录按钮，直接查找登录表单");
        }
        sleep(Duration::from_secs(2)).await;

        page.wait_for_selector("input#email", FORM_STEP_WAIT).await?;
        page.fill("input#email", &self.credentials.email).await?;
        sleep(Duration::from_millis(500)).await;
        page.click_text("button", "Login").await?;
        sleep(Duration::from_secs(2)).await;

        page.wait_for_selector("input#password", FORM_STEP_WAIT).await?;
        page.fill("input#password", &self.credentials.password).await?;
        sleep(Duration::from_millis(500)).await;
        page.click_text("button", "Login").await?;

        info!("⏳ 等待登录完成...");
        match page
            .wait_for_url(self.login_timeout, |url| self.is_authenticated_url(url))
            .await?
        {
            Ok(url) => {
                debug!("已跳转到: {}", url);
                Ok(())
            }
            Err(url) => Err(AuthError::Timeout {
                timeout: self.login_timeout,
                url,
            }
            .into()),
        }
    }

    /// 保存当前 cookie 到会话文件
    async fn persist(&self, page: &PageContext) -> AppResult<()> {
        let state = SessionState {
            saved_at: Utc::now(),
            cookies: page.cookies().await?.iter().map(StoredCookie::from).collect(),
        };
        let path = self.state_path.display().to_string();
        if let Some(parent) = self.state_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ScrapeError::persist(path.clone(), e))?;
        }
        let json = serde_json::to_string_pretty(&state)?;
        tokio::fs::write(&self.state_path, json)
            .await
            .map_err(|e| ScrapeError::persist(path, e))?;
        Ok(())
    }
}
