//! 详情提取服务 - 业务能力层
//!
//! 编排核心只依赖 `DetailExtractor` 的成功 / 失败约定，
//! 页面结构相关的选择器和文本规则都封装在 `BrowserDetailExtractor` 里。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppResult, AuthError, ScrapeError};
use crate::infrastructure::PageContext;
use crate::models::{split_title_company, AttendeeRecord, Identity};
use crate::services::SessionProvider;

/// 详情提取能力
///
/// - 成功返回一条记录
/// - 内容缺失返回 `ScrapeError::Extraction` / `ScrapeError::Timeout`
/// - 被重定向到登录页返回 `AuthError::Redirected`，调用方应先 `recover_session` 再重试同一身份
#[async_trait]
pub trait DetailExtractor: Send + Sync {
    async fn extract(&self, identity: &Identity) -> AppResult<AttendeeRecord>;

    /// 恢复会话（重新登录）
    async fn recover_session(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: DetailExtractor + ?Sized> DetailExtractor for Arc<T> {
    async fn extract(&self, identity: &Identity) -> AppResult<AttendeeRecord> {
        (**self).extract(identity).await
    }

    async fn recover_session(&self) -> AppResult<()> {
        (**self).recover_session().await
    }
}

/// 详情页主体元素
const NAME_SELECTOR: &str = r#"p[data-test^="thingName"]"#;

/// "Show more" 最多展开次数
const MAX_EXPANSIONS: usize = 5;

/// 页面脚本返回的原始字段
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawProfile {
    pub name: String,
    pub role: String,
    pub badge_number: String,
    pub title_company: String,
    pub location: String,
    pub summary: String,
    pub company_services: String,
    pub regions: String,
    pub interested_in: String,
    pub sponsor_company_name: String,
    pub sponsor_company_summary: String,
    pub sponsor_level: String,
    pub sponsor_website: String,
}

impl RawProfile {
    /// 组装成记录；页面上没有姓名时沿用列表页的姓名
    pub fn into_record(self, identity: &Identity) -> AttendeeRecord {
        let (title, company) = split_title_company(&self.title_company);
        let mut record = AttendeeRecord::for_identity(identity);
        if !self.name.trim().is_empty() {
            record.name = self.name.trim().to_string();
        }
        record.role = self.role;
        record.badge_number = self.badge_number;
        record.title = title;
        record.company = company;
        record.location = self.location;
        record.summary = self.summary;
        record.company_services_provided = self.company_services;
        record.regions = self.regions;
        record.interested_in = self.interested_in;
        record.sponsor_company_name = self.sponsor_company_name;
        record.sponsor_company_summary = self.sponsor_company_summary;
        record.sponsor_level = self.sponsor_level;
        record.sponsor_website = self.sponsor_website;
        record
    }
}

/// 基于浏览器的详情提取器，每个 worker 一个（独占一个渲染上下文）
pub struct BrowserDetailExtractor {
    page: PageContext,
    session: Arc<SessionProvider>,
    config: Arc<Config>,
}

impl BrowserDetailExtractor {
    pub fn new(page: PageContext, session: Arc<SessionProvider>, config: Arc<Config>) -> Self {
        Self {
            page,
            session,
            config,
        }
    }

    /// 点开所有 "Show more"
    async fn expand_sections(&self) {
        for _ in 0..MAX_EXPANSIONS {
            match self.page.click_text("button", "Show more").await {
                Ok(true) => sleep(Duration::from_secs(1)).await,
                _ => break,
            }
        }
    }
}

#[async_trait]
impl DetailExtractor for BrowserDetailExtractor {
    async fn extract(&self, identity: &Identity) -> AppResult<AttendeeRecord> {
        let url = self.config.resolve_profile_url(&identity.detail_ref);
        debug!("打开详情页 {}: {}", identity.id, url);
        self.page.goto(&url).await?;

        let current = self.page.current_url().await?;
        if self.session.is_login_url(&current) {
            return Err(AuthError::Redirected { url: current }.into());
        }

        self.page
            .wait_for_selector(NAME_SELECTOR, self.config.detail_wait)
            .await
            .map_err(|e| ScrapeError::extraction(&identity.id, e.to_string()))?;
        // 角色、标签等区块晚于姓名渲染
        sleep(self.config.detail_settle).await;

        self.expand_sections().await;

        let raw: RawProfile = self
            .page
            .eval_as(EXTRACT_PROFILE_JS)
            .await
            .map_err(|e| ScrapeError::extraction(&identity.id, format!("页面脚本执行失败: {}", e)))?;
        Ok(raw.into_record(identity))
    }

    async fn recover_session(&self) -> AppResult<()> {
        self.session.ensure_authenticated(&self.page).await
    }
}

/// 站点相关的字段提取脚本
const EXTRACT_PROFILE_JS: &str = r#"
(() => {
    const out = {
        name: '', role: '', badgeNumber: '', titleCompany: '', location: '', summary: '',
        companyServices: '', regions: '', interestedIn: '', sponsorCompanyName: '',
        sponsorCompanySummary: '', sponsorLevel: '', sponsorWebsite: ''
    };
    const text = el => (el && el.textContent ? el.textContent.trim() : '');

    const nameEl = document.querySelector('p[data-test^="thingName"]');
    if (nameEl) {
        out.name = Array.from(nameEl.childNodes)
            .filter(n => n.nodeType === Node.TEXT_NODE)
            .map(n => (n.textContent || '').trim())
            .filter(Boolean)
            .join(' ')
            .replace(/\s+/g, ' ');
        const header = nameEl.closest('.is-fullwidth');
        if (header) {
            for (const p of header.querySelectorAll('p')) {
                const t = text(p);
                if (t.includes(' at ') && t.length < 300 && !p.hasAttribute('data-test')) {
                    out.titleCompany = t;
                    break;
                }
            }
        }
    }

    for (const small of document.querySelectorAll('small')) {
        const t = text(small);
        const roleMatch = t.match(/(Sponsor|Speaker|Attendee)\s*[•·]?/);
        if (!roleMatch) continue;
        out.role = roleMatch[1];
        out.badgeNumber = text(small.querySelector('a.is-underlined'));
        const locMatch = t.match(/[•·]\s*([A-Z][a-zA-Z\s]+,\s*[A-Z][a-zA-Z\s]+)/);
        if (locMatch) out.location = locMatch[1].trim();
        break;
    }

    for (const rtm of document.querySelectorAll('app-profile-rtm-display')) {
        const label = text(rtm.querySelector('span.has-text-color-primary'));
        if (!label) continue;
        const tags = Array.from(rtm.querySelectorAll('.metadata-field-tag-container .metadata-value-tag'))
            .map(text)
            .filter(Boolean);
        const rest = text(rtm).replace(label, '').trim();
        if (label.includes('Company Services')) {
            out.companyServices = tags.join('; ');
        } else if (label.includes('Sponsor Business Category')) {
            const v = tags.join('; ');
            out.companyServices = out.companyServices ? out.companyServices + '; ' + v : v;
        } else if (label === 'Region') {
            out.regions = tags.join('; ');
        } else if (label === 'Interested In') {
            out.interestedIn = tags.join('; ');
        } else if (label.includes('Sponsor Level')) {
            out.sponsorLevel = tags.join('; ');
        } else if (label === 'Website') {
            out.sponsorWebsite = tags.join('') || rest;
        } else if (label === 'Summary' && rest.length > 10) {
            if (rtm.closest('[data-test="companyContainer"]')) {
                out.sponsorCompanySummary = rest;
            } else {
                out.summary = rest;
            }
        }
    }

    if (!out.summary) {
        const info = document.querySelector('[data-test="infoContainer"]');
        const source = info ? info.innerText : document.body.innerText;
        const m = (source || '').match(/Summary\n([\s\S]+?)(?=\n(?:Company Services|Region|Interested|Sponsor|Details|Show less|Show more|$))/);
        if (m) out.summary = m[1].trim();
    }

    const company = document.querySelector('[data-test="companyContainer"]');
    if (company) {
        out.sponsorCompanyName = text(company.querySelector('a.is-header'));
        if (!out.sponsorCompanySummary) {
            const m = (company.innerText || '').match(/Summary\s*\n\s*([\s\S]+?)(?=\n\s*(Sponsor Level|Website|Show more|Show less|$))/);
            if (m) out.sponsorCompanySummary = m[1].trim();
        }
    }

    if (!out.sponsorWebsite) {
        const skip = ['grip.events', 'manife.st', 'apple.com', 'play.google.com'];
        for (const a of document.querySelectorAll('a[href^="http"]')) {
            const href = a.getAttribute('href') || '';
            if (!skip.some(s => href.includes(s))) {
                out.sponsorWebsite = href;
                break;
            }
        }
    }

    return out;
})()
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_record_splits_title_and_keeps_identity_fields() {
        let identity = Identity::new("77", "List Name", "/manifestvegas2026/app/profile/77");
        let raw: RawProfile = serde_json::from_value(serde_json::json!({
            "name": "  Page Name ",
            "role": "Sponsor",
            "titleCompany": "CTO at Example Corp",
            "companyServices": "Lending; Payments",
            "sponsorLevel": "Gold"
        }))
        .unwrap();

        let record = raw.into_record(&identity);
        assert_eq!(record.id, "77");
        assert_eq!(record.name, "Page Name");
        assert_eq!(record.title, "CTO");
        assert_eq!(record.company, "Example Corp");
        assert_eq!(record.company_services_provided, "Lending; Payments");
        assert_eq!(record.sponsor_level, "Gold");
        assert_eq!(record.profile_url, "/manifestvegas2026/app/profile/77");
        assert!(record.summary.is_empty());
    }

    #[test]
    fn test_into_record_falls_back_to_list_name() {
        let identity = Identity::new("78", "List Name", "/app/profile/78");
        let record = RawProfile::default().into_record(&identity);
        assert_eq!(record.name, "List Name");
        assert_eq!(record.title, "");
    }
}
