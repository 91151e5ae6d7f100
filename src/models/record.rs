use chrono::{SecondsFormat, Utc};

use crate::models::Identity;

/// CSV 列顺序（固定）
pub const CSV_HEADERS: [&str; 17] = [
    "id",
    "name",
    "role",
    "badge_number",
    "title",
    "company",
    "location",
    "summary",
    "company_services_provided",
    "regions",
    "interested_in",
    "sponsor_company_name",
    "sponsor_company_summary",
    "sponsor_level",
    "sponsor_website",
    "profile_url",
    "scraped_at",
];

/// 一条完整的参会者记录，对应 CSV 中的一行
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendeeRecord {
    pub id: String,
    pub name: String,
    pub role: String,
    pub badge_number: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub summary: String,
    pub company_services_provided: String,
    pub regions: String,
    pub interested_in: String,
    pub sponsor_company_name: String,
    pub sponsor_company_summary: String,
    pub sponsor_level: String,
    pub sponsor_website: String,
    pub profile_url: String,
    /// 抓取时间（RFC 3339）
    pub scraped_at: String,
}

impl AttendeeRecord {
    /// 以身份信息为底创建记录，`scraped_at` 取当前时间
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.name.clone(),
            profile_url: identity.detail_ref.clone(),
            scraped_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ..Default::default()
        }
    }

    /// 按 `CSV_HEADERS` 的顺序输出字段
    pub fn to_row(&self) -> [&str; 17] {
        [
            &self.id,
            &self.name,
            &self.role,
            &self.badge_number,
            &self.title,
            &self.company,
            &self.location,
            &self.summary,
            &self.company_services_provided,
            &self.regions,
            &self.interested_in,
            &self.sponsor_company_name,
            &self.sponsor_company_summary,
            &self.sponsor_level,
            &self.sponsor_website,
            &self.profile_url,
            &self.scraped_at,
        ]
    }
}

/// 拆分 "Title at Company"，按第一个 " at " 分割
pub fn split_title_company(text: &str) -> (String, String) {
    match text.split_once(" at ") {
        Some((title, company)) => (title.trim().to_string(), company.trim().to_string()),
        None => (text.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_identity_fills_key_fields() {
        let identity = Identity::new("123", "Ada Lovelace", "/app/profile/123");
        let record = AttendeeRecord::for_identity(&identity);
        assert_eq!(record.id, "123");
        assert_eq!(record.name, "Ada Lovelace");
        assert_eq!(record.profile_url, "/app/profile/123");
        assert!(chrono::DateTime::parse_from_rfc3339(&record.scraped_at).is_ok());
    }

    #[test]
    fn test_row_matches_header_order() {
        let mut record = AttendeeRecord::for_identity(&Identity::new("1", "A", "/p/1"));
        record.sponsor_level = "Gold".into();
        let row = record.to_row();
        assert_eq!(row.len(), CSV_HEADERS.len());
        let idx = CSV_HEADERS.iter().position(|h| *h == "sponsor_level").unwrap();
        assert_eq!(row[idx], "Gold");
        assert_eq!(row[0], "1");
        assert_eq!(row[15], "/p/1");
    }

    #[test]
    fn test_split_title_company() {
        assert_eq!(
            split_title_company("Head of Data at Acme at Large"),
            ("Head of Data".to_string(), "Acme at Large".to_string())
        );
        assert_eq!(
            split_title_company("Founder"),
            ("Founder".to_string(), String::new())
        );
    }
}
