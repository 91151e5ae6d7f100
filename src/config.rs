use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::utils::delay::DelayRange;

/// 默认配置文件
pub const DEFAULT_CONFIG_FILE: &str = "scraper.toml";

/// 程序配置
///
/// 启动时构建一次，之后按引用传入各组件
#[derive(Clone, Debug)]
pub struct Config {
    /// 活动站点根地址
    pub base_url: String,
    /// 参会者列表地址模板，`{page}` 会被替换为页码
    pub list_url_template: String,
    /// 详情页相对链接的站点前缀
    pub profile_origin: String,
    /// 已认证区域的地址标记
    pub app_marker: String,
    /// 登录页地址标记
    pub login_marker: String,
    /// 并发 worker 数量
    pub concurrency: usize,
    /// 单次页面导航超时
    pub page_timeout: Duration,
    /// 详情页主体元素等待时长
    pub detail_wait: Duration,
    /// 登录跳转等待时长
    pub login_timeout: Duration,
    /// 列表页导航后的渲染等待
    pub list_settle: Duration,
    /// 详情页主体出现后的渲染等待
    pub detail_settle: Duration,
    /// 每个参会者的最大尝试次数
    pub max_retries: u32,
    /// 指数退避基准时长
    pub retry_base_delay: Duration,
    /// 列表翻页之间的礼貌延迟
    pub list_delay: DelayRange,
    /// 详情抓取之间的礼貌延迟
    pub detail_delay: DelayRange,
    /// 每处理 N 条后长暂停（0 表示关闭）
    pub batch_pause_every: usize,
    /// 长暂停时长
    pub batch_pause: Duration,
    /// 本次运行最多处理的条目数（冒烟测试用）
    pub item_limit: Option<usize>,
    /// 是否有界面运行浏览器
    pub headed: bool,
    /// 自定义 Chrome / Edge 可执行文件
    pub chrome_executable: Option<PathBuf>,
    /// 数据目录（会话、进度、CSV）
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let base_url = "https://matchmaking.grip.events/manifestvegas2026".to_string();
        Self {
            list_url_template: format!(
                "{}/app/home/network/list/121246?page={{page}}&sort=name",
                base_url
            ),
            base_url,
            profile_origin: "https://matchmaking.grip.events".to_string(),
            app_marker: "/app/".to_string(),
            login_marker: "event-login".to_string(),
            concurrency: 5,
            page_timeout: Duration::from_secs(30),
            detail_wait: Duration::from_secs(15),
            login_timeout: Duration::from_secs(30),
            list_settle: Duration::from_millis(2000),
            detail_settle: Duration::from_millis(1500),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(2000),
            list_delay: DelayRange::from_millis(1500, 2500),
            detail_delay: DelayRange::from_millis(500, 1000),
            batch_pause_every: 0,
            batch_pause: Duration::from_secs(60),
            item_limit: None,
            headed: false,
            chrome_executable: None,
            data_dir: PathBuf::from("data"),
        }
    }
}

/// TOML 配置文件结构，所有字段可选
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    list_url_template: Option<String>,
    profile_origin: Option<String>,
    concurrency: Option<usize>,
    page_timeout_ms: Option<u64>,
    detail_wait_ms: Option<u64>,
    login_timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    list_delay_ms: Option<[u64; 2]>,
    detail_delay_ms: Option<[u64; 2]>,
    batch_pause_every: Option<usize>,
    batch_pause_ms: Option<u64>,
    item_limit: Option<usize>,
    headed: Option<bool>,
    chrome_executable: Option<PathBuf>,
    data_dir: Option<PathBuf>,
}

impl Config {
    /// 加载配置：默认值 → TOML 文件（若存在）→ 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("SCRAPER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let mut config = if Path::new(&path).exists() {
            Self::from_toml_file(Path::new(&path))?
        } else {
            Self::default()
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// 只使用默认值和环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载（未出现的字段保持默认值）
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::InvalidFile { message, .. } => ConfigError::InvalidFile {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| ConfigError::InvalidFile {
            path: String::new(),
            message: e.to_string(),
        })?;

        let mut config = Self::default();
        if let Some(v) = file.base_url {
            config.base_url = v;
        }
        if let Some(v) = file.list_url_template {
            config.list_url_template = v;
        }
        if let Some(v) = file.profile_origin {
            config.profile_origin = v;
        }
        if let Some(v) = file.concurrency {
            config.concurrency = v;
        }
        if let Some(v) = file.page_timeout_ms {
            config.page_timeout = Duration::from_millis(v);
        }
        if let Some(v) = file.detail_wait_ms {
            config.detail_wait = Duration::from_millis(v);
        }
        if let Some(v) = file.login_timeout_ms {
            config.login_timeout = Duration::from_millis(v);
        }
        if let Some(v) = file.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = file.retry_base_delay_ms {
            config.retry_base_delay = Duration::from_millis(v);
        }
        if let Some([min, max]) = file.list_delay_ms {
            config.list_delay = DelayRange::from_millis(min, max);
        }
        if let Some([min, max]) = file.detail_delay_ms {
            config.detail_delay = DelayRange::from_millis(min, max);
        }
        if let Some(v) = file.batch_pause_every {
            config.batch_pause_every = v;
        }
        if let Some(v) = file.batch_pause_ms {
            config.batch_pause = Duration::from_millis(v);
        }
        config.item_limit = file.item_limit.or(config.item_limit);
        if let Some(v) = file.headed {
            config.headed = v;
        }
        config.chrome_executable = file.chrome_executable.or(config.chrome_executable);
        if let Some(v) = file.data_dir {
            config.data_dir = v;
        }
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("SCRAPER_BASE_URL") {
            self.base_url = v;
        }
        if let Ok(v) = std::env::var("SCRAPER_LIST_URL") {
            self.list_url_template = v;
        }
        if let Some(v) = env_parse("SCRAPER_CONCURRENCY", "usize")? {
            self.concurrency = v;
        }
        if let Some(v) = env_parse::<u64>("SCRAPER_PAGE_TIMEOUT_MS", "u64")? {
            self.page_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_parse("SCRAPER_MAX_RETRIES", "u32")? {
            self.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("SCRAPER_RETRY_BASE_DELAY_MS", "u64")? {
            self.retry_base_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse("SCRAPER_LIST_DELAY_MS", "min-max")? {
            self.list_delay = v;
        }
        if let Some(v) = env_parse("SCRAPER_DETAIL_DELAY_MS", "min-max")? {
            self.detail_delay = v;
        }
        if let Some(v) = env_parse("SCRAPER_BATCH_PAUSE_EVERY", "usize")? {
            self.batch_pause_every = v;
        }
        if let Some(v) = env_parse::<u64>("SCRAPER_BATCH_PAUSE_MS", "u64")? {
            self.batch_pause = Duration::from_millis(v);
        }
        if let Some(v) = env_parse("SCRAPER_LIMIT", "usize")? {
            self.item_limit = Some(v);
        }
        if let Some(v) = env_parse("SCRAPER_HEADED", "bool")? {
            self.headed = v;
        }
        if let Ok(v) = std::env::var("CHROME_EXECUTABLE") {
            self.chrome_executable = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SCRAPER_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        Ok(())
    }

    /// 检查配置值
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrency",
                message: "至少需要 1 个 worker".into(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_retries",
                message: "至少需要尝试 1 次".into(),
            });
        }
        if !self.list_url_template.contains("{page}") {
            return Err(ConfigError::InvalidValue {
                field: "list_url_template",
                message: format!("缺少 {{page}} 占位符: {}", self.list_url_template),
            });
        }
        for (field, range) in [("list_delay", self.list_delay), ("detail_delay", self.detail_delay)] {
            if range.min > range.max {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("区间 {} 无效", range),
                });
            }
        }
        Ok(())
    }

    /// 第 `page` 页列表地址
    pub fn list_url(&self, page: u32) -> String {
        self.list_url_template.replace("{page}", &page.to_string())
    }

    /// 列表第一页，登录流程从这里进入
    pub fn entry_url(&self) -> String {
        self.list_url(1)
    }

    /// 把详情页引用补全成绝对地址
    pub fn resolve_profile_url(&self, detail_ref: &str) -> String {
        if detail_ref.starts_with("http://") || detail_ref.starts_with("https://") {
            detail_ref.to_string()
        } else {
            format!(
                "{}/{}",
                self.profile_origin.trim_end_matches('/'),
                detail_ref.trim_start_matches('/')
            )
        }
    }

    pub fn session_state_path(&self) -> PathBuf {
        self.data_dir.join("auth-state.json")
    }

    pub fn progress_path(&self) -> PathBuf {
        self.data_dir.join("progress.json")
    }

    pub fn output_csv_path(&self) -> PathBuf {
        self.data_dir.join("attendees.csv")
    }
}

fn env_parse<T: FromStr>(var_name: &str, expected_type: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type,
            }),
        Err(_) => Ok(None),
    }
}
