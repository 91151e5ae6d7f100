use std::time::Duration;

use thiserror::Error;

/// 认证相关错误
#[derive(Debug, Error)]
pub enum AuthError {
    /// 环境变量中缺少登录凭据
    #[error("缺少登录凭据: 环境变量 {var_name} 未设置")]
    MissingCredentials { var_name: &'static str },

    /// 登录后在限定时间内没有跳转到已认证区域
    #[error("登录超时: {timeout:?} 内未进入已认证区域 (当前地址: {url})")]
    Timeout { timeout: Duration, url: String },

    /// 页面被重定向到登录页（会话失效）
    #[error("会话已失效，被重定向到登录页: {url}")]
    Redirected { url: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: &'static str,
    },

    /// 配置文件读取或解析失败
    #[error("配置文件 {path} 无效: {message}")]
    InvalidFile { path: String, message: String },

    /// 配置值不合法
    #[error("配置项 {field} 不合法: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// 抓取引擎错误类型
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// 认证错误
    #[error("认证错误: {0}")]
    Auth(#[from] AuthError),

    /// 列表页加载失败
    #[error("列表第 {page} 页加载失败: {message}")]
    Discovery { page: u32, message: String },

    /// 详情页提取失败
    #[error("详情提取失败 ({id}): {message}")]
    Extraction { id: String, message: String },

    /// 浏览器 / CDP 错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    /// 单个操作超时
    #[error("操作超时: {operation} (限时 {timeout:?})")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// 进度或会话文件读写失败
    #[error("持久化失败 ({path}): {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 输出文件写入失败
    #[error("写入输出文件失败 ({path}): {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// worker 任务 panic 或被取消
    #[error("worker {worker_id} 异常退出: {message}")]
    Worker { worker_id: usize, message: String },

    /// JSON 序列化 / 反序列化失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScrapeError {
    /// 会话失效（被重定向到登录页），调用方应重新登录后重试同一条目
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ScrapeError::Auth(AuthError::Redirected { .. }))
    }

    /// 基础设施错误：无法持久化进度、无法写输出、配置错误、worker 异常退出。
    /// 这类错误会终止整个批次。
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            ScrapeError::Persist { .. }
                | ScrapeError::Output { .. }
                | ScrapeError::Config(_)
                | ScrapeError::Worker { .. }
        )
    }

    // ========== 便捷构造函数 ==========

    /// 创建列表页错误
    pub fn discovery(page: u32, message: impl Into<String>) -> Self {
        ScrapeError::Discovery {
            page,
            message: message.into(),
        }
    }

    /// 创建详情提取错误
    pub fn extraction(id: impl Into<String>, message: impl Into<String>) -> Self {
        ScrapeError::Extraction {
            id: id.into(),
            message: message.into(),
        }
    }

    /// 创建超时错误
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        ScrapeError::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// 创建持久化错误
    pub fn persist(path: impl Into<String>, source: std::io::Error) -> Self {
        ScrapeError::Persist {
            path: path.into(),
            source,
        }
    }

    /// 创建输出错误
    pub fn output(path: impl Into<String>, source: std::io::Error) -> Self {
        ScrapeError::Output {
            path: path.into(),
            source,
        }
    }
}

// ========== Result 类型别名 ==========

/// 抓取引擎结果类型
pub type AppResult<T> = Result<T, ScrapeError>;
