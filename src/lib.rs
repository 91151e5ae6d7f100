//! # Attendee Scraper
//!
//! 登录活动配对平台，收集参会者目录并逐个抓取详情页，输出为 CSV。
//! 进度随时写盘，中断后重新运行会从上次的位置继续。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `browser/` - 启动 Chromium
//! - `infrastructure/` - `PageContext` 包装单个页面，`PagePool` 每个 worker 一个
//!
//! ### ② 业务能力层（Services）
//! - `SessionProvider` - 保证已登录、保存 / 恢复会话
//! - `ListDiscovery` - 按页码收集参会者身份
//! - `BrowserDetailExtractor` - 提取单个详情页
//! - `ProgressStore` - 断点续跑状态
//! - `CsvSink` - 追加输出记录
//!
//! ### ③ 流程层（Workflow）
//! - `AttendeeFlow` - 一位参会者：提取 → 重试 / 重新登录 → 写入
//!
//! ### ④ 编排层（Orchestration）
//! - `Crawl` - 阶段切换与队列构建
//! - `WorkerPool` - 并发 worker
//! - `App` - 浏览器资源的唯一持有者

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppResult, AuthError, ConfigError, ScrapeError};
pub use models::{AttendeeRecord, CrawlSummary, Identity, Phase, ProgressState};
pub use orchestrator::{App, Crawl};
pub use services::{CsvSink, DetailExtractor, DirectoryPage, ProgressStore};
pub use workflow::{AttendeeFlow, ProcessResult, RetryPolicy};
