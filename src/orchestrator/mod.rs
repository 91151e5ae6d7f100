//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 启动浏览器、打开渲染上下文池、登录
//! - 把页面包装成 `BrowserDirectory` / `BrowserDetailExtractor`
//! - 出错时保存进度，结束时关闭浏览器
//!
//! ### `crawl` - 抓取编排
//! - 阶段切换：收集列表 → 抓取详情 → 完成
//! - 启动时对账输出文件和进度，构建待处理队列
//! - 不依赖浏览器，测试中可以换成假的目录页和提取器
//!
//! ### `worker_pool` - worker 池
//! - 原子领取游标，每位参会者恰好领取一次
//! - 礼貌延迟与批量暂停
//!
//! ## 层次关系
//!
//! ```text
//! app (持有 Browser / PagePool)
//!     ↓
//! crawl (处理 Vec<Identity>)
//!     ↓
//! worker_pool (领取 → AttendeeFlow)
//!     ↓
//! workflow::AttendeeFlow (处理单个参会者)
//!     ↓
//! services (能力层：session / discovery / extractor / progress / csv)
//!     ↓
//! infrastructure (基础设施：PageContext)
//! ```

pub mod app;
pub mod crawl;
pub mod worker_pool;

pub use app::App;
pub use crawl::Crawl;
pub use worker_pool::{ClaimCursor, PoolStats, WorkerPool};
