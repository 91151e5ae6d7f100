//! 抓取编排 - 编排层
//!
//! 不依赖浏览器：目录页和提取器都由调用方传入，
//! 这里只负责阶段切换、队列构建和续跑。

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::{CrawlSummary, Phase};
use crate::orchestrator::worker_pool::WorkerPool;
use crate::services::{CsvSink, DetailExtractor, DirectoryPage, ListDiscovery, ProgressStore};
use crate::utils::logging::{log_phase, truncate_text};
use crate::workflow::{AttendeeFlow, RetryPolicy};

pub struct Crawl {
    config: Arc<Config>,
    store: Arc<ProgressStore>,
    sink: Arc<CsvSink>,
}

impl Crawl {
    pub fn new(config: Arc<Config>, store: Arc<ProgressStore>, sink: Arc<CsvSink>) -> Self {
        Self {
            config,
            store,
            sink,
        }
    }

    /// 按配置中的路径打开进度文件和输出文件
    pub async fn open(config: Arc<Config>) -> AppResult<Self> {
        let store = ProgressStore::open(config.progress_path()).await?;
        let sink = CsvSink::open(config.output_csv_path()).await?;
        Ok(Self::new(config, Arc::new(store), Arc::new(sink)))
    }

    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    /// 完整运行一次：收集列表（如需要）→ 对账 → 抓取详情 → 统计
    pub async fn run<D, E>(&self, directory: &D, extractors: Vec<E>) -> AppResult<CrawlSummary>
    where
        D: DirectoryPage + ?Sized,
        E: DetailExtractor + 'static,
    {
        let max_retries = self.config.max_retries;

        if self.store.snapshot().await.needs_discovery() {
            log_phase("阶段 1: 收集参会者列表");
            let identities = ListDiscovery::from_config(&self.config)
                .discover(directory)
                .await?;
            self.store.set_identities(identities).await?;
        } else {
            let state = self.store.snapshot().await;
            info!(
                "✓ 已有 {} 位参会者的列表 (阶段: {:?})，跳过收集",
                state.identities.len(),
                state.phase
            );
        }

        // 上次运行可能在写入 CSV 之后、标记完成之前被杀死
        let written = self.sink.existing_ids().await?;
        let reconciled = self.store.reconcile_completed(&written).await?;
        if reconciled > 0 {
            warn!("⚠️ {} 位参会者已在输出文件中但未标记完成，已补记", reconciled);
        }

        let state = self.store.snapshot().await;
        for (identity, failure) in state.permanently_failed(max_retries) {
            info!(
                "⏭️ 跳过 {} (ID#{}): 已失败 {} 次, 最后错误: {}",
                identity.name,
                identity.id,
                failure.attempts,
                truncate_text(&failure.error, 120)
            );
        }

        let mut pending = state.pending(max_retries);
        let mut drained = true;
        if let Some(limit) = self.config.item_limit {
            if pending.len() > limit {
                info!("🔬 限量运行: 只处理前 {} 位 (共 {} 位待处理)", limit, pending.len());
                pending.truncate(limit);
                drained = false;
            }
        }

        log_phase("阶段 2: 抓取参会者详情");
        info!(
            "📋 共 {} 位, 已完成 {} 位, 本次待处理 {} 位",
            state.identities.len(),
            state.completed_ids.len(),
            pending.len()
        );

        if pending.is_empty() {
            info!("✓ 没有需要处理的参会者");
        } else {
            let flow = Arc::new(AttendeeFlow::new(
                self.store.clone(),
                self.sink.clone(),
                RetryPolicy::from_config(&self.config),
            ));
            WorkerPool::from_config(flow, &self.config)
                .run(pending, extractors)
                .await?;
        }

        if drained {
            self.store.set_phase(Phase::Complete).await?;
        }

        Ok(self.store.snapshot().await.summary(max_retries))
    }
}
