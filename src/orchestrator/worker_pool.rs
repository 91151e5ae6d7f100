//! worker 池 - 编排层
//!
//! 固定数量的 worker 共享一个原子领取游标，每位参会者恰好被领取一次。
//! 每个 worker 独占一个提取器（渲染上下文），一个 worker 的页面出错不影响其他 worker。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{AppResult, ScrapeError};
use crate::models::PendingItem;
use crate::services::DetailExtractor;
use crate::utils::DelayRange;
use crate::workflow::{AttendeeCtx, AttendeeFlow, ProcessResult};

/// 待处理队列上的领取游标
#[derive(Debug)]
pub struct ClaimCursor {
    next: AtomicUsize,
    len: usize,
}

impl ClaimCursor {
    pub fn new(len: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            len,
        }
    }

    /// 领取下一个下标，队列耗尽返回 None
    pub fn claim(&self) -> Option<usize> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        (index < self.len).then_some(index)
    }
}

/// 池的运行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
}

impl PoolStats {
    fn merge(&mut self, other: PoolStats) {
        self.processed += other.processed;
        self.completed += other.completed;
        self.failed += other.failed;
    }
}

/// worker 之间共享的状态
struct Shared {
    items: Vec<PendingItem>,
    cursor: ClaimCursor,
    processed: AtomicUsize,
    abort: AtomicBool,
}

pub struct WorkerPool {
    flow: Arc<AttendeeFlow>,
    detail_delay: DelayRange,
    batch_pause_every: usize,
    batch_pause: Duration,
}

impl WorkerPool {
    pub fn new(flow: Arc<AttendeeFlow>, detail_delay: DelayRange) -> Self {
        Self {
            flow,
            detail_delay,
            batch_pause_every: 0,
            batch_pause: Duration::ZERO,
        }
    }

    pub fn from_config(flow: Arc<AttendeeFlow>, config: &Config) -> Self {
        Self::new(flow, config.detail_delay).with_batch_pause(config.batch_pause_every, config.batch_pause)
    }

    /// 每处理 `every` 位（全池累计）额外暂停 `pause`；`every` 为 0 表示关闭
    pub fn with_batch_pause(mut self, every: usize, pause: Duration) -> Self {
        self.batch_pause_every = every;
        self.batch_pause = pause;
        self
    }

    /// 每个提取器启动一个 worker，直到队列耗尽
    ///
    /// 任一 worker 遇到基础设施错误或 panic 时，其余 worker 处理完手头的条目后停止，错误向上返回
    pub async fn run<E>(&self, items: Vec<PendingItem>, extractors: Vec<E>) -> AppResult<PoolStats>
    where
        E: DetailExtractor + 'static,
    {
        let total = items.len();
        let shared = Arc::new(Shared {
            cursor: ClaimCursor::new(total),
            items,
            processed: AtomicUsize::new(0),
            abort: AtomicBool::new(false),
        });

        info!(
            "🚦 {} 个 worker 开始处理 {} 位参会者",
            extractors.len(),
            total
        );

        let mut handles = Vec::with_capacity(extractors.len());
        for (worker_id, extractor) in extractors.into_iter().enumerate() {
            let shared = shared.clone();
            let flow = self.flow.clone();
            let detail_delay = self.detail_delay;
            let batch_pause_every = self.batch_pause_every;
            let batch_pause = self.batch_pause;

            let handle = tokio::spawn(async move {
                let mut stats = PoolStats::default();
                while !shared.abort.load(Ordering::SeqCst) {
                    let Some(index) = shared.cursor.claim() else {
                        break;
                    };
                    let ctx = AttendeeCtx::new(shared.items[index].clone(), worker_id, index + 1, total);

                    match flow.run(&extractor, &ctx).await {
                        Ok(ProcessResult::Completed) => stats.completed += 1,
                        Ok(ProcessResult::Failed { .. }) => stats.failed += 1,
                        Err(e) => {
                            error!("[worker {}] ❌ 无法继续: {}", worker_id, e);
                            shared.abort.store(true, Ordering::SeqCst);
                            return Err(e);
                        }
                    }
                    stats.processed += 1;

                    let processed = shared.processed.fetch_add(1, Ordering::SeqCst) + 1;
                    if batch_pause_every > 0 && processed % batch_pause_every == 0 && processed < total {
                        info!(
                            "[worker {}] ☕ 已处理 {} 位，暂停 {:?}",
                            worker_id, processed, batch_pause
                        );
                        sleep(batch_pause).await;
                    } else {
                        detail_delay.wait().await;
                    }
                }
                Ok::<PoolStats, ScrapeError>(stats)
            });
            handles.push((worker_id, handle));
        }

        let mut stats = PoolStats::default();
        let mut fatal: Option<ScrapeError> = None;
        for (worker_id, handle) in handles {
            match handle.await {
                Ok(Ok(worker_stats)) => stats.merge(worker_stats),
                Ok(Err(e)) => {
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(e) => {
                    error!("[worker {}] 任务异常退出: {}", worker_id, e);
                    shared.abort.store(true, Ordering::SeqCst);
                    if fatal.is_none() {
                        fatal = Some(ScrapeError::Worker {
                            worker_id,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => {
                info!(
                    "✓ worker 全部结束: 处理 {} 位, 成功 {}, 失败 {}",
                    stats.processed, stats.completed, stats.failed
                );
                Ok(stats)
            }
        }
    }
}
