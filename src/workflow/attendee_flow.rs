//! 参会者处理流程 - 流程层
//!
//! 核心职责：定义"一位参会者"的完整处理流程
//!
//! 流程顺序：
//! 1. 提取详情（失败按指数退避重试，每次失败都写进度）
//! 2. 被重定向到登录页 → 重新登录 → 重试同一位（不计入失败次数）
//! 3. 成功 → 追加 CSV → 标记完成

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::services::{CsvSink, DetailExtractor, ProgressStore};
use crate::workflow::attendee_ctx::AttendeeCtx;
use crate::workflow::retry::RetryPolicy;

/// 单个参会者最多重新登录几次
pub const MAX_SESSION_RECOVERIES: u32 = 2;

/// 参会者处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// 已写入 CSV 并标记完成
    Completed,
    /// 本次运行的尝试次数用尽
    Failed { attempts: u32, error: String },
}

/// 参会者处理流程
///
/// - 不持有页面，提取器由调用方（worker）传入
/// - 基础设施错误（进度 / 输出写入失败）直接向上返回，由 worker 池终止整批
pub struct AttendeeFlow {
    store: Arc<ProgressStore>,
    sink: Arc<CsvSink>,
    policy: RetryPolicy,
}

impl AttendeeFlow {
    pub fn new(store: Arc<ProgressStore>, sink: Arc<CsvSink>, policy: RetryPolicy) -> Self {
        Self {
            store,
            sink,
            policy,
        }
    }

    pub async fn run<E>(&self, extractor: &E, ctx: &AttendeeCtx) -> AppResult<ProcessResult>
    where
        E: DetailExtractor + ?Sized,
    {
        let budget = self.policy.remaining(ctx.prior_attempts);
        if budget == 0 {
            return Ok(ProcessResult::Failed {
                attempts: ctx.prior_attempts,
                error: "重试次数已用尽".to_string(),
            });
        }
        if ctx.prior_attempts > 0 {
            info!(
                "{} 🔁 继续重试 (此前已失败 {} 次, 本次最多 {} 次)",
                ctx, ctx.prior_attempts, budget
            );
        }

        let mut run_attempt = 0;
        let mut recoveries = 0;

        loop {
            let error = match extractor.extract(&ctx.identity).await {
                Ok(record) => {
                    self.sink.append(&record).await?;
                    self.store.mark_completed(&ctx.identity.id).await?;
                    info!("{} ✓ 已保存", ctx);
                    return Ok(ProcessResult::Completed);
                }
                Err(e) if e.is_infrastructure() => return Err(e),
                Err(e) if e.is_session_expired() && recoveries < MAX_SESSION_RECOVERIES => {
                    recoveries += 1;
                    warn!("{} ⚠️ 会话失效，重新登录后重试...", ctx);
                    match extractor.recover_session().await {
                        Ok(()) => continue,
                        Err(recover_err) if recover_err.is_infrastructure() => {
                            return Err(recover_err)
                        }
                        Err(recover_err) => recover_err.to_string(),
                    }
                }
                Err(e) => e.to_string(),
            };

            run_attempt += 1;
            let attempts = self.store.mark_failed(&ctx.identity.id, &error).await?;

            if run_attempt >= budget {
                error!("{} ❌ 已失败 {} 次，放弃: {}", ctx, attempts, error);
                return Ok(ProcessResult::Failed { attempts, error });
            }

            let delay = self.policy.delay_for(run_attempt);
            warn!(
                "{} ⚠️ 第 {} 次尝试失败: {}，{:?} 后重试",
                ctx, attempts, error, delay
            );
            sleep(delay).await;
        }
    }
}
