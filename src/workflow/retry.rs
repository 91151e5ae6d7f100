use std::time::Duration;

use crate::config::Config;

/// 单个参会者的重试策略
///
/// 失败次数跨运行累计：上次运行已失败 `a` 次，本次最多再尝试 `max_attempts - a` 次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_retries, config.retry_base_delay)
    }

    /// 第 `attempt` 次（从 1 开始）失败后的等待：`base_delay * 2^(attempt-1)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// 本次运行还剩多少次尝试
    pub fn remaining(&self, prior_attempts: u32) -> u32 {
        self.max_attempts.saturating_sub(prior_attempts)
    }
}
