//! 抓取进度状态
//!
//! 断点续跑的唯一依据，只由 `ProgressStore` 持有和修改

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Identity;

/// 抓取阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// 正在收集参会者列表
    Discovering,
    /// 正在抓取详情
    Extracting,
    /// 队列已清空
    Complete,
}

/// 某个参会者的失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: String,
    /// 最近一次失败的错误信息
    pub error: String,
    /// 累计失败次数（≥1）
    pub attempts: u32,
}

/// 参会者当前所处的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Pending,
    Completed,
    PermanentlyFailed,
}

/// 待处理条目：身份 + 之前已失败的次数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    pub identity: Identity,
    pub prior_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub phase: Phase,
    pub identities: Vec<Identity>,
    pub completed_ids: BTreeSet<String>,
    pub failures: BTreeMap<String, FailureRecord>,
    pub last_updated: DateTime<Utc>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Discovering,
            identities: Vec::new(),
            completed_ids: BTreeSet::new(),
            failures: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// 列表是否还需要收集
    pub fn needs_discovery(&self) -> bool {
        self.phase == Phase::Discovering || self.identities.is_empty()
    }

    /// 写入发现的身份列表（按 id 去重，保持首次出现的顺序），进入抓取阶段
    pub fn set_identities(&mut self, identities: Vec<Identity>) {
        let mut seen = HashSet::new();
        self.identities = identities
            .into_iter()
            .filter(|identity| seen.insert(identity.id.clone()))
            .collect();
        self.phase = Phase::Extracting;
    }

    /// 标记成功，同时移除失败记录
    pub fn mark_completed(&mut self, id: &str) {
        self.completed_ids.insert(id.to_string());
        self.failures.remove(id);
    }

    /// 记录一次失败，返回累计失败次数
    ///
    /// 已完成的 id 不会再记录失败
    pub fn record_failure(&mut self, id: &str, error: &str) -> u32 {
        if self.completed_ids.contains(id) {
            return 0;
        }
        let entry = self
            .failures
            .entry(id.to_string())
            .or_insert_with(|| FailureRecord {
                id: id.to_string(),
                error: String::new(),
                attempts: 0,
            });
        entry.attempts += 1;
        entry.error = error.to_string();
        entry.attempts
    }

    pub fn attempts(&self, id: &str) -> u32 {
        self.failures.get(id).map(|f| f.attempts).unwrap_or(0)
    }

    pub fn status(&self, id: &str, max_retries: u32) -> ItemStatus {
        if self.completed_ids.contains(id) {
            ItemStatus::Completed
        } else if self.attempts(id) >= max_retries {
            ItemStatus::PermanentlyFailed
        } else {
            ItemStatus::Pending
        }
    }

    /// 构建待处理队列：排除已完成和已永久失败的身份
    pub fn pending(&self, max_retries: u32) -> Vec<PendingItem> {
        self.identities
            .iter()
            .filter(|identity| self.status(&identity.id, max_retries) == ItemStatus::Pending)
            .map(|identity| PendingItem {
                identity: identity.clone(),
                prior_attempts: self.attempts(&identity.id),
            })
            .collect()
    }

    /// 永久失败的条目（按身份列表顺序）
    pub fn permanently_failed(&self, max_retries: u32) -> Vec<(&Identity, &FailureRecord)> {
        self.identities
            .iter()
            .filter_map(|identity| {
                self.failures
                    .get(&identity.id)
                    .filter(|f| f.attempts >= max_retries && !self.completed_ids.contains(&identity.id))
                    .map(|f| (identity, f))
            })
            .collect()
    }

    /// 生成运行结束时的统计
    pub fn summary(&self, max_retries: u32) -> CrawlSummary {
        let permanently_failed: Vec<FailureSummary> = self
            .permanently_failed(max_retries)
            .into_iter()
            .map(|(identity, failure)| FailureSummary {
                id: identity.id.clone(),
                name: identity.name.clone(),
                error: failure.error.clone(),
                attempts: failure.attempts,
            })
            .collect();
        let completed = self
            .identities
            .iter()
            .filter(|identity| self.completed_ids.contains(&identity.id))
            .count();
        CrawlSummary {
            total: self.identities.len(),
            completed,
            retriable: self.identities.len() - completed - permanently_failed.len(),
            permanently_failed,
        }
    }
}

/// 永久失败条目的摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureSummary {
    pub id: String,
    pub name: String,
    pub error: String,
    pub attempts: u32,
}

/// 运行统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub total: usize,
    pub completed: usize,
    /// 失败但尚未达到上限（下次运行会重试）
    pub retriable: usize,
    pub permanently_failed: Vec<FailureSummary>,
}
