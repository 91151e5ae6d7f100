//! 进度存储服务 - 业务能力层
//!
//! 进度状态只在这里修改；每次修改都会在返回前整体写回磁盘，
//! 进程随时被杀死，最后一次写入的状态就是续跑起点。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AppResult, ScrapeError};
use crate::models::{Identity, PendingItem, Phase, ProgressState};

/// 进度存储
pub struct ProgressStore {
    path: PathBuf,
    state: Mutex<ProgressState>,
}

impl ProgressStore {
    /// 读取进度文件，不存在时返回 None
    ///
    /// 文件存在但无法解析时返回错误，不会用空状态覆盖它
    pub async fn load(path: &Path) -> AppResult<Option<ProgressState>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ScrapeError::persist(path.display().to_string(), e)),
        }
    }

    /// 打开进度存储：有进度文件则恢复，否则从空状态开始
    pub async fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let state = match Self::load(&path).await? {
            Some(state) => {
                info!(
                    "📂 已恢复进度: {} 位参会者, {} 已完成, {} 有失败记录",
                    state.identities.len(),
                    state.completed_ids.len(),
                    state.failures.len()
                );
                state
            }
            None => ProgressState::new(),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 整体写回：先写临时文件再改名，写到一半被杀也不会留下半个文件
    async fn write(&self, state: &mut ProgressState) -> AppResult<()> {
        state.last_updated = Utc::now();
        let path = self.path.display().to_string();
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ScrapeError::persist(path.clone(), e))?;
        }

        let json = serde_json::to_string_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| ScrapeError::persist(path.clone(), e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| ScrapeError::persist(path, e))?;
        debug!("进度已保存: {}", self.path.display());
        Ok(())
    }

    /// 立即保存当前状态
    pub async fn save(&self) -> AppResult<()> {
        let mut state = self.state.lock().await;
        self.write(&mut state).await
    }

    /// 写入发现的身份列表并进入抓取阶段
    pub async fn set_identities(&self, identities: Vec<Identity>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.set_identities(identities);
        self.write(&mut state).await
    }

    pub async fn mark_completed(&self, id: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.mark_completed(id);
        self.write(&mut state).await
    }

    /// 记录一次失败并持久化，返回累计失败次数
    pub async fn mark_failed(&self, id: &str, error: &str) -> AppResult<u32> {
        let mut state = self.state.lock().await;
        let attempts = state.record_failure(id, error);
        self.write(&mut state).await?;
        Ok(attempts)
    }

    pub async fn set_phase(&self, phase: Phase) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.phase = phase;
        self.write(&mut state).await
    }

    /// 把输出文件里已有、但进度中未标记完成的 id 标记为完成，返回补记的数量
    pub async fn reconcile_completed(&self, written_ids: &HashSet<String>) -> AppResult<usize> {
        let mut state = self.state.lock().await;
        let missing: Vec<String> = written_ids
            .iter()
            .filter(|id| !state.completed_ids.contains(*id))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }
        for id in &missing {
            state.mark_completed(id);
        }
        self.write(&mut state).await?;
        Ok(missing.len())
    }

    /// 当前状态的副本
    pub async fn snapshot(&self) -> ProgressState {
        self.state.lock().await.clone()
    }

    pub async fn pending(&self, max_retries: u32) -> Vec<PendingItem> {
        self.state.lock().await.pending(max_retries)
    }
}
