//! 参会者处理上下文
//!
//! 封装"哪个 worker 正在处理队列中第几位参会者"这一信息

use std::fmt::Display;

use crate::models::{Identity, PendingItem};

#[derive(Debug, Clone)]
pub struct AttendeeCtx {
    pub identity: Identity,

    /// worker 编号（仅用于日志显示）
    pub worker_id: usize,

    /// 在本次队列中的位置（从1开始）
    pub position: usize,

    /// 本次队列长度
    pub total: usize,

    /// 之前运行中已失败的次数
    pub prior_attempts: u32,
}

impl AttendeeCtx {
    pub fn new(item: PendingItem, worker_id: usize, position: usize, total: usize) -> Self {
        Self {
            identity: item.identity,
            worker_id,
            position,
            total,
            prior_attempts: item.prior_attempts,
        }
    }
}

impl Display for AttendeeCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[worker {}] [{}/{}] {} (ID#{})",
            self.worker_id, self.position, self.total, self.identity.name, self.identity.id
        )
    }
}
