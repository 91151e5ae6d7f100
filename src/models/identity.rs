use serde::{Deserialize, Serialize};

/// 参会者身份：列表页发现的最小信息
///
/// 发现后不再修改，`id` 唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// 站点上的稳定 ID
    pub id: String,
    /// 列表页显示的姓名
    pub name: String,
    /// 详情页引用（可能是相对地址）
    pub detail_ref: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, detail_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            detail_ref: detail_ref.into(),
        }
    }
}
