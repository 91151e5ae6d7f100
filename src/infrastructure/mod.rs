//! 基础设施层：持有稀缺资源（Page），只暴露能力

pub mod page_context;
pub mod page_pool;

pub use page_context::PageContext;
pub use page_pool::PagePool;
