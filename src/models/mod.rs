pub mod identity;
pub mod progress;
pub mod record;

pub use identity::Identity;
pub use progress::{
    CrawlSummary, FailureRecord, FailureSummary, ItemStatus, PendingItem, Phase, ProgressState,
};
pub use record::{split_title_company, AttendeeRecord, CSV_HEADERS};
