pub mod csv_sink;
pub mod detail_extractor;
pub mod list_discovery;
pub mod progress_store;
pub mod session;

pub use csv_sink::CsvSink;
pub use detail_extractor::{BrowserDetailExtractor, DetailExtractor};
pub use list_discovery::{BrowserDirectory, DirectoryPage, ListDiscovery};
pub use progress_store::ProgressStore;
pub use session::{Credentials, SessionProvider};
