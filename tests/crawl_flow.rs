use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use attendee_scraper::browser::launch_browser;
use attendee_scraper::models::Phase;
use attendee_scraper::services::csv_sink::parse_rows;
use attendee_scraper::utils::DelayRange;
use attendee_scraper::{
    AppResult, AttendeeRecord, Config, Crawl, CsvSink, DetailExtractor, DirectoryPage, Identity,
    ProgressStore, ScrapeError,
};

fn identity(id: &str) -> Identity {
    Identity::new(id, format!("Name {}", id), format!("/app/profile/{}", id))
}

fn test_config(data_dir: &Path) -> Arc<Config> {
    Arc::new(Config {
        data_dir: data_dir.to_path_buf(),
        concurrency: 2,
        max_retries: 3,
        retry_base_delay: Duration::ZERO,
        list_delay: DelayRange::zero(),
        detail_delay: DelayRange::zero(),
        ..Config::default()
    })
}

/// 每页返回固定身份的目录
struct FakeDirectory {
    pages: Vec<Vec<Identity>>,
    fail: bool,
    loads: AtomicU32,
}

impl FakeDirectory {
    fn new(pages: Vec<Vec<&str>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|ids| ids.into_iter().map(identity).collect())
                .collect(),
            fail: false,
            loads: AtomicU32::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![])
        }
    }
}

#[async_trait]
impl DirectoryPage for FakeDirectory {
    async fn load_page(&self, page_number: u32) -> AppResult<Vec<Identity>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ScrapeError::discovery(page_number, "list did not render"));
        }
        Ok(self
            .pages
            .get(page_number as usize - 1)
            .cloned()
            .unwrap_or_default())
    }
}

/// 按 id 预设失败次数的提取器（`u32::MAX` 表示永远失败），多个 worker 共享
#[derive(Default)]
struct FakeExtractor {
    failures_before_success: HashMap<String, u32>,
    panic_on: Option<String>,
    calls: Mutex<HashMap<String, u32>>,
}

impl FakeExtractor {
    fn with_failures(failures: &[(&str, u32)]) -> Arc<Self> {
        Arc::new(Self {
            failures_before_success: failures
                .iter()
                .map(|(id, n)| (id.to_string(), *n))
                .collect(),
            ..Self::default()
        })
    }

    fn panicking_on(id: &str) -> Arc<Self> {
        Arc::new(Self {
            panic_on: Some(id.to_string()),
            ..Self::default()
        })
    }

    fn calls(&self, id: &str) -> u32 {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl DetailExtractor for FakeExtractor {
    async fn extract(&self, identity: &Identity) -> AppResult<AttendeeRecord> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(identity.id.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        if self.panic_on.as_deref() == Some(identity.id.as_str()) {
            panic!("extractor bug on {}", identity.id);
        }
        let failures = self
            .failures_before_success
            .get(&identity.id)
            .copied()
            .unwrap_or(0);
        if call <= failures {
            return Err(ScrapeError::extraction(
                &identity.id,
                format!("detail did not render (call {})", call),
            ));
        }
        let mut record = AttendeeRecord::for_identity(identity);
        record.title = "Engineer".into();
        record.company = "Example, Inc.".into();
        Ok(record)
    }
}

fn workers(extractor: &Arc<FakeExtractor>, count: usize) -> Vec<Arc<FakeExtractor>> {
    (0..count).map(|_| extractor.clone()).collect()
}

async fn csv_ids(path: &Path) -> Vec<String> {
    let content = tokio::fs::read_to_string(path).await.unwrap();
    parse_rows(&content)
        .into_iter()
        .skip(1)
        .map(|row| row[0].clone())
        .collect()
}

#[tokio::test]
async fn test_retry_then_success_and_permanent_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let crawl = Crawl::open(config.clone()).await.unwrap();

    let directory = FakeDirectory::new(vec![vec!["W", "X"], vec!["Y"]]);
    let extractor = FakeExtractor::with_failures(&[("X", 2), ("Y", u32::MAX)]);

    let summary = crawl
        .run(&directory, workers(&extractor, 2))
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.retriable, 0);
    assert_eq!(summary.permanently_failed.len(), 1);
    let failed = &summary.permanently_failed[0];
    assert_eq!(failed.id, "Y");
    assert_eq!(failed.name, "Name Y");
    assert_eq!(failed.attempts, 3);
    assert!(failed.error.contains("call 3"));

    assert_eq!(extractor.calls("X"), 3);
    assert_eq!(extractor.calls("Y"), 3);

    let state = ProgressStore::load(&config.progress_path())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.phase, Phase::Complete);
    assert!(state.completed_ids.contains("X"));
    assert!(!state.failures.contains_key("X"));
    assert_eq!(state.failures["Y"].attempts, 3);

    let mut ids = csv_ids(&config.output_csv_path()).await;
    ids.sort();
    assert_eq!(ids, vec!["W", "X"]);
}

#[tokio::test]
async fn test_resume_processes_only_pending() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    // 上次运行：列表已收集，A 已完成，B 失败过一次
    {
        let store = ProgressStore::open(config.progress_path()).await.unwrap();
        store
            .set_identities(vec![identity("A"), identity("B"), identity("C")])
            .await
            .unwrap();
        store.mark_completed("A").await.unwrap();
        store.mark_failed("B", "timeout").await.unwrap();
    }

    let crawl = Crawl::open(config.clone()).await.unwrap();
    let directory = FakeDirectory::new(vec![vec!["should", "not", "load"]]);
    let extractor = FakeExtractor::with_failures(&[]);

    let summary = crawl
        .run(&directory, workers(&extractor, 2))
        .await
        .unwrap();

    assert_eq!(directory.loads.load(Ordering::SeqCst), 0);
    assert_eq!(extractor.calls("A"), 0);
    assert_eq!(extractor.calls("B"), 1);
    assert_eq!(extractor.calls("C"), 1);
    assert_eq!(summary.completed, 3);
    assert!(summary.permanently_failed.is_empty());
}

#[tokio::test]
async fn test_two_runs_write_one_row_per_id() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let directory = FakeDirectory::new(vec![vec!["1", "2"], vec!["3"]]);

    let first = FakeExtractor::with_failures(&[]);
    Crawl::open(config.clone())
        .await
        .unwrap()
        .run(&directory, workers(&first, 2))
        .await
        .unwrap();
    assert_eq!(first.total_calls(), 3);

    let second = FakeExtractor::with_failures(&[]);
    let summary = Crawl::open(config.clone())
        .await
        .unwrap()
        .run(&directory, workers(&second, 2))
        .await
        .unwrap();
    assert_eq!(second.total_calls(), 0);
    assert_eq!(summary.completed, 3);

    let mut ids = csv_ids(&config.output_csv_path()).await;
    ids.sort();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_appended_but_unmarked_id_is_reconciled() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    // 上次运行在追加 B 之后、标记完成之前被杀死
    {
        let store = ProgressStore::open(config.progress_path()).await.unwrap();
        store
            .set_identities(vec![identity("A"), identity("B")])
            .await
            .unwrap();
        let sink = CsvSink::open(config.output_csv_path()).await.unwrap();
        sink.append(&AttendeeRecord::for_identity(&identity("B")))
            .await
            .unwrap();
    }

    let extractor = FakeExtractor::with_failures(&[]);
    let summary = Crawl::open(config.clone())
        .await
        .unwrap()
        .run(&FakeDirectory::new(vec![]), workers(&extractor, 1))
        .await
        .unwrap();

    assert_eq!(extractor.calls("A"), 1);
    assert_eq!(extractor.calls("B"), 0);
    assert_eq!(summary.completed, 2);

    let ids = csv_ids(&config.output_csv_path()).await;
    assert_eq!(ids.iter().filter(|id| *id == "B").count(), 1);
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn test_discovery_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let extractor = FakeExtractor::with_failures(&[]);

    let err = Crawl::open(config.clone())
        .await
        .unwrap()
        .run(&FakeDirectory::failing(), workers(&extractor, 1))
        .await
        .unwrap_err();

    assert!(matches!(err, ScrapeError::Discovery { page: 1, .. }));
    assert_eq!(extractor.total_calls(), 0);
    assert!(ProgressStore::load(&config.progress_path())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_item_limit_leaves_rest_pending() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = (*test_config(dir.path())).clone();
    config.item_limit = Some(2);
    let config = Arc::new(config);

    let directory = FakeDirectory::new(vec![vec!["1", "2", "3", "4"]]);
    let extractor = FakeExtractor::with_failures(&[]);
    let summary = Crawl::open(config.clone())
        .await
        .unwrap()
        .run(&directory, workers(&extractor, 2))
        .await
        .unwrap();

    assert_eq!(extractor.total_calls(), 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.retriable, 2);

    let state = ProgressStore::load(&config.progress_path())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.phase, Phase::Extracting);
}

#[tokio::test]
async fn test_persist_failure_stops_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    {
        let store = ProgressStore::open(config.progress_path()).await.unwrap();
        store
            .set_identities(["A", "B", "C", "D", "E"].into_iter().map(identity).collect())
            .await
            .unwrap();
    }
    let crawl = Crawl::open(config.clone()).await.unwrap();

    // 进度文件的位置被目录占住，之后每次写盘都会失败
    tokio::fs::remove_file(config.progress_path()).await.unwrap();
    tokio::fs::create_dir(config.progress_path()).await.unwrap();

    let extractor = FakeExtractor::with_failures(&[]);
    let err = crawl
        .run(&FakeDirectory::new(vec![]), workers(&extractor, 1))
        .await
        .unwrap_err();

    assert!(matches!(err, ScrapeError::Persist { .. }));
    assert!(err.is_infrastructure());
    assert_eq!(extractor.total_calls(), 1);
    assert_eq!(extractor.calls("B"), 0);

    let state = crawl.store().snapshot().await;
    assert_eq!(state.phase, Phase::Extracting);
    assert_eq!(crawl.store().pending(3).await.len(), 4);

    // 目录移走后，退出前的保存能把未完成状态写盘
    tokio::fs::remove_dir(config.progress_path()).await.unwrap();
    crawl.store().save().await.unwrap();
    let saved = ProgressStore::load(&config.progress_path())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.phase, Phase::Extracting);
}

#[tokio::test]
async fn test_worker_panic_does_not_mark_complete() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let directory = FakeDirectory::new(vec![vec!["1", "2", "3", "4"]]);
    let extractor = FakeExtractor::panicking_on("2");

    let crawl = Crawl::open(config.clone()).await.unwrap();
    let err = crawl
        .run(&directory, workers(&extractor, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::Worker { .. }));

    let state = ProgressStore::load(&config.progress_path())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.phase, Phase::Extracting);
    assert!(!state.completed_ids.contains("2"));
    assert!(crawl
        .store()
        .pending(3)
        .await
        .iter()
        .any(|item| item.identity.id == "2"));
}

#[tokio::test]
#[ignore] // 需要本机安装 Chrome，手动运行：cargo test -- --ignored
async fn test_browser_launch() {
    attendee_scraper::utils::logging::init();

    let config = Config::default();
    let (mut browser, handler) = launch_browser(&config).await.expect("启动浏览器失败");
    let page = browser.new_page("about:blank").await.expect("打开页面失败");
    assert!(page.url().await.is_ok(), "应该能够读取页面地址");

    browser.close().await.expect("关闭浏览器失败");
    assert!(browser.wait().await.is_ok(), "应该能够等待浏览器进程退出");
    handler.abort();
}
