//! CSV 输出服务 - 业务能力层
//!
//! 只负责"追加一行记录"能力：表头只写一次，每个字段都加引号，
//! 字段中的双引号写成两个双引号。

use std::collections::HashSet;
use std::mem::take;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{AppResult, ScrapeError};
use crate::models::{AttendeeRecord, CSV_HEADERS};

/// CSV 输出
///
/// 追加用锁串行化，多个 worker 同时写也不会交错
pub struct CsvSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvSink {
    /// 打开输出文件，文件不存在或为空时写入表头
    pub async fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let display = path.display().to_string();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ScrapeError::output(display.clone(), e))?;
        }

        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(ScrapeError::output(display, e)),
        };

        // 上次运行在追加途中被杀死：截掉最后一个不完整的行
        let complete = complete_prefix_len(&content);
        if complete < content.len() {
            warn!(
                "⚠️ 输出文件末尾有 {} 字节不完整的记录，已截断",
                content.len() - complete
            );
            let file = OpenOptions::new()
                .write(true)
                .open(&path)
                .await
                .map_err(|e| ScrapeError::output(display.clone(), e))?;
            file.set_len(complete as u64)
                .await
                .map_err(|e| ScrapeError::output(display.clone(), e))?;
        }

        if complete == 0 {
            tokio::fs::write(&path, format_row(&CSV_HEADERS))
                .await
                .map_err(|e| ScrapeError::output(display, e))?;
            debug!("已创建输出文件: {}", path.display());
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条记录
    pub async fn append(&self, record: &AttendeeRecord) -> AppResult<()> {
        let line = format_row(&record.to_row());
        let _guard = self.write_lock.lock().await;

        let display = || self.path.display().to_string();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ScrapeError::output(display(), e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ScrapeError::output(display(), e))?;
        file.flush()
            .await
            .map_err(|e| ScrapeError::output(display(), e))?;
        Ok(())
    }

    /// 读出文件中已有的 id（第一列，跳过表头）
    pub async fn existing_ids(&self) -> AppResult<HashSet<String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(ScrapeError::output(self.path.display().to_string(), e)),
        };
        Ok(parse_rows(&content)
            .into_iter()
            .skip(1)
            .filter(|row| row.len() == CSV_HEADERS.len())
            .filter_map(|row| row.into_iter().next())
            .filter(|id| !id.is_empty())
            .collect())
    }
}

/// 格式化一行：每个字段都加引号
pub fn format_row(fields: &[&str]) -> String {
    let mut line = fields
        .iter()
        .map(|field| format!("\"{}\"", field.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// 最后一个引号外换行之后的字节偏移，即完整行部分的长度
fn complete_prefix_len(content: &[u8]) -> usize {
    let mut in_quotes = false;
    let mut complete = 0;
    for (i, byte) in content.iter().enumerate() {
        match byte {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => complete = i + 1,
            _ => {}
        }
    }
    complete
}

/// 解析 CSV 文本（支持引号内的逗号、换行和转义引号）
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                if row.len() == 1 && row[0].is_empty() {
                    row.clear();
                } else {
                    rows.push(take(&mut row));
                }
            }
            _ => field.push(ch),
        }
    }

    // 文件末尾没有换行
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;

    fn record(id: &str, summary: &str) -> AttendeeRecord {
        let mut record = AttendeeRecord::for_identity(&Identity::new(
            id,
            format!("Name {}", id),
            format!("/app/profile/{}", id),
        ));
        record.summary = summary.to_string();
        record
    }

    #[tokio::test]
    async fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendees.csv");

        let sink = CsvSink::open(&path).await.unwrap();
        sink.append(&record("1", "hello")).await.unwrap();
        drop(sink);
        let sink = CsvSink::open(&path).await.unwrap();
        sink.append(&record("2", "world")).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let rows = parse_rows(&content);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], CSV_HEADERS.iter().map(|h| h.to_string()).collect::<Vec<_>>());
        assert!(content.starts_with("\"id\",\"name\",\"role\""));
        assert!(rows.iter().all(|row| row.len() == CSV_HEADERS.len()));
    }

    #[tokio::test]
    async fn test_special_characters_survive() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::open(dir.path().join("attendees.csv")).await.unwrap();
        let tricky = "Line one, with comma\nLine \"two\"\r\nend";
        sink.append(&record("42", tricky)).await.unwrap();

        let content = tokio::fs::read_to_string(sink.path()).await.unwrap();
        assert!(content.contains("Line \"\"two\"\"\r\nend\""));

        let rows = parse_rows(&content);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "42");
        assert_eq!(rows[1][7], tricky);
    }

    #[tokio::test]
    async fn test_existing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::open(dir.path().join("attendees.csv")).await.unwrap();
        assert!(sink.existing_ids().await.unwrap().is_empty());

        sink.append(&record("7", "multi\nline")).await.unwrap();
        sink.append(&record("8", "")).await.unwrap();
        let ids = sink.existing_ids().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("7") && ids.contains("8"));
        assert!(!ids.contains("id"));
    }

    #[tokio::test]
    async fn test_partial_row_is_dropped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendees.csv");
        // 追加 id 9 时被杀死
        let partial = format!("{}\"9\",\"Na", format_row(&CSV_HEADERS));
        tokio::fs::write(&path, &partial).await.unwrap();

        let sink = CsvSink::open(&path).await.unwrap();
        assert!(sink.existing_ids().await.unwrap().is_empty());

        sink.append(&record("10", "after restart")).await.unwrap();
        let ids = sink.existing_ids().await.unwrap();
        assert_eq!(ids, ["10".to_string()].into_iter().collect());

        let rows = parse_rows(&tokio::fs::read_to_string(&path).await.unwrap());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.len() == CSV_HEADERS.len()));
    }

    #[tokio::test]
    async fn test_partial_row_ending_inside_quoted_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendees.csv");
        let complete = format!("{}{}", format_row(&CSV_HEADERS), format_row(&record("1", "ok").to_row()));
        // 被杀死时正好写到 summary 中的换行
        tokio::fs::write(&path, format!("{}\"2\",\"Name 2\",\"\",\"\",\"\",\"\",\"\",\"first line\n", complete))
            .await
            .unwrap();

        let sink = CsvSink::open(&path).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), complete);
        assert_eq!(sink.existing_ids().await.unwrap(), ["1".to_string()].into_iter().collect());
    }

    #[test]
    fn test_complete_prefix_len() {
        assert_eq!(complete_prefix_len(b"\"a\"\n\"b"), 4);
        assert_eq!(complete_prefix_len(b"\"a\nb\"\n"), 7);
        assert_eq!(complete_prefix_len(b""), 0);
    }

    #[test]
    fn test_parse_rows_without_trailing_newline() {
        let rows = parse_rows("\"a\",\"b\"\n\"c\",\"d\"");
        assert_eq!(rows, vec![vec!["a", "b"], vec!["c", "d"]]);
    }
}
