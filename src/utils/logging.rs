/// 日志工具模块
///
/// 提供日志初始化和各阶段的格式化输出
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::CrawlSummary;

/// 初始化 tracing 日志
///
/// 默认级别 info，可通过 `RUST_LOG` 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 参会者抓取程序启动");
    info!("🌐 活动站点: {}", config.base_url);
    info!(
        "🖥️ 浏览器模式: {}",
        if config.headed { "有界面" } else { "无头" }
    );
    info!("📊 并发 worker 数: {}", config.concurrency);
    info!("🔁 最大尝试次数: {}", config.max_retries);
    info!("📁 数据目录: {}", config.data_dir.display());
    info!("{}", "=".repeat(60));
}

/// 记录阶段开始
pub fn log_phase(title: &str) {
    info!("\n{}", "─".repeat(60));
    info!("▶ {}", title);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息，并逐条列出永久失败的参会者
pub fn print_final_summary(summary: &CrawlSummary, config: &Config) {
    info!("\n{}", "=".repeat(60));
    info!("📊 抓取完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("👥 参会者总数: {}", summary.total);
    info!("✅ 成功: {}", summary.completed);
    info!("❌ 永久失败: {}", summary.permanently_failed.len());
    if summary.retriable > 0 {
        info!("⏳ 待重试: {}", summary.retriable);
    }
    info!("{}", "=".repeat(60));

    if !summary.permanently_failed.is_empty() {
        warn!("失败的参会者:");
        for failure in &summary.permanently_failed {
            warn!(
                "  - {} ({}): {} ({} 次尝试)",
                failure.name, failure.id, failure.error, failure.attempts
            );
        }
    }
    info!("\n输出已保存至: {}", config.output_csv_path().display());
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("参会者名单很长", 3), "参会者...");
    }
}
