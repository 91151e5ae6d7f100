//! 随机礼貌延迟
//!
//! 远程请求之间的随机停顿，避免触发限流

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

/// 延迟区间 `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms),
        }
    }

    /// 不等待（测试和单次运行使用）
    pub fn zero() -> Self {
        Self::from_millis(0, 0)
    }

    /// 在 `[min, max]` 内均匀取一个时长
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
    }

    /// 随机等待一次，返回实际等待时长
    pub async fn wait(&self) -> Duration {
        let delay = self.sample();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        delay
    }
}

impl fmt::Display for DelayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}ms", self.min.as_millis(), self.max.as_millis())
    }
}

/// 解析 `"1500-2500"` 形式（毫秒）
impl FromStr for DelayRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s
            .split_once('-')
            .ok_or_else(|| format!("'{}' 不是 min-max 形式", s))?;
        let min: u64 = min.trim().parse().map_err(|_| format!("无效的最小值: {}", min))?;
        let max: u64 = max.trim().parse().map_err(|_| format!("无效的最大值: {}", max))?;
        if min > max {
            return Err(format!("最小值 {} 大于最大值 {}", min, max));
        }
        Ok(Self::from_millis(min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_stays_in_range() {
        let range = DelayRange::from_millis(500, 1000);
        for _ in 0..200 {
            let d = range.sample();
            assert!(d >= range.min && d <= range.max, "{:?} 超出区间", d);
        }
    }

    #[test]
    fn test_degenerate_range() {
        let range = DelayRange::from_millis(700, 700);
        assert_eq!(range.sample(), Duration::from_millis(700));
        assert_eq!(DelayRange::zero().sample(), Duration::ZERO);
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "1500-2500".parse::<DelayRange>().unwrap(),
            DelayRange::from_millis(1500, 2500)
        );
        assert_eq!(
            " 0 - 10 ".parse::<DelayRange>().unwrap(),
            DelayRange::from_millis(0, 10)
        );
        assert!("2500-1500".parse::<DelayRange>().is_err());
        assert!("fast".parse::<DelayRange>().is_err());
    }
}
