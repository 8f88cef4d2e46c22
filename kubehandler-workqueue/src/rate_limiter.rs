//! 限速器（RateLimiter）
//!
//! 决定条目重新入队前需要等待多久：
//! - `ItemExponentialFailureRateLimiter`：单条目指数退避，带上限，`forget` 后归零；
//! - `BucketRateLimiter`：全局令牌桶，限制整体入队速率；
//! - `MaxOfRateLimiter`：取多个限速器中的最大延迟。
//!
use crate::config::RateLimiterConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// 限速器协议
pub trait RateLimiter: Send + Sync {
    /// 记录一次观察并返回该条目需要等待的时长
    fn when(&self, item: &str) -> Duration;
    /// 清空条目的失败计数（成功或永久失败时调用）
    fn forget(&self, item: &str);
    /// 条目被延迟重新入队的次数
    fn num_requeues(&self, item: &str) -> u32;
}

/// 单条目指数退避：首次观察不延迟，之后为 `base * 2^(n-1)`，不超过 `max`
pub struct ItemExponentialFailureRateLimiter {
    failures: DashMap<String, u32>,
    base_delay: Duration,
    max_delay: Duration,
}

impl ItemExponentialFailureRateLimiter {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            failures: DashMap::new(),
            base_delay,
            max_delay,
        }
    }
}

impl RateLimiter for ItemExponentialFailureRateLimiter {
    fn when(&self, item: &str) -> Duration {
        let observed = {
            let mut entry = self.failures.entry(item.to_string()).or_insert(0);
            let observed = *entry;
            *entry = entry.saturating_add(1);
            observed
        };

        if observed == 0 {
            return Duration::ZERO;
        }

        let factor = 1u32.checked_shl(observed - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    fn forget(&self, item: &str) {
        self.failures.remove(item);
    }

    fn num_requeues(&self, item: &str) -> u32 {
        self.failures
            .get(item)
            .map_or(0, |n| n.saturating_sub(1))
    }
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

/// 全局令牌桶：容量内立即放行，超出部分按 `qps` 排队
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }
}

impl RateLimiter for BucketRateLimiter {
    fn when(&self, _item: &str) -> Duration {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let refill = now.duration_since(bucket.last).as_secs_f64() * self.qps;
        bucket.tokens = (bucket.tokens + refill).min(self.burst) - 1.0;
        bucket.last = now;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            // qps 非正时永远等不到令牌，按最大时长处理
            Duration::try_from_secs_f64(-bucket.tokens / self.qps).unwrap_or(Duration::MAX)
        }
    }

    fn forget(&self, _item: &str) {}

    fn num_requeues(&self, _item: &str) -> u32 {
        0
    }
}

/// 组合限速器：取最大延迟
pub struct MaxOfRateLimiter {
    limiters: Vec<Box<dyn RateLimiter>>,
}

impl MaxOfRateLimiter {
    pub fn new(limiters: Vec<Box<dyn RateLimiter>>) -> Self {
        Self { limiters }
    }
}

impl RateLimiter for MaxOfRateLimiter {
    fn when(&self, item: &str) -> Duration {
        self.limiters
            .iter()
            .map(|l| l.when(item))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, item: &str) {
        for l in &self.limiters {
            l.forget(item);
        }
    }

    fn num_requeues(&self, item: &str) -> u32 {
        self.limiters
            .iter()
            .map(|l| l.num_requeues(item))
            .max()
            .unwrap_or(0)
    }
}

/// 控制器默认限速器：单条目指数退避与全局令牌桶取最大
pub fn default_controller_rate_limiter(config: &RateLimiterConfig) -> MaxOfRateLimiter {
    MaxOfRateLimiter::new(vec![
        Box::new(ItemExponentialFailureRateLimiter::new(
            config.base_delay(),
            config.max_delay(),
        )),
        Box::new(BucketRateLimiter::new(config.qps, config.burst)),
    ])
}
