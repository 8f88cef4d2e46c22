//! 工作队列配置
//!
//! 所有时长字段以毫秒为单位，便于从 TOML/环境变量反序列化。
//!
use crate::error::{WorkQueueError, WorkQueueResult as Result};
use bon::Builder;
use serde::Deserialize;
use std::time::Duration;

/// 限速/退避策略
#[derive(Builder, Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct RateLimiterConfig {
    /// 单条目失败退避的基数（毫秒）
    #[builder(default = default_base_delay_ms())]
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// 单条目失败退避的上限（毫秒）
    #[builder(default = default_max_delay_ms())]
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// 最大重试次数（0 表示不限）
    #[builder(default)]
    #[serde(default)]
    pub max_retries: u32,

    /// 全局令牌桶速率
    #[builder(default = default_qps())]
    #[serde(default = "default_qps")]
    pub qps: f64,

    /// 全局令牌桶容量
    #[builder(default = default_burst())]
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: 0,
            qps: default_qps(),
            burst: default_burst(),
        }
    }
}

impl RateLimiterConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// `None` 表示不限重试次数
    pub fn retry_limit(&self) -> Option<u32> {
        (self.max_retries > 0).then_some(self.max_retries)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(WorkQueueError::InvalidConfig {
                reason: format!(
                    "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                    self.base_delay_ms, self.max_delay_ms
                ),
            });
        }
        if !(self.qps.is_finite() && self.qps > 0.0) {
            return Err(WorkQueueError::InvalidConfig {
                reason: format!("qps must be positive, got {}", self.qps),
            });
        }
        if self.burst == 0 {
            return Err(WorkQueueError::InvalidConfig {
                reason: "burst must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// 工作队列配置
#[derive(Builder, Clone, Debug, Deserialize, PartialEq)]
pub struct WorkQueueConfig {
    /// 队列名称（日志字段）
    #[builder(into, default = default_name())]
    #[serde(default = "default_name")]
    pub name: String,

    #[builder(default)]
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,

    /// 等待通知源完成初始同步时的轮询间隔（毫秒）
    #[builder(default = default_sync_poll_interval_ms())]
    #[serde(default = "default_sync_poll_interval_ms")]
    pub sync_poll_interval_ms: u64,

    /// 取消后等待在途条目完成的最长时间（毫秒）
    #[builder(default = default_shutdown_grace_ms())]
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            rate_limiter: RateLimiterConfig::default(),
            sync_poll_interval_ms: default_sync_poll_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl WorkQueueConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync_poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_poll_interval_ms == 0 {
            return Err(WorkQueueError::InvalidConfig {
                reason: "sync_poll_interval_ms must be positive".to_string(),
            });
        }
        self.rate_limiter.validate()
    }
}

fn default_name() -> String {
    "workqueue".to_string()
}
fn default_base_delay_ms() -> u64 {
    5
}
fn default_max_delay_ms() -> u64 {
    1_000_000
}
fn default_qps() -> f64 {
    10.0
}
fn default_burst() -> u32 {
    100
}
fn default_sync_poll_interval_ms() -> u64 {
    100
}
fn default_shutdown_grace_ms() -> u64 {
    30_000
}
