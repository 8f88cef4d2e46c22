//! 工作队列统一错误定义
//!
//! 覆盖键编解码、对象标识提取、处理器分发、缓存同步与配置校验，
//! 并区分“可重试”（回调失败）与“永久失败”（键损坏、未注册的 kind）。
//!
use thiserror::Error;

/// 工作队列错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum WorkQueueError {
    // --- 键编解码 ---
    #[error("malformed key: key={key}, reason={reason}")]
    MalformedKey { key: String, reason: String },
    #[error("cannot extract object identity: {reason}")]
    Identity { reason: String },

    // --- 分发 ---
    #[error("no handler registered: kind={kind}, event_type={event_type}")]
    UnknownKind { kind: String, event_type: String },
    #[error("error syncing '{key}': kind={kind}, event_type={event_type}, reason={source}")]
    Handler {
        kind: String,
        event_type: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("handler panicked: kind={kind}, key={key}, message={message}")]
    HandlerPanicked {
        kind: String,
        key: String,
        message: String,
    },
    #[error("retries exhausted: key={key}, attempts={attempts}")]
    RetriesExhausted { key: String, attempts: u32 },

    // --- 生命周期/配置 ---
    #[error("failed to wait for caches to sync: queue={name}")]
    CacheSyncTimeout { name: String },
    #[error("workers did not finish within shutdown grace: queue={name}, in_flight={in_flight}")]
    ShutdownTimeout { name: String, in_flight: usize },
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
}

impl WorkQueueError {
    pub fn malformed_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn identity(reason: impl Into<String>) -> Self {
        Self::Identity {
            reason: reason.into(),
        }
    }

    /// 是否值得按退避策略重新投递
    ///
    /// 损坏的键与未注册的 kind 永远不会“变好”，重投只会形成死循环。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Handler { .. } | Self::HandlerPanicked { .. })
    }
}

/// 统一 Result 类型别名
pub type WorkQueueResult<T> = Result<T, WorkQueueError>;
