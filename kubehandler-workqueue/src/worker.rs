//! Worker：从队列取键、解码、分发并把结果反馈给限速器
//!
//! 单个条目的失败（包括回调 panic）只会记录到错误汇，不会让 worker 退出；
//! worker 只在取消信号触发或队列关闭时结束。
//!
use crate::codec::decode;
use crate::context::DispatchContext;
use crate::error::WorkQueueError;
use crate::queue::RateLimitingQueue;
use crate::registry::HandlerRegistry;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, warn};

/// 错误汇：接收所有单条目错误
pub trait ErrorSink: Send + Sync {
    fn handle_error(&self, queue: &str, key: &str, err: &WorkQueueError);
}

/// 默认错误汇：写入 tracing 日志
#[derive(Clone, Copy, Debug, Default)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn handle_error(&self, queue: &str, key: &str, err: &WorkQueueError) {
        if err.is_retryable() {
            warn!(queue, key, error = %err, "item failed, will retry");
        } else {
            error!(queue, key, error = %err, "item dropped");
        }
    }
}

/// 单个条目的处理结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// 处理成功，退避计数已清空
    Synced,
    /// 处理失败，已按退避策略重新入队
    Requeued,
    /// 永久失败或重试次数耗尽，已丢弃
    Dropped,
}

#[derive(Clone)]
pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) queue: RateLimitingQueue,
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) error_sink: Arc<dyn ErrorSink>,
    pub(crate) retry_limit: Option<u32>,
}

impl Worker {
    /// Fetching → Processing → Fetching，直到取消或队列关闭
    pub(crate) async fn run(self, token: CancellationToken) {
        debug!(queue = %self.queue.name(), worker = self.id, "worker started");
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                item = self.queue.get() => match item {
                    Some(key) => {
                        self.process(&key, &token).await;
                    }
                    None => break,
                },
            }
        }
        debug!(queue = %self.queue.name(), worker = self.id, "worker stopped");
    }

    /// 处理一个已取出的条目，结束时总会调用 `done`
    pub(crate) async fn process(&self, key: &str, token: &CancellationToken) -> Outcome {
        let span = info_span!("workqueue_item", queue = %self.queue.name(), worker = self.id, key);
        let outcome = self.sync(key, token).instrument(span).await;
        self.queue.done(key);
        outcome
    }

    async fn sync(&self, key: &str, token: &CancellationToken) -> Outcome {
        let parsed = match decode(key) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.queue.forget(key);
                self.error_sink.handle_error(self.queue.name(), key, &err);
                return Outcome::Dropped;
            }
        };

        let retries = self.queue.num_requeues(key);
        let ctx = DispatchContext {
            kind: parsed.kind.clone(),
            event_type: parsed.event_type,
            retries,
            cancellation: token.clone(),
        };

        let result = AssertUnwindSafe(self.registry.dispatch_key(&parsed, ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(WorkQueueError::HandlerPanicked {
                    kind: parsed.kind.clone(),
                    key: key.to_string(),
                    message: panic_message(payload.as_ref()),
                })
            });

        match result {
            Ok(()) => {
                self.queue.forget(key);
                debug!(retries, "synced");
                Outcome::Synced
            }
            Err(err) if !err.is_retryable() => {
                self.queue.forget(key);
                self.error_sink.handle_error(self.queue.name(), key, &err);
                Outcome::Dropped
            }
            Err(err) => {
                self.error_sink.handle_error(self.queue.name(), key, &err);
                match self.retry_limit {
                    Some(limit) if retries >= limit => {
                        self.queue.forget(key);
                        let exhausted = WorkQueueError::RetriesExhausted {
                            key: key.to_string(),
                            attempts: retries + 1,
                        };
                        self.error_sink.handle_error(self.queue.name(), key, &exhausted);
                        Outcome::Dropped
                    }
                    _ => {
                        self.queue.requeue(key);
                        Outcome::Requeued
                    }
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
