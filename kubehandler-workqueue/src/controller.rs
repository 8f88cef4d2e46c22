//! 分发循环（WorkQueue）
//!
//! 把限速队列、处理器注册表与 worker 池组装为一个长驻的控制循环：
//! 1. 等待所有通知源完成初始同步（或取消）；
//! 2. 启动 `threadiness` 个 worker 并发消费队列；
//! 3. 阻塞直到取消；
//! 4. 关闭队列，等待在途条目处理完毕后返回。
//!
//! 回调没有单条目超时：挂起的回调会一直占用其 worker，
//! 取消后 `run` 最多等待 `shutdown_grace`，随后中止剩余 worker 并返回 `ShutdownTimeout`。
//!
use crate::codec::{EventType, encode};
use crate::config::WorkQueueConfig;
use crate::error::{WorkQueueError, WorkQueueResult as Result};
use crate::queue::RateLimitingQueue;
use crate::rate_limiter::RateLimiter;
use crate::registry::{HandlerFn, HandlerRegistry};
use crate::resource::{Resource, meta_namespace_key};
use crate::worker::{ErrorSink, LogErrorSink, Outcome, Worker};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 通知源初始同步探针
pub type SyncedFn = Arc<dyn Fn() -> bool + Send + Sync>;

pub struct WorkQueue {
    config: WorkQueueConfig,
    queue: RateLimitingQueue,
    registry: Arc<HandlerRegistry>,
    synced: Mutex<Vec<SyncedFn>>,
    error_sink: Arc<dyn ErrorSink>,
}

impl WorkQueue {
    /// 以默认配置创建命名队列
    pub fn named(name: impl Into<String>) -> Self {
        Self::from_valid(WorkQueueConfig::named(name))
    }

    /// 校验配置后创建；非法的限速参数在此处拒绝，而不是在首次入队时暴露
    pub fn new(config: WorkQueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: WorkQueueConfig) -> Self {
        Self {
            queue: RateLimitingQueue::with_config(&config),
            config,
            registry: Arc::new(HandlerRegistry::new()),
            synced: Mutex::new(Vec::new()),
            error_sink: Arc::new(LogErrorSink),
        }
    }

    /// 替换限速器（默认：指数退避与令牌桶取最大）
    pub fn with_rate_limiter(mut self, rate_limiter: impl RateLimiter + 'static) -> Self {
        self.queue = RateLimitingQueue::new(self.config.name.clone(), rate_limiter);
        self
    }

    /// 替换错误汇（默认写日志）
    pub fn with_error_sink(mut self, error_sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = error_sink;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &WorkQueueConfig {
        &self.config
    }

    pub fn queue(&self) -> &RateLimitingQueue {
        &self.queue
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// 当前待处理条目数
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// 追加一个同步探针；`run` 会等待所有探针返回 true
    pub fn add_synced<F>(&self, synced: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.synced.lock().push(Arc::new(synced));
    }

    pub fn register_add_handler(&self, kind: impl Into<String>, handler: HandlerFn) {
        self.registry.register_handler(EventType::Add, kind, handler);
    }

    pub fn register_update_handler(&self, kind: impl Into<String>, handler: HandlerFn) {
        self.registry
            .register_handler(EventType::Update, kind, handler);
    }

    pub fn register_delete_handler(&self, kind: impl Into<String>, handler: HandlerFn) {
        self.registry
            .register_handler(EventType::Delete, kind, handler);
    }

    pub fn enqueue_add(&self, kind: &str, obj: &dyn Resource) {
        self.enqueue(EventType::Add, kind, obj);
    }

    pub fn enqueue_update(&self, kind: &str, obj: &dyn Resource) {
        self.enqueue(EventType::Update, kind, obj);
    }

    pub fn enqueue_delete(&self, kind: &str, obj: &dyn Resource) {
        self.enqueue(EventType::Delete, kind, obj);
    }

    /// 计算对象标识并限速入队；标识无法提取时记录日志并丢弃，依赖下一次 resync 自愈
    pub fn enqueue(&self, event_type: EventType, kind: &str, obj: &dyn Resource) {
        match meta_namespace_key(obj) {
            Ok(object_key) => {
                let key = encode(event_type, kind, &object_key);
                debug!(queue = %self.config.name, %key, "enqueue");
                self.queue.add_rate_limited(key);
            }
            Err(err) => {
                warn!(
                    queue = %self.config.name,
                    kind,
                    event_type = %event_type,
                    error = %err,
                    "dropping event without identity"
                );
            }
        }
    }

    fn worker(&self, id: usize) -> Worker {
        Worker {
            id,
            queue: self.queue.clone(),
            registry: self.registry.clone(),
            error_sink: self.error_sink.clone(),
            retry_limit: self.config.rate_limiter.retry_limit(),
        }
    }

    /// 取出并处理一个条目；队列已关闭时返回 `None`
    pub async fn process_next_work_item(&self, token: &CancellationToken) -> Option<Outcome> {
        let key = self.queue.get().await?;
        Some(self.worker(0).process(&key, token).await)
    }

    /// 等待所有同步探针返回 true；取消先到达时返回 false
    pub async fn wait_for_cache_sync(&self, token: &CancellationToken) -> bool {
        let probes: Vec<SyncedFn> = self.synced.lock().clone();
        let mut ticker = time::interval(self.config.sync_poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return false,
                _ = ticker.tick() => {
                    if probes.iter().all(|synced| synced()) {
                        return true;
                    }
                }
            }
        }
    }

    /// 启动分发循环，阻塞直到 `token` 被取消
    ///
    /// 取消后等待在途回调最多 `shutdown_grace`；超时仍未结束的 worker 会被中止，
    /// 并返回 `ShutdownTimeout`。阻塞线程的同步回调无法被中止，会在后台继续运行。
    pub async fn run(&self, threadiness: usize, token: CancellationToken) -> Result<()> {
        let result = self.run_workers(threadiness, &token).await;
        self.queue.shut_down();
        result
    }

    async fn run_workers(&self, threadiness: usize, token: &CancellationToken) -> Result<()> {
        if threadiness == 0 {
            return Err(WorkQueueError::InvalidConfig {
                reason: "threadiness must be at least 1".to_string(),
            });
        }
        self.config.validate()?;

        info!(queue = %self.config.name, "waiting for caches to sync");
        if !self.wait_for_cache_sync(token).await {
            return Err(WorkQueueError::CacheSyncTimeout {
                name: self.config.name.clone(),
            });
        }

        info!(queue = %self.config.name, threadiness, "starting workers");
        let mut workers: Vec<JoinHandle<()>> = (0..threadiness)
            .map(|id| tokio::spawn(self.worker(id).run(token.clone())))
            .collect();

        token.cancelled().await;
        info!(queue = %self.config.name, "shutting down workers");
        self.queue.shut_down();

        let grace = self.config.shutdown_grace();
        let joined = time::timeout(grace, async {
            for w in workers.iter_mut() {
                let _ = w.await;
            }
        })
        .await;
        if joined.is_err() {
            let in_flight = self.queue.in_flight();
            warn!(
                queue = %self.config.name,
                in_flight,
                ?grace,
                "workers still busy after shutdown grace period, aborting"
            );
            for w in &workers {
                w.abort();
            }
            return Err(WorkQueueError::ShutdownTimeout {
                name: self.config.name.clone(),
                in_flight,
            });
        }

        Ok(())
    }
}
