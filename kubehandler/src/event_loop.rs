//! 事件循环（EventLoop）
//!
//! 处理器注册中心与运行入口：
//! - `register`：登记处理器的同步探针与三类回调，并在其通知源上挂载 `QueueBinding`；
//! - `run`：等待所有通知源同步后启动 worker，阻塞直到取消。
//!
use crate::binding::QueueBinding;
use crate::error::{EventLoopError, EventLoopResult as Result};
use crate::handler::EventHandler;
use kubehandler_workqueue::{ErrorSink, HandlerFn, WorkQueue, WorkQueueConfig, handler_fn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct EventLoop {
    work_queue: Arc<WorkQueue>,
    names: Mutex<HashSet<String>>,
}

impl EventLoop {
    /// 以默认配置创建；`name` 同时作为队列名
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_work_queue(WorkQueue::named(name))
    }

    /// 配置非法时返回错误
    pub fn with_config(config: WorkQueueConfig) -> Result<Self> {
        Ok(Self::with_work_queue(WorkQueue::new(config)?))
    }

    /// 使用预先配置好的队列（自定义限速器、错误汇等）
    pub fn with_work_queue(work_queue: WorkQueue) -> Self {
        Self {
            work_queue: Arc::new(work_queue),
            names: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_error_sink(
        config: WorkQueueConfig,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Result<Self> {
        Ok(Self::with_work_queue(WorkQueue::new(config)?.with_error_sink(error_sink)))
    }

    pub fn work_queue(&self) -> &WorkQueue {
        &self.work_queue
    }

    /// 注册处理器；同名处理器只能注册一次
    pub fn register(&self, handler: Arc<dyn EventHandler>) -> Result<()> {
        let kind = handler.name().to_string();
        if !self.names.lock().insert(kind.clone()) {
            return Err(EventLoopError::AlreadyRegistered { name: kind });
        }

        {
            let handler = handler.clone();
            self.work_queue.add_synced(move || handler.has_synced());
        }

        self.work_queue.registry().register(
            kind.clone(),
            add_fn(handler.clone()),
            update_fn(handler.clone()),
            delete_fn(handler.clone()),
        );

        handler
            .informer()
            .add_event_handler(Arc::new(QueueBinding::new(kind.clone(), &self.work_queue)));

        info!(queue = %self.work_queue.name(), handler = %kind, "handler registered");
        Ok(())
    }

    /// 运行事件循环，阻塞直到 `token` 被取消
    pub async fn run(&self, threadiness: usize, token: CancellationToken) -> Result<()> {
        self.work_queue.run(threadiness, token).await?;
        Ok(())
    }
}

fn add_fn(handler: Arc<dyn EventHandler>) -> HandlerFn {
    handler_fn(move |ctx, namespace, name| {
        let handler = handler.clone();
        async move { handler.on_add(&ctx, &namespace, &name).await }
    })
}

fn update_fn(handler: Arc<dyn EventHandler>) -> HandlerFn {
    handler_fn(move |ctx, namespace, name| {
        let handler = handler.clone();
        async move { handler.on_update(&ctx, &namespace, &name).await }
    })
}

fn delete_fn(handler: Arc<dyn EventHandler>) -> HandlerFn {
    handler_fn(move |ctx, namespace, name| {
        let handler = handler.clone();
        async move { handler.on_delete(&ctx, &namespace, &name).await }
    })
}
