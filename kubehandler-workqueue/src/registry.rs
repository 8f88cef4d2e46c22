//! 处理器注册表（HandlerRegistry）
//!
//! 按 kind 保存 add/update/delete 三类回调。注册发生在事件循环启动前，
//! 之后只读；同一 kind 重复注册时以最后一次为准。
//!
use crate::codec::{EventType, QueueKey};
use crate::context::DispatchContext;
use crate::error::{WorkQueueError, WorkQueueResult as Result};
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// 类型擦除后的回调：`(ctx, namespace, name)`
pub type HandlerFn = Arc<dyn Fn(DispatchContext, String, String) -> HandlerFuture + Send + Sync>;

/// 把普通异步闭包包装为 `HandlerFn`
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(DispatchContext, String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx, namespace, name| Box::pin(f(ctx, namespace, name)))
}

#[derive(Default)]
pub struct HandlerRegistry {
    add: DashMap<String, HandlerFn>,
    update: DashMap<String, HandlerFn>,
    delete: DashMap<String, HandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, event_type: EventType) -> &DashMap<String, HandlerFn> {
        match event_type {
            EventType::Add => &self.add,
            EventType::Update => &self.update,
            EventType::Delete => &self.delete,
        }
    }

    /// 一次性注册某个 kind 的三类回调
    pub fn register(
        &self,
        kind: impl Into<String>,
        add: HandlerFn,
        update: HandlerFn,
        delete: HandlerFn,
    ) {
        let kind = kind.into();
        self.add.insert(kind.clone(), add);
        self.update.insert(kind.clone(), update);
        self.delete.insert(kind, delete);
    }

    /// 注册单个事件类型的回调
    pub fn register_handler(&self, event_type: EventType, kind: impl Into<String>, f: HandlerFn) {
        self.table(event_type).insert(kind.into(), f);
    }

    pub fn contains(&self, event_type: EventType, kind: &str) -> bool {
        self.table(event_type).contains_key(kind)
    }

    /// 已注册任一回调的 kind
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .add
            .iter()
            .chain(self.update.iter())
            .chain(self.delete.iter())
            .map(|e| e.key().clone())
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// 按事件类型分发；未注册的 kind 返回 `UnknownKind`，回调错误原样包装返回
    pub async fn dispatch(
        &self,
        event_type: EventType,
        kind: &str,
        namespace: &str,
        name: &str,
        ctx: DispatchContext,
    ) -> Result<()> {
        // 先克隆出回调再 await，避免跨 await 持有分片锁
        let Some(f) = self.table(event_type).get(kind).map(|h| h.clone()) else {
            return Err(WorkQueueError::UnknownKind {
                kind: kind.to_string(),
                event_type: event_type.to_string(),
            });
        };

        (f)(ctx, namespace.to_string(), name.to_string())
            .await
            .map_err(|source| WorkQueueError::Handler {
                kind: kind.to_string(),
                event_type: event_type.to_string(),
                key: object_key(namespace, name),
                source,
            })
    }

    pub async fn dispatch_key(&self, key: &QueueKey, ctx: DispatchContext) -> Result<()> {
        self.dispatch(key.event_type, &key.kind, &key.namespace, &key.name, ctx)
            .await
    }

    pub async fn dispatch_add(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        ctx: DispatchContext,
    ) -> Result<()> {
        self.dispatch(EventType::Add, kind, namespace, name, ctx).await
    }

    pub async fn dispatch_update(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        ctx: DispatchContext,
    ) -> Result<()> {
        self.dispatch(EventType::Update, kind, namespace, name, ctx)
            .await
    }

    pub async fn dispatch_delete(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        ctx: DispatchContext,
    ) -> Result<()> {
        self.dispatch(EventType::Delete, kind, namespace, name, ctx)
            .await
    }
}

fn object_key(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}/{name}")
    }
}
