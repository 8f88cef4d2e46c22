//! 处理器绑定（QueueBinding）
//!
//! 挂在通知源上的原始事件回调，把 add/update/delete 翻译为队列键：
//! - add：总是入队；
//! - update：先经 resync 过滤，版本号未变化时丢弃；
//! - delete：总是入队，删除永远不是 resync 的产物。
//!
use crate::informer::ResourceEventHandler;
use kubehandler_workqueue::{Resource, WorkQueue, is_resync, meta_namespace_key};
use std::sync::{Arc, Weak};
use tracing::trace;

pub struct QueueBinding {
    kind: String,
    // 通知源持有绑定，绑定只弱引用队列，避免形成引用环
    work_queue: Weak<WorkQueue>,
}

impl QueueBinding {
    pub fn new(kind: impl Into<String>, work_queue: &Arc<WorkQueue>) -> Self {
        Self {
            kind: kind.into(),
            work_queue: Arc::downgrade(work_queue),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    fn with_queue(&self, f: impl FnOnce(&WorkQueue)) {
        match self.work_queue.upgrade() {
            Some(wq) => f(&wq),
            None => trace!(kind = %self.kind, "event loop dropped, ignoring event"),
        }
    }
}

impl ResourceEventHandler for QueueBinding {
    fn on_add(&self, obj: &dyn Resource) {
        self.with_queue(|wq| wq.enqueue_add(&self.kind, obj));
    }

    fn on_update(&self, old: &dyn Resource, new: &dyn Resource) {
        if is_resync(old, new) {
            trace!(
                kind = %self.kind,
                key = ?meta_namespace_key(new).ok(),
                version = ?new.resource_version(),
                "skipping resync of unchanged object"
            );
            return;
        }
        self.with_queue(|wq| wq.enqueue_update(&self.kind, new));
    }

    fn on_delete(&self, obj: &dyn Resource) {
        self.with_queue(|wq| wq.enqueue_delete(&self.kind, obj));
    }
}
