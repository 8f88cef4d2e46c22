//! 通知源协议（Informer）
//!
//! 事件循环只依赖通知源的两项能力：
//! - 订阅原始的 add / update(old, new) / delete 事件；
//! - 查询初始全量同步是否已完成。
//!
//! 真正的 watch/list 实现属于外部协作方；`InMemoryInformer` 是一个内存实现，
//! 适用于测试、示例与本地开发。
//!
use kubehandler_workqueue::{Resource, WorkQueueResult, meta_namespace_key};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

/// 原始事件回调：在通知源的投递路径上同步执行，应尽快返回
pub trait ResourceEventHandler: Send + Sync {
    fn on_add(&self, obj: &dyn Resource);
    fn on_update(&self, old: &dyn Resource, new: &dyn Resource);
    fn on_delete(&self, obj: &dyn Resource);
}

/// 通知源
pub trait Informer: Send + Sync {
    /// 订阅原始事件
    fn add_event_handler(&self, handler: Arc<dyn ResourceEventHandler>);
    /// 初始同步是否完成
    fn has_synced(&self) -> bool;
}

/// 内存通知源：维护一份按 `namespace/name` 索引的对象缓存并向订阅者扇出事件
pub struct InMemoryInformer<R> {
    store: RwLock<BTreeMap<String, Arc<R>>>,
    handlers: RwLock<Vec<Arc<dyn ResourceEventHandler>>>,
    synced: AtomicBool,
}

impl<R> Default for InMemoryInformer<R> {
    fn default() -> Self {
        Self {
            store: RwLock::new(BTreeMap::new()),
            handlers: RwLock::new(Vec::new()),
            synced: AtomicBool::new(false),
        }
    }
}

impl<R: Resource + 'static> InMemoryInformer<R> {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> Vec<Arc<dyn ResourceEventHandler>> {
        self.handlers.read().clone()
    }

    /// 写入对象；已存在时按 update 投递
    pub fn add(&self, obj: R) -> WorkQueueResult<()> {
        let key = meta_namespace_key(&obj)?;
        let new = Arc::new(obj);
        let old = self.store.write().insert(key, new.clone());

        for h in self.subscribers() {
            match &old {
                Some(old) => h.on_update(old.as_ref(), new.as_ref()),
                None => h.on_add(new.as_ref()),
            }
        }
        Ok(())
    }

    /// 更新对象；不存在时按 add 投递
    pub fn update(&self, obj: R) -> WorkQueueResult<()> {
        self.add(obj)
    }

    /// 删除对象；不存在时忽略
    pub fn delete(&self, key: &str) -> Option<Arc<R>> {
        let removed = self.store.write().remove(key)?;
        for h in self.subscribers() {
            h.on_delete(removed.as_ref());
        }
        Some(removed)
    }

    /// 周期性 resync：对缓存中每个对象投递一次 update(obj, obj)
    pub fn resync(&self) {
        let objects: Vec<Arc<R>> = self.store.read().values().cloned().collect();
        trace!(objects = objects.len(), "resync");
        let handlers = self.subscribers();
        for obj in &objects {
            for h in &handlers {
                h.on_update(obj.as_ref(), obj.as_ref());
            }
        }
    }

    /// 标记初始同步完成
    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<Arc<R>> {
        self.store.read().get(key).cloned()
    }

    pub fn list(&self) -> Vec<Arc<R>> {
        self.store.read().values().cloned().collect()
    }
}

impl<R: Resource + 'static> Informer for InMemoryInformer<R> {
    /// 新订阅者会先收到缓存中现有对象的 add 事件
    fn add_event_handler(&self, handler: Arc<dyn ResourceEventHandler>) {
        let existing: Vec<Arc<R>> = self.store.read().values().cloned().collect();
        self.handlers.write().push(handler.clone());
        for obj in &existing {
            handler.on_add(obj.as_ref());
        }
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubehandler_workqueue::ObjectRef;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Tape {
        events: Mutex<Vec<String>>,
    }

    fn key(obj: &dyn Resource) -> String {
        meta_namespace_key(obj).unwrap()
    }

    impl ResourceEventHandler for Tape {
        fn on_add(&self, obj: &dyn Resource) {
            self.events.lock().push(format!("add {}", key(obj)));
        }
        fn on_update(&self, old: &dyn Resource, new: &dyn Resource) {
            self.events.lock().push(format!(
                "update {} {:?}->{:?}",
                key(new),
                old.resource_version(),
                new.resource_version()
            ));
        }
        fn on_delete(&self, obj: &dyn Resource) {
            self.events.lock().push(format!("delete {}", key(obj)));
        }
    }

    #[test]
    fn fans_out_lifecycle_events() {
        let informer = InMemoryInformer::<ObjectRef>::new();
        let tape = Arc::new(Tape::default());
        informer.add_event_handler(tape.clone());

        let pod = ObjectRef::new("ns1", "pod-a").with_resource_version("1");
        informer.add(pod.clone()).unwrap();
        informer.update(pod.clone().with_resource_version("2")).unwrap();
        informer.resync();
        assert!(informer.delete("ns1/pod-a").is_some());
        assert!(informer.delete("ns1/pod-a").is_none());

        assert_eq!(
            *tape.events.lock(),
            vec![
                "add ns1/pod-a".to_string(),
                "update ns1/pod-a Some(\"1\")->Some(\"2\")".to_string(),
                "update ns1/pod-a Some(\"2\")->Some(\"2\")".to_string(),
                "delete ns1/pod-a".to_string(),
            ]
        );
    }

    #[test]
    fn late_subscribers_receive_existing_objects() {
        let informer = InMemoryInformer::<ObjectRef>::new();
        informer.add(ObjectRef::new("ns1", "a")).unwrap();
        informer.add(ObjectRef::cluster_scoped("b")).unwrap();

        let tape = Arc::new(Tape::default());
        informer.add_event_handler(tape.clone());
        assert_eq!(
            *tape.events.lock(),
            vec!["add b".to_string(), "add ns1/a".to_string()]
        );
    }

    #[test]
    fn rejects_objects_without_identity() {
        let informer = InMemoryInformer::<ObjectRef>::new();
        assert!(informer.add(ObjectRef::new("ns1", "")).is_err());
        assert!(informer.list().is_empty());
    }

    #[test]
    fn reports_sync_state() {
        let informer = InMemoryInformer::<ObjectRef>::new();
        assert!(!informer.has_synced());
        informer.mark_synced();
        assert!(informer.has_synced());
    }
}
