//! 事件处理器（EventHandler）
//!
//! 应用按资源 kind 实现的协调逻辑：名称（即队列中的 kind）、所订阅的通知源，
//! 以及 add/update/delete 三个回调。回调只拿到 `namespace/name`，
//! 需要对象当前状态时应自行从缓存或远端读取。
//!
use crate::informer::Informer;
use async_trait::async_trait;
use kubehandler_workqueue::DispatchContext;
use std::sync::Arc;

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称，同时作为队列键中的 kind
    fn name(&self) -> &str;

    /// 所订阅的通知源
    fn informer(&self) -> Arc<dyn Informer>;

    /// 初始同步探针，默认委托给通知源
    fn has_synced(&self) -> bool {
        self.informer().has_synced()
    }

    async fn on_add(&self, _ctx: &DispatchContext, _namespace: &str, _name: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_update(
        &self,
        _ctx: &DispatchContext,
        _namespace: &str,
        _name: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_delete(
        &self,
        _ctx: &DispatchContext,
        _namespace: &str,
        _name: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 只订阅、不处理的处理器：三个回调均为空操作
#[derive(Clone)]
pub struct DefaultHandler {
    name: String,
    informer: Arc<dyn Informer>,
}

impl DefaultHandler {
    pub fn new(name: impl Into<String>, informer: Arc<dyn Informer>) -> Self {
        Self {
            name: name.into(),
            informer,
        }
    }
}

#[async_trait]
impl EventHandler for DefaultHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn informer(&self) -> Arc<dyn Informer> {
        self.informer.clone()
    }
}
