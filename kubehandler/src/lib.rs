//! kubehandler：资源协调控制器的事件循环
//!
//! 在 `kubehandler-workqueue` 之上提供面向应用的接口：
//! - `EventHandler`：按 kind 实现 add/update/delete 协调逻辑；
//! - `Informer`/`ResourceEventHandler`：外部通知源协议，附带内存实现；
//! - `QueueBinding`：把通知源的原始事件（经 resync 过滤）翻译为队列键；
//! - `EventLoop`：注册处理器并运行 worker 池，直到取消。
//!
//! 典型用法：
//! 1. 为每种资源实现 `EventHandler`，返回其通知源；
//! 2. `EventLoop::register` 注册全部处理器；
//! 3. 启动通知源，`EventLoop::run(threadiness, token)` 阻塞运行；
//! 4. 取消 `token` 以优雅退出。
//!
pub mod binding;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod handler;
pub mod informer;

pub use crate::binding::QueueBinding;
pub use crate::config::EventLoopConfig;
pub use crate::error::{EventLoopError, EventLoopResult};
pub use crate::event_loop::EventLoop;
pub use crate::handler::{DefaultHandler, EventHandler};
pub use crate::informer::{InMemoryInformer, Informer, ResourceEventHandler};

pub use kubehandler_workqueue as workqueue;
pub use kubehandler_workqueue::{DispatchContext, ObjectRef, Resource};
