//! 工作队列分发核心（kubehandler-workqueue）
//!
//! 把异步到达的“资源已变化”通知转换为串行化、去重、带退避重试的
//! 按 kind 回调调用，是资源协调类控制器的事件分发核心：
//! - 队列键编解码（`codec`）与对象标识适配（`resource`）；
//! - resync 过滤（`resync`），跳过周期重放的未变化对象；
//! - 限速器（`rate_limiter`）与限速去重队列（`queue`）；
//! - 处理器注册表（`registry`）与 worker（`worker`）；
//! - 分发循环（`controller`）：等待同步、启动 worker、优雅关闭。
//!
//! 本 crate 不关心资源的具体形态，也不实现 watch 协议；通知源只需提供
//! 事件回调与“初始同步是否完成”的探针。所有状态仅驻留内存。
//!
pub mod codec;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod queue;
pub mod rate_limiter;
pub mod registry;
pub mod resource;
pub mod resync;
pub mod worker;

pub use codec::{EventType, QueueKey, decode, encode};
pub use config::{RateLimiterConfig, WorkQueueConfig};
pub use context::DispatchContext;
pub use controller::{SyncedFn, WorkQueue};
pub use error::{WorkQueueError, WorkQueueResult};
pub use queue::RateLimitingQueue;
pub use rate_limiter::{
    BucketRateLimiter, ItemExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
    default_controller_rate_limiter,
};
pub use registry::{HandlerFn, HandlerRegistry, handler_fn};
pub use resource::{ObjectRef, Resource, meta_namespace_key, split_meta_namespace_key};
pub use resync::{is_resync, should_suppress};
pub use worker::{ErrorSink, LogErrorSink, Outcome};
