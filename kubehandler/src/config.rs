//! 事件循环配置
//!
//! 加载优先级（由低到高）：
//! 1. 内置默认值；
//! 2. 配置文件（TOML，可选）；
//! 3. 环境变量 `KUBEHANDLER__*`，层级以 `__` 分隔，
//!    例如 `KUBEHANDLER__QUEUE__RATE_LIMITER__MAX_RETRIES=5`。
//!
use crate::error::EventLoopResult as Result;
use config::{Config, Environment, File};
use kubehandler_workqueue::WorkQueueConfig;
use serde::Deserialize;

pub const ENV_PREFIX: &str = "KUBEHANDLER";

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EventLoopConfig {
    /// worker 数量
    #[serde(default = "default_threadiness")]
    pub threadiness: usize,

    #[serde(default)]
    pub queue: WorkQueueConfig,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            threadiness: default_threadiness(),
            queue: WorkQueueConfig::default(),
        }
    }
}

impl EventLoopConfig {
    /// 从可选的配置文件与环境变量加载
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.queue.validate()?;
        Ok(config)
    }
}

fn default_threadiness() -> usize {
    2
}
