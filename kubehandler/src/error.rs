use kubehandler_workqueue::WorkQueueError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum EventLoopError {
    #[error("workqueue: {0}")]
    WorkQueue(#[from] WorkQueueError),

    #[error("handler already registered: name={name}")]
    AlreadyRegistered { name: String },

    #[error("config: {0}")]
    Config(#[from] config::ConfigError),
}

pub type EventLoopResult<T> = Result<T, EventLoopError>;
