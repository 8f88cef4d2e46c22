//! 队列键编解码（Key Codec）
//!
//! 队列中的元素是不透明字符串：`<eventType>:<kind>:<namespace>/<name>`，
//! 集群级对象省略 `namespace/`。相等的字符串被去重，不等的字符串彼此独立。
//!
use crate::error::{WorkQueueError, WorkQueueResult as Result};
use crate::resource::split_meta_namespace_key;
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = ':';

/// 事件类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    Add,
    Update,
    Delete,
}

impl EventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::Add => "add",
            EventType::Update => "update",
            EventType::Delete => "delete",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = WorkQueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(EventType::Add),
            "update" => Ok(EventType::Update),
            "delete" => Ok(EventType::Delete),
            other => Err(WorkQueueError::malformed_key(
                other,
                format!("invalid event type: {other}"),
            )),
        }
    }
}

/// 解码后的队列键
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueKey {
    pub event_type: EventType,
    pub kind: String,
    /// 集群级对象为空串
    pub namespace: String,
    pub name: String,
}

impl QueueKey {
    /// 还原对象标识（`namespace/name` 或 `name`）
    pub fn object_key(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }

    pub fn encode(&self) -> String {
        encode(self.event_type, &self.kind, &self.object_key())
    }
}

/// 编码队列键
pub fn encode(event_type: EventType, kind: &str, object_key: &str) -> String {
    format!("{event_type}{SEPARATOR}{kind}{SEPARATOR}{object_key}")
}

/// 解码队列键；段数不为 3、事件类型未知或对象标识非法时返回 `MalformedKey`
pub fn decode(key: &str) -> Result<QueueKey> {
    let segments: Vec<&str> = key.split(SEPARATOR).collect();
    let [event_type, kind, object_key] = segments.as_slice() else {
        return Err(WorkQueueError::malformed_key(
            key,
            format!("expected 3 segments, found {}", segments.len()),
        ));
    };

    if kind.is_empty() {
        return Err(WorkQueueError::malformed_key(key, "empty kind"));
    }

    let event_type = event_type
        .parse::<EventType>()
        .map_err(|e| reattach(key, e))?;
    let (namespace, name) = split_meta_namespace_key(object_key).map_err(|e| reattach(key, e))?;

    Ok(QueueKey {
        event_type,
        kind: kind.to_string(),
        namespace,
        name,
    })
}

// 子解析器只知道片段，这里把完整键补回错误里
fn reattach(key: &str, err: WorkQueueError) -> WorkQueueError {
    match err {
        WorkQueueError::MalformedKey { reason, .. } => WorkQueueError::malformed_key(key, reason),
        other => other,
    }
}
